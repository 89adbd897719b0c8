//! Observable value cells
//!
//! A thin wrapper over `tokio::sync::watch`: writers replace the value,
//! readers either take a snapshot or subscribe. Delivery is latest-value-wins;
//! a slow subscriber only ever sees the newest value.

use tokio::sync::watch;

#[derive(Debug)]
pub struct Observable<T> {
    tx: watch::Sender<T>,
}

impl<T: Clone> Observable<T> {
    pub fn new(initial: T) -> Self {
        let (tx, _) = watch::channel(initial);
        Self { tx }
    }

    /// Snapshot of the current value
    pub fn get(&self) -> T {
        self.tx.borrow().clone()
    }

    /// Publishes a value even when nobody is subscribed.
    pub fn set(&self, value: T) {
        self.tx.send_replace(value);
    }

    pub fn subscribe(&self) -> watch::Receiver<T> {
        self.tx.subscribe()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_latest_value_wins() {
        let cell = Observable::new(0u32);
        let mut rx = cell.subscribe();

        cell.set(1);
        cell.set(2);
        rx.changed().await.unwrap();
        assert_eq!(*rx.borrow_and_update(), 2);
        assert_eq!(cell.get(), 2);
    }

    #[test]
    fn test_set_without_subscribers() {
        let cell = Observable::new(String::new());
        cell.set("engine".into());
        assert_eq!(cell.get(), "engine");

        let rx = cell.subscribe();
        assert_eq!(*rx.borrow(), "engine");
    }
}
