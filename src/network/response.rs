use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Status {
    Idle,
    Loading,
    Success,
    Error,
}

/// State of a value loaded from the engine.
///
/// `Error` keeps the last good payload so the UI can keep showing it under
/// an error banner.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum Response<T> {
    Idle,
    Loading,
    Success { data: T },
    Error { message: String, last: Option<T> },
}

impl<T> Response<T> {
    pub fn success(data: T) -> Self {
        Response::Success { data }
    }

    pub fn error(message: impl Into<String>, last: Option<T>) -> Self {
        Response::Error { message: message.into(), last }
    }

    pub fn status(&self) -> Status {
        match self {
            Response::Idle => Status::Idle,
            Response::Loading => Status::Loading,
            Response::Success { .. } => Status::Success,
            Response::Error { .. } => Status::Error,
        }
    }

    /// Payload if any, including the last good value of an error.
    pub fn data(&self) -> Option<&T> {
        match self {
            Response::Success { data } => Some(data),
            Response::Error { last, .. } => last.as_ref(),
            _ => None,
        }
    }

    pub fn into_data(self) -> Option<T> {
        match self {
            Response::Success { data } => Some(data),
            Response::Error { last, .. } => last,
            _ => None,
        }
    }

    pub fn message(&self) -> Option<&str> {
        match self {
            Response::Error { message, .. } => Some(message),
            _ => None,
        }
    }

    pub fn is_loading(&self) -> bool {
        matches!(self, Response::Loading)
    }

    pub fn map<U, F: FnOnce(T) -> U>(self, f: F) -> Response<U> {
        match self {
            Response::Idle => Response::Idle,
            Response::Loading => Response::Loading,
            Response::Success { data } => Response::Success { data: f(data) },
            Response::Error { message, last } => Response::Error { message, last: last.map(f) },
        }
    }
}

impl<T> Default for Response<T> {
    fn default() -> Self {
        Response::Idle
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_payload_per_state() {
        assert_eq!(Response::<u32>::Idle.data(), None);
        assert_eq!(Response::<u32>::Loading.data(), None);
        assert_eq!(Response::success(3).data(), Some(&3));
        assert_eq!(Response::error("down", Some(2)).data(), Some(&2));
        assert_eq!(Response::<u32>::error("down", None).message(), Some("down"));
        assert_eq!(Response::success(1).message(), None);
    }

    #[test]
    fn test_map_keeps_state() {
        let r = Response::error("down", Some(vec![1, 2])).map(|v| v.len());
        assert_eq!(r.status(), Status::Error);
        assert_eq!(r.into_data(), Some(2));
    }
}
