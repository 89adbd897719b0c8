//! Architecture Verification Suite
//!
//! Compile-time checks that the shared components can cross task and
//! thread boundaries.

#[cfg(test)]
mod architecture_tests {
    use attestation_monitor::attestation::AttestationSession;
    use attestation_monitor::config::PreferencesStore;
    use attestation_monitor::data::{FetchCoordinator, Observable, SyncEventBus};
    use attestation_monitor::model::Element;
    use attestation_monitor::network::{EngineConnector, HttpEngineClient, RemoteEngineClient};
    use attestation_monitor::{AttestationMonitor, AttesterError, Response};

    fn assert_send_sync<T: Send + Sync + ?Sized>() {}

    #[test]
    fn test_core_is_thread_safe() {
        assert_send_sync::<FetchCoordinator>();
        assert_send_sync::<AttestationSession>();
        assert_send_sync::<AttestationMonitor>();
        assert_send_sync::<PreferencesStore>();
    }

    #[test]
    fn test_seams_are_thread_safe() {
        assert_send_sync::<dyn RemoteEngineClient>();
        assert_send_sync::<dyn EngineConnector>();
        assert_send_sync::<HttpEngineClient>();
        assert_send_sync::<Observable<Response<Vec<Element>>>>();
        assert_send_sync::<SyncEventBus>();
        assert_send_sync::<AttesterError>();
    }

    // Futures handed to tokio::spawn must be Send
    #[test]
    fn test_operations_are_spawnable() {
        fn assert_send<T: Send>(_: &T) {}

        #[allow(dead_code)]
        fn check(monitor: &AttestationMonitor) {
            assert_send(&monitor.refresh_elements());
            assert_send(&monitor.get_more_elements());
            assert_send(&monitor.refresh_element("e"));
            assert_send(&monitor.switch_base_url("127.0.0.1:8520"));
            assert_send(&monitor.session().attest("e", "p", None));
            assert_send(&monitor.session().policies());
        }
    }
}
