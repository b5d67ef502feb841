//! Application state for Axum handlers.

use crate::hub::ConnectionHub;
use occupancy_runtime::ScanCoordinator;

/// State shared across all HTTP and WebSocket handlers.
///
/// The coordinator's broadcast gateway is expected to be the same `hub`, so
/// that scans reach the sockets registered here.
#[derive(Clone, Debug)]
pub struct AppState {
    /// Scan and occupancy operations
    pub coordinator: ScanCoordinator,
    /// Live WebSocket connections
    pub hub: ConnectionHub,
}

impl AppState {
    /// Create application state.
    #[must_use]
    pub const fn new(coordinator: ScanCoordinator, hub: ConnectionHub) -> Self {
        Self { coordinator, hub }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn state_is_clone_and_send() {
        fn assert_shareable<T: Clone + Send + Sync + 'static>() {}
        assert_shareable::<AppState>();
    }
}
