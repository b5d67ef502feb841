//! Integration tests for the administrative reset

#![allow(clippy::unwrap_used, clippy::expect_used)] // Test code can use unwrap/expect

use occupancy_core::{LogRepository, OccupancyState};
use occupancy_runtime::{MaintenanceService, ScanCoordinator};
use occupancy_testing::{
    InMemoryIdentityDirectory, InMemoryLogRepository, InMemoryOccupancyStore,
    InMemoryScanRecorder, RecordingBroadcaster, identity, test_clock,
};
use std::sync::Arc;

#[tokio::test]
async fn reset_clears_logs_and_zeroes_counter() {
    let directory = InMemoryIdentityDirectory::new();
    let logs = InMemoryLogRepository::new();
    let store = InMemoryOccupancyStore::new(3);
    let coordinator = ScanCoordinator::new(
        Arc::new(directory.clone()),
        Arc::new(logs.clone()),
        Arc::new(store.clone()),
        Arc::new(InMemoryScanRecorder::new(&logs, &store)),
        Arc::new(RecordingBroadcaster::new()),
        Arc::new(test_clock()),
    );
    let ada = directory.insert(identity("Ada", "Lovelace"));
    let grace = directory.insert(identity("Grace", "Hopper"));
    coordinator.handle_scan(&ada.credential).await.unwrap();
    coordinator.handle_scan(&grace.credential).await.unwrap();
    coordinator.handle_scan(&ada.credential).await.unwrap();

    let maintenance = MaintenanceService::new(Arc::new(logs.clone()), Arc::new(store.clone()), 100);
    let report = maintenance.reset().await.unwrap();

    assert_eq!(report.logs_before, 3);
    assert_eq!(report.logs_deleted, 3);
    assert_eq!(report.occupancy_before, Some(OccupancyState::new(1, 3)));
    assert_eq!(report.occupancy_after, OccupancyState::empty(3));
    assert_eq!(logs.count_logs().await.unwrap(), 0);

    // History is gone, so Ada's next scan is an entry again.
    let again = coordinator.handle_scan(&ada.credential).await.unwrap();
    assert!(again.kind.is_entry());
}

#[tokio::test]
async fn reset_creates_missing_counter_with_default_capacity() {
    let logs = InMemoryLogRepository::new();
    let store = InMemoryOccupancyStore::uninitialized();
    let maintenance = MaintenanceService::new(Arc::new(logs), Arc::new(store.clone()), 100);

    let report = maintenance.reset().await.unwrap();

    assert_eq!(report.occupancy_before, None);
    assert_eq!(report.occupancy_after, OccupancyState::empty(100));
    assert_eq!(store.current(), Some(OccupancyState::empty(100)));
}

#[tokio::test]
async fn reset_twice_is_harmless() {
    let logs = InMemoryLogRepository::new();
    let store = InMemoryOccupancyStore::new(10);
    let maintenance = MaintenanceService::new(Arc::new(logs), Arc::new(store), 100);

    maintenance.reset().await.unwrap();
    let second = maintenance.reset().await.unwrap();

    assert_eq!(second.logs_deleted, 0);
    assert_eq!(second.occupancy_after, OccupancyState::empty(10));
}
