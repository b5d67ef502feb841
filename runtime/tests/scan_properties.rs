//! Concurrency and property tests for the scan path
//!
//! - Per-identity logs strictly alternate, starting with ENTRY
//! - The counter equals entries minus exits (no clamping in valid sequences)
//! - Concurrent scans never lose counter updates
//! - Racing entries may overshoot capacity, but only by accepted entries

#![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)] // Test code can use unwrap/expect/panic

use chrono::Duration;
use occupancy_core::{Clock, EventKind, Identity, ScanError};
use occupancy_runtime::ScanCoordinator;
use occupancy_testing::properties::{arb_capacity, arb_scan_sequence};
use occupancy_testing::{
    InMemoryIdentityDirectory, InMemoryLogRepository, InMemoryOccupancyStore,
    InMemoryScanRecorder, RecordingBroadcaster, SteppingClock, identity, test_clock,
};
use proptest::prelude::*;
use std::sync::Arc;

struct World {
    logs: InMemoryLogRepository,
    store: InMemoryOccupancyStore,
    people: Vec<Identity>,
    coordinator: ScanCoordinator,
}

fn world(capacity: u32, population: usize) -> World {
    let directory = InMemoryIdentityDirectory::new();
    let logs = InMemoryLogRepository::new();
    let store = InMemoryOccupancyStore::new(capacity);
    let people = (0..population)
        .map(|n| directory.insert(identity("Person", &n.to_string())))
        .collect();
    let coordinator = ScanCoordinator::new(
        Arc::new(directory),
        Arc::new(logs.clone()),
        Arc::new(store.clone()),
        Arc::new(InMemoryScanRecorder::new(&logs, &store)),
        Arc::new(RecordingBroadcaster::new()),
        Arc::new(SteppingClock::new(test_clock().now(), Duration::seconds(1))),
    );
    World {
        logs,
        store,
        people,
        coordinator,
    }
}

// ============================================================================
// Concurrency
// ============================================================================

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_entries_lose_no_updates() {
    let w = world(1_000, 64);

    let tasks: Vec<_> = w
        .people
        .iter()
        .map(|person| {
            let coordinator = w.coordinator.clone();
            let token = person.credential.clone();
            tokio::spawn(async move { coordinator.handle_scan(&token).await })
        })
        .collect();
    for outcome in futures::future::join_all(tasks).await {
        assert_eq!(outcome.unwrap().unwrap().kind, EventKind::Entry);
    }
    assert_eq!(w.store.current().unwrap().current_occupancy, 64);

    let tasks: Vec<_> = w
        .people
        .iter()
        .map(|person| {
            let coordinator = w.coordinator.clone();
            let token = person.credential.clone();
            tokio::spawn(async move { coordinator.handle_scan(&token).await })
        })
        .collect();
    for outcome in futures::future::join_all(tasks).await {
        assert_eq!(outcome.unwrap().unwrap().kind, EventKind::Exit);
    }
    assert_eq!(w.store.current().unwrap().current_occupancy, 0);
    assert_eq!(w.logs.len(), 128);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn racing_entries_overshoot_only_by_accepted_scans() {
    let w = world(1, 16);

    let tasks: Vec<_> = w
        .people
        .iter()
        .map(|person| {
            let coordinator = w.coordinator.clone();
            let token = person.credential.clone();
            tokio::spawn(async move { coordinator.handle_scan(&token).await })
        })
        .collect();

    let mut accepted = 0u32;
    for outcome in futures::future::join_all(tasks).await {
        match outcome.unwrap() {
            Ok(scan) => {
                assert_eq!(scan.kind, EventKind::Entry);
                accepted += 1;
            }
            Err(ScanError::CapacityExceeded { .. }) => {}
            Err(other) => panic!("unexpected error: {other}"),
        }
    }

    assert!(accepted >= 1);
    let state = w.store.current().unwrap();
    assert_eq!(state.current_occupancy, accepted);
    assert_eq!(w.logs.len(), usize::try_from(accepted).unwrap());
}

// ============================================================================
// Properties
// ============================================================================

proptest! {
    #[test]
    fn logs_alternate_and_counter_balances(
        capacity in arb_capacity(),
        sequence in arb_scan_sequence(5),
    ) {
        let runtime = tokio::runtime::Builder::new_current_thread().build().unwrap();
        runtime.block_on(async {
            let w = world(capacity, 5);

            for index in sequence {
                let before = w.store.current().unwrap();
                match w.coordinator.handle_scan(&w.people[index].credential).await {
                    Ok(outcome) => prop_assert!(outcome.current_occupancy <= capacity),
                    Err(ScanError::CapacityExceeded { current, max }) => {
                        prop_assert!(current >= max);
                        prop_assert_eq!(w.store.current().unwrap(), before);
                    }
                    Err(other) => prop_assert!(false, "unexpected error: {}", other),
                }
            }

            let mut entries = 0u32;
            let mut exits = 0u32;
            for person in &w.people {
                let kinds: Vec<_> = w.logs.records_for(person.id).iter().map(|r| r.kind).collect();
                for (position, kind) in kinds.iter().enumerate() {
                    let expected = if position % 2 == 0 { EventKind::Entry } else { EventKind::Exit };
                    prop_assert_eq!(*kind, expected);
                }
                let entered = kinds.iter().filter(|k| k.is_entry()).count();
                entries += u32::try_from(entered).unwrap();
                exits += u32::try_from(kinds.len() - entered).unwrap();
            }
            prop_assert_eq!(w.store.current().unwrap().current_occupancy, entries - exits);
            Ok::<(), TestCaseError>(())
        })?;
    }
}
