//! # Occupancy Testing
//!
//! Testing utilities for the occupancy gate.
//!
//! This crate provides:
//! - Deterministic clocks
//! - In-memory implementations of the persistence traits
//! - Recording and failing broadcast gateways
//! - Identity fixtures
//!
//! ## Example
//!
//! ```ignore
//! use occupancy_testing::{InMemoryOccupancyStore, RecordingBroadcaster, identity};
//!
//! #[tokio::test]
//! async fn entry_broadcasts_update() {
//!     let store = InMemoryOccupancyStore::new(2);
//!     let gateway = RecordingBroadcaster::new();
//!     let coordinator = build_coordinator(&store, &gateway);
//!
//!     coordinator.handle_scan(&ada.credential).await?;
//!
//!     assert_eq!(gateway.global_event_names(), ["occupancy:update"]);
//! }
//! ```

use chrono::{DateTime, Utc};
use occupancy_core::environment::Clock;

pub mod broadcast;
pub mod stores;

/// Mock implementations of the clock.
pub mod mocks {
    use super::{Clock, DateTime, Utc};
    use chrono::Duration;
    use std::sync::Mutex;

    /// Fixed clock for deterministic tests
    ///
    /// Always returns the same time, making tests reproducible.
    ///
    /// # Example
    ///
    /// ```
    /// use occupancy_testing::mocks::FixedClock;
    /// use occupancy_core::environment::Clock;
    /// use chrono::Utc;
    ///
    /// let clock = FixedClock::new(Utc::now());
    /// assert_eq!(clock.now(), clock.now());
    /// ```
    #[derive(Debug, Clone)]
    pub struct FixedClock {
        time: DateTime<Utc>,
    }

    impl FixedClock {
        /// Create a new fixed clock with the given time
        #[must_use]
        pub const fn new(time: DateTime<Utc>) -> Self {
            Self { time }
        }
    }

    impl Clock for FixedClock {
        fn now(&self) -> DateTime<Utc> {
            self.time
        }
    }

    /// Clock that moves forward by a fixed step on every read.
    ///
    /// Gives strictly increasing scan timestamps without sleeping.
    #[derive(Debug)]
    pub struct SteppingClock {
        next: Mutex<DateTime<Utc>>,
        step: Duration,
    }

    impl SteppingClock {
        /// Start at `start`, advancing by `step` per call to `now`
        #[must_use]
        pub const fn new(start: DateTime<Utc>, step: Duration) -> Self {
            Self {
                next: Mutex::new(start),
                step,
            }
        }
    }

    impl Clock for SteppingClock {
        #[allow(clippy::unwrap_used)]
        fn now(&self) -> DateTime<Utc> {
            let mut next = self.next.lock().unwrap();
            let now = *next;
            *next = now + self.step;
            now
        }
    }

    /// Create a default fixed clock for tests (2025-01-01 00:00:00 UTC)
    ///
    /// # Panics
    ///
    /// This function will panic if the hardcoded timestamp fails to parse,
    /// which should never happen in practice.
    #[must_use]
    #[allow(clippy::expect_used)]
    pub fn test_clock() -> FixedClock {
        FixedClock::new(
            DateTime::parse_from_rfc3339("2025-01-01T00:00:00Z")
                .expect("hardcoded timestamp should always parse")
                .with_timezone(&Utc),
        )
    }
}

/// Identity fixtures.
pub mod fixtures {
    use occupancy_core::{CredentialToken, Identity, IdentityId, Role};

    /// A student with a unique credential derived from the name.
    #[must_use]
    pub fn identity(first_name: &str, last_name: &str) -> Identity {
        identity_with_role(first_name, last_name, Role::Student)
    }

    /// Same as [`identity`] with an explicit role.
    #[must_use]
    pub fn identity_with_role(first_name: &str, last_name: &str, role: Role) -> Identity {
        let id = IdentityId::new();
        Identity {
            id,
            email: format!(
                "{}.{}@example.edu",
                first_name.to_lowercase(),
                last_name.to_lowercase()
            ),
            first_name: first_name.to_string(),
            last_name: last_name.to_string(),
            role,
            credential: CredentialToken::new(format!("QR-{id}")),
        }
    }
}

/// Property-based testing strategies.
pub mod properties {
    use proptest::prelude::*;

    /// A plausible facility capacity.
    pub fn arb_capacity() -> impl Strategy<Value = u32> {
        1u32..=50
    }

    /// A scan sequence: each element picks one of `population` identities.
    pub fn arb_scan_sequence(population: usize) -> impl Strategy<Value = Vec<usize>> {
        prop::collection::vec(0..population, 0..40)
    }
}

// Re-export commonly used items
pub use broadcast::{FailingBroadcaster, RecordingBroadcaster};
pub use fixtures::{identity, identity_with_role};
pub use mocks::{FixedClock, SteppingClock, test_clock};
pub use stores::{
    InMemoryIdentityDirectory, InMemoryLogRepository, InMemoryOccupancyStore, InMemoryScanRecorder,
};
