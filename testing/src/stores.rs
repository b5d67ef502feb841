//! In-memory persistence for fast, deterministic tests.
//!
//! - [`InMemoryIdentityDirectory`]: `HashMap`-backed identity lookup
//! - [`InMemoryLogRepository`]: `Vec`-backed append-only log
//! - [`InMemoryOccupancyStore`]: mutex-guarded singleton counter
//! - [`InMemoryScanRecorder`]: log append plus delta under the counter's mutex
//!
//! Each type is cheap to clone; clones share storage, so a test can keep a
//! handle for assertions while the coordinator owns another.

#![allow(clippy::unwrap_used)] // Test infrastructure uses unwrap for simplicity
#![allow(clippy::missing_panics_doc)] // Test utilities document panics where critical

use crate::mocks::test_clock;
use chrono::{DateTime, Utc};
use occupancy_core::environment::Clock;
use occupancy_core::persistence::{
    IdentityDirectory, LogRepository, OccupancySnapshot, OccupancyStore, ScanRecorder,
    StoreFuture,
};
use occupancy_core::{
    CredentialToken, EventKind, Identity, IdentityId, LogId, LogRecord, OccupancyState,
    StoreError,
};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, RwLock};

fn poisoned() -> StoreError {
    StoreError::Database("in-memory lock poisoned".to_string())
}

// ============================================================================
// Identities
// ============================================================================

/// In-memory identity directory.
///
/// # Example
///
/// ```
/// use occupancy_testing::{InMemoryIdentityDirectory, identity};
/// use occupancy_core::IdentityDirectory;
///
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let directory = InMemoryIdentityDirectory::new();
/// let ada = directory.insert(identity("Ada", "Lovelace"));
///
/// let found = directory.find_identity_by_credential(&ada.credential).await?;
/// assert_eq!(found.map(|i| i.id), Some(ada.id));
/// # Ok(())
/// # }
/// ```
#[derive(Clone, Debug, Default)]
pub struct InMemoryIdentityDirectory {
    identities: Arc<RwLock<HashMap<IdentityId, Identity>>>,
}

impl InMemoryIdentityDirectory {
    /// Create an empty directory
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an identity and hand it back for convenience.
    pub fn insert(&self, identity: Identity) -> Identity {
        self.identities
            .write()
            .unwrap()
            .insert(identity.id, identity.clone());
        identity
    }

    /// Number of registered identities
    #[must_use]
    pub fn len(&self) -> usize {
        self.identities.read().unwrap().len()
    }

    /// Whether the directory is empty
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.identities.read().unwrap().is_empty()
    }
}

impl IdentityDirectory for InMemoryIdentityDirectory {
    fn find_identity_by_credential<'a>(
        &'a self,
        token: &'a CredentialToken,
    ) -> StoreFuture<'a, Option<Identity>> {
        Box::pin(async move {
            Ok(self
                .identities
                .read()
                .map_err(|_| poisoned())?
                .values()
                .find(|identity| &identity.credential == token)
                .cloned())
        })
    }

    fn find_identity_by_id(&self, id: IdentityId) -> StoreFuture<'_, Option<Identity>> {
        Box::pin(async move {
            Ok(self
                .identities
                .read()
                .map_err(|_| poisoned())?
                .get(&id)
                .cloned())
        })
    }
}

// ============================================================================
// Entry/exit log
// ============================================================================

/// In-memory append-only log.
///
/// "Most recent" is the record with the greatest timestamp; ties go to the
/// later append, matching the sequence tie-break of the Postgres table.
#[derive(Clone, Debug, Default)]
pub struct InMemoryLogRepository {
    records: Arc<RwLock<Vec<LogRecord>>>,
    fail_appends: Arc<AtomicBool>,
}

impl InMemoryLogRepository {
    /// Create an empty log
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Every record in append order
    #[must_use]
    pub fn records(&self) -> Vec<LogRecord> {
        self.records.read().unwrap().clone()
    }

    /// Records for one identity in append order
    #[must_use]
    pub fn records_for(&self, identity_id: IdentityId) -> Vec<LogRecord> {
        self.records
            .read()
            .unwrap()
            .iter()
            .filter(|record| record.identity_id == identity_id)
            .cloned()
            .collect()
    }

    /// Number of stored records
    #[must_use]
    pub fn len(&self) -> usize {
        self.records.read().unwrap().len()
    }

    /// Whether the log is empty
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.records.read().unwrap().is_empty()
    }

    /// Make subsequent appends fail with [`StoreError::Database`].
    pub fn fail_appends(&self, fail: bool) {
        self.fail_appends.store(fail, Ordering::SeqCst);
    }
}

impl LogRepository for InMemoryLogRepository {
    fn find_most_recent_log(&self, identity_id: IdentityId) -> StoreFuture<'_, Option<LogRecord>> {
        Box::pin(async move {
            Ok(self
                .records
                .read()
                .map_err(|_| poisoned())?
                .iter()
                .filter(|record| record.identity_id == identity_id)
                .max_by_key(|record| record.timestamp)
                .cloned())
        })
    }

    fn append_log(
        &self,
        identity_id: IdentityId,
        kind: EventKind,
        timestamp: DateTime<Utc>,
    ) -> StoreFuture<'_, LogRecord> {
        Box::pin(async move {
            if self.fail_appends.load(Ordering::SeqCst) {
                return Err(StoreError::Database("append rejected".to_string()));
            }
            let record = LogRecord {
                id: LogId::new(),
                identity_id,
                kind,
                timestamp,
            };
            self.records
                .write()
                .map_err(|_| poisoned())?
                .push(record.clone());
            Ok(record)
        })
    }

    fn count_logs(&self) -> StoreFuture<'_, u64> {
        Box::pin(async move {
            let count = self.records.read().map_err(|_| poisoned())?.len();
            Ok(count as u64)
        })
    }

    fn delete_all_logs(&self) -> StoreFuture<'_, u64> {
        Box::pin(async move {
            let mut records = self.records.write().map_err(|_| poisoned())?;
            let removed = records.len() as u64;
            records.clear();
            Ok(removed)
        })
    }
}

// ============================================================================
// Occupancy
// ============================================================================

/// In-memory singleton counter.
///
/// `atomic_apply_delta` holds the mutex across the whole read-modify-write,
/// so concurrent deltas never lose updates. `is_full` takes the lock
/// separately, leaving the check-then-act window of the real store intact.
#[derive(Clone)]
pub struct InMemoryOccupancyStore {
    state: Arc<Mutex<Option<OccupancySnapshot>>>,
    clock: Arc<dyn Clock>,
    fail_updates: Arc<AtomicBool>,
}

impl std::fmt::Debug for InMemoryOccupancyStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InMemoryOccupancyStore")
            .field("state", &self.state)
            .finish_non_exhaustive()
    }
}

impl InMemoryOccupancyStore {
    /// Empty facility with the given capacity, stamped by [`test_clock`].
    #[must_use]
    pub fn new(max_capacity: u32) -> Self {
        Self::with_clock(max_capacity, Arc::new(test_clock()))
    }

    /// Empty facility with the given capacity and clock.
    #[must_use]
    pub fn with_clock(max_capacity: u32, clock: Arc<dyn Clock>) -> Self {
        let snapshot = OccupancySnapshot {
            state: OccupancyState::empty(max_capacity),
            updated_at: clock.now(),
        };
        Self {
            state: Arc::new(Mutex::new(Some(snapshot))),
            clock,
            fail_updates: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Store whose singleton row has not been created yet.
    #[must_use]
    pub fn uninitialized() -> Self {
        Self {
            state: Arc::new(Mutex::new(None)),
            clock: Arc::new(test_clock()),
            fail_updates: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Overwrite the counter (for arranging test scenarios).
    pub fn set_occupancy(&self, current_occupancy: u32) {
        let mut guard = self.state.lock().unwrap();
        if let Some(snapshot) = guard.as_mut() {
            snapshot.state.current_occupancy = current_occupancy;
            snapshot.updated_at = self.clock.now();
        }
    }

    /// Current state, if initialized
    #[must_use]
    pub fn current(&self) -> Option<OccupancyState> {
        self.state.lock().unwrap().map(|snapshot| snapshot.state)
    }

    /// Make subsequent counter updates fail, both `atomic_apply_delta` and
    /// [`InMemoryScanRecorder::record_scan`].
    pub fn fail_updates(&self, fail: bool) {
        self.fail_updates.store(fail, Ordering::SeqCst);
    }
}

impl OccupancyStore for InMemoryOccupancyStore {
    fn read_occupancy_state(&self) -> StoreFuture<'_, OccupancySnapshot> {
        Box::pin(async move {
            self.state
                .lock()
                .map_err(|_| poisoned())?
                .ok_or(StoreError::OccupancyNotInitialized)
        })
    }

    fn atomic_apply_delta(&self, is_entry: bool) -> StoreFuture<'_, OccupancySnapshot> {
        Box::pin(async move {
            if self.fail_updates.load(Ordering::SeqCst) {
                return Err(StoreError::Database("update rejected".to_string()));
            }
            let mut guard = self.state.lock().map_err(|_| poisoned())?;
            let snapshot = guard.as_mut().ok_or(StoreError::OccupancyNotInitialized)?;
            snapshot.state = snapshot.state.apply_delta(is_entry);
            snapshot.updated_at = self.clock.now();
            Ok(*snapshot)
        })
    }

    fn reset_occupancy_to_zero(&self, default_capacity: u32) -> StoreFuture<'_, OccupancySnapshot> {
        Box::pin(async move {
            let mut guard = self.state.lock().map_err(|_| poisoned())?;
            let now = self.clock.now();
            let state = match *guard {
                Some(existing) => OccupancyState::empty(existing.state.max_capacity),
                None => OccupancyState::empty(default_capacity),
            };
            let snapshot = OccupancySnapshot {
                state,
                updated_at: now,
            };
            *guard = Some(snapshot);
            Ok(snapshot)
        })
    }
}

// ============================================================================
// Scan recording
// ============================================================================

/// Records scans into an [`InMemoryLogRepository`] and an
/// [`InMemoryOccupancyStore`] as one unit.
///
/// The counter's mutex is held for the whole operation and the record is
/// only pushed once the delta is known to succeed, so a rejected update
/// leaves both sides untouched.
#[derive(Clone, Debug)]
pub struct InMemoryScanRecorder {
    logs: InMemoryLogRepository,
    occupancy: InMemoryOccupancyStore,
}

impl InMemoryScanRecorder {
    /// Share storage with the given log and counter.
    #[must_use]
    pub fn new(logs: &InMemoryLogRepository, occupancy: &InMemoryOccupancyStore) -> Self {
        Self {
            logs: logs.clone(),
            occupancy: occupancy.clone(),
        }
    }
}

impl ScanRecorder for InMemoryScanRecorder {
    fn record_scan(
        &self,
        identity_id: IdentityId,
        kind: EventKind,
        timestamp: DateTime<Utc>,
    ) -> StoreFuture<'_, (LogRecord, OccupancySnapshot)> {
        Box::pin(async move {
            let mut guard = self.occupancy.state.lock().map_err(|_| poisoned())?;
            let current = (*guard).ok_or(StoreError::OccupancyNotInitialized)?;
            if self.logs.fail_appends.load(Ordering::SeqCst) {
                return Err(StoreError::Database("append rejected".to_string()));
            }
            if self.occupancy.fail_updates.load(Ordering::SeqCst) {
                return Err(StoreError::Database("update rejected".to_string()));
            }

            let record = LogRecord {
                id: LogId::new(),
                identity_id,
                kind,
                timestamp,
            };
            let snapshot = OccupancySnapshot {
                state: current.state.apply_delta(kind.is_entry()),
                updated_at: self.occupancy.clock.now(),
            };
            self.logs
                .records
                .write()
                .map_err(|_| poisoned())?
                .push(record.clone());
            *guard = Some(snapshot);
            Ok((record, snapshot))
        })
    }
}
