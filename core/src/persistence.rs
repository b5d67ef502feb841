//! Persistence collaborator traits.
//!
//! Narrow repositories cover everything the scan path touches:
//!
//! - [`IdentityDirectory`]: resolve credential tokens and identity IDs
//! - [`LogRepository`]: append-only entry/exit log
//! - [`OccupancyStore`]: the singleton counter, updated atomically
//! - [`ScanRecorder`]: log append and counter update committed together
//!
//! # Implementations
//!
//! - `PostgresOccupancyRepository` (in `occupancy-postgres`): production storage
//! - `InMemory*` types (in `occupancy-testing`): fast, deterministic tests
//!
//! # Dyn Compatibility
//!
//! These traits return `Pin<Box<dyn Future>>` instead of using `async fn` so
//! the coordinator can hold them as `Arc<dyn ...>` trait objects.

use crate::error::StoreError;
use crate::types::{CredentialToken, EventKind, Identity, IdentityId, LogRecord, OccupancyState};
use chrono::{DateTime, Utc};
use std::future::Future;
use std::pin::Pin;

/// Boxed future returned by every persistence operation.
pub type StoreFuture<'a, T> = Pin<Box<dyn Future<Output = Result<T, StoreError>> + Send + 'a>>;

/// Occupancy state together with the time it last changed.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct OccupancySnapshot {
    /// Counter and capacity
    pub state: OccupancyState,
    /// Last modification of the singleton row
    pub updated_at: DateTime<Utc>,
}

impl OccupancySnapshot {
    /// `current_occupancy >= max_capacity`
    #[must_use]
    pub const fn is_at_capacity(&self) -> bool {
        self.state.is_full()
    }
}

/// Lookup of identities owned by the external user-management system.
pub trait IdentityDirectory: Send + Sync {
    /// Resolve a scanned credential token.
    ///
    /// Returns `Ok(None)` when no identity carries this token.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Database`] if the query fails.
    fn find_identity_by_credential<'a>(
        &'a self,
        token: &'a CredentialToken,
    ) -> StoreFuture<'a, Option<Identity>>;

    /// Look an identity up by ID.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Database`] if the query fails.
    fn find_identity_by_id(&self, id: IdentityId) -> StoreFuture<'_, Option<Identity>>;
}

/// Append-only store of entry/exit events.
pub trait LogRepository: Send + Sync {
    /// Most recent log record for an identity, ordered by timestamp descending.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Database`] if the query fails.
    fn find_most_recent_log(&self, identity_id: IdentityId) -> StoreFuture<'_, Option<LogRecord>>;

    /// Append a record. Records are never updated afterwards.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Database`] if the insert fails.
    fn append_log(
        &self,
        identity_id: IdentityId,
        kind: EventKind,
        timestamp: DateTime<Utc>,
    ) -> StoreFuture<'_, LogRecord>;

    /// Number of stored records.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Database`] if the query fails.
    fn count_logs(&self) -> StoreFuture<'_, u64>;

    /// Administrative: delete every record, returning how many were removed.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Database`] if the delete fails.
    fn delete_all_logs(&self) -> StoreFuture<'_, u64>;
}

/// The singleton occupancy counter.
///
/// `atomic_apply_delta` must be a single atomic read-modify-write: concurrent
/// entries and exits from different identities must never lose updates.
pub trait OccupancyStore: Send + Sync {
    /// Read the current state.
    ///
    /// # Errors
    ///
    /// - [`StoreError::OccupancyNotInitialized`] if the singleton does not exist
    /// - [`StoreError::Database`] if the query fails
    fn read_occupancy_state(&self) -> StoreFuture<'_, OccupancySnapshot>;

    /// Increment (entry) or decrement (exit, clamped at zero) and return the
    /// updated state.
    ///
    /// Not capacity-aware: an entry is applied even when the counter already
    /// sits at the maximum.
    ///
    /// # Errors
    ///
    /// - [`StoreError::OccupancyNotInitialized`] if the singleton does not exist
    /// - [`StoreError::Database`] if the update fails
    fn atomic_apply_delta(&self, is_entry: bool) -> StoreFuture<'_, OccupancySnapshot>;

    /// Administrative: set occupancy to zero, creating the singleton with
    /// `default_capacity` if it does not exist yet.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Database`] if the write fails.
    fn reset_occupancy_to_zero(&self, default_capacity: u32) -> StoreFuture<'_, OccupancySnapshot>;

    /// `current_occupancy >= max_capacity`, without mutating anything.
    ///
    /// # Errors
    ///
    /// Same as [`OccupancyStore::read_occupancy_state`].
    fn is_full(&self) -> StoreFuture<'_, bool> {
        Box::pin(async move { Ok(self.read_occupancy_state().await?.is_at_capacity()) })
    }
}

/// Commits a classified scan: one log record plus the matching counter delta.
///
/// Both writes land or neither does.
pub trait ScanRecorder: Send + Sync {
    /// Append a record for `identity_id` and apply the delta for `kind`
    /// (increment for entries, clamped decrement for exits).
    ///
    /// Not capacity-aware, like [`OccupancyStore::atomic_apply_delta`].
    ///
    /// # Errors
    ///
    /// - [`StoreError::OccupancyNotInitialized`] if the singleton does not exist
    /// - [`StoreError::Database`] if either write fails
    ///
    /// On error nothing has been written.
    fn record_scan(
        &self,
        identity_id: IdentityId,
        kind: EventKind,
        timestamp: DateTime<Utc>,
    ) -> StoreFuture<'_, (LogRecord, OccupancySnapshot)>;
}
