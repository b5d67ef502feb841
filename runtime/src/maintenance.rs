//! Administrative reset of the entry/exit log and the counter.

use occupancy_core::{LogRepository, OccupancyState, OccupancyStore, StoreError};
use std::sync::Arc;

/// Before/after figures of a reset.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ResetReport {
    /// Log records present before the reset
    pub logs_before: u64,
    /// Log records removed
    pub logs_deleted: u64,
    /// Counter before the reset, `None` if it did not exist yet
    pub occupancy_before: Option<OccupancyState>,
    /// Counter after the reset
    pub occupancy_after: OccupancyState,
}

/// Clears all scan history and zeroes the counter.
///
/// Not part of steady-state scanning; run it while no scans are in flight.
#[derive(Clone)]
pub struct MaintenanceService {
    logs: Arc<dyn LogRepository>,
    occupancy: Arc<dyn OccupancyStore>,
    default_capacity: u32,
}

impl MaintenanceService {
    /// `default_capacity` seeds the counter when it does not exist yet.
    #[must_use]
    pub fn new(
        logs: Arc<dyn LogRepository>,
        occupancy: Arc<dyn OccupancyStore>,
        default_capacity: u32,
    ) -> Self {
        Self {
            logs,
            occupancy,
            default_capacity,
        }
    }

    /// Delete every log record and set occupancy to zero.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] if any step fails. Steps already taken are not
    /// rolled back; running the reset again is safe.
    #[tracing::instrument(skip(self), fields(default_capacity = self.default_capacity))]
    pub async fn reset(&self) -> Result<ResetReport, StoreError> {
        let logs_before = self.logs.count_logs().await?;
        let occupancy_before = match self.occupancy.read_occupancy_state().await {
            Ok(snapshot) => Some(snapshot.state),
            Err(StoreError::OccupancyNotInitialized) => None,
            Err(error) => return Err(error),
        };
        tracing::info!(logs_before, ?occupancy_before, "Resetting occupancy data");

        let logs_deleted = self.logs.delete_all_logs().await?;
        let after = self
            .occupancy
            .reset_occupancy_to_zero(self.default_capacity)
            .await?;

        tracing::info!(
            logs_deleted,
            max_capacity = after.state.max_capacity,
            "Occupancy data reset"
        );

        Ok(ResetReport {
            logs_before,
            logs_deleted,
            occupancy_before,
            occupancy_after: after.state,
        })
    }
}

impl std::fmt::Debug for MaintenanceService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MaintenanceService")
            .field("default_capacity", &self.default_capacity)
            .finish_non_exhaustive()
    }
}
