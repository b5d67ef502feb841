//! Error types surfaced by the occupancy core.

use thiserror::Error;

/// Errors from the persistence collaborator.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StoreError {
    /// Database connection or query failed.
    #[error("Database error: {0}")]
    Database(String),

    /// The occupancy singleton row does not exist.
    #[error("Occupancy state has not been initialized")]
    OccupancyNotInitialized,

    /// A stored value could not be mapped back to a domain type.
    #[error("Corrupt record: {0}")]
    CorruptRecord(String),
}

/// Errors returned by scan and query operations.
///
/// All of these are terminal for the current request. The boundary layer
/// decides how to present them (404, 403, and so on).
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ScanError {
    /// No caller identity context was supplied.
    #[error("Unauthenticated")]
    Unauthenticated,

    /// The credential token or identity ID did not match any identity.
    #[error("{0} not found")]
    NotFound(String),

    /// Entry refused because occupancy reached the maximum.
    #[error("Facility is at maximum capacity ({current}/{max})")]
    CapacityExceeded {
        /// Occupancy at the time of the check
        current: u32,
        /// Configured maximum
        max: u32,
    },

    /// Persistence infrastructure failure.
    #[error("Internal error: {0}")]
    Internal(#[from] StoreError),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn capacity_exceeded_display() {
        let error = ScanError::CapacityExceeded { current: 2, max: 2 };
        assert_eq!(error.to_string(), "Facility is at maximum capacity (2/2)");
    }

    #[test]
    fn store_error_converts_to_internal() {
        let error: ScanError = StoreError::Database("connection reset".to_string()).into();
        assert!(matches!(error, ScanError::Internal(StoreError::Database(_))));
        assert!(error.to_string().contains("connection reset"));
    }
}
