//! # Occupancy Runtime
//!
//! Services that drive the occupancy core against real collaborators.
//!
//! ## Core Components
//!
//! - **`ScanCoordinator`**: scan handling, occupancy query, credential lookup
//! - **`BestEffortBroadcaster`**: gateway front that logs and drops failures
//! - **`MaintenanceService`**: administrative reset
//! - **Metrics**: Prometheus counters, histograms and gauges
//!
//! ## Example
//!
//! ```ignore
//! use occupancy_runtime::ScanCoordinator;
//!
//! let coordinator = ScanCoordinator::new(
//!     repository.clone(),
//!     repository.clone(),
//!     repository.clone(),
//!     repository,
//!     hub,
//!     Arc::new(SystemClock),
//! );
//!
//! let outcome = coordinator.handle_scan(&token).await?;
//! println!("{} {}", outcome.identity_display_name, outcome.kind);
//! ```

pub mod broadcaster;
pub mod coordinator;
pub mod maintenance;
pub mod metrics;

pub use broadcaster::{BestEffortBroadcaster, DeliveryReport};
pub use coordinator::ScanCoordinator;
pub use maintenance::{MaintenanceService, ResetReport};
pub use metrics::{MetricsError, MetricsServer};
