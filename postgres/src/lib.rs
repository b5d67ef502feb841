//! `PostgreSQL` persistence for the occupancy gate.
//!
//! Implements the three persistence traits of `occupancy-core` over one
//! connection pool using sqlx:
//!
//! - `identities`: read-only for the scan path
//! - `entry_exit_logs`: append-only scan history
//! - `occupancy_state`: singleton counter, updated with a single
//!   `UPDATE ... RETURNING` so concurrent scans never lose an update
//!
//! # Example
//!
//! ```ignore
//! use occupancy_postgres::PostgresOccupancyRepository;
//!
//! let repository = PostgresOccupancyRepository::connect(&url, 10, timeout).await?;
//! repository.migrate().await?;
//! let snapshot = repository.initialize_occupancy(100).await?;
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod repository;

pub use repository::PostgresOccupancyRepository;
