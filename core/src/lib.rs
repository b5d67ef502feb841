//! # Occupancy Core
//!
//! Core types and traits for tracking facility occupancy from credential scans.
//!
//! A scan resolves a credential token to an identity, classifies the scan as
//! an entry or an exit, gates entries on capacity, appends to an entry/exit
//! log, updates a singleton counter and fans the new state out to connected
//! clients.
//!
//! ## Core Concepts
//!
//! - **Identity**: a person carrying a credential token (their QR code)
//! - **Entry/Exit Log**: append-only record of classified scans
//! - **Occupancy State**: singleton counter plus configured maximum capacity
//! - **Capacity gate**: entries are refused once occupancy reaches the maximum
//! - **Broadcast Gateway**: global and identity-targeted real-time events
//!
//! ## Layout
//!
//! ```text
//! types ──► decision ──► status
//!   │                      │
//!   ▼                      ▼
//! persistence          broadcast
//! (collaborator traits, implemented by -postgres / -testing / -web)
//! ```
//!
//! This crate does no I/O of its own. The scan coordinator that drives these
//! pieces lives in `occupancy-runtime`.

#![forbid(unsafe_code)]

pub mod broadcast;
pub mod decision;
pub mod environment;
pub mod error;
pub mod persistence;
pub mod status;
pub mod types;

// Re-export commonly used types
pub use broadcast::{BroadcastError, BroadcastEvent, BroadcastGateway, ConnectionId, Delivery};
pub use chrono::{DateTime, Utc};
pub use decision::{next_event_kind, next_event_kind_for};
pub use environment::{Clock, SystemClock};
pub use error::{ScanError, StoreError};
pub use persistence::{
    IdentityDirectory, LogRepository, OccupancySnapshot, OccupancyStore, ScanRecorder,
};
pub use status::{AlertType, OccupancyAlert, OccupancyStatus, UserAction, scan_deliveries};
pub use types::{
    CredentialInfo, CredentialToken, EventKind, Identity, IdentityId, IdentityProfile, LogId,
    LogRecord, OccupancyState, Role, ScanOutcome,
};
