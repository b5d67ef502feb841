//! Broadcast gateway abstraction for real-time fan-out.
//!
//! The scan path emits three kinds of events:
//!
//! | Event              | Audience                              |
//! |--------------------|---------------------------------------|
//! | `occupancy:update` | every subscriber                      |
//! | `occupancy:alert`  | every subscriber (FULL or WARNING)    |
//! | `user:action`      | the scanning identity's connections   |
//!
//! Delivery is best-effort. A gateway failure never turns a committed scan
//! into an error; the runtime's `BestEffortBroadcaster` swallows and logs it.
//!
//! # Wire format
//!
//! [`BroadcastEvent`] serializes as an envelope:
//!
//! ```json
//! { "event": "occupancy:update", "data": { "currentOccupancy": 3, ... } }
//! ```

use crate::status::{OccupancyAlert, OccupancyStatus, UserAction};
use crate::types::IdentityId;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::future::Future;
use std::pin::Pin;
use thiserror::Error;
use uuid::Uuid;

/// Event name for the global occupancy update.
pub const OCCUPANCY_UPDATE: &str = "occupancy:update";
/// Event name for the global capacity alert.
pub const OCCUPANCY_ALERT: &str = "occupancy:alert";
/// Event name for the personal scan notification.
pub const USER_ACTION: &str = "user:action";

/// Errors that can occur while delivering events.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum BroadcastError {
    /// No subscriber channel exists (hub shut down).
    #[error("Broadcast channel closed")]
    ChannelClosed,

    /// Delivery to a specific connection failed.
    #[error("Delivery to connection {connection} failed: {reason}")]
    DeliveryFailed {
        /// Target connection
        connection: ConnectionId,
        /// Why delivery failed
        reason: String,
    },

    /// Event could not be serialized.
    #[error("Serialization failed: {0}")]
    Serialization(String),

    /// Transport-level failure.
    #[error("Transport error: {0}")]
    Transport(String),
}

/// Handle for one live subscriber connection.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ConnectionId(Uuid);

impl ConnectionId {
    /// Creates a new random `ConnectionId`
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for ConnectionId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A named event with its payload.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event", content = "data")]
pub enum BroadcastEvent {
    /// Current occupancy figures
    #[serde(rename = "occupancy:update")]
    OccupancyUpdate(OccupancyStatus),
    /// Capacity reached or nearly reached
    #[serde(rename = "occupancy:alert")]
    OccupancyAlert(OccupancyAlert),
    /// Personal notification for the scanning identity
    #[serde(rename = "user:action")]
    UserAction(UserAction),
}

impl BroadcastEvent {
    /// Wire name of this event.
    #[must_use]
    pub const fn name(&self) -> &'static str {
        match self {
            Self::OccupancyUpdate(_) => OCCUPANCY_UPDATE,
            Self::OccupancyAlert(_) => OCCUPANCY_ALERT,
            Self::UserAction(_) => USER_ACTION,
        }
    }
}

/// Who should receive an event.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Delivery {
    /// Every connected subscriber
    Global(BroadcastEvent),
    /// Only the connections of one identity
    Personal {
        /// Target identity
        identity_id: IdentityId,
        /// The event
        event: BroadcastEvent,
    },
}

impl Delivery {
    /// The event regardless of audience.
    #[must_use]
    pub const fn event(&self) -> &BroadcastEvent {
        match self {
            Self::Global(event) | Self::Personal { event, .. } => event,
        }
    }
}

/// Boxed future returned by gateway operations.
pub type BroadcastFuture<'a, T> =
    Pin<Box<dyn Future<Output = Result<T, BroadcastError>> + Send + 'a>>;

/// Real-time fan-out to connected clients.
///
/// # Dyn Compatibility
///
/// Explicit `Pin<Box<dyn Future>>` returns allow `Arc<dyn BroadcastGateway>`.
pub trait BroadcastGateway: Send + Sync {
    /// Deliver an event to every subscriber.
    ///
    /// # Errors
    ///
    /// Returns [`BroadcastError`] if the event could not be handed to the
    /// transport.
    fn broadcast_global<'a>(&'a self, event: &'a BroadcastEvent) -> BroadcastFuture<'a, ()>;

    /// Deliver an event to every active connection of one identity.
    ///
    /// Returns the number of connections that accepted the event.
    ///
    /// # Errors
    ///
    /// Returns [`BroadcastError`] if delivery failed for a connection.
    fn send_to_identity<'a>(
        &'a self,
        identity_id: IdentityId,
        event: &'a BroadcastEvent,
    ) -> BroadcastFuture<'a, usize>;

    /// Active connections currently associated with an identity.
    ///
    /// # Errors
    ///
    /// Returns [`BroadcastError`] if the registry is unavailable.
    fn lookup_active_connections(
        &self,
        identity_id: IdentityId,
    ) -> BroadcastFuture<'_, Vec<ConnectionId>>;
}
