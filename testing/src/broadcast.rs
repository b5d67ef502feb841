//! Broadcast gateways for assertions.

#![allow(clippy::unwrap_used)] // Test infrastructure uses unwrap for simplicity
#![allow(clippy::missing_panics_doc)]

use occupancy_core::broadcast::{BroadcastFuture, BroadcastGateway};
use occupancy_core::{BroadcastError, BroadcastEvent, ConnectionId, IdentityId};
use std::collections::HashMap;
use std::sync::{Arc, RwLock};

/// Records every delivery and keeps a fake connection registry.
///
/// Personal sends only land on identities that were [`connect`]ed first,
/// one recorded copy per connection.
///
/// [`connect`]: RecordingBroadcaster::connect
#[derive(Clone, Debug, Default)]
pub struct RecordingBroadcaster {
    global: Arc<RwLock<Vec<BroadcastEvent>>>,
    personal: Arc<RwLock<Vec<(ConnectionId, IdentityId, BroadcastEvent)>>>,
    connections: Arc<RwLock<HashMap<IdentityId, Vec<ConnectionId>>>>,
}

impl RecordingBroadcaster {
    /// Create a broadcaster with no connections
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Open a fake connection for an identity.
    pub fn connect(&self, identity_id: IdentityId) -> ConnectionId {
        let connection = ConnectionId::new();
        self.connections
            .write()
            .unwrap()
            .entry(identity_id)
            .or_default()
            .push(connection);
        connection
    }

    /// Events sent to everyone, in order
    #[must_use]
    pub fn global_events(&self) -> Vec<BroadcastEvent> {
        self.global.read().unwrap().clone()
    }

    /// Wire names of the global events, in order
    #[must_use]
    pub fn global_event_names(&self) -> Vec<&'static str> {
        self.global.read().unwrap().iter().map(BroadcastEvent::name).collect()
    }

    /// Events delivered to one identity's connections, in order
    #[must_use]
    pub fn personal_events(&self, identity_id: IdentityId) -> Vec<BroadcastEvent> {
        self.personal
            .read()
            .unwrap()
            .iter()
            .filter(|(_, target, _)| *target == identity_id)
            .map(|(_, _, event)| event.clone())
            .collect()
    }

    /// Total personal deliveries across all identities
    #[must_use]
    pub fn personal_delivery_count(&self) -> usize {
        self.personal.read().unwrap().len()
    }
}

impl BroadcastGateway for RecordingBroadcaster {
    fn broadcast_global<'a>(&'a self, event: &'a BroadcastEvent) -> BroadcastFuture<'a, ()> {
        Box::pin(async move {
            self.global
                .write()
                .map_err(|_| BroadcastError::ChannelClosed)?
                .push(event.clone());
            Ok(())
        })
    }

    fn send_to_identity<'a>(
        &'a self,
        identity_id: IdentityId,
        event: &'a BroadcastEvent,
    ) -> BroadcastFuture<'a, usize> {
        Box::pin(async move {
            let targets = self
                .connections
                .read()
                .map_err(|_| BroadcastError::ChannelClosed)?
                .get(&identity_id)
                .cloned()
                .unwrap_or_default();

            let mut personal = self
                .personal
                .write()
                .map_err(|_| BroadcastError::ChannelClosed)?;
            for connection in &targets {
                personal.push((*connection, identity_id, event.clone()));
            }
            Ok(targets.len())
        })
    }

    fn lookup_active_connections(
        &self,
        identity_id: IdentityId,
    ) -> BroadcastFuture<'_, Vec<ConnectionId>> {
        Box::pin(async move {
            Ok(self
                .connections
                .read()
                .map_err(|_| BroadcastError::ChannelClosed)?
                .get(&identity_id)
                .cloned()
                .unwrap_or_default())
        })
    }
}

/// Gateway whose every operation fails with a transport error.
#[derive(Clone, Copy, Debug, Default)]
pub struct FailingBroadcaster;

impl FailingBroadcaster {
    fn error() -> BroadcastError {
        BroadcastError::Transport("gateway unavailable".to_string())
    }
}

impl BroadcastGateway for FailingBroadcaster {
    fn broadcast_global<'a>(&'a self, _event: &'a BroadcastEvent) -> BroadcastFuture<'a, ()> {
        Box::pin(async { Err(Self::error()) })
    }

    fn send_to_identity<'a>(
        &'a self,
        _identity_id: IdentityId,
        _event: &'a BroadcastEvent,
    ) -> BroadcastFuture<'a, usize> {
        Box::pin(async { Err(Self::error()) })
    }

    fn lookup_active_connections(
        &self,
        _identity_id: IdentityId,
    ) -> BroadcastFuture<'_, Vec<ConnectionId>> {
        // Reports a live connection so callers go on to attempt the send.
        Box::pin(async { Ok(vec![ConnectionId::new()]) })
    }
}
