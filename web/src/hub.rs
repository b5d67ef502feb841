//! In-process WebSocket connection hub.
//!
//! Implements [`BroadcastGateway`] for the WebSocket endpoint:
//!
//! - Global events go through one `tokio::sync::broadcast` channel that every
//!   connection subscribes to. Lagging receivers drop old frames.
//! - Personal events go through a bounded `mpsc` channel per connection,
//!   registered under the identity the connection declared.
//!
//! Frames are serialized once and shared as `Arc<str>`.

use futures::future;
use occupancy_core::broadcast::BroadcastFuture;
use occupancy_core::{BroadcastError, BroadcastEvent, BroadcastGateway, ConnectionId, IdentityId};
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, RwLock};
use tokio::sync::{broadcast, mpsc};

/// A serialized event ready to be written to a socket.
pub type Frame = Arc<str>;

type Registry = HashMap<IdentityId, HashMap<ConnectionId, mpsc::Sender<Frame>>>;

/// Registry of live WebSocket connections.
#[derive(Clone)]
pub struct ConnectionHub {
    global: broadcast::Sender<Frame>,
    personal: Arc<RwLock<Registry>>,
    live: Arc<AtomicUsize>,
    channel_capacity: usize,
}

/// Receiving side of one registered connection.
#[derive(Debug)]
pub struct Subscription {
    /// Handle used to deregister
    pub connection_id: ConnectionId,
    /// Identity the connection declared, if any
    pub identity_id: Option<IdentityId>,
    /// Events for every subscriber
    pub global: broadcast::Receiver<Frame>,
    /// Events for this identity only
    pub personal: mpsc::Receiver<Frame>,
}

fn poisoned<T>(_: T) -> BroadcastError {
    BroadcastError::Transport("connection registry lock poisoned".to_string())
}

fn serialize(event: &BroadcastEvent) -> Result<Frame, BroadcastError> {
    serde_json::to_string(event)
        .map(Frame::from)
        .map_err(|e| BroadcastError::Serialization(e.to_string()))
}

impl ConnectionHub {
    /// Create a hub whose per-connection buffers hold `channel_capacity` frames.
    #[must_use]
    pub fn new(channel_capacity: usize) -> Self {
        let capacity = channel_capacity.max(1);
        let (global, _) = broadcast::channel(capacity);
        Self {
            global,
            personal: Arc::new(RwLock::new(HashMap::new())),
            live: Arc::new(AtomicUsize::new(0)),
            channel_capacity: capacity,
        }
    }

    /// Register a connection.
    ///
    /// Anonymous connections receive global events only.
    ///
    /// # Errors
    ///
    /// Returns [`BroadcastError::Transport`] if the registry lock is poisoned.
    pub fn subscribe(&self, identity_id: Option<IdentityId>) -> Result<Subscription, BroadcastError> {
        let connection_id = ConnectionId::new();
        let (tx, rx) = mpsc::channel(self.channel_capacity);

        if let Some(identity_id) = identity_id {
            self.personal
                .write()
                .map_err(poisoned)?
                .entry(identity_id)
                .or_default()
                .insert(connection_id, tx);
        }

        let live = self.live.fetch_add(1, Ordering::Relaxed) + 1;
        record_live(live);
        tracing::debug!(%connection_id, ?identity_id, live, "Connection registered");

        Ok(Subscription {
            connection_id,
            identity_id,
            global: self.global.subscribe(),
            personal: rx,
        })
    }

    /// Remove a connection from the registry.
    pub fn disconnect(&self, identity_id: Option<IdentityId>, connection_id: ConnectionId) {
        if let Some(identity_id) = identity_id {
            match self.personal.write() {
                Ok(mut registry) => {
                    if let Some(connections) = registry.get_mut(&identity_id) {
                        connections.remove(&connection_id);
                        if connections.is_empty() {
                            registry.remove(&identity_id);
                        }
                    }
                }
                Err(_) => tracing::warn!("Connection registry lock poisoned on disconnect"),
            }
        }

        let live = self
            .live
            .fetch_sub(1, Ordering::Relaxed)
            .saturating_sub(1);
        record_live(live);
        tracing::debug!(%connection_id, live, "Connection removed");
    }

    /// Number of registered connections, anonymous ones included.
    #[must_use]
    pub fn connection_count(&self) -> usize {
        self.live.load(Ordering::Relaxed)
    }

    fn deliver_personal(
        &self,
        identity_id: IdentityId,
        event: &BroadcastEvent,
    ) -> Result<usize, BroadcastError> {
        let frame = serialize(event)?;
        let targets: Vec<_> = self
            .personal
            .read()
            .map_err(poisoned)?
            .get(&identity_id)
            .map(|connections| {
                connections
                    .iter()
                    .map(|(id, tx)| (*id, tx.clone()))
                    .collect()
            })
            .unwrap_or_default();

        let mut delivered = 0;
        let mut closed = Vec::new();
        let mut failure = None;
        for (connection, tx) in targets {
            match tx.try_send(Arc::clone(&frame)) {
                Ok(()) => delivered += 1,
                Err(mpsc::error::TrySendError::Closed(_)) => closed.push(connection),
                Err(mpsc::error::TrySendError::Full(_)) => {
                    failure.get_or_insert(BroadcastError::DeliveryFailed {
                        connection,
                        reason: "send buffer full".to_string(),
                    });
                }
            }
        }

        if !closed.is_empty() {
            self.prune(identity_id, &closed)?;
        }

        match failure {
            Some(error) => Err(error),
            None => Ok(delivered),
        }
    }

    fn prune(&self, identity_id: IdentityId, closed: &[ConnectionId]) -> Result<(), BroadcastError> {
        let mut registry = self.personal.write().map_err(poisoned)?;
        if let Some(connections) = registry.get_mut(&identity_id) {
            for connection in closed {
                connections.remove(connection);
            }
            if connections.is_empty() {
                registry.remove(&identity_id);
            }
        }
        Ok(())
    }

    fn active_connections(&self, identity_id: IdentityId) -> Result<Vec<ConnectionId>, BroadcastError> {
        Ok(self
            .personal
            .read()
            .map_err(poisoned)?
            .get(&identity_id)
            .map(|connections| {
                connections
                    .iter()
                    .filter(|(_, tx)| !tx.is_closed())
                    .map(|(id, _)| *id)
                    .collect()
            })
            .unwrap_or_default())
    }
}

#[allow(clippy::cast_precision_loss)]
fn record_live(live: usize) {
    metrics::gauge!("occupancy_ws_connections").set(live as f64);
}

impl BroadcastGateway for ConnectionHub {
    fn broadcast_global<'a>(&'a self, event: &'a BroadcastEvent) -> BroadcastFuture<'a, ()> {
        let result = serialize(event).map(|frame| {
            // No receivers is not an error: nobody is listening yet.
            if self.global.send(frame).is_err() {
                tracing::trace!(event = event.name(), "No subscribers for global event");
            }
        });
        Box::pin(future::ready(result))
    }

    fn send_to_identity<'a>(
        &'a self,
        identity_id: IdentityId,
        event: &'a BroadcastEvent,
    ) -> BroadcastFuture<'a, usize> {
        Box::pin(future::ready(self.deliver_personal(identity_id, event)))
    }

    fn lookup_active_connections(
        &self,
        identity_id: IdentityId,
    ) -> BroadcastFuture<'_, Vec<ConnectionId>> {
        Box::pin(future::ready(self.active_connections(identity_id)))
    }
}

impl std::fmt::Debug for ConnectionHub {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectionHub")
            .field("live", &self.connection_count())
            .field("channel_capacity", &self.channel_capacity)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use occupancy_core::{Clock, OccupancyState, OccupancyStatus};
    use occupancy_testing::test_clock;

    fn update() -> BroadcastEvent {
        BroadcastEvent::OccupancyUpdate(OccupancyStatus::derive(
            OccupancyState::new(1, 10),
            test_clock().now(),
        ))
    }

    #[tokio::test]
    async fn global_without_subscribers_is_ok() {
        let hub = ConnectionHub::new(4);
        assert!(hub.broadcast_global(&update()).await.is_ok());
    }

    #[tokio::test]
    async fn global_reaches_anonymous_and_identified() {
        let hub = ConnectionHub::new(4);
        let mut anonymous = hub.subscribe(None).unwrap();
        let mut known = hub.subscribe(Some(IdentityId::new())).unwrap();

        hub.broadcast_global(&update()).await.unwrap();

        let frame = anonymous.global.recv().await.unwrap();
        assert!(frame.contains(r#""event":"occupancy:update""#));
        assert_eq!(known.global.recv().await.unwrap(), frame);
    }

    #[tokio::test]
    async fn personal_reaches_only_that_identity() {
        let hub = ConnectionHub::new(4);
        let ada = IdentityId::new();
        let mut first = hub.subscribe(Some(ada)).unwrap();
        let mut second = hub.subscribe(Some(ada)).unwrap();
        let mut other = hub.subscribe(Some(IdentityId::new())).unwrap();

        let sent = hub.send_to_identity(ada, &update()).await.unwrap();

        assert_eq!(sent, 2);
        assert!(first.personal.try_recv().is_ok());
        assert!(second.personal.try_recv().is_ok());
        assert!(other.personal.try_recv().is_err());
    }

    #[tokio::test]
    async fn lookup_follows_disconnect() {
        let hub = ConnectionHub::new(4);
        let ada = IdentityId::new();
        let subscription = hub.subscribe(Some(ada)).unwrap();

        let active = hub.lookup_active_connections(ada).await.unwrap();
        assert_eq!(active, vec![subscription.connection_id]);
        assert_eq!(hub.connection_count(), 1);

        hub.disconnect(Some(ada), subscription.connection_id);
        assert!(hub.lookup_active_connections(ada).await.unwrap().is_empty());
        assert_eq!(hub.connection_count(), 0);
        assert_eq!(hub.send_to_identity(ada, &update()).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn dropped_receivers_are_pruned() {
        let hub = ConnectionHub::new(4);
        let ada = IdentityId::new();
        drop(hub.subscribe(Some(ada)).unwrap());

        assert!(hub.lookup_active_connections(ada).await.unwrap().is_empty());
        assert_eq!(hub.send_to_identity(ada, &update()).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn full_buffer_is_a_delivery_failure() {
        let hub = ConnectionHub::new(1);
        let ada = IdentityId::new();
        let subscription = hub.subscribe(Some(ada)).unwrap();

        assert_eq!(hub.send_to_identity(ada, &update()).await.unwrap(), 1);
        let result = hub.send_to_identity(ada, &update()).await;

        assert_eq!(
            result,
            Err(BroadcastError::DeliveryFailed {
                connection: subscription.connection_id,
                reason: "send buffer full".to_string(),
            })
        );
    }
}
