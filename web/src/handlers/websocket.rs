//! WebSocket endpoint for real-time occupancy events.
//!
//! ```text
//! Client              WebSocket Handler             ConnectionHub
//!   │                        │                            │
//!   ├─ GET /api/ws ─────────>│                            │
//!   │                        ├─ subscribe(identity) ─────>│
//!   │<─ occupancy:update ────┤ (current snapshot)         │
//!   │                        │<── global / personal ──────┤
//!   │<─ {event, data} ───────┤                            │
//!   ├─ Close ───────────────>│                            │
//!   │                        ├─ disconnect ──────────────>│
//! ```
//!
//! The connection is bound to the caller from the `X-Identity-Id` header,
//! which only the authenticating gateway may set. Anonymous connections
//! receive global events only. Inbound text is ignored.

use crate::extractors::CallerIdentity;
use crate::hub::{Frame, Subscription};
use crate::state::AppState;
use axum::{
    extract::{
        State, WebSocketUpgrade,
        ws::{Message, WebSocket},
    },
    response::Response,
};
use futures::{SinkExt, stream::StreamExt};
use occupancy_core::{BroadcastEvent, IdentityId};
use tokio::sync::broadcast::error::RecvError;
use tracing::{debug, info, warn};

/// Upgrade to a WebSocket subscribed to occupancy events.
#[allow(clippy::unused_async)] // Axum handler signature requires async
pub async fn handle(
    ws: WebSocketUpgrade,
    State(state): State<AppState>,
    CallerIdentity(identity_id): CallerIdentity,
) -> Response {
    info!(?identity_id, "WebSocket connection requested");
    ws.on_upgrade(move |socket| handle_socket(socket, state, identity_id))
}

async fn initial_frame(state: &AppState) -> Option<Frame> {
    let status = match state.coordinator.get_occupancy_status().await {
        Ok(status) => status,
        Err(error) => {
            warn!(%error, "Could not load occupancy for new connection");
            return None;
        }
    };
    serde_json::to_string(&BroadcastEvent::OccupancyUpdate(status))
        .ok()
        .map(Frame::from)
}

/// Drive one connection until either side closes.
///
/// A send task forwards hub frames to the client while a receive task
/// watches for close; whichever finishes first aborts the other.
async fn handle_socket(socket: WebSocket, state: AppState, identity_id: Option<IdentityId>) {
    let subscription = match state.hub.subscribe(identity_id) {
        Ok(subscription) => subscription,
        Err(error) => {
            warn!(%error, "Could not register connection");
            return;
        }
    };
    let connection_id = subscription.connection_id;
    info!(%connection_id, "WebSocket connection established");

    let (mut sender, mut receiver) = socket.split();
    let initial = initial_frame(&state).await;
    let Subscription {
        global: mut global_rx,
        personal: mut personal_rx,
        ..
    } = subscription;

    let mut send_task = tokio::spawn(async move {
        if let Some(frame) = initial {
            if sender.send(Message::Text(frame.to_string())).await.is_err() {
                return;
            }
        }

        loop {
            let frame = tokio::select! {
                global = global_rx.recv() => match global {
                    Ok(frame) => frame,
                    Err(RecvError::Lagged(skipped)) => {
                        warn!(%connection_id, skipped, "Connection lagged; frames dropped");
                        continue;
                    }
                    Err(RecvError::Closed) => break,
                },
                personal = personal_rx.recv() => match personal {
                    Some(frame) => frame,
                    None => break,
                },
            };

            if sender.send(Message::Text(frame.to_string())).await.is_err() {
                break;
            }
        }

        debug!(%connection_id, "WebSocket send task terminated");
    });

    let mut recv_task = tokio::spawn(async move {
        while let Some(Ok(msg)) = receiver.next().await {
            match msg {
                Message::Close(_) => {
                    debug!(%connection_id, "Client requested close");
                    break;
                }
                Message::Text(_) | Message::Binary(_) => {
                    debug!(%connection_id, "Ignoring inbound message");
                }
                Message::Ping(_) | Message::Pong(_) => {}
            }
        }

        debug!(%connection_id, "WebSocket receive task terminated");
    });

    tokio::select! {
        _ = (&mut send_task) => recv_task.abort(),
        _ = (&mut recv_task) => send_task.abort(),
    }

    state.hub.disconnect(identity_id, connection_id);
    info!(%connection_id, "WebSocket connection closed");
}
