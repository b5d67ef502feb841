//! Best-effort delivery of scan events.
//!
//! Wraps any [`BroadcastGateway`] and never fails: every gateway error is
//! logged, counted and dropped. The scan it belongs to has already been
//! committed by the time delivery starts.

use crate::metrics::BroadcastMetrics;
use occupancy_core::{BroadcastGateway, Delivery};
use std::sync::Arc;

/// What happened to a batch of deliveries.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct DeliveryReport {
    /// Global events handed to the gateway
    pub global_sent: usize,
    /// Personal events accepted, counted per connection
    pub personal_sent: usize,
    /// Personal events skipped because the identity had no connection
    pub personal_skipped: usize,
    /// Deliveries the gateway refused
    pub failed: usize,
}

/// Error-swallowing front for a broadcast gateway.
#[derive(Clone)]
pub struct BestEffortBroadcaster {
    gateway: Arc<dyn BroadcastGateway>,
}

impl BestEffortBroadcaster {
    /// Wrap a gateway.
    #[must_use]
    pub fn new(gateway: Arc<dyn BroadcastGateway>) -> Self {
        Self { gateway }
    }

    /// Deliver every event in order.
    ///
    /// Personal events go through `lookup_active_connections` first and are
    /// skipped when the identity has nothing connected.
    pub async fn deliver(&self, deliveries: &[Delivery]) -> DeliveryReport {
        let mut report = DeliveryReport::default();

        for delivery in deliveries {
            match delivery {
                Delivery::Global(event) => match self.gateway.broadcast_global(event).await {
                    Ok(()) => report.global_sent += 1,
                    Err(error) => {
                        tracing::warn!(event = event.name(), %error, "Global broadcast failed");
                        BroadcastMetrics::record_failure(event.name());
                        report.failed += 1;
                    }
                },
                Delivery::Personal { identity_id, event } => {
                    let connections =
                        match self.gateway.lookup_active_connections(*identity_id).await {
                            Ok(connections) => connections,
                            Err(error) => {
                                tracing::warn!(%identity_id, %error, "Connection lookup failed");
                                BroadcastMetrics::record_failure(event.name());
                                report.failed += 1;
                                continue;
                            }
                        };

                    if connections.is_empty() {
                        tracing::debug!(%identity_id, event = event.name(), "No active connection, skipping");
                        report.personal_skipped += 1;
                        continue;
                    }

                    match self.gateway.send_to_identity(*identity_id, event).await {
                        Ok(accepted) => report.personal_sent += accepted,
                        Err(error) => {
                            tracing::warn!(%identity_id, event = event.name(), %error, "Personal delivery failed");
                            BroadcastMetrics::record_failure(event.name());
                            report.failed += 1;
                        }
                    }
                }
            }
        }

        report
    }
}

impl std::fmt::Debug for BestEffortBroadcaster {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BestEffortBroadcaster").finish_non_exhaustive()
    }
}
