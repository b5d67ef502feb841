//! Scan coordinator.
//!
//! Owns the scan sequence end to end:
//!
//! ```text
//! token ─► resolve identity ─► decide kind ─► capacity gate (entries)
//!        ─► record scan (log + delta) ─► build payloads ─► deliver ─► outcome
//! ```
//!
//! The log record and the counter delta are committed together through
//! [`ScanRecorder`]; a failure there leaves neither behind.
//!
//! The capacity gate reads the counter and the recorder writes it in a
//! separate atomic step. Concurrent entries racing past the gate can therefore
//! push occupancy above the maximum by the number of racers; the counter
//! itself never loses an update.

use crate::broadcaster::BestEffortBroadcaster;
use crate::metrics::ScanMetrics;
use occupancy_core::{
    BroadcastGateway, Clock, CredentialInfo, CredentialToken, IdentityDirectory, IdentityId,
    LogRepository, OccupancyStatus, OccupancyStore, ScanError, ScanOutcome, ScanRecorder,
    next_event_kind_for, scan_deliveries,
};
use std::sync::Arc;
use std::time::Instant;

/// Drives scans and occupancy queries against injected collaborators.
///
/// Cheap to clone; every collaborator sits behind an `Arc`.
#[derive(Clone)]
pub struct ScanCoordinator {
    identities: Arc<dyn IdentityDirectory>,
    logs: Arc<dyn LogRepository>,
    occupancy: Arc<dyn OccupancyStore>,
    recorder: Arc<dyn ScanRecorder>,
    broadcaster: BestEffortBroadcaster,
    clock: Arc<dyn Clock>,
}

impl ScanCoordinator {
    /// Wire a coordinator from its collaborators.
    #[must_use]
    pub fn new(
        identities: Arc<dyn IdentityDirectory>,
        logs: Arc<dyn LogRepository>,
        occupancy: Arc<dyn OccupancyStore>,
        recorder: Arc<dyn ScanRecorder>,
        gateway: Arc<dyn BroadcastGateway>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            identities,
            logs,
            occupancy,
            recorder,
            broadcaster: BestEffortBroadcaster::new(gateway),
            clock,
        }
    }

    /// Process one credential scan.
    ///
    /// # Errors
    ///
    /// - [`ScanError::NotFound`]: no identity carries `token`; nothing changes
    /// - [`ScanError::CapacityExceeded`]: an entry while the facility is full;
    ///   no log, no counter change, no broadcast
    /// - [`ScanError::Internal`]: a persistence call failed
    ///
    /// Broadcast failures are never returned.
    #[tracing::instrument(skip_all, fields(identity_id = tracing::field::Empty, kind = tracing::field::Empty))]
    pub async fn handle_scan(&self, token: &CredentialToken) -> Result<ScanOutcome, ScanError> {
        let started = Instant::now();
        let result = self.process_scan(token).await;

        match &result {
            Ok(outcome) => ScanMetrics::record_scan(outcome.kind, started.elapsed()),
            Err(error) => {
                match error {
                    ScanError::Internal(_) => tracing::error!(%error, "Scan failed"),
                    _ => tracing::info!(%error, "Scan rejected"),
                }
                ScanMetrics::record_rejection(error, started.elapsed());
            }
        }

        result
    }

    async fn process_scan(&self, token: &CredentialToken) -> Result<ScanOutcome, ScanError> {
        let identity = self
            .identities
            .find_identity_by_credential(token)
            .await?
            .ok_or_else(|| ScanError::NotFound("User".to_string()))?;

        let span = tracing::Span::current();
        span.record("identity_id", tracing::field::display(identity.id));

        let kind = next_event_kind_for(self.logs.as_ref(), identity.id).await?;
        span.record("kind", kind.as_str());

        if kind.is_entry() && self.occupancy.is_full().await? {
            let refused = self.occupancy.read_occupancy_state().await?;
            return Err(ScanError::CapacityExceeded {
                current: refused.state.current_occupancy,
                max: refused.state.max_capacity,
            });
        }

        let (record, snapshot) = self
            .recorder
            .record_scan(identity.id, kind, self.clock.now())
            .await?;
        ScanMetrics::record_occupancy(snapshot.state);

        tracing::info!(
            current_occupancy = snapshot.state.current_occupancy,
            max_capacity = snapshot.state.max_capacity,
            "Scan recorded"
        );

        let deliveries = scan_deliveries(snapshot.state, &identity, &record, snapshot.updated_at);
        let report = self.broadcaster.deliver(&deliveries).await;
        if report.failed > 0 {
            tracing::warn!(failed = report.failed, "Scan committed with undelivered events");
        }

        Ok(ScanOutcome {
            kind,
            current_occupancy: snapshot.state.current_occupancy,
            max_capacity: snapshot.state.max_capacity,
            is_at_capacity: snapshot.is_at_capacity(),
            identity_display_name: identity.display_name(),
            timestamp: record.timestamp,
        })
    }

    /// Current occupancy figures. Pure read.
    ///
    /// `last_updated` is the counter's last modification, so repeated calls
    /// without an intervening scan return identical values.
    ///
    /// # Errors
    ///
    /// Returns [`ScanError::Internal`] if the counter cannot be read.
    #[tracing::instrument(skip(self))]
    pub async fn get_occupancy_status(&self) -> Result<OccupancyStatus, ScanError> {
        let snapshot = self.occupancy.read_occupancy_state().await?;
        Ok(OccupancyStatus::derive(snapshot.state, snapshot.updated_at))
    }

    /// The caller's own credential token and profile.
    ///
    /// # Errors
    ///
    /// - [`ScanError::Unauthenticated`]: no caller identity
    /// - [`ScanError::NotFound`]: the caller is unknown to the directory
    /// - [`ScanError::Internal`]: the lookup failed
    #[tracing::instrument(skip(self))]
    pub async fn get_my_credential(
        &self,
        caller: Option<IdentityId>,
    ) -> Result<CredentialInfo, ScanError> {
        let identity_id = caller.ok_or(ScanError::Unauthenticated)?;
        let identity = self
            .identities
            .find_identity_by_id(identity_id)
            .await?
            .ok_or_else(|| ScanError::NotFound("User".to_string()))?;

        Ok(CredentialInfo {
            qr_code: identity.credential.clone(),
            user: identity.profile(),
        })
    }
}

impl std::fmt::Debug for ScanCoordinator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ScanCoordinator").finish_non_exhaustive()
    }
}
