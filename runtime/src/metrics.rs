//! Prometheus metrics for the scan path.
//!
//! - Scans accepted, by kind
//! - Scans rejected, by reason
//! - Broadcast deliveries that failed, by event
//! - Scan latency
//! - Current occupancy
//!
//! # Example
//!
//! ```rust,no_run
//! use occupancy_runtime::metrics::MetricsServer;
//!
//! # fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let mut server = MetricsServer::new("0.0.0.0:9090".parse()?);
//! server.start()?;
//! # Ok(())
//! # }
//! ```

use metrics::{counter, describe_counter, describe_gauge, describe_histogram, gauge, histogram};
use metrics_exporter_prometheus::{Matcher, PrometheusBuilder, PrometheusHandle};
use occupancy_core::{EventKind, OccupancyState, ScanError};
use std::net::SocketAddr;
use std::time::Duration;
use thiserror::Error;

/// Errors from metrics operations.
#[derive(Error, Debug)]
pub enum MetricsError {
    /// Failed to build metrics exporter
    #[error("Failed to build metrics exporter: {0}")]
    Build(String),
    /// Failed to install metrics exporter
    #[error("Failed to install metrics exporter: {0}")]
    Install(String),
}

/// Prometheus metrics exporter.
///
/// `start` installs the global recorder; the web layer serves [`render`]
/// output on its own `/metrics` listener.
///
/// [`render`]: MetricsServer::render
pub struct MetricsServer {
    addr: SocketAddr,
    handle: Option<PrometheusHandle>,
}

impl MetricsServer {
    /// Create a new metrics server bound (later) to `addr`.
    #[must_use]
    pub const fn new(addr: SocketAddr) -> Self {
        Self { addr, handle: None }
    }

    /// Address the metrics endpoint should listen on
    #[must_use]
    pub const fn addr(&self) -> SocketAddr {
        self.addr
    }

    /// Register metric descriptions and install the Prometheus recorder.
    ///
    /// # Errors
    ///
    /// Returns error if the exporter cannot be built or installed.
    ///
    /// # Note
    ///
    /// A recorder that is already installed (common in tests) is tolerated
    /// with a warning; `handle` then stays `None`.
    pub fn start(&mut self) -> Result<(), MetricsError> {
        register_metrics();

        let builder = PrometheusBuilder::new()
            .set_buckets_for_metric(
                Matcher::Suffix("duration_seconds".to_string()),
                &[0.001, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5],
            )
            .map_err(|e| MetricsError::Build(e.to_string()))?;

        match builder.install_recorder() {
            Ok(handle) => {
                self.handle = Some(handle);
                tracing::info!(addr = %self.addr, "Metrics recorder installed");
                Ok(())
            }
            Err(e) => {
                let err_msg = e.to_string();
                if err_msg.contains("already initialized") {
                    tracing::warn!("Metrics recorder already initialized, skipping re-initialization");
                    Ok(())
                } else {
                    Err(MetricsError::Install(err_msg))
                }
            }
        }
    }

    /// Get the metrics handle for rendering.
    #[must_use]
    pub const fn handle(&self) -> Option<&PrometheusHandle> {
        self.handle.as_ref()
    }

    /// Render current metrics in Prometheus format.
    ///
    /// Returns `None` if the recorder was not installed by this server.
    #[must_use]
    pub fn render(&self) -> Option<String> {
        self.handle.as_ref().map(PrometheusHandle::render)
    }
}

fn register_metrics() {
    describe_counter!(
        "occupancy_scans_total",
        "Scans recorded, labelled by entry or exit"
    );
    describe_counter!(
        "occupancy_scans_rejected_total",
        "Scans refused, labelled by reason"
    );
    describe_counter!(
        "occupancy_broadcast_failures_total",
        "Real-time deliveries that failed, labelled by event"
    );
    describe_histogram!(
        "occupancy_scan_duration_seconds",
        "Time taken to process a scan"
    );
    describe_gauge!("occupancy_current", "People currently inside the facility");
    describe_gauge!("occupancy_max_capacity", "Configured maximum capacity");
}

/// Metric label for a refused scan.
#[must_use]
pub const fn rejection_reason(error: &ScanError) -> &'static str {
    match error {
        ScanError::Unauthenticated => "unauthenticated",
        ScanError::NotFound(_) => "not_found",
        ScanError::CapacityExceeded { .. } => "capacity_exceeded",
        ScanError::Internal(_) => "internal",
    }
}

/// Scan metrics recorder.
pub struct ScanMetrics;

impl ScanMetrics {
    /// Record an accepted scan.
    pub fn record_scan(kind: EventKind, duration: Duration) {
        counter!("occupancy_scans_total", "kind" => kind.as_str()).increment(1);
        histogram!("occupancy_scan_duration_seconds").record(duration.as_secs_f64());
    }

    /// Record a refused scan.
    pub fn record_rejection(error: &ScanError, duration: Duration) {
        counter!("occupancy_scans_rejected_total", "reason" => rejection_reason(error))
            .increment(1);
        histogram!("occupancy_scan_duration_seconds").record(duration.as_secs_f64());
    }

    /// Publish the counter value.
    pub fn record_occupancy(state: OccupancyState) {
        gauge!("occupancy_current").set(f64::from(state.current_occupancy));
        gauge!("occupancy_max_capacity").set(f64::from(state.max_capacity));
    }
}

/// Broadcast metrics recorder.
pub struct BroadcastMetrics;

impl BroadcastMetrics {
    /// Record a failed delivery.
    pub fn record_failure(event: &'static str) {
        counter!("occupancy_broadcast_failures_total", "event" => event).increment(1);
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use occupancy_core::StoreError;

    #[test]
    fn metrics_server_creation() {
        let server = MetricsServer::new("127.0.0.1:0".parse().unwrap());
        assert!(server.handle().is_none());
        assert!(server.render().is_none());
    }

    #[test]
    fn metrics_server_render() {
        let mut server = MetricsServer::new("127.0.0.1:0".parse().unwrap());
        server.start().unwrap();

        ScanMetrics::record_scan(EventKind::Entry, Duration::from_millis(3));
        ScanMetrics::record_occupancy(OccupancyState::new(4, 10));
        BroadcastMetrics::record_failure("occupancy:update");

        // Another test may have installed the recorder first.
        if let Some(rendered) = server.render() {
            assert!(rendered.contains("occupancy_scans_total"));
            assert!(rendered.contains("occupancy_current"));
            assert!(rendered.contains("occupancy_broadcast_failures_total"));
        }
    }

    #[test]
    fn rejection_reasons_are_stable_labels() {
        assert_eq!(
            rejection_reason(&ScanError::CapacityExceeded { current: 1, max: 1 }),
            "capacity_exceeded"
        );
        assert_eq!(
            rejection_reason(&ScanError::Internal(StoreError::OccupancyNotInitialized)),
            "internal"
        );
    }
}
