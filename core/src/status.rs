//! Occupancy status derivation and scan payload construction.
//!
//! Everything here is a pure function of the updated state, so the same rules
//! serve both the scan broadcast and the polling query.
//!
//! ```text
//! percentage       = round(current / max * 100)
//! is_available     = current < max
//! is_near_capacity = percentage >= 90
//! is_at_capacity   = current >= max
//! ```

use crate::broadcast::{BroadcastEvent, Delivery};
use crate::types::{EventKind, Identity, IdentityId, LogRecord, OccupancyState};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use smallvec::{SmallVec, smallvec};

/// Percentage at or above which the facility counts as nearly full.
pub const NEAR_CAPACITY_PERCENT: u32 = 90;

/// Alert message when the facility is full.
pub const FULL_MESSAGE: &str = "Facility is at maximum capacity!";

/// Alert message when the facility is nearly full.
pub const WARNING_MESSAGE: &str = "Facility is nearly full!";

/// `round(current / max * 100)`, halves rounded away from zero.
///
/// A zero capacity reads as 100%.
#[must_use]
#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)] // Non-negative, bounded by u32::MAX * 100
pub fn occupancy_percentage(current: u32, max: u32) -> u32 {
    if max == 0 {
        return 100;
    }
    (f64::from(current) / f64::from(max) * 100.0).round() as u32
}

/// Derived occupancy figures shown to clients.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OccupancyStatus {
    /// People currently inside
    pub current_occupancy: u32,
    /// Configured maximum
    pub max_capacity: u32,
    /// Rounded fill percentage
    pub percentage: u32,
    /// `current < max`
    pub is_available: bool,
    /// `percentage >= 90`
    pub is_near_capacity: bool,
    /// `current >= max`
    pub is_at_capacity: bool,
    /// When these figures were produced
    pub last_updated: DateTime<Utc>,
}

impl OccupancyStatus {
    /// Derive the status from a state value.
    #[must_use]
    pub fn derive(state: OccupancyState, last_updated: DateTime<Utc>) -> Self {
        let percentage = occupancy_percentage(state.current_occupancy, state.max_capacity);
        Self {
            current_occupancy: state.current_occupancy,
            max_capacity: state.max_capacity,
            percentage,
            is_available: state.current_occupancy < state.max_capacity,
            is_near_capacity: percentage >= NEAR_CAPACITY_PERCENT,
            is_at_capacity: state.is_full(),
            last_updated,
        }
    }

    /// The alert this status warrants, if any. `FULL` wins over `WARNING`.
    #[must_use]
    pub fn alert(&self) -> Option<OccupancyAlert> {
        let (alert_type, message) = if self.is_at_capacity {
            (AlertType::Full, FULL_MESSAGE)
        } else if self.is_near_capacity {
            (AlertType::Warning, WARNING_MESSAGE)
        } else {
            return None;
        };

        Some(OccupancyAlert {
            alert_type,
            message: message.to_string(),
            status: self.clone(),
        })
    }
}

/// Severity of a capacity alert.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AlertType {
    /// `current >= max`
    Full,
    /// `percentage >= 90` but not full
    Warning,
}

/// Global capacity alert payload.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct OccupancyAlert {
    /// FULL or WARNING
    #[serde(rename = "type")]
    pub alert_type: AlertType,
    /// Human-readable message
    pub message: String,
    /// The status that triggered the alert
    #[serde(flatten)]
    pub status: OccupancyStatus,
}

/// Personal notification sent to the scanning identity.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserAction {
    /// Entry or exit
    #[serde(rename = "type")]
    pub kind: EventKind,
    /// Display name of the identity
    pub user_name: String,
    /// Identity ID
    pub user_id: IdentityId,
    /// Log record timestamp
    pub timestamp: DateTime<Utc>,
    /// Occupancy after the scan
    pub current_occupancy: u32,
    /// Configured maximum
    pub max_capacity: u32,
}

/// Up to three deliveries per scan: update, optional alert, personal action.
pub type ScanDeliveries = SmallVec<[Delivery; 3]>;

/// Build every event a successful scan emits.
///
/// Always an `occupancy:update`; at most one `occupancy:alert`; always a
/// `user:action` addressed to the scanning identity only.
#[must_use]
pub fn scan_deliveries(
    state: OccupancyState,
    identity: &Identity,
    record: &LogRecord,
    last_updated: DateTime<Utc>,
) -> ScanDeliveries {
    let status = OccupancyStatus::derive(state, last_updated);
    let alert = status.alert();

    let mut deliveries: ScanDeliveries =
        smallvec![Delivery::Global(BroadcastEvent::OccupancyUpdate(status))];

    if let Some(alert) = alert {
        deliveries.push(Delivery::Global(BroadcastEvent::OccupancyAlert(alert)));
    }

    deliveries.push(Delivery::Personal {
        identity_id: identity.id,
        event: BroadcastEvent::UserAction(UserAction {
            kind: record.kind,
            user_name: identity.display_name(),
            user_id: identity.id,
            timestamp: record.timestamp,
            current_occupancy: state.current_occupancy,
            max_capacity: state.max_capacity,
        }),
    });

    deliveries
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)] // Test code can use unwrap/expect/panic
mod tests {
    use super::*;
    use crate::types::{CredentialToken, LogId, Role};
    use proptest::prelude::*;

    fn at() -> DateTime<Utc> {
        DateTime::parse_from_rfc3339("2025-01-01T00:00:00Z")
            .expect("valid timestamp")
            .with_timezone(&Utc)
    }

    fn identity() -> Identity {
        Identity {
            id: IdentityId::new(),
            email: "grace@example.edu".to_string(),
            first_name: "Grace".to_string(),
            last_name: "Hopper".to_string(),
            role: Role::Staff,
            credential: CredentialToken::new("QR-grace"),
        }
    }

    fn record(identity: &Identity, kind: EventKind) -> LogRecord {
        LogRecord {
            id: LogId::new(),
            identity_id: identity.id,
            kind,
            timestamp: at(),
        }
    }

    #[test]
    fn percentage_rounds_half_up() {
        assert_eq!(occupancy_percentage(0, 100), 0);
        assert_eq!(occupancy_percentage(1, 8), 13); // 12.5
        assert_eq!(occupancy_percentage(3, 8), 38); // 37.5
        assert_eq!(occupancy_percentage(1, 3), 33);
        assert_eq!(occupancy_percentage(2, 3), 67);
        assert_eq!(occupancy_percentage(3, 2), 150);
    }

    #[test]
    fn status_at_89_percent_has_no_alert() {
        let status = OccupancyStatus::derive(OccupancyState::new(89, 100), at());
        assert!(!status.is_near_capacity);
        assert!(status.is_available);
        assert!(status.alert().is_none());
    }

    #[test]
    fn status_at_90_percent_warns() {
        let status = OccupancyStatus::derive(OccupancyState::new(9, 10), at());
        assert!(status.is_near_capacity);
        assert!(!status.is_at_capacity);
        let alert = status.alert().expect("warning expected");
        assert_eq!(alert.alert_type, AlertType::Warning);
        assert_eq!(alert.message, WARNING_MESSAGE);
    }

    #[test]
    fn status_rounding_into_near_capacity() {
        // 359/400 = 89.75% rounds to 90
        let status = OccupancyStatus::derive(OccupancyState::new(359, 400), at());
        assert_eq!(status.percentage, 90);
        assert!(status.is_near_capacity);
        assert!(status.alert().is_some());
    }

    #[test]
    fn full_beats_warning() {
        let status = OccupancyStatus::derive(OccupancyState::new(2, 2), at());
        assert!(status.is_at_capacity);
        assert!(!status.is_available);
        assert_eq!(status.alert().expect("alert").alert_type, AlertType::Full);
    }

    #[test]
    fn alert_serializes_flat() {
        let alert = OccupancyStatus::derive(OccupancyState::new(2, 2), at())
            .alert()
            .expect("alert");
        let json = serde_json::to_value(&alert).unwrap();
        assert_eq!(json["type"], "FULL");
        assert_eq!(json["message"], FULL_MESSAGE);
        assert_eq!(json["currentOccupancy"], 2);
        assert_eq!(json["isAtCapacity"], true);
    }

    #[test]
    fn deliveries_without_alert() {
        let who = identity();
        let deliveries = scan_deliveries(
            OccupancyState::new(1, 10),
            &who,
            &record(&who, EventKind::Entry),
            at(),
        );
        let names: Vec<_> = deliveries.iter().map(|d| d.event().name()).collect();
        assert_eq!(names, vec!["occupancy:update", "user:action"]);
    }

    #[test]
    fn deliveries_with_full_alert_and_personal_action() {
        let who = identity();
        let deliveries = scan_deliveries(
            OccupancyState::new(2, 2),
            &who,
            &record(&who, EventKind::Entry),
            at(),
        );
        assert_eq!(deliveries.len(), 3);
        assert!(matches!(
            &deliveries[1],
            Delivery::Global(BroadcastEvent::OccupancyAlert(alert)) if alert.alert_type == AlertType::Full
        ));
        match &deliveries[2] {
            Delivery::Personal { identity_id, event: BroadcastEvent::UserAction(action) } => {
                assert_eq!(*identity_id, who.id);
                assert_eq!(action.user_name, "Grace Hopper");
                assert_eq!(action.kind, EventKind::Entry);
                assert_eq!(action.timestamp, at());
            }
            other => panic!("expected personal user:action, got {other:?}"),
        }
    }

    #[test]
    fn envelope_wire_format() {
        let status = OccupancyStatus::derive(OccupancyState::new(1, 4), at());
        let json = serde_json::to_value(BroadcastEvent::OccupancyUpdate(status)).unwrap();
        assert_eq!(json["event"], "occupancy:update");
        assert_eq!(json["data"]["percentage"], 25);
    }

    proptest! {
        #[test]
        fn derived_flags_match_definitions(current in 0u32..10_000, max in 1u32..10_000) {
            let status = OccupancyStatus::derive(OccupancyState::new(current, max), at());
            let expected = (f64::from(current) / f64::from(max) * 100.0).round();
            prop_assert!((f64::from(status.percentage) - expected).abs() < f64::EPSILON);
            prop_assert_eq!(status.is_at_capacity, current >= max);
            prop_assert_eq!(status.is_available, current < max);
            prop_assert_eq!(status.is_near_capacity, status.percentage >= 90);
        }

        #[test]
        fn at_most_one_alert(current in 0u32..500, max in 1u32..500) {
            let who = identity();
            let deliveries = scan_deliveries(
                OccupancyState::new(current, max),
                &who,
                &record(&who, EventKind::Exit),
                at(),
            );
            let alerts = deliveries
                .iter()
                .filter(|d| d.event().name() == "occupancy:alert")
                .count();
            prop_assert!(alerts <= 1);
            let personal = deliveries
                .iter()
                .filter(|d| matches!(d, Delivery::Personal { .. }))
                .count();
            prop_assert_eq!(personal, 1);
        }
    }
}
