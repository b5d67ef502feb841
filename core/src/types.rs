//! Domain types for facility occupancy tracking.
//!
//! Identities, credential tokens, entry/exit log records and the singleton
//! occupancy state. Everything here is plain owned data; persistence and
//! broadcasting live behind the traits in [`crate::persistence`] and
//! [`crate::broadcast`].

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;
use uuid::Uuid;

// ============================================================================
// Identifiers
// ============================================================================

/// Unique identifier for a person known to the facility.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct IdentityId(Uuid);

impl IdentityId {
    /// Creates a new random `IdentityId`
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Create an `IdentityId` from a `Uuid`
    #[must_use]
    pub const fn from_uuid(uuid: Uuid) -> Self {
        Self(uuid)
    }

    /// Get the inner UUID
    #[must_use]
    pub const fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl Default for IdentityId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for IdentityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for IdentityId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Uuid::parse_str(s.trim()).map(Self)
    }
}

/// Error returned when parsing an empty credential token.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("Credential token must not be empty")]
pub struct EmptyCredentialError;

/// Opaque token printed in an identity's QR code.
///
/// - `FromStr::from_str()`: rejects empty or whitespace-only input
/// - `new()`: no validation (for tokens read back from storage)
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CredentialToken(String);

impl CredentialToken {
    /// Create a token without validation.
    #[must_use]
    pub fn new(token: impl Into<String>) -> Self {
        Self(token.into())
    }

    /// Get the token as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl FromStr for CredentialToken {
    type Err = EmptyCredentialError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        if trimmed.is_empty() {
            return Err(EmptyCredentialError);
        }
        Ok(Self(trimmed.to_string()))
    }
}

impl fmt::Display for CredentialToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Unique identifier for an entry/exit log record.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct LogId(Uuid);

impl LogId {
    /// Creates a new random `LogId`
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Create a `LogId` from a `Uuid`
    #[must_use]
    pub const fn from_uuid(uuid: Uuid) -> Self {
        Self(uuid)
    }

    /// Get the inner UUID
    #[must_use]
    pub const fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl Default for LogId {
    fn default() -> Self {
        Self::new()
    }
}

// ============================================================================
// Identity
// ============================================================================

/// Role of an identity. Informational only; no authorization hangs off it here.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Role {
    /// Regular visitor
    Student,
    /// Facility staff
    Staff,
    /// Administrator
    Admin,
}

impl Role {
    /// Storage representation.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Student => "STUDENT",
            Self::Staff => "STAFF",
            Self::Admin => "ADMIN",
        }
    }

    /// Parse the storage representation. Unknown values are `None`.
    #[must_use]
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "STUDENT" => Some(Self::Student),
            "STAFF" => Some(Self::Staff),
            "ADMIN" => Some(Self::Admin),
            _ => None,
        }
    }
}

/// A person with a credential token and profile fields.
///
/// Owned by an external user-management system; read-only here.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Identity {
    /// Identity ID
    pub id: IdentityId,
    /// Contact email
    pub email: String,
    /// Given name
    pub first_name: String,
    /// Family name
    pub last_name: String,
    /// Role
    pub role: Role,
    /// QR credential token
    pub credential: CredentialToken,
}

impl Identity {
    /// Name shown in scan results and personal notifications.
    #[must_use]
    pub fn display_name(&self) -> String {
        format!("{} {}", self.first_name, self.last_name)
    }

    /// Profile without the credential.
    #[must_use]
    pub fn profile(&self) -> IdentityProfile {
        IdentityProfile {
            id: self.id,
            email: self.email.clone(),
            first_name: self.first_name.clone(),
            last_name: self.last_name.clone(),
            role: self.role,
        }
    }
}

/// Public profile fields of an identity.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IdentityProfile {
    /// Identity ID
    pub id: IdentityId,
    /// Contact email
    pub email: String,
    /// Given name
    pub first_name: String,
    /// Family name
    pub last_name: String,
    /// Role
    pub role: Role,
}

/// Result of looking up one's own credential.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CredentialInfo {
    /// The token to encode in the QR code
    pub qr_code: CredentialToken,
    /// Owner profile
    pub user: IdentityProfile,
}

// ============================================================================
// Entry/exit log
// ============================================================================

/// Classification of a scan event.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EventKind {
    /// Identity walked in
    Entry,
    /// Identity walked out
    Exit,
}

impl EventKind {
    /// Storage and wire representation.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Entry => "ENTRY",
            Self::Exit => "EXIT",
        }
    }

    /// Parse the storage representation.
    #[must_use]
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "ENTRY" => Some(Self::Entry),
            "EXIT" => Some(Self::Exit),
            _ => None,
        }
    }

    /// Whether this kind increments occupancy.
    #[must_use]
    pub const fn is_entry(&self) -> bool {
        matches!(self, Self::Entry)
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One append-only scan event.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogRecord {
    /// Record ID
    pub id: LogId,
    /// Who scanned
    pub identity_id: IdentityId,
    /// Entry or exit
    pub kind: EventKind,
    /// When the scan was recorded
    pub timestamp: DateTime<Utc>,
}

// ============================================================================
// Occupancy
// ============================================================================

/// Singleton counter plus configured maximum capacity.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct OccupancyState {
    /// People currently inside
    pub current_occupancy: u32,
    /// Configured maximum (always positive)
    pub max_capacity: u32,
}

impl OccupancyState {
    /// Create a state value.
    #[must_use]
    pub const fn new(current_occupancy: u32, max_capacity: u32) -> Self {
        Self {
            current_occupancy,
            max_capacity,
        }
    }

    /// Empty facility with the given capacity.
    #[must_use]
    pub const fn empty(max_capacity: u32) -> Self {
        Self::new(0, max_capacity)
    }

    /// `current_occupancy >= max_capacity`
    #[must_use]
    pub const fn is_full(&self) -> bool {
        self.current_occupancy >= self.max_capacity
    }

    /// The state after one entry or exit. Exits clamp at zero.
    #[must_use]
    pub const fn apply_delta(self, is_entry: bool) -> Self {
        let current_occupancy = if is_entry {
            self.current_occupancy.saturating_add(1)
        } else {
            self.current_occupancy.saturating_sub(1)
        };
        Self {
            current_occupancy,
            max_capacity: self.max_capacity,
        }
    }
}

/// What a successful scan returns to the caller.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScanOutcome {
    /// Entry or exit
    #[serde(rename = "type")]
    pub kind: EventKind,
    /// Occupancy after this scan
    pub current_occupancy: u32,
    /// Configured maximum
    pub max_capacity: u32,
    /// `current_occupancy >= max_capacity` after this scan
    pub is_at_capacity: bool,
    /// Scanning identity's display name
    #[serde(rename = "userName")]
    pub identity_display_name: String,
    /// Log record timestamp
    pub timestamp: DateTime<Utc>,
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn credential_token_rejects_blank_input() {
        assert_eq!("".parse::<CredentialToken>(), Err(EmptyCredentialError));
        assert_eq!("   ".parse::<CredentialToken>(), Err(EmptyCredentialError));
        let token: CredentialToken = " QR-abc ".parse().unwrap();
        assert_eq!(token.as_str(), "QR-abc");
    }

    #[test]
    fn event_kind_wire_format() {
        assert_eq!(serde_json::to_string(&EventKind::Entry).unwrap(), r#""ENTRY""#);
        assert_eq!(EventKind::parse("EXIT"), Some(EventKind::Exit));
        assert_eq!(EventKind::parse("exit"), None);
    }

    #[test]
    fn apply_delta_clamps_exit_at_zero() {
        let state = OccupancyState::empty(5);
        assert_eq!(state.apply_delta(false).current_occupancy, 0);
        assert_eq!(state.apply_delta(true).current_occupancy, 1);
    }

    #[test]
    fn apply_delta_does_not_cap_at_capacity() {
        let state = OccupancyState::new(2, 2).apply_delta(true);
        assert_eq!(state.current_occupancy, 3);
        assert!(state.is_full());
    }

    #[test]
    fn display_name_joins_first_and_last() {
        let identity = Identity {
            id: IdentityId::new(),
            email: "ada@example.edu".to_string(),
            first_name: "Ada".to_string(),
            last_name: "Lovelace".to_string(),
            role: Role::Student,
            credential: CredentialToken::new("QR-1"),
        };
        assert_eq!(identity.display_name(), "Ada Lovelace");
    }

    #[test]
    fn scan_outcome_serializes_camel_case() {
        let outcome = ScanOutcome {
            kind: EventKind::Entry,
            current_occupancy: 1,
            max_capacity: 2,
            is_at_capacity: false,
            identity_display_name: "Ada Lovelace".to_string(),
            timestamp: DateTime::parse_from_rfc3339("2025-01-01T00:00:00Z")
                .unwrap()
                .with_timezone(&Utc),
        };
        let json = serde_json::to_value(&outcome).unwrap();
        assert_eq!(json["type"], "ENTRY");
        assert_eq!(json["currentOccupancy"], 1);
        assert_eq!(json["userName"], "Ada Lovelace");
    }
}
