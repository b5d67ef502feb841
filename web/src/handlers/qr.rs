//! Credential endpoints.
//!
//! - `GET /api/qr/me`: the caller's own QR code and profile
//! - `POST /api/qr/scan`: process one scan at the gate

use crate::error::AppError;
use crate::extractors::{CallerIdentity, CorrelationId};
use crate::state::AppState;
use axum::{Json, extract::State};
use occupancy_core::{CredentialInfo, CredentialToken, ScanError, ScanOutcome};
use serde::{Deserialize, Serialize};

/// Scan request body.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScanRequest {
    /// Token read from the QR code
    #[serde(default)]
    pub qr_code: Option<String>,
}

/// Successful scan response.
#[derive(Debug, Serialize)]
pub struct ScanResponse {
    /// Always `true`
    pub success: bool,
    /// Scan result
    #[serde(flatten)]
    pub outcome: ScanOutcome,
}

/// Return the caller's credential.
///
/// # Errors
///
/// 401 without an `X-Identity-Id` header, 404 when that identity is unknown.
pub async fn my_credential(
    State(state): State<AppState>,
    CallerIdentity(caller): CallerIdentity,
) -> Result<Json<CredentialInfo>, AppError> {
    let info = state.coordinator.get_my_credential(caller).await.map_err(|e| match e {
        ScanError::NotFound(_) => AppError::not_found("User not found"),
        other => other.into(),
    })?;
    Ok(Json(info))
}

/// Process a scanned QR code.
///
/// ```bash
/// curl -X POST http://localhost:8080/api/qr/scan \
///   -H 'Content-Type: application/json' -d '{"qrCode":"QR-..."}'
/// # {"success":true,"type":"ENTRY","currentOccupancy":1,...}
/// ```
///
/// # Errors
///
/// - 400 when `qrCode` is missing or blank
/// - 404 when no identity carries the code
/// - 403 when an entry is refused for capacity
/// - 500 on persistence failure
pub async fn scan(
    State(state): State<AppState>,
    CorrelationId(correlation_id): CorrelationId,
    Json(request): Json<ScanRequest>,
) -> Result<Json<ScanResponse>, AppError> {
    let token: CredentialToken = request
        .qr_code
        .as_deref()
        .unwrap_or_default()
        .parse()
        .map_err(|_| AppError::bad_request("QR code is required"))?;

    tracing::debug!(%correlation_id, "Scan received");

    let outcome = state.coordinator.handle_scan(&token).await.map_err(|e| match e {
        ScanError::NotFound(_) => AppError::not_found("Invalid QR code"),
        other => other.into(),
    })?;

    Ok(Json(ScanResponse {
        success: true,
        outcome,
    }))
}
