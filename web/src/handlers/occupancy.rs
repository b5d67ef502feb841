//! `GET /api/occupancy`: current occupancy figures.

use crate::error::AppError;
use crate::state::AppState;
use axum::{Json, extract::State};
use occupancy_core::OccupancyStatus;

/// Current occupancy status. Read-only and idempotent.
///
/// # Errors
///
/// 500 when the counter cannot be read.
pub async fn occupancy_status(
    State(state): State<AppState>,
) -> Result<Json<OccupancyStatus>, AppError> {
    Ok(Json(state.coordinator.get_occupancy_status().await?))
}
