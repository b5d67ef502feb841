//! Maintenance reset.
//!
//! Deletes every entry/exit record and sets occupancy to zero. The counter
//! row is created with `DEFAULT_MAX_CAPACITY` if it does not exist; an
//! existing maximum is kept. Run while the gate is idle.
//!
//! ```bash
//! cargo run --bin occupancy-reset
//! ```

use occupancy_postgres::PostgresOccupancyRepository;
use occupancy_runtime::MaintenanceService;
use occupancy_web::Config;
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let _ = dotenvy::dotenv();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,sqlx=warn".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = Config::from_env();
    config.validate()?;

    let repository = PostgresOccupancyRepository::connect(
        &config.postgres.url,
        config.postgres.max_connections,
        config.postgres.connect_timeout(),
    )
    .await?;
    repository.migrate().await?;

    let shared = Arc::new(repository);
    let report = MaintenanceService::new(
        shared.clone(),
        shared,
        config.occupancy.default_max_capacity,
    )
    .reset()
    .await?;

    match report.occupancy_before {
        Some(before) => tracing::info!(
            logs = report.logs_before,
            current_occupancy = before.current_occupancy,
            max_capacity = before.max_capacity,
            "Before reset"
        ),
        None => tracing::info!(logs = report.logs_before, "Before reset: counter not initialized"),
    }
    tracing::info!(
        logs_deleted = report.logs_deleted,
        current_occupancy = report.occupancy_after.current_occupancy,
        max_capacity = report.occupancy_after.max_capacity,
        "Reset complete"
    );

    Ok(())
}
