//! `PostgreSQL` persistence for identities, the entry/exit log and the counter.

use chrono::{DateTime, Utc};
use occupancy_core::persistence::{
    IdentityDirectory, LogRepository, OccupancySnapshot, OccupancyStore, ScanRecorder,
    StoreFuture,
};
use occupancy_core::{
    CredentialToken, EventKind, Identity, IdentityId, LogId, LogRecord, OccupancyState, Role,
    StoreError,
};
use sqlx::postgres::{PgPoolOptions, PgRow};
use sqlx::{PgExecutor, PgPool, Row};
use std::time::Duration;

const IDENTITY_COLUMNS: &str = "id, email, first_name, last_name, role, qr_code";
const OCCUPANCY_COLUMNS: &str = "current_occupancy, max_capacity, updated_at";

/// Map a driver error, counting it by operation.
fn db_error(operation: &'static str) -> impl FnOnce(sqlx::Error) -> StoreError {
    move |e| {
        metrics::counter!("occupancy_store_errors_total", "operation" => operation).increment(1);
        tracing::error!(operation, error = %e, "Database operation failed");
        StoreError::Database(format!("{operation}: {e}"))
    }
}

/// One repository serving every persistence trait over a shared pool.
///
/// # Example
///
/// ```no_run
/// use occupancy_postgres::PostgresOccupancyRepository;
///
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let repository = PostgresOccupancyRepository::connect(
///     "postgres://localhost/occupancy",
///     10,
///     std::time::Duration::from_secs(5),
/// )
/// .await?;
/// repository.migrate().await?;
/// repository.initialize_occupancy(100).await?;
/// # Ok(())
/// # }
/// ```
#[derive(Clone, Debug)]
pub struct PostgresOccupancyRepository {
    pool: PgPool,
}

impl PostgresOccupancyRepository {
    /// Wrap an existing pool.
    #[must_use]
    pub const fn from_pool(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Open a connection pool.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Database`] if the database is unreachable.
    pub async fn connect(
        database_url: &str,
        max_connections: u32,
        connect_timeout: Duration,
    ) -> Result<Self, StoreError> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .acquire_timeout(connect_timeout)
            .connect(database_url)
            .await
            .map_err(db_error("connect"))?;
        Ok(Self { pool })
    }

    /// Run the bundled migrations.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Database`] if a migration fails.
    pub async fn migrate(&self) -> Result<(), StoreError> {
        sqlx::migrate!("./migrations")
            .run(&self.pool)
            .await
            .map_err(|e| StoreError::Database(format!("Migration failed: {e}")))?;
        Ok(())
    }

    /// Create the counter row with `max_capacity` unless it already exists.
    ///
    /// An existing row is left untouched.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Database`] if the write fails.
    pub async fn initialize_occupancy(
        &self,
        max_capacity: u32,
    ) -> Result<OccupancySnapshot, StoreError> {
        sqlx::query(
            r"
            INSERT INTO occupancy_state (id, current_occupancy, max_capacity)
            VALUES (1, 0, $1)
            ON CONFLICT (id) DO NOTHING
            ",
        )
        .bind(to_db_int(max_capacity)?)
        .execute(&self.pool)
        .await
        .map_err(db_error("initialize_occupancy"))?;

        self.fetch_occupancy().await
    }

    /// Insert or update an identity. Used to seed data; the scan path never
    /// writes identities.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Database`] if the write fails (for example a
    /// duplicate email or credential).
    pub async fn upsert_identity(&self, identity: &Identity) -> Result<(), StoreError> {
        sqlx::query(
            r"
            INSERT INTO identities (id, email, first_name, last_name, role, qr_code)
            VALUES ($1, $2, $3, $4, $5, $6)
            ON CONFLICT (id) DO UPDATE
            SET email = EXCLUDED.email,
                first_name = EXCLUDED.first_name,
                last_name = EXCLUDED.last_name,
                role = EXCLUDED.role,
                qr_code = EXCLUDED.qr_code
            ",
        )
        .bind(*identity.id.as_uuid())
        .bind(&identity.email)
        .bind(&identity.first_name)
        .bind(&identity.last_name)
        .bind(identity.role.as_str())
        .bind(identity.credential.as_str())
        .execute(&self.pool)
        .await
        .map_err(db_error("upsert_identity"))?;
        Ok(())
    }

    async fn fetch_identity(
        &self,
        filter: &'static str,
        bind: IdentityFilter<'_>,
    ) -> Result<Option<Identity>, StoreError> {
        let sql = format!("SELECT {IDENTITY_COLUMNS} FROM identities WHERE {filter} = $1");
        let query = sqlx::query(&sql);
        let query = match bind {
            IdentityFilter::Credential(token) => query.bind(token.as_str()),
            IdentityFilter::Id(id) => query.bind(*id.as_uuid()),
        };
        let row = query
            .fetch_optional(&self.pool)
            .await
            .map_err(db_error("find_identity"))?;
        row.as_ref().map(row_to_identity).transpose()
    }

    async fn fetch_occupancy(&self) -> Result<OccupancySnapshot, StoreError> {
        let sql = format!("SELECT {OCCUPANCY_COLUMNS} FROM occupancy_state WHERE id = 1");
        let row = sqlx::query(&sql)
            .fetch_optional(&self.pool)
            .await
            .map_err(db_error("read_occupancy_state"))?
            .ok_or(StoreError::OccupancyNotInitialized)?;
        row_to_snapshot(&row)
    }
}

// RETURNING hands back the stored timestamp, truncated to microseconds.
async fn insert_log<'e>(
    executor: impl PgExecutor<'e>,
    identity_id: IdentityId,
    kind: EventKind,
    timestamp: DateTime<Utc>,
) -> Result<LogRecord, StoreError> {
    let row = sqlx::query(
        r"
        INSERT INTO entry_exit_logs (id, identity_id, kind, occurred_at)
        VALUES ($1, $2, $3, $4)
        RETURNING id, identity_id, kind, occurred_at
        ",
    )
    .bind(*LogId::new().as_uuid())
    .bind(*identity_id.as_uuid())
    .bind(kind.as_str())
    .bind(timestamp)
    .fetch_one(executor)
    .await
    .map_err(db_error("append_log"))?;

    row_to_log(&row)
}

async fn apply_delta<'e>(
    executor: impl PgExecutor<'e>,
    is_entry: bool,
) -> Result<OccupancySnapshot, StoreError> {
    let delta: i32 = if is_entry { 1 } else { -1 };
    let sql = format!(
        r"
        UPDATE occupancy_state
        SET current_occupancy = GREATEST(current_occupancy + $1, 0),
            updated_at = now()
        WHERE id = 1
        RETURNING {OCCUPANCY_COLUMNS}
        "
    );
    let row = sqlx::query(&sql)
        .bind(delta)
        .fetch_optional(executor)
        .await
        .map_err(db_error("atomic_apply_delta"))?
        .ok_or(StoreError::OccupancyNotInitialized)?;
    row_to_snapshot(&row)
}

enum IdentityFilter<'a> {
    Credential(&'a CredentialToken),
    Id(IdentityId),
}

fn to_db_int(value: u32) -> Result<i32, StoreError> {
    i32::try_from(value).map_err(|_| StoreError::Database(format!("{value} exceeds INTEGER range")))
}

fn from_db_int(column: &str, value: i32) -> Result<u32, StoreError> {
    u32::try_from(value).map_err(|_| StoreError::CorruptRecord(format!("{column} = {value}")))
}

fn row_to_identity(row: &PgRow) -> Result<Identity, StoreError> {
    let get = |e: sqlx::Error| StoreError::CorruptRecord(e.to_string());
    let role: String = row.try_get("role").map_err(get)?;
    let qr_code: String = row.try_get("qr_code").map_err(get)?;

    Ok(Identity {
        id: IdentityId::from_uuid(row.try_get("id").map_err(get)?),
        email: row.try_get("email").map_err(get)?,
        first_name: row.try_get("first_name").map_err(get)?,
        last_name: row.try_get("last_name").map_err(get)?,
        role: Role::parse(&role)
            .ok_or_else(|| StoreError::CorruptRecord(format!("unknown role {role}")))?,
        credential: CredentialToken::new(qr_code),
    })
}

fn row_to_log(row: &PgRow) -> Result<LogRecord, StoreError> {
    let get = |e: sqlx::Error| StoreError::CorruptRecord(e.to_string());
    let kind: String = row.try_get("kind").map_err(get)?;

    Ok(LogRecord {
        id: LogId::from_uuid(row.try_get("id").map_err(get)?),
        identity_id: IdentityId::from_uuid(row.try_get("identity_id").map_err(get)?),
        kind: EventKind::parse(&kind)
            .ok_or_else(|| StoreError::CorruptRecord(format!("unknown event kind {kind}")))?,
        timestamp: row.try_get("occurred_at").map_err(get)?,
    })
}

fn row_to_snapshot(row: &PgRow) -> Result<OccupancySnapshot, StoreError> {
    let get = |e: sqlx::Error| StoreError::CorruptRecord(e.to_string());
    let current: i32 = row.try_get("current_occupancy").map_err(get)?;
    let max: i32 = row.try_get("max_capacity").map_err(get)?;

    Ok(OccupancySnapshot {
        state: OccupancyState::new(
            from_db_int("current_occupancy", current)?,
            from_db_int("max_capacity", max)?,
        ),
        updated_at: row.try_get("updated_at").map_err(get)?,
    })
}

impl IdentityDirectory for PostgresOccupancyRepository {
    fn find_identity_by_credential<'a>(
        &'a self,
        token: &'a CredentialToken,
    ) -> StoreFuture<'a, Option<Identity>> {
        Box::pin(self.fetch_identity("qr_code", IdentityFilter::Credential(token)))
    }

    fn find_identity_by_id(&self, id: IdentityId) -> StoreFuture<'_, Option<Identity>> {
        Box::pin(self.fetch_identity("id", IdentityFilter::Id(id)))
    }
}

impl LogRepository for PostgresOccupancyRepository {
    fn find_most_recent_log(&self, identity_id: IdentityId) -> StoreFuture<'_, Option<LogRecord>> {
        Box::pin(async move {
            let row = sqlx::query(
                r"
                SELECT id, identity_id, kind, occurred_at
                FROM entry_exit_logs
                WHERE identity_id = $1
                ORDER BY occurred_at DESC, seq DESC
                LIMIT 1
                ",
            )
            .bind(*identity_id.as_uuid())
            .fetch_optional(&self.pool)
            .await
            .map_err(db_error("find_most_recent_log"))?;

            row.as_ref().map(row_to_log).transpose()
        })
    }

    fn append_log(
        &self,
        identity_id: IdentityId,
        kind: EventKind,
        timestamp: DateTime<Utc>,
    ) -> StoreFuture<'_, LogRecord> {
        Box::pin(insert_log(&self.pool, identity_id, kind, timestamp))
    }

    fn count_logs(&self) -> StoreFuture<'_, u64> {
        Box::pin(async move {
            let (count,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM entry_exit_logs")
                .fetch_one(&self.pool)
                .await
                .map_err(db_error("count_logs"))?;
            u64::try_from(count).map_err(|_| StoreError::CorruptRecord(format!("count = {count}")))
        })
    }

    fn delete_all_logs(&self) -> StoreFuture<'_, u64> {
        Box::pin(async move {
            let result = sqlx::query("DELETE FROM entry_exit_logs")
                .execute(&self.pool)
                .await
                .map_err(db_error("delete_all_logs"))?;
            Ok(result.rows_affected())
        })
    }
}

impl OccupancyStore for PostgresOccupancyRepository {
    fn read_occupancy_state(&self) -> StoreFuture<'_, OccupancySnapshot> {
        Box::pin(self.fetch_occupancy())
    }

    fn atomic_apply_delta(&self, is_entry: bool) -> StoreFuture<'_, OccupancySnapshot> {
        Box::pin(apply_delta(&self.pool, is_entry))
    }

    fn reset_occupancy_to_zero(&self, default_capacity: u32) -> StoreFuture<'_, OccupancySnapshot> {
        Box::pin(async move {
            let sql = format!(
                r"
                INSERT INTO occupancy_state (id, current_occupancy, max_capacity)
                VALUES (1, 0, $1)
                ON CONFLICT (id) DO UPDATE
                SET current_occupancy = 0,
                    updated_at = now()
                RETURNING {OCCUPANCY_COLUMNS}
                "
            );
            let row = sqlx::query(&sql)
                .bind(to_db_int(default_capacity)?)
                .fetch_one(&self.pool)
                .await
                .map_err(db_error("reset_occupancy_to_zero"))?;
            row_to_snapshot(&row)
        })
    }
}

impl ScanRecorder for PostgresOccupancyRepository {
    fn record_scan(
        &self,
        identity_id: IdentityId,
        kind: EventKind,
        timestamp: DateTime<Utc>,
    ) -> StoreFuture<'_, (LogRecord, OccupancySnapshot)> {
        Box::pin(async move {
            let mut tx = self.pool.begin().await.map_err(db_error("record_scan"))?;

            // An early return drops `tx`, which rolls the insert back.
            let record = insert_log(&mut *tx, identity_id, kind, timestamp).await?;
            let snapshot = apply_delta(&mut *tx, kind.is_entry()).await?;

            tx.commit().await.map_err(db_error("record_scan"))?;
            Ok((record, snapshot))
        })
    }
}
