use super::{AccessLogStore, StoreError, StoreResult, VisitorStore};
use crate::access_log::normalize_collaborator;
use crate::config::DatabaseConfig;
use crate::models::{
    AccessLogEntry, BanState, NewAccessLog, NewVisitor, VisitRecorded, Visitor, VisitorFilter,
    VisitorUpdate,
};
use anyhow::{Context, Result};
use async_trait::async_trait;
use sqlx::postgres::{PgPool, PgPoolOptions};
use tracing::{debug, info, instrument};
use uuid::Uuid;

const VISITOR_COLUMNS: &str = r#"
    id, name, national_id, photo_ref, is_banned, ban_reason,
    visit_count, last_entry_at, last_apartment_visited, created_at
"#;

const ACCESS_LOG_COLUMNS: &str = r#"
    id, visitor_id, destination_apartment, authorized_by,
    collaborator, photo_ref, timestamp
"#;

/// Visitor and access log store backed by PostgreSQL
pub struct PostgresStore {
    pool: PgPool,
}

impl PostgresStore {
    /// Create a new store with connection pool
    pub async fn new(config: &DatabaseConfig) -> Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(config.max_connections)
            .min_connections(config.min_connections)
            .acquire_timeout(config.connect_timeout())
            .idle_timeout(Some(config.idle_timeout()))
            .connect(&config.url)
            .await
            .context("Failed to connect to PostgreSQL")?;

        info!("Connected to PostgreSQL database");

        Ok(Self { pool })
    }

    /// Run database migrations
    pub async fn run_migrations(&self) -> Result<()> {
        info!("Running database migrations");

        sqlx::migrate!("./migrations")
            .run(&self.pool)
            .await
            .context("Failed to run migrations")?;

        info!("Database migrations completed");
        Ok(())
    }
}

impl From<sqlx::Error> for StoreError {
    fn from(err: sqlx::Error) -> Self {
        if is_unique_violation(&err) {
            return StoreError::Conflict(err.to_string());
        }
        match err {
            sqlx::Error::RowNotFound => StoreError::NotFound("row not found".to_string()),
            other => StoreError::Unavailable(other.to_string()),
        }
    }
}

fn is_unique_violation(err: &sqlx::Error) -> bool {
    if let sqlx::Error::Database(db_err) = err {
        return db_err.code().map(|code| code == "23505").unwrap_or(false);
    }
    false
}

#[async_trait]
impl VisitorStore for PostgresStore {
    #[instrument(skip(self))]
    async fn find_by_national_id(&self, national_id: &str) -> StoreResult<Option<Visitor>> {
        let sql = format!("SELECT {VISITOR_COLUMNS} FROM visitors WHERE national_id = $1");
        let visitor = sqlx::query_as::<_, Visitor>(&sql)
            .bind(national_id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(visitor)
    }

    #[instrument(skip(self))]
    async fn find_banned(&self, national_id: &str) -> StoreResult<Option<Visitor>> {
        let sql = format!(
            "SELECT {VISITOR_COLUMNS} FROM visitors WHERE national_id = $1 AND is_banned = TRUE"
        );
        let visitor = sqlx::query_as::<_, Visitor>(&sql)
            .bind(national_id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(visitor)
    }

    async fn find_by_id(&self, id: Uuid) -> StoreResult<Option<Visitor>> {
        let sql = format!("SELECT {VISITOR_COLUMNS} FROM visitors WHERE id = $1");
        let visitor = sqlx::query_as::<_, Visitor>(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(visitor)
    }

    async fn find_by_ids(&self, ids: &[Uuid]) -> StoreResult<Vec<Visitor>> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }
        let sql = format!("SELECT {VISITOR_COLUMNS} FROM visitors WHERE id = ANY($1)");
        let visitors = sqlx::query_as::<_, Visitor>(&sql)
            .bind(ids)
            .fetch_all(&self.pool)
            .await?;
        Ok(visitors)
    }

    #[instrument(skip(self, visitor), fields(national_id = %visitor.national_id))]
    async fn create(&self, visitor: NewVisitor) -> StoreResult<Visitor> {
        let sql = format!(
            r#"
            INSERT INTO visitors (id, name, national_id, photo_ref, created_at)
            VALUES ($1, $2, $3, $4, NOW())
            RETURNING {VISITOR_COLUMNS}
            "#
        );
        let created = sqlx::query_as::<_, Visitor>(&sql)
            .bind(Uuid::new_v4())
            .bind(&visitor.name)
            .bind(&visitor.national_id)
            .bind(&visitor.photo_ref)
            .fetch_one(&self.pool)
            .await?;

        debug!(visitor_id = %created.id, "Visitor row inserted");
        Ok(created)
    }

    #[instrument(skip(self, update))]
    async fn update(&self, id: Uuid, update: VisitorUpdate) -> StoreResult<Visitor> {
        // NULL parameters leave the column untouched; the ban pair is written together.
        let (set_ban, is_banned, ban_reason) = match update.ban {
            Some(BanState::Banned { reason }) => (true, true, Some(reason)),
            Some(BanState::Clear) => (true, false, None),
            None => (false, false, None),
        };

        let sql = format!(
            r#"
            UPDATE visitors SET
                photo_ref = COALESCE($2, photo_ref),
                is_banned = CASE WHEN $3 THEN $4 ELSE is_banned END,
                ban_reason = CASE WHEN $3 THEN $5 ELSE ban_reason END
            WHERE id = $1
            RETURNING {VISITOR_COLUMNS}
            "#
        );
        let updated = sqlx::query_as::<_, Visitor>(&sql)
            .bind(id)
            .bind(update.photo_ref)
            .bind(set_ban)
            .bind(is_banned)
            .bind(ban_reason)
            .fetch_optional(&self.pool)
            .await?;

        updated.ok_or_else(|| StoreError::NotFound(format!("visitor {id}")))
    }

    #[instrument(skip(self, visit), fields(visitor_id = %visit.visitor_id))]
    async fn record_visit(&self, visit: VisitRecorded) -> StoreResult<()> {
        let result = sqlx::query(
            r#"
            UPDATE visitors SET
                visit_count = visit_count + 1,
                last_entry_at = $2,
                last_apartment_visited = $3
            WHERE id = $1
            "#,
        )
        .bind(visit.visitor_id)
        .bind(visit.at)
        .bind(&visit.apartment)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound(format!("visitor {}", visit.visitor_id)));
        }
        Ok(())
    }

    #[instrument(skip(self))]
    async fn list(&self, filter: VisitorFilter) -> StoreResult<Vec<Visitor>> {
        // strpos instead of LIKE so '%' and '_' in the query match literally.
        let sql = format!(
            r#"
            SELECT {VISITOR_COLUMNS} FROM visitors
            WHERE ($1::BOOLEAN IS NULL OR is_banned = $1)
              AND ($2::TEXT IS NULL
                   OR strpos(lower(name), lower($2)) > 0
                   OR strpos(lower(national_id), lower($2)) > 0)
            ORDER BY created_at DESC
            "#
        );
        let visitors = sqlx::query_as::<_, Visitor>(&sql)
            .bind(filter.banned)
            .bind(filter.query)
            .fetch_all(&self.pool)
            .await?;
        Ok(visitors)
    }

    async fn health_check(&self) -> StoreResult<()> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }

    fn backend_name(&self) -> &'static str {
        "postgres"
    }
}

#[async_trait]
impl AccessLogStore for PostgresStore {
    #[instrument(skip(self, entry), fields(visitor_id = %entry.visitor_id))]
    async fn create(&self, entry: NewAccessLog) -> StoreResult<AccessLogEntry> {
        let sql = format!(
            r#"
            INSERT INTO access_logs (
                id, visitor_id, destination_apartment, authorized_by,
                collaborator, photo_ref, timestamp
            ) VALUES ($1, $2, $3, $4, $5, $6, $7)
            RETURNING {ACCESS_LOG_COLUMNS}
            "#
        );
        let created = sqlx::query_as::<_, AccessLogEntry>(&sql)
            .bind(Uuid::new_v4())
            .bind(entry.visitor_id)
            .bind(&entry.destination_apartment)
            .bind(&entry.authorized_by)
            .bind(&entry.collaborator)
            .bind(&entry.photo_ref)
            .bind(entry.timestamp)
            .fetch_one(&self.pool)
            .await?;

        Ok(created)
    }

    #[instrument(skip(self))]
    async fn list_recent(&self, limit: usize) -> StoreResult<Vec<AccessLogEntry>> {
        let sql = format!(
            "SELECT {ACCESS_LOG_COLUMNS} FROM access_logs ORDER BY timestamp DESC LIMIT $1"
        );
        let rows = sqlx::query_as::<_, AccessLogEntry>(&sql)
            .bind(limit as i64)
            .fetch_all(&self.pool)
            .await?;

        // Rows written before the collaborator column was normalized may hold "null" text.
        Ok(rows
            .into_iter()
            .map(|mut row| {
                row.collaborator = normalize_collaborator(Some(&row.collaborator));
                row
            })
            .collect())
    }
}
