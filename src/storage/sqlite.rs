use async_trait::async_trait;
use chrono::SecondsFormat;
use sqlx::migrate::Migrator;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use std::str::FromStr;
use tracing::{debug, info};

use super::{SessionStore, SessionSummary};
use crate::config::DatabaseConfig;
use crate::error::{StorageError, StorageResult};
use crate::evidence::Session;

/// Static migrator that embeds migrations at compile time
static MIGRATOR: Migrator = sqlx::migrate!("./migrations");

/// SQLite-backed session store
#[derive(Clone)]
pub struct SqliteStorage {
    pool: SqlitePool,
}

impl SqliteStorage {
    /// Open (creating if needed) the database and run migrations
    pub async fn new(config: &DatabaseConfig) -> StorageResult<Self> {
        if let Some(parent) = config.path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent).map_err(|e| StorageError::Connection {
                    message: format!("Failed to create database directory: {}", e),
                })?;
            }
        }

        let database_url = format!("sqlite://{}?mode=rwc", config.path.display());

        let options = SqliteConnectOptions::from_str(&database_url)
            .map_err(|e| StorageError::Connection {
                message: format!("Invalid database URL: {}", e),
            })?
            .create_if_missing(true);

        let pool = SqlitePoolOptions::new()
            .max_connections(config.max_connections)
            .connect_with(options)
            .await
            .map_err(|e| StorageError::Connection {
                message: format!("Failed to connect to database: {}", e),
            })?;

        let storage = Self { pool };
        storage.run_migrations().await?;

        Ok(storage)
    }

    async fn run_migrations(&self) -> StorageResult<()> {
        info!("Running database migrations...");

        MIGRATOR.run(&self.pool).await.map_err(|e| StorageError::Migration {
            message: format!("Failed to run migrations: {}", e),
        })?;

        info!("Database migrations completed successfully");
        Ok(())
    }
}

#[async_trait]
impl SessionStore for SqliteStorage {
    async fn create_session(&self, session: &Session) -> StorageResult<()> {
        let snapshot = serde_json::to_string(session)?;
        let summary = SessionSummary::of(session);

        sqlx::query(
            r#"
            INSERT INTO sessions (id, title, created_at, updated_at, chunk_count, verdict_count, snapshot)
            VALUES (?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&summary.id)
        .bind(&summary.title)
        .bind(summary.created_at.to_rfc3339_opts(SecondsFormat::Micros, true))
        .bind(summary.updated_at.to_rfc3339_opts(SecondsFormat::Micros, true))
        .bind(summary.chunk_count)
        .bind(summary.verdict_count)
        .bind(&snapshot)
        .execute(&self.pool)
        .await?;

        debug!(session_id = %session.id, "Session created");
        Ok(())
    }

    async fn get_session(&self, id: &str) -> StorageResult<Option<Session>> {
        let snapshot: Option<(String,)> = sqlx::query_as("SELECT snapshot FROM sessions WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

        match snapshot {
            Some((json,)) => Ok(Some(serde_json::from_str(&json)?)),
            None => Ok(None),
        }
    }

    async fn save_session(&self, session: &Session) -> StorageResult<()> {
        let snapshot = serde_json::to_string(session)?;
        let summary = SessionSummary::of(session);

        let result = sqlx::query(
            r#"
            UPDATE sessions
            SET title = ?, updated_at = ?, chunk_count = ?, verdict_count = ?, snapshot = ?
            WHERE id = ?
            "#,
        )
        .bind(&summary.title)
        .bind(summary.updated_at.to_rfc3339_opts(SecondsFormat::Micros, true))
        .bind(summary.chunk_count)
        .bind(summary.verdict_count)
        .bind(&snapshot)
        .bind(&summary.id)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(StorageError::SessionNotFound {
                session_id: session.id.clone(),
            });
        }

        debug!(
            session_id = %session.id,
            chunks = summary.chunk_count,
            verdicts = summary.verdict_count,
            "Session saved"
        );
        Ok(())
    }

    async fn list_sessions(&self) -> StorageResult<Vec<SessionSummary>> {
        let rows: Vec<SessionRow> = sqlx::query_as(
            r#"
            SELECT id, title, created_at, updated_at, chunk_count, verdict_count
            FROM sessions
            ORDER BY updated_at DESC
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().map(Into::into).collect())
    }
}

#[derive(sqlx::FromRow)]
struct SessionRow {
    id: String,
    title: Option<String>,
    created_at: String,
    updated_at: String,
    chunk_count: i64,
    verdict_count: i64,
}

impl From<SessionRow> for SessionSummary {
    fn from(row: SessionRow) -> Self {
        use chrono::DateTime;

        Self {
            id: row.id,
            title: row.title,
            created_at: DateTime::parse_from_rfc3339(&row.created_at)
                .map(|dt| dt.with_timezone(&chrono::Utc))
                .unwrap_or_else(|_| chrono::Utc::now()),
            updated_at: DateTime::parse_from_rfc3339(&row.updated_at)
                .map(|dt| dt.with_timezone(&chrono::Utc))
                .unwrap_or_else(|_| chrono::Utc::now()),
            chunk_count: row.chunk_count,
            verdict_count: row.verdict_count,
        }
    }
}
