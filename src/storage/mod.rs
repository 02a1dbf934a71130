//! Persistence for session projections.
//!
//! The engine never writes anything durable itself. The binary loads a
//! session here, hands it to [`crate::modes::EvidenceEngine::run`], and saves
//! the returned projection.

mod sqlite;

pub use sqlite::SqliteStorage;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::StorageResult;
use crate::evidence::Session;

/// One row of a session listing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionSummary {
    pub id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub chunk_count: i64,
    pub verdict_count: i64,
}

impl SessionSummary {
    /// Summarise a session projection.
    pub fn of(session: &Session) -> Self {
        Self {
            id: session.id.clone(),
            title: session.title.clone(),
            created_at: session.created_at,
            updated_at: session.updated_at,
            chunk_count: session.evidence.len() as i64,
            verdict_count: session.verdicts().len() as i64,
        }
    }
}

/// Storage for whole session projections.
#[async_trait]
pub trait SessionStore: Send + Sync {
    /// Insert a new session.
    async fn create_session(&self, session: &Session) -> StorageResult<()>;
    /// Load a session by ID.
    async fn get_session(&self, id: &str) -> StorageResult<Option<Session>>;
    /// Replace the stored projection of an existing session.
    async fn save_session(&self, session: &Session) -> StorageResult<()>;
    /// Sessions ordered by most recent update first.
    async fn list_sessions(&self) -> StorageResult<Vec<SessionSummary>>;
}
