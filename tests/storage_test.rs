//! Integration tests for the SQLite session store
//!
//! Each test opens a fresh database in a temporary directory.

use pretty_assertions::assert_eq;
use tempfile::TempDir;

use evidence_engine::config::DatabaseConfig;
use evidence_engine::error::StorageError;
use evidence_engine::evidence::{EvidenceChunk, EvidenceType, Session};
use evidence_engine::storage::{SessionStore, SqliteStorage};

async fn open_store() -> (TempDir, SqliteStorage) {
    let dir = TempDir::new().expect("temp dir");
    let config = DatabaseConfig {
        path: dir.path().join("nested").join("evidence.db"),
        max_connections: 1,
    };
    let storage = SqliteStorage::new(&config).await.expect("storage");
    (dir, storage)
}

fn session_with_evidence() -> Session {
    let mut session = Session::new().with_title("Calendar onboarding study");
    session
        .evidence
        .add(
            EvidenceChunk::new(
                "I gave up connecting my calendar after twenty minutes",
                EvidenceType::UserQuote,
                "Interview 3",
            )
            .unwrap(),
        )
        .unwrap();
    session.register_hypothesis("Calendar setup blocks activation").unwrap();
    session
}

#[tokio::test]
async fn test_create_and_get_round_trips_projection() {
    let (_dir, storage) = open_store().await;
    let session = session_with_evidence();

    storage.create_session(&session).await.unwrap();
    let loaded = storage.get_session(&session.id).await.unwrap().unwrap();

    assert_eq!(loaded, session);
}

#[tokio::test]
async fn test_get_unknown_session_is_none() {
    let (_dir, storage) = open_store().await;
    assert!(storage.get_session("missing").await.unwrap().is_none());
}

#[tokio::test]
async fn test_save_replaces_projection() {
    let (_dir, storage) = open_store().await;
    let mut session = session_with_evidence();
    storage.create_session(&session).await.unwrap();

    session
        .evidence
        .add(
            EvidenceChunk::new(
                "Only 34% of accounts finish calendar setup in week one",
                EvidenceType::AnalyticsData,
                "Dashboard",
            )
            .unwrap(),
        )
        .unwrap();
    session.touch();
    storage.save_session(&session).await.unwrap();

    let loaded = storage.get_session(&session.id).await.unwrap().unwrap();
    assert_eq!(loaded.evidence.len(), 2);
    assert_eq!(loaded.hypotheses.len(), 1);
}

#[tokio::test]
async fn test_save_unknown_session_fails() {
    let (_dir, storage) = open_store().await;
    let err = storage.save_session(&Session::new()).await.unwrap_err();
    assert!(matches!(err, StorageError::SessionNotFound { .. }));
}

#[tokio::test]
async fn test_create_duplicate_id_fails() {
    let (_dir, storage) = open_store().await;
    let session = Session::new();
    storage.create_session(&session).await.unwrap();
    assert!(storage.create_session(&session).await.is_err());
}

#[tokio::test]
async fn test_list_sessions_newest_first() {
    let (_dir, storage) = open_store().await;

    let older = Session::new().with_title("older");
    storage.create_session(&older).await.unwrap();
    tokio::time::sleep(std::time::Duration::from_millis(10)).await;
    let newer = session_with_evidence();
    storage.create_session(&newer).await.unwrap();

    let listed = storage.list_sessions().await.unwrap();
    assert_eq!(listed.len(), 2);
    assert_eq!(listed[0].id, newer.id);
    assert_eq!(listed[0].chunk_count, 1);
    assert_eq!(listed[0].title.as_deref(), Some("Calendar onboarding study"));
    assert_eq!(listed[1].id, older.id);
    assert_eq!(listed[1].verdict_count, 0);
}
