//! Presence tests driven through the engine with a paused clock.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use logos_docs::{AgentId, DocumentEngine, DocumentId, EngineConfig, ErrorKind, Permission};

fn agent(name: &str) -> AgentId {
    AgentId::new(name)
}

async fn setup(idle: Duration) -> (Arc<DocumentEngine>, DocumentId) {
    let engine = Arc::new(DocumentEngine::new(EngineConfig {
        presence_idle_timeout: idle,
        ..EngineConfig::for_testing()
    }));
    let grants = HashMap::from([
        (agent("collaborator_agent"), Permission::ReadWrite),
        (agent("reviewer_agent"), Permission::Read),
    ]);
    let id = engine
        .create_document(&agent("editor"), "Doc", "one\ntwo\nthree\nfour", grants)
        .await
        .unwrap()
        .document_id;
    (engine, id)
}

#[tokio::test(start_paused = true)]
async fn test_idle_cursor_expires() {
    let (engine, id) = setup(Duration::from_secs(60)).await;
    let editor = agent("editor");
    let reviewer = agent("reviewer_agent");

    engine.update_cursor_position(&editor, id, 3, 5).await.unwrap();
    tokio::time::advance(Duration::from_secs(30)).await;
    engine.update_cursor_position(&reviewer, id, 1, 1).await.unwrap();

    let presence = engine.get_agent_presence(&reviewer, id).await.unwrap();
    assert_eq!(presence.len(), 2);
    let mine = presence.iter().find(|p| p.agent_id == editor).unwrap();
    assert_eq!((mine.line, mine.column), (3, 5));
    assert_eq!(mine.age_ms, 30_000);

    // Exactly at the timeout the cursor is still live
    tokio::time::advance(Duration::from_secs(30)).await;
    assert_eq!(engine.get_agent_presence(&reviewer, id).await.unwrap().len(), 2);

    tokio::time::advance(Duration::from_secs(1)).await;
    let presence = engine.get_agent_presence(&reviewer, id).await.unwrap();
    assert_eq!(presence.len(), 1);
    assert_eq!(presence[0].agent_id, reviewer);

    // Reads report the same view
    let snap = engine.get_document(&editor, id).await.unwrap();
    assert_eq!(snap.presence.len(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_update_refreshes_cursor() {
    let (engine, id) = setup(Duration::from_secs(10)).await;
    let editor = agent("editor");

    engine.update_cursor_position(&editor, id, 1, 1).await.unwrap();
    for line in 2..=4 {
        tokio::time::advance(Duration::from_secs(8)).await;
        engine.update_cursor_position(&editor, id, line, 1).await.unwrap();
    }

    let presence = engine.get_agent_presence(&editor, id).await.unwrap();
    assert_eq!(presence.len(), 1);
    assert_eq!(presence[0].line, 4);
    assert_eq!(presence[0].age_ms, 0);
}

#[tokio::test(start_paused = true)]
async fn test_open_and_close_document() {
    let (engine, id) = setup(Duration::from_secs(60)).await;
    let collaborator = agent("collaborator_agent");

    engine.open_document(&collaborator, id).await.unwrap();
    let presence = engine.get_agent_presence(&collaborator, id).await.unwrap();
    assert_eq!(presence.len(), 1);
    assert_eq!((presence[0].line, presence[0].column), (1, 1));

    // Reopening keeps a live cursor where it is
    engine.update_cursor_position(&collaborator, id, 4, 2).await.unwrap();
    engine.open_document(&collaborator, id).await.unwrap();
    let presence = engine.get_agent_presence(&collaborator, id).await.unwrap();
    assert_eq!(presence[0].line, 4);

    assert!(engine.close_document(&collaborator, id).await.unwrap());
    assert!(engine.get_agent_presence(&collaborator, id).await.unwrap().is_empty());
    assert!(!engine.close_document(&collaborator, id).await.unwrap());
}

#[tokio::test(start_paused = true)]
async fn test_presence_never_versions_the_document() {
    let (engine, id) = setup(Duration::from_secs(60)).await;
    let editor = agent("editor");

    for column in 1..=10 {
        engine.update_cursor_position(&editor, id, 2, column).await.unwrap();
    }
    engine.close_document(&editor, id).await.unwrap();

    let snap = engine.get_document(&editor, id).await.unwrap();
    assert_eq!(snap.version, 1);
    assert_eq!(engine.get_document_history(&editor, id, 10).await.unwrap().len(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_cursor_requires_read_access() {
    let (engine, id) = setup(Duration::from_secs(60)).await;

    let err = engine
        .update_cursor_position(&agent("stranger"), id, 1, 1)
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::PermissionDenied);
    let err = engine
        .update_cursor_position(&agent("editor"), DocumentId::new(), 1, 1)
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::NotFound);
}

#[tokio::test(start_paused = true)]
async fn test_cursor_bounds_follow_edits() {
    let (engine, id) = setup(Duration::from_secs(60)).await;
    let editor = agent("editor");

    let err = engine.update_cursor_position(&editor, id, 6, 1).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::OutOfRange);

    engine
        .replace_lines(&editor, id, 5, 4, vec!["five".into(), "six".into()], None)
        .await
        .unwrap();
    engine.update_cursor_position(&editor, id, 6, 1).await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn test_sweep_drops_expired_entries() {
    let (engine, id) = setup(Duration::from_secs(5)).await;
    engine.update_cursor_position(&agent("editor"), id, 1, 1).await.unwrap();
    engine
        .update_cursor_position(&agent("reviewer_agent"), id, 2, 1)
        .await
        .unwrap();

    assert_eq!(engine.sweep_presence().await, 0);
    tokio::time::advance(Duration::from_secs(6)).await;
    assert_eq!(engine.sweep_presence().await, 2);
    assert_eq!(engine.sweep_presence().await, 0);
}
