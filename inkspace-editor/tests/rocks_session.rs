//! Editor sessions over the durable RocksDB store.

use std::sync::Arc;
use std::time::Duration;

use tempfile::tempdir;

use inkspace_collab::{NodeStore, RocksNodeStore, StoreConfig};
use inkspace_core::{Delta, DocumentNode, NodeKind, RichText};
use inkspace_editor::{AutosaveScheduler, EditorSession};

const QUIET: Duration = Duration::from_millis(50);

fn open_store(path: &std::path::Path) -> RocksNodeStore {
    RocksNodeStore::open(StoreConfig::for_testing(path)).unwrap()
}

/// Workspace → folder → file chain; returns the file id.
fn seed_chain(store: &RocksNodeStore) -> uuid::Uuid {
    let ws = DocumentNode::new(NodeKind::Workspace, None, "Home", 1);
    let folder = DocumentNode::new(NodeKind::Folder, Some(ws.id), "Notes", 2);
    let file = DocumentNode::new(NodeKind::File, Some(folder.id), "Journal", 3);
    let file_id = file.id;
    store.create_node(&ws).unwrap();
    store.create_node(&folder).unwrap();
    store.create_node(&file).unwrap();
    file_id
}

fn open_session(store: Arc<RocksNodeStore>, file_id: uuid::Uuid) -> EditorSession {
    let autosave =
        AutosaveScheduler::with_timing(store.clone(), file_id, QUIET, Duration::from_millis(10));
    EditorSession::open_with_scheduler(store, NodeKind::File, file_id, "alice@x", autosave)
        .unwrap()
}

#[tokio::test]
async fn test_close_flushes_into_rocks() {
    let dir = tempdir().unwrap();
    let store = Arc::new(open_store(dir.path()));
    let file_id = seed_chain(&store);

    let mut session = open_session(store.clone(), file_id);
    session
        .edit(&Delta::new().insert("durable words"))
        .await
        .unwrap();
    // Close inside the quiet window: the final flush must still land.
    session.close().await;

    let node = store.get_node(NodeKind::File, file_id).unwrap();
    let doc = RichText::new()
        .apply(&Delta::from_json(&node.content).unwrap())
        .unwrap();
    assert_eq!(doc.plain(), "durable words");
}

#[tokio::test]
async fn test_debounced_write_lands_and_reloads() {
    let dir = tempdir().unwrap();
    let store = Arc::new(open_store(dir.path()));
    let file_id = seed_chain(&store);

    {
        let mut session = open_session(store.clone(), file_id);
        session.edit(&Delta::new().insert("hello")).await.unwrap();
        session
            .edit(&Delta::new().retain(5).insert(" world"))
            .await
            .unwrap();
        tokio::time::sleep(QUIET * 6).await;
        assert!(session.is_synced());
    }

    // A fresh session sees the persisted content.
    let session = open_session(store, file_id);
    assert_eq!(session.plain_text(), "hello world");
}
