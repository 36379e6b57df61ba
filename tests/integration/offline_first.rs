// Test-specific lint overrides: integration tests use unwrap/expect freely,
// and some pedantic/nursery lints are not appropriate for test code.
#![allow(
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::needless_continue,
    clippy::match_same_arms,
    clippy::doc_markdown,
    clippy::missing_panics_doc,
    clippy::missing_docs_in_private_items
)]

//! Integration tests for offline operation.
//!
//! The gateway is unreachable throughout; every mutation must still apply
//! locally, persist to the durable mirror, and survive an engine restart.
//! Storage failure must degrade to memory-only operation rather than
//! blocking commands.

use std::time::Duration;

use tasksync::dispatch::AddIntent;
use tasksync::engine::{self, Command, EngineConfig, EngineEvent};
use tasksync::store::file::JsonFileStore;
use tasksync_proto::task::{TaskRecord, TaskStatus};
use tokio::sync::mpsc;

/// A gateway URL nothing listens on.
const DEAD_GATEWAY: &str = "ws://127.0.0.1:1/ws";

fn offline_config() -> EngineConfig {
    EngineConfig {
        gateway_url: DEAD_GATEWAY.to_string(),
        connect_timeout: Duration::from_secs(2),
        reconnect_delay: Duration::from_millis(200),
        channel_capacity: 64,
    }
}

async fn next_event(rx: &mut mpsc::Receiver<EngineEvent>) -> EngineEvent {
    tokio::time::timeout(Duration::from_secs(5), rx.recv())
        .await
        .expect("timed out waiting for engine event")
        .expect("engine event channel closed")
}

/// Waits for the next `TasksChanged` snapshot satisfying `pred`.
async fn wait_for_tasks(
    rx: &mut mpsc::Receiver<EngineEvent>,
    pred: impl Fn(&[TaskRecord]) -> bool,
) -> Vec<TaskRecord> {
    loop {
        if let EngineEvent::TasksChanged(tasks) = next_event(rx).await
            && pred(&tasks)
        {
            return tasks;
        }
    }
}

#[tokio::test]
async fn mutations_survive_engine_restart() {
    let dir = tempfile::tempdir().unwrap();
    let store = JsonFileStore::new(dir.path());

    // First engine lifetime: log in, create, complete one.
    let (cmd_tx, mut evt_rx) = engine::spawn_engine(offline_config(), store).await;
    cmd_tx
        .send(Command::Login {
            name: "alice".to_string(),
        })
        .await
        .unwrap();
    cmd_tx
        .send(Command::Add(AddIntent::titled("buy milk")))
        .await
        .unwrap();
    cmd_tx
        .send(Command::Add(AddIntent::titled("water plants")))
        .await
        .unwrap();
    let tasks = wait_for_tasks(&mut evt_rx, |t| t.len() == 2).await;
    // Newest first.
    assert_eq!(tasks[0].title, "water plants");
    assert_eq!(tasks[1].title, "buy milk");

    cmd_tx.send(Command::Toggle(tasks[1].id.clone())).await.unwrap();
    wait_for_tasks(&mut evt_rx, |t| t[1].status == TaskStatus::Completed).await;

    cmd_tx.send(Command::Shutdown).await.unwrap();

    // Second engine lifetime over the same directory: the old identity is
    // suggested, and an explicit login brings the cached tasks back.
    let store = JsonFileStore::new(dir.path());
    let (cmd_tx, mut evt_rx) = engine::spawn_engine(offline_config(), store).await;
    match next_event(&mut evt_rx).await {
        EngineEvent::IdentitySuggested { name } => assert_eq!(name, "alice"),
        other => panic!("expected IdentitySuggested, got {other:?}"),
    }
    cmd_tx
        .send(Command::Login {
            name: "alice".to_string(),
        })
        .await
        .unwrap();
    let tasks = wait_for_tasks(&mut evt_rx, |t| t.len() == 2).await;
    assert_eq!(tasks[0].title, "water plants");
    assert_eq!(tasks[1].status, TaskStatus::Completed);
}

#[tokio::test]
async fn remove_persists_across_restart() {
    let dir = tempfile::tempdir().unwrap();
    let store = JsonFileStore::new(dir.path());

    let (cmd_tx, mut evt_rx) = engine::spawn_engine(offline_config(), store).await;
    cmd_tx
        .send(Command::Login {
            name: "alice".to_string(),
        })
        .await
        .unwrap();
    cmd_tx
        .send(Command::Add(AddIntent::titled("short lived")))
        .await
        .unwrap();
    let tasks = wait_for_tasks(&mut evt_rx, |t| t.len() == 1).await;
    cmd_tx.send(Command::Remove(tasks[0].id.clone())).await.unwrap();
    wait_for_tasks(&mut evt_rx, <[TaskRecord]>::is_empty).await;
    cmd_tx.send(Command::Shutdown).await.unwrap();

    let store = JsonFileStore::new(dir.path());
    let (cmd_tx, mut evt_rx) = engine::spawn_engine(offline_config(), store).await;
    match next_event(&mut evt_rx).await {
        EngineEvent::IdentitySuggested { name } => assert_eq!(name, "alice"),
        other => panic!("expected IdentitySuggested, got {other:?}"),
    }
    cmd_tx
        .send(Command::Login {
            name: "alice".to_string(),
        })
        .await
        .unwrap();
    let tasks = wait_for_tasks(&mut evt_rx, |_| true).await;
    assert!(tasks.is_empty());
}

#[tokio::test]
async fn logout_keeps_cache_but_forgets_identity() {
    let dir = tempfile::tempdir().unwrap();
    let store = JsonFileStore::new(dir.path());

    let (cmd_tx, mut evt_rx) = engine::spawn_engine(offline_config(), store).await;
    cmd_tx
        .send(Command::Login {
            name: "alice".to_string(),
        })
        .await
        .unwrap();
    cmd_tx
        .send(Command::Add(AddIntent::titled("still here later")))
        .await
        .unwrap();
    wait_for_tasks(&mut evt_rx, |t| t.len() == 1).await;
    cmd_tx.send(Command::Logout).await.unwrap();
    loop {
        if matches!(next_event(&mut evt_rx).await, EngineEvent::SessionEnded) {
            break;
        }
    }
    cmd_tx.send(Command::Shutdown).await.unwrap();

    // Restart: no auto-login, but the cache resurfaces on the next login.
    let store = JsonFileStore::new(dir.path());
    let (cmd_tx, mut evt_rx) = engine::spawn_engine(offline_config(), store).await;
    cmd_tx
        .send(Command::Login {
            name: "bob".to_string(),
        })
        .await
        .unwrap();
    match next_event(&mut evt_rx).await {
        EngineEvent::SessionStarted { name } => assert_eq!(name, "bob"),
        other => panic!("expected SessionStarted, got {other:?}"),
    }
    let tasks = wait_for_tasks(&mut evt_rx, |_| true).await;
    assert_eq!(tasks.len(), 1);
    assert_eq!(tasks[0].title, "still here later");
}

#[tokio::test]
async fn unwritable_storage_degrades_to_memory_only() {
    // A regular file where a directory is needed makes initialization
    // fail regardless of the user the tests run as.
    let dir = tempfile::tempdir().unwrap();
    let blocked = dir.path().join("blocked");
    std::fs::write(&blocked, b"not a directory").unwrap();

    let store = JsonFileStore::new(blocked.join("data"));
    let (cmd_tx, mut evt_rx) = engine::spawn_engine(offline_config(), store).await;

    match next_event(&mut evt_rx).await {
        EngineEvent::StorageUnavailable { .. } => {}
        other => panic!("expected StorageUnavailable, got {other:?}"),
    }

    // Commands still work in memory.
    cmd_tx
        .send(Command::Login {
            name: "alice".to_string(),
        })
        .await
        .unwrap();
    cmd_tx
        .send(Command::Add(AddIntent::titled("memory only")))
        .await
        .unwrap();
    let tasks = wait_for_tasks(&mut evt_rx, |t| t.len() == 1).await;
    assert_eq!(tasks[0].title, "memory only");
}
