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

//! End-to-end synchronization tests: two engines against one in-process
//! gateway. Covers the full load on connect, event fan-out between
//! clients, echo absorption on the originating client, and the
//! local-wins merge when the gateway already holds tasks.

use std::sync::Arc;
use std::time::Duration;

use tasksync::dispatch::AddIntent;
use tasksync::engine::{self, Command, EngineConfig, EngineEvent};
use tasksync::store::MemoryStore;
use tasksync_gateway::server::{self, GatewayState};
use tasksync_proto::task::{Priority, TaskId, TaskRecord, TaskStatus};
use tokio::sync::mpsc;

async fn start_gateway() -> (String, Arc<GatewayState>) {
    let state = Arc::new(GatewayState::new());
    let (addr, _handle) = server::start_server_with_state("127.0.0.1:0", Arc::clone(&state))
        .await
        .expect("failed to start gateway");
    (format!("ws://{addr}/ws"), state)
}

fn engine_config(url: &str) -> EngineConfig {
    EngineConfig {
        gateway_url: url.to_string(),
        connect_timeout: Duration::from_secs(5),
        reconnect_delay: Duration::from_millis(200),
        channel_capacity: 64,
    }
}

async fn spawn_client(
    url: &str,
    name: &str,
) -> (mpsc::Sender<Command>, mpsc::Receiver<EngineEvent>) {
    let (cmd_tx, mut evt_rx) = engine::spawn_engine(engine_config(url), MemoryStore::new()).await;
    cmd_tx
        .send(Command::Login {
            name: name.to_string(),
        })
        .await
        .unwrap();
    // Wait until the engine reports the link open.
    loop {
        match next_event(&mut evt_rx).await {
            EngineEvent::ConnectionStatus { connected: true } => break,
            _ => continue,
        }
    }
    (cmd_tx, evt_rx)
}

async fn next_event(rx: &mut mpsc::Receiver<EngineEvent>) -> EngineEvent {
    tokio::time::timeout(Duration::from_secs(5), rx.recv())
        .await
        .expect("timed out waiting for engine event")
        .expect("engine event channel closed")
}

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

fn seeded_task(id: &str, title: &str) -> TaskRecord {
    TaskRecord {
        id: TaskId::new(id),
        title: title.to_string(),
        status: TaskStatus::Pending,
        assignee: "bob".to_string(),
        priority: Priority::Medium,
        due_date: None,
        created_by: "bob".to_string(),
        created_at: "2026-08-30T09:00:00Z".to_string(),
    }
}

#[tokio::test]
async fn add_reaches_gateway_and_other_client() {
    let (url, state) = start_gateway().await;
    let (alice_tx, mut alice_rx) = spawn_client(&url, "alice").await;
    let (_bob_tx, mut bob_rx) = spawn_client(&url, "bob").await;

    alice_tx
        .send(Command::Add(AddIntent::titled("buy milk")))
        .await
        .unwrap();

    // Bob sees the task through the broadcast.
    let bob_tasks = wait_for_tasks(&mut bob_rx, |t| t.len() == 1).await;
    assert_eq!(bob_tasks[0].title, "buy milk");
    assert_eq!(bob_tasks[0].created_by, "alice");

    // Alice absorbed her own echo without duplicating.
    let alice_tasks = wait_for_tasks(&mut alice_rx, |t| !t.is_empty()).await;
    assert_eq!(alice_tasks.len(), 1);

    // The gateway holds the authoritative copy.
    assert_eq!(state.tasks().await.len(), 1);
}

#[tokio::test]
async fn toggle_propagates_between_clients() {
    let (url, _state) = start_gateway().await;
    let (alice_tx, mut alice_rx) = spawn_client(&url, "alice").await;
    let (_bob_tx, mut bob_rx) = spawn_client(&url, "bob").await;

    alice_tx
        .send(Command::Add(AddIntent::titled("water plants")))
        .await
        .unwrap();
    let tasks = wait_for_tasks(&mut alice_rx, |t| t.len() == 1).await;
    wait_for_tasks(&mut bob_rx, |t| t.len() == 1).await;

    alice_tx.send(Command::Toggle(tasks[0].id.clone())).await.unwrap();
    let bob_tasks =
        wait_for_tasks(&mut bob_rx, |t| t[0].status == TaskStatus::Completed).await;
    assert_eq!(bob_tasks[0].title, "water plants");
}

#[tokio::test]
async fn delete_propagates_between_clients() {
    let (url, state) = start_gateway().await;
    let (alice_tx, mut alice_rx) = spawn_client(&url, "alice").await;
    let (_bob_tx, mut bob_rx) = spawn_client(&url, "bob").await;

    alice_tx
        .send(Command::Add(AddIntent::titled("to remove")))
        .await
        .unwrap();
    let tasks = wait_for_tasks(&mut alice_rx, |t| t.len() == 1).await;
    wait_for_tasks(&mut bob_rx, |t| t.len() == 1).await;

    alice_tx.send(Command::Remove(tasks[0].id.clone())).await.unwrap();
    wait_for_tasks(&mut bob_rx, <[TaskRecord]>::is_empty).await;
    assert!(state.tasks().await.is_empty());
}

#[tokio::test]
async fn full_load_brings_in_preexisting_tasks() {
    let (url, state) = start_gateway().await;

    // Seed the gateway before any client connects.
    {
        let mut ws = connect_raw(&url).await;
        send_add(&mut ws, seeded_task("t-old", "already there")).await;
    }

    let (_alice_tx, mut alice_rx) = spawn_client(&url, "alice").await;
    let tasks = wait_for_tasks(&mut alice_rx, |t| t.len() == 1).await;
    assert_eq!(tasks[0].title, "already there");
    assert_eq!(state.tasks().await.len(), 1);
}

#[tokio::test]
async fn clients_converge_without_duplicates() {
    let (url, _state) = start_gateway().await;
    let (alice_tx, mut alice_rx) = spawn_client(&url, "alice").await;

    alice_tx
        .send(Command::Add(AddIntent::titled("mine")))
        .await
        .unwrap();
    wait_for_tasks(&mut alice_rx, |t| t.len() == 1).await;

    // A second client joins (full-loading alice's task) and adds its own;
    // both ends must converge on the same two tasks without duplicates.
    let (bob_tx, mut bob_rx) = spawn_client(&url, "bob").await;
    bob_tx
        .send(Command::Add(AddIntent::titled("bob's task")))
        .await
        .unwrap();
    wait_for_tasks(&mut bob_rx, |t| t.len() == 2).await;

    let alice_tasks = wait_for_tasks(&mut alice_rx, |t| t.len() == 2).await;
    let titles: Vec<&str> = alice_tasks.iter().map(|t| t.title.as_str()).collect();
    assert!(titles.contains(&"mine"));
    assert!(titles.contains(&"bob's task"));
}

// Raw WebSocket helpers for seeding the gateway.

type WsClient = tokio_tungstenite::WebSocketStream<
    tokio_tungstenite::MaybeTlsStream<tokio::net::TcpStream>,
>;

async fn connect_raw(url: &str) -> WsClient {
    let (ws, _) = tokio_tungstenite::connect_async(url).await.unwrap();
    ws
}

async fn send_add(ws: &mut WsClient, task: TaskRecord) {
    use futures_util::{SinkExt, StreamExt};
    use tasksync_proto::envelope::{self, ClientMessage};

    let text = envelope::encode_client(&ClientMessage::AddTask { task }).unwrap();
    ws.send(tokio_tungstenite::tungstenite::Message::Text(text.into()))
        .await
        .unwrap();
    // Wait for the echo so the mutation is applied before we return.
    let _echo = ws.next().await.unwrap().unwrap();
}
