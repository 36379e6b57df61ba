//! `TaskSync` — offline-first task list synchronized over WebSocket.
//!
//! Line-oriented client driving the sync engine from stdin. Configuration
//! via CLI flags, environment variables, or config file
//! (`~/.config/tasksync/config.toml`).
//!
//! ```bash
//! # Start against the default local gateway
//! cargo run --bin tasksync -- --name alice
//!
//! # Point at another gateway
//! cargo run --bin tasksync -- --gateway-url ws://sync.example.com/ws
//! ```
//!
//! Commands once running: `login <name>`, `logout`, `add <title>`,
//! `toggle <id>`, `rm <id>`, `list`, `quit`.

use std::io;
use std::path::Path;

use clap::Parser;
use tokio::io::AsyncBufReadExt;
use tokio::sync::mpsc;
use tracing_appender::non_blocking::WorkerGuard;

use tasksync::config::{CliArgs, ClientConfig};
use tasksync::dispatch::AddIntent;
use tasksync::engine::{self, Command, EngineEvent};
use tasksync::store::file::JsonFileStore;
use tasksync_proto::task::{TaskId, TaskRecord, TaskStatus};

#[tokio::main]
async fn main() -> io::Result<()> {
    let cli = CliArgs::parse();

    // Load and resolve configuration (CLI args > config file > env > defaults).
    let config = match ClientConfig::load(&cli) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Error loading configuration: {e}");
            std::process::exit(1);
        }
    };

    // Logging goes to a file so stdout stays clean for the command loop.
    let _log_guard = init_logging(&cli.log_level, cli.log_file.as_deref());

    tracing::info!("tasksync starting");

    let data_dir = config.resolve_data_dir().map_err(io::Error::other)?;
    let store = JsonFileStore::new(data_dir);
    let (cmd_tx, evt_rx) = engine::spawn_engine(config.to_engine_config(), store).await;

    if let Some(name) = cli.name {
        let _ = cmd_tx.send(Command::Login { name }).await;
    }

    run_repl(cmd_tx, evt_rx).await;

    tracing::info!("tasksync exiting");
    Ok(())
}

/// Initialize file-based logging.
///
/// Returns a [`WorkerGuard`] that must be held until shutdown to ensure all
/// buffered log entries are flushed.
fn init_logging(level: &str, file_path: Option<&Path>) -> Option<WorkerGuard> {
    let default_path = std::env::temp_dir().join("tasksync.log");
    let log_path = file_path.unwrap_or(&default_path);

    let log_dir = log_path.parent()?;
    let file_name = log_path.file_name()?.to_str()?;

    let file_appender = tracing_appender::rolling::never(log_dir, file_name);
    let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);

    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(level));

    tracing_subscriber::fmt()
        .with_writer(non_blocking)
        .with_env_filter(env_filter)
        .with_ansi(false)
        .init();

    Some(guard)
}

/// Reads commands from stdin and prints engine events, line by line.
async fn run_repl(cmd_tx: mpsc::Sender<Command>, mut evt_rx: mpsc::Receiver<EngineEvent>) {
    let mut lines = tokio::io::BufReader::new(tokio::io::stdin()).lines();
    // Last snapshot seen, for `list` output and id-prefix resolution.
    let mut tasks: Vec<TaskRecord> = Vec::new();

    loop {
        tokio::select! {
            line = lines.next_line() => {
                let Ok(Some(line)) = line else {
                    let _ = cmd_tx.send(Command::Shutdown).await;
                    return;
                };
                if !handle_line(line.trim(), &cmd_tx, &tasks).await {
                    let _ = cmd_tx.send(Command::Shutdown).await;
                    return;
                }
            }
            event = evt_rx.recv() => {
                let Some(event) = event else { return };
                print_event(&event, &mut tasks);
            }
        }
    }
}

/// Parses one input line and dispatches it. Returns `false` on `quit`.
async fn handle_line(line: &str, cmd_tx: &mpsc::Sender<Command>, tasks: &[TaskRecord]) -> bool {
    let (verb, rest) = line.split_once(' ').unwrap_or((line, ""));
    let rest = rest.trim();
    match verb {
        "" => {}
        "quit" | "exit" => return false,
        "help" => {
            println!("commands: login <name> | logout | add <title> | toggle <id> | rm <id> | list | quit");
        }
        "login" => {
            let _ = cmd_tx
                .send(Command::Login {
                    name: rest.to_string(),
                })
                .await;
        }
        "logout" => {
            let _ = cmd_tx.send(Command::Logout).await;
        }
        "add" => {
            let _ = cmd_tx.send(Command::Add(AddIntent::titled(rest))).await;
        }
        "toggle" => match resolve_id(tasks, rest) {
            Some(id) => {
                let _ = cmd_tx.send(Command::Toggle(id)).await;
            }
            None => println!("no task matching '{rest}'"),
        },
        "rm" => match resolve_id(tasks, rest) {
            Some(id) => {
                let _ = cmd_tx.send(Command::Remove(id)).await;
            }
            None => println!("no task matching '{rest}'"),
        },
        "list" => print_tasks(tasks),
        other => println!("unknown command '{other}' (try 'help')"),
    }
    true
}

/// Resolves an id or unique id prefix against the current snapshot.
fn resolve_id(tasks: &[TaskRecord], prefix: &str) -> Option<TaskId> {
    if prefix.is_empty() {
        return None;
    }
    let mut matches = tasks.iter().filter(|t| t.id.as_str().starts_with(prefix));
    let first = matches.next()?;
    if matches.next().is_some() {
        println!("'{prefix}' is ambiguous");
        return None;
    }
    Some(first.id.clone())
}

fn print_event(event: &EngineEvent, tasks: &mut Vec<TaskRecord>) {
    match event {
        EngineEvent::TasksChanged(snapshot) => {
            *tasks = snapshot.clone();
            print_tasks(tasks);
        }
        EngineEvent::SessionStarted { name } => println!("logged in as {name}"),
        EngineEvent::IdentitySuggested { name } => {
            println!("previously logged in as {name} (type 'login {name}' to resume)");
        }
        EngineEvent::SessionEnded => println!("logged out"),
        EngineEvent::ConnectionStatus { connected } => {
            if *connected {
                println!("connected to gateway");
            } else {
                println!("offline, changes will sync on reconnect");
            }
        }
        EngineEvent::Rejected { reason } => println!("rejected: {reason}"),
        EngineEvent::ServerError { message } => println!("gateway error: {message}"),
        EngineEvent::StorageUnavailable { reason } => {
            println!("storage unavailable ({reason}), changes will not survive restart");
        }
    }
}

fn print_tasks(tasks: &[TaskRecord]) {
    if tasks.is_empty() {
        println!("(no tasks)");
        return;
    }
    for task in tasks {
        let mark = match task.status {
            TaskStatus::Pending => " ",
            TaskStatus::Completed => "x",
        };
        let short_id = task.id.as_str().get(..8).unwrap_or(task.id.as_str());
        println!("[{mark}] {short_id}  {}  ({})", task.title, task.assignee);
    }
}
