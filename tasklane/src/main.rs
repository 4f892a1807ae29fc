//! `tasklane`: offline-first personal task manager.
//!
//! Every invocation loads the local state, applies the command, replays
//! queued changes if the server is reachable, and prints the result.
//! Configuration via CLI flags, environment variables, or config file
//! (`~/.config/tasklane/config.toml`).
//!
//! ```bash
//! tasklane add "Buy milk" --due +1d --priority high
//! tasklane list
//! tasklane done 0190a1
//! tasklane sync --watch
//! ```

use std::path::Path;
use std::process::ExitCode;
use std::sync::Arc;

use clap::Parser;
use tokio::sync::mpsc;
use tracing_appender::non_blocking::WorkerGuard;

use tasklane::cli::{self, CliError};
use tasklane::config::{CliArgs, ClientConfig, Command};
use tasklane::connectivity::ConnectivityMonitor;
use tasklane::remote::http::HttpRemote;
use tasklane::remote::{RemoteApi, RemoteError};
use tasklane::replica::Replica;
use tasklane::service::{ServiceError, TaskService};
use tasklane::storage::{FileStore, StoreError};
use tasklane::sync::runner::{self, SyncTrigger};
use tasklane::sync::{SyncEngine, SyncEvent};
use tasklane_proto::task::{NewTask, TaskId, TaskPatch, TaskStatus, Timestamp};

type Engine = SyncEngine<FileStore, Arc<HttpRemote>>;

/// Top-level failure of a command.
#[derive(Debug, thiserror::Error)]
enum AppError {
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error(transparent)]
    Service(#[from] ServiceError),
    #[error(transparent)]
    Cli(#[from] CliError),
    #[error(transparent)]
    Remote(#[from] RemoteError),
    #[error("failed to wait for interrupt: {0}")]
    Signal(#[from] std::io::Error),
}

#[tokio::main]
async fn main() -> ExitCode {
    let args = CliArgs::parse();

    let config = match ClientConfig::load(&args) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Warning: failed to load config file: {e}");
            ClientConfig::default()
        }
    };

    // Logs go to a file; stdout carries command output.
    let _log_guard = init_logging(&args.log_level, args.log_file.as_deref());
    tracing::info!(data_dir = %config.data_dir.display(), server = %config.base_url, "tasklane starting");

    match run(args, config).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!(error = %e, "command failed");
            eprintln!("error: {e}");
            ExitCode::FAILURE
        }
    }
}

/// Initialize file-based logging.
///
/// Returns a [`WorkerGuard`] that must be held until shutdown to ensure all
/// buffered log entries are flushed.
fn init_logging(level: &str, file_path: Option<&Path>) -> Option<WorkerGuard> {
    let default_path = std::env::temp_dir().join("tasklane.log");
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

async fn run(args: CliArgs, config: ClientConfig) -> Result<(), AppError> {
    let replica = Replica::load(FileStore::new(&config.data_dir))
        .await?
        .shared();
    let remote = Arc::new(HttpRemote::new(&config.base_url, config.request_timeout)?);
    let (engine, events) = SyncEngine::new(
        Arc::clone(&replica),
        Arc::clone(&remote),
        config.sync.clone(),
    );
    let engine = Arc::new(engine);
    let service = TaskService::new(replica);
    let view = command_view(args.command.as_ref());
    let command = args.command.unwrap_or(Command::List { all: false });
    let now = Timestamp::now();

    match command {
        Command::Sync { watch: true } => {
            return watch(engine, remote, &config, events).await;
        }
        Command::Sync { watch: false } => {}
        Command::Add {
            title,
            due,
            priority,
            description,
            category,
        } => {
            let mut new = NewTask::new(title, cli::parse_due(&due, now)?)
                .with_priority(cli::parse_priority(&priority)?);
            if let Some(description) = description {
                new = new.with_description(description);
            }
            if let Some(category) = category {
                new = new.with_category(category);
            }
            let task = service.create_task(new).await?;
            println!("added {}  {}", cli::short_id(&task.id), task.title);
        }
        Command::Done { id } => {
            let id = resolve(&service, &id).await?;
            let task = service.complete_task(&id).await?;
            println!("completed {}  {}", cli::short_id(&task.id), task.title);
        }
        Command::Reopen { id } => {
            let id = resolve(&service, &id).await?;
            let task = service.reopen_task(&id).await?;
            println!("reopened {}  {}", cli::short_id(&task.id), task.title);
        }
        Command::Edit {
            id,
            title,
            description,
            priority,
            status,
            category,
            due,
        } => {
            let id = resolve(&service, &id).await?;
            let patch = TaskPatch {
                title,
                description,
                priority: priority.as_deref().map(cli::parse_priority).transpose()?,
                status: status.as_deref().map(cli::parse_status).transpose()?,
                category,
                due_date: due.as_deref().map(|d| cli::parse_due(d, now)).transpose()?,
            };
            let task = service.update_task(&id, patch).await?;
            println!("updated {}  {}", cli::short_id(&task.id), task.title);
        }
        Command::Rm { id } => {
            let id = resolve(&service, &id).await?;
            service.delete_task(&id).await?;
            println!("deleted {}", cli::short_id(&id));
        }
        Command::List { .. } | Command::Stats => {}
    }

    if args.offline {
        tracing::debug!("offline flag set, not syncing");
    } else {
        sync_once(&engine, events).await;
    }

    let queued = service.queued_operations().await;
    match view {
        View::List { all } => print_list(&service, all).await,
        View::Stats => println!("{}", cli::format_stats(&service.stats(Timestamp::now()).await)),
        View::None => {}
    }
    if queued > 0 {
        println!("{queued} change(s) waiting to sync");
    }
    Ok(())
}

enum View {
    List { all: bool },
    Stats,
    None,
}

fn command_view(command: Option<&Command>) -> View {
    match command {
        None => View::List { all: false },
        Some(Command::List { all }) => View::List { all: *all },
        Some(Command::Stats) => View::Stats,
        Some(_) => View::None,
    }
}

async fn resolve(service: &TaskService<FileStore>, input: &str) -> Result<TaskId, CliError> {
    let tasks = service.ranked_tasks(Timestamp::now()).await;
    cli::resolve_id(&tasks, input)
}

async fn print_list(service: &TaskService<FileStore>, all: bool) {
    let now = Timestamp::now();
    let tasks = service.ranked_tasks(now).await;
    let mut shown = 0;
    for task in tasks.iter().filter(|t| all || t.status != TaskStatus::Completed) {
        let unsynced = service.is_pending(&task.id).await;
        println!("{}", cli::format_task(task, unsynced, now));
        shown += 1;
    }
    if shown == 0 {
        println!("no tasks");
    }
}

/// Runs one drain if the server answers its health check.
async fn sync_once(engine: &Engine, mut events: mpsc::Receiver<SyncEvent>) {
    if !engine.remote().health().await {
        tracing::info!("server unreachable, changes stay queued");
        println!("offline: changes are kept locally");
        return;
    }
    engine.set_connectivity(true);
    if let Some(report) = engine.drain().await
        && report.attempted > 0
    {
        println!("{}", cli::format_report(&report));
    }
    while let Ok(event) = events.try_recv() {
        if let SyncEvent::OperationRejected {
            kind,
            task_id,
            message,
            ..
        } = event
        {
            eprintln!("server rejected {kind} of {task_id}: {message}");
        }
    }
}

/// Keeps syncing in the background until Ctrl-C.
async fn watch(
    engine: Arc<Engine>,
    remote: Arc<HttpRemote>,
    config: &ClientConfig,
    mut events: mpsc::Receiver<SyncEvent>,
) -> Result<(), AppError> {
    let (connectivity, probe) = ConnectivityMonitor::new(remote, config.probe_interval).spawn();
    let (trigger, requests) = SyncTrigger::channel();
    let handle = runner::spawn(engine, connectivity, trigger, requests);
    println!(
        "syncing every {}s with {} (Ctrl-C to stop)",
        config.sync.interval.as_secs(),
        config.base_url
    );

    let interrupted = loop {
        tokio::select! {
            result = tokio::signal::ctrl_c() => break result,
            Some(event) = events.recv() => print_event(&event),
        }
    };

    handle.shutdown().await;
    probe.abort();
    interrupted?;
    Ok(())
}

fn print_event(event: &SyncEvent) {
    match event {
        SyncEvent::StateChanged(state) => println!("[{state}]"),
        SyncEvent::Reconciled {
            temporary,
            permanent,
        } => println!("{} is now {}", cli::short_id(temporary), cli::short_id(permanent)),
        SyncEvent::OperationRejected {
            kind,
            task_id,
            message,
            ..
        } => eprintln!("server rejected {kind} of {task_id}: {message}"),
        SyncEvent::DrainCompleted(report) if report.attempted > 0 => {
            println!("{}", cli::format_report(report));
        }
        SyncEvent::DrainCompleted(_) => {}
    }
}
