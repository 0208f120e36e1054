use std::process::ExitCode;
use std::sync::Arc;

use anyhow::Context;
use tokio::sync::watch;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use mediashelf_worker::models::{JobStatus, ProgressState, TaskKind};
use mediashelf_worker::store::PgMediaStore;
use mediashelf_worker::{AppState, Config};

/// What the command line asked for
#[derive(Debug, PartialEq)]
enum Command {
    Help,
    Scan { path: Option<String> },
    Tasks(TaskKind),
}

#[tokio::main]
async fn main() -> anyhow::Result<ExitCode> {
    // Load environment variables
    dotenvy::dotenv().ok();

    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "mediashelf_worker=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let args: Vec<String> = std::env::args().skip(1).collect();
    let command = match parse_args(&args) {
        Ok(Command::Help) => {
            print_help();
            return Ok(ExitCode::SUCCESS);
        }
        Ok(command) => command,
        Err(message) => {
            eprintln!("error: {message}");
            print_help();
            return Ok(ExitCode::from(2));
        }
    };

    tracing::info!("Starting mediashelf worker");

    let config = Config::from_env()?;
    tracing::info!(
        environment = ?config.environment(),
        media_root = %config.media_root().display(),
        "Configuration loaded"
    );
    let store = PgMediaStore::connect(config.database())
        .await
        .context("Failed to connect to database")?;
    store
        .ensure_schema()
        .await
        .context("Failed to prepare database schema")?;

    let state = AppState::with_probe_extractor(config, Arc::new(store))
        .context("Failed to initialise worker")?;
    if !state.runner.check_available().await {
        tracing::warn!("ffmpeg/ffprobe not available, transcoding and probing will fail");
    }

    let final_state = match command {
        Command::Scan { path } => {
            let manager = state.scan_manager();
            manager.start(path.as_deref())?;
            follow(manager.subscribe(), || manager.cancel()).await
        }
        Command::Tasks(kind) => {
            let manager = state.task_manager();
            manager.start(kind)?;
            follow(manager.subscribe(), || manager.cancel()).await
        }
        Command::Help => return Ok(ExitCode::SUCCESS),
    };

    tracing::info!(
        status = %final_state.status,
        processed = final_state.processed,
        total = final_state.total,
        "{}",
        final_state.message
    );

    Ok(match final_state.status {
        JobStatus::Completed => ExitCode::SUCCESS,
        JobStatus::Canceled => ExitCode::from(130),
        _ => ExitCode::from(1),
    })
}

/// Log progress until the run settles; the first Ctrl-C requests cancellation
async fn follow(mut rx: watch::Receiver<ProgressState>, cancel: impl Fn()) -> ProgressState {
    let mut last_percentage = None;
    let mut cancel_sent = false;
    let interrupt = tokio::signal::ctrl_c();
    tokio::pin!(interrupt);

    loop {
        let state = rx.borrow_and_update().clone();
        if state.status.is_terminal() {
            return state;
        }
        if last_percentage != Some(state.percentage) {
            last_percentage = Some(state.percentage);
            tracing::info!(
                percentage = state.percentage,
                processed = state.processed,
                total = state.total,
                current = %state.current,
                "Progress"
            );
        }

        tokio::select! {
            changed = rx.changed() => {
                if changed.is_err() {
                    return rx.borrow().clone();
                }
            }
            _ = &mut interrupt, if !cancel_sent => {
                tracing::warn!("Interrupt received, cancelling");
                cancel();
                cancel_sent = true;
            }
        }
    }
}

fn parse_args(args: &[String]) -> Result<Command, String> {
    let mut args = args.iter();
    let Some(cmd) = args.next() else {
        return Ok(Command::Help);
    };

    match cmd.as_str() {
        "--help" | "-h" | "help" => Ok(Command::Help),
        "scan" => {
            let mut path = None;
            while let Some(arg) = args.next() {
                match arg.as_str() {
                    "--path" => {
                        path = Some(
                            args.next()
                                .cloned()
                                .ok_or_else(|| "missing value for --path".to_string())?,
                        )
                    }
                    _ => return Err(format!("unknown arg: {arg}")),
                }
            }
            Ok(Command::Scan { path })
        }
        "tasks" => {
            let kind = match args.next().map(String::as_str) {
                Some("move") => TaskKind::Move,
                Some("delete") => TaskKind::Delete,
                Some("transcode") => TaskKind::Transcode,
                Some("thumbnail") => TaskKind::Thumbnail,
                Some("normalize") => TaskKind::NormalizeVideo,
                Some(other) => return Err(format!("unknown task kind: {other}")),
                None => return Err("missing task kind".to_string()),
            };
            if let Some(extra) = args.next() {
                return Err(format!("unknown arg: {extra}"));
            }
            Ok(Command::Tasks(kind))
        }
        _ => Err(format!("unknown command: {cmd}")),
    }
}

fn print_help() {
    println!(
        r#"mediashelf-worker

USAGE:
  mediashelf-worker scan [--path <dir relative to MEDIA_ROOT>]
  mediashelf-worker tasks <move|delete|transcode|thumbnail|normalize>

Ctrl-C cancels the running job. Exit status: 0 completed, 1 failed,
130 canceled, 2 usage error."#
    );
}
