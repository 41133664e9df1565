use std::io::IsTerminal;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{CommandFactory, Parser};
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

use adam::args::{Args, Commands};
use adam::config::DownloadConfig;
use adam::coordinator::{self, DownloadOutcome};
use adam::events::EventBus;
use adam::library::{self, LsScope};
use adam::pause::PauseGate;
use adam::progress::ProgressBus;
use adam::state::DownloadState;
use adam::store::Library;
use adam::ui::{self, Dashboard, QuitMode};
use adam::util::{filename_from_url, truncate_str};

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();
    let config = DownloadConfig::default();
    let library = Library::default_location();

    match args.command {
        Some(Commands::Ls { ongoing, complete }) => {
            let scope = match (ongoing, complete) {
                (true, false) => LsScope::Ongoing,
                (false, true) => LsScope::Complete,
                _ => LsScope::Both,
            };
            let sessions = library::collect_sessions(&library, scope).await?;
            if sessions.is_empty() {
                println!("No sessions found.");
            } else {
                print!("{}", library::render_sessions(&sessions));
            }
        }
        Some(Commands::Update { filename, new_url }) => {
            let old = library::update_session_url(&library, &filename, &new_url)
                .await
                .with_context(|| format!("could not update session '{filename}'"))?;
            println!("Updated URL for {filename}");
            println!("OLD: {}", truncate_str(&old, 50));
            println!("NEW: {}", truncate_str(&new_url, 50));
            println!("Run 'adam resume {filename}' to continue.");
        }
        Some(Commands::Resume { filename }) => {
            let state = library
                .load(&filename)
                .await
                .with_context(|| format!("no session found for '{filename}'"))?;
            println!("Resuming download: {filename}");
            run_transfer(&config, &library, state).await?;
        }
        None => match args.url {
            Some(url) => {
                let filename = args.output.unwrap_or_else(|| filename_from_url(&url));
                let client = coordinator::build_client()?;
                let state = coordinator::create_session(
                    &client,
                    &config,
                    &library,
                    Path::new("."),
                    url,
                    filename,
                )
                .await
                .context("could not start download")?;
                run_transfer(&config, &library, state).await?;
            }
            None => {
                Args::command().print_help()?;
            }
        },
    }

    Ok(())
}

/// Launch the engine plus a frontend and reconcile how they ended.
async fn run_transfer(
    config: &DownloadConfig,
    library: &Library,
    state: DownloadState,
) -> Result<()> {
    let work_dir = PathBuf::from(".");
    let filename = state.filename.clone();
    let total_size = state.total_size;
    let num_parts = state.parts.len();

    let client = coordinator::build_client()?;
    let progress = Arc::new(ProgressBus::new());
    let events = EventBus::default();
    let pause = Arc::new(PauseGate::new());
    let cancel = CancellationToken::new();

    // Subscribe before the engine starts so no event is missed.
    let ui_events = events.subscribe();

    let engine = {
        let config = *config;
        let library = library.clone();
        let work_dir = work_dir.clone();
        let progress = progress.clone();
        let events = events.clone();
        let pause = pause.clone();
        let cancel = cancel.clone();
        tokio::spawn(async move {
            coordinator::run_download(
                &config, state, &library, &work_dir, client, progress, events, pause, cancel,
            )
            .await
        })
    };

    let quit_mode = if std::io::stdout().is_terminal() {
        let dashboard = Dashboard {
            filename: filename.clone(),
            total_size,
            progress,
            events: ui_events,
            pause,
            cancel: cancel.clone(),
        };
        tokio::task::spawn_blocking(move || dashboard.run()).await??
    } else {
        ui::run_headless(ui_events, cancel.clone()).await
    };

    match engine.await? {
        Ok(DownloadOutcome::Completed) => {
            println!("Downloaded {filename}");
            Ok(())
        }
        Ok(DownloadOutcome::CancelledByUser) => {
            if quit_mode == QuitMode::Save {
                println!("Session saved. Run 'adam resume {filename}' to continue.");
            } else {
                library.cleanup(&work_dir, &filename, num_parts).await;
                println!("Download cancelled.");
            }
            Ok(())
        }
        Err(err) => Err(anyhow::Error::new(err).context(format!("download failed for {filename}"))),
    }
}
