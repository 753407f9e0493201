mod api;
mod app;
mod command;
mod event;
mod router;
mod task;
mod tui;
mod views;
mod widgets;

use std::path::PathBuf;

use anyhow::{bail, Result};
use clap::Parser;
use tokio::sync::mpsc;
use tracing::{info, warn};

use geosolve_transport::{ConnectionConfig, ConnectionManager, SocketIoConnector};

use api::TaskClient;
use app::{App, RunOutcome};
use event::EventHandler;
use task::TaskTracker;
use widgets::results::geogebra_url;

#[derive(Parser)]
#[command(name = "geosolve", about = "Terminal client for the geometry solving pipeline")]
struct Cli {
    #[arg(short, long, help = "Solver base URL (default: from config, http://localhost:8000)")]
    server: Option<String>,

    #[arg(long, help = "Path to config file (default: ~/.config/geosolve/config.toml)")]
    config: Option<PathBuf>,

    #[arg(long)]
    tick_rate: Option<u64>,

    #[arg(short, long, help = "Problem statement to submit on startup")]
    problem: Option<String>,

    #[arg(long, requires = "problem", help = "Run without the TUI and print the result")]
    headless: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Daily rolling logs to ~/.geosolve/logs/, the TUI owns stdout
    let log_dir = geosolve_core::config::log_dir();
    std::fs::create_dir_all(&log_dir)?;
    let file_appender = tracing_appender::rolling::daily(&log_dir, "client.log");
    let (non_blocking, _guard) = tracing_appender::non_blocking(file_appender);
    let filter = tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        tracing_subscriber::EnvFilter::new(
            "geosolve=debug,geosolve_core=debug,geosolve_transport=debug",
        )
    });
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(non_blocking)
        .with_ansi(false)
        .init();

    let cli = Cli::parse();

    // Load config: --config flag > default platform path
    let config = match &cli.config {
        Some(path) => geosolve_core::config::load_config(path),
        None => geosolve_core::config::load_or_create_config(),
    };
    let config_path = cli
        .config
        .clone()
        .unwrap_or_else(geosolve_core::config::config_path);
    info!("Config: {}", config_path.display());

    // CLI flags override config values
    let server_url = cli.server.clone().unwrap_or_else(|| config.server.url.clone());
    let tick_rate = cli.tick_rate.unwrap_or(config.ui.tick_rate_ms);

    info!("Starting geosolve client, server={}", server_url);

    // Realtime channel
    let conn_config = ConnectionConfig::from_settings(server_url.clone(), &config.connection);
    let connector = SocketIoConnector::new(&conn_config)?;
    info!("Realtime endpoint: {}", connector.endpoint());
    let (conn_tx, conn_rx) = mpsc::unbounded_channel();
    let connection = ConnectionManager::new(conn_config, connector).spawn(conn_tx);

    let mut events = EventHandler::new(tick_rate, conn_rx, !cli.headless);

    let tracker = TaskTracker::shared();
    let mut app = App::new(app::AppInit {
        client: TaskClient::new(&server_url, tracker),
        event_tx: events.inject_tx.clone(),
        flow_log_capacity: config.ui.flow_log_capacity,
    });

    if let Some(problem) = cli.problem.clone() {
        app.submit(problem);
    }

    let result = if cli.headless {
        run_headless(&mut app, &mut events).await
    } else {
        run_tui(&mut app, &mut events).await
    };

    info!("Realtime channel {} at exit", connection.state());
    connection.disconnect();
    info!("Client shutdown complete");
    result
}

async fn run_tui(app: &mut App, events: &mut EventHandler) -> Result<()> {
    let mut terminal = tui::init()?;

    // Main loop
    loop {
        terminal.draw(|frame| app.render(frame))?;

        if let Some(event) = events.next().await {
            app.update(event);
        }

        if app.should_quit {
            break;
        }
    }

    tui::restore()?;
    Ok(())
}

async fn run_headless(app: &mut App, events: &mut EventHandler) -> Result<()> {
    let outcome = loop {
        match events.next().await {
            Some(event) => app.update(event),
            None => bail!("event loop ended before the task finished"),
        }
        if let Some(outcome) = app.outcome() {
            break outcome;
        }
    };

    match outcome {
        RunOutcome::Completed => {
            let commands = app.workspace.results.commands();
            if commands.is_empty() {
                warn!("Task completed without usable commands");
                println!("No valid GeoGebra commands.");
            } else {
                println!("GeoGebra commands:");
                for (i, cmd) in commands.iter().enumerate() {
                    println!("{:>3}. {}", i + 1, cmd);
                }
                println!();
                println!("Open: {}", geogebra_url(commands));
            }
            if let Some(explanation) = app.workspace.results.explanation() {
                println!();
                println!("{}", explanation);
            }
            Ok(())
        }
        RunOutcome::Failed(message) => bail!(message),
    }
}
