
use crate::bus::{EventBus, EventSender};
use crate::config::{Config, get_config_path, load_config};
use crate::gateway::{self, GatewayState};
use crate::lifecycle::LifecycleBroadcaster;
use crate::media::MediaCache;
use crate::pipeline::dispatch::WebhookDispatcher;
use crate::pipeline::{Pipeline, run_event_loop};
use crate::session::SessionClient;
use crate::session::replay::ReplaySession;
use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::io::BufReader;
use tracing::{error, info, warn};

/// Reads events from stdin instead of a file.
const STDIN_SOURCE: &str = "-";

const STATUS_PROBE_TIMEOUT: Duration = Duration::from_secs(3);

#[derive(Parser)]
#[command(name = "wabridge")]
#[command(about = "Forward messaging-session events to an automation webhook")]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the bridge (event loop, media cache and HTTP gateway)
    Serve {
        /// Config file (defaults to ~/.wabridge/config.json)
        #[arg(long, short = 'c')]
        config: Option<PathBuf>,
        /// JSON-lines session event stream to replay; `-` reads stdin
        #[arg(long, short = 'e')]
        events: Option<String>,
    },
    /// Show effective configuration and whether a running bridge is connected
    Status {
        #[arg(long, short = 'c')]
        config: Option<PathBuf>,
    },
    /// Run one media cache sweep and exit
    Sweep {
        #[arg(long, short = 'c')]
        config: Option<PathBuf>,
    },
}

pub async fn run() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Serve { config, events } => {
            serve(config.as_deref(), events).await?;
        }
        Commands::Status { config } => {
            status_command(config.as_deref()).await?;
        }
        Commands::Sweep { config } => {
            sweep_command(config.as_deref()).await?;
        }
    }

    Ok(())
}

async fn serve(config_path: Option<&Path>, events: Option<String>) -> Result<()> {
    info!("Loading configuration...");
    let config = load_config(config_path)?;
    config.validate_for_serve()?;
    info!("Configuration loaded. Webhook: {}", config.webhook.url);

    let media = Arc::new(MediaCache::from_config(&config)?);
    info!(
        "media cache at {} (retention {}s)",
        media.dir().display(),
        config.media.retention_secs
    );
    let sweeper = media.clone().spawn_sweeper(config.media.sweep_interval());

    let session = Arc::new(ReplaySession::new());
    let mut bus = EventBus::new(config.session.event_capacity);
    let rx = bus
        .take_rx()
        .context("session event receiver already taken")?;

    let broadcaster = Arc::new(
        LifecycleBroadcaster::new(session.clone(), config.session.reconnect.clone())
            .with_terminal_qr(config.session.print_qr),
    );
    let dispatcher = WebhookDispatcher::new(
        config.webhook.url.trim(),
        config.webhook.timeout(),
        session.clone(),
    );
    let pipeline = Arc::new(Pipeline::new(
        session.clone(),
        media.clone(),
        dispatcher,
        Duration::from_secs(config.contacts.cache_ttl_secs),
    ));

    let gateway_task = gateway::start(
        &config.gateway.host,
        config.gateway.port,
        GatewayState {
            broadcaster: broadcaster.clone(),
            media,
        },
    )
    .await?;
    let event_loop = tokio::spawn(run_event_loop(rx, pipeline, broadcaster));

    session
        .initialize()
        .await
        .context("failed to initialize session")?;

    let feed_task = match events {
        Some(source) => {
            let sender = bus.sender();
            let session = session.clone();
            Some(tokio::spawn(async move {
                if let Err(e) = feed_events(&session, &source, &sender).await {
                    error!("event stream {} failed: {:#}", source, e);
                }
            }))
        }
        None => {
            warn!("no event source given (--events); waiting for session events");
            None
        }
    };

    println!("Starting wabridge...");
    println!(
        "Gateway listening on {}:{}, media served from {}",
        config.gateway.host,
        config.gateway.port,
        config.gateway.public_base_url()
    );

    tokio::select! {
        _ = tokio::signal::ctrl_c() => {
            println!("\nShutting down...");
        }
        _ = event_loop => {}
        _ = gateway_task => {}
    }

    sweeper.abort();
    if let Some(task) = feed_task {
        task.abort();
    }
    Ok(())
}

async fn feed_events(session: &ReplaySession, source: &str, sender: &EventSender) -> Result<()> {
    let stats = if source == STDIN_SOURCE {
        session
            .replay(BufReader::new(tokio::io::stdin()), sender)
            .await?
    } else {
        let file = tokio::fs::File::open(source)
            .await
            .with_context(|| format!("failed to open event stream {}", source))?;
        session.replay(BufReader::new(file), sender).await?
    };
    info!(
        "replayed {} events from {} ({} skipped)",
        stats.published, source, stats.skipped
    );
    Ok(())
}

async fn status_command(config_path: Option<&Path>) -> Result<()> {
    let config = load_config(config_path)?;
    let config_file = match config_path {
        Some(p) => p.to_path_buf(),
        None => get_config_path()?,
    };

    println!("wabridge status");
    println!(
        "  Config: {} {}",
        config_file.display(),
        if config_file.exists() { "\u{2713}" } else { "(defaults)" }
    );
    for line in status_lines(&config) {
        println!("  {}", line);
    }

    let probe_url = format!("{}/status", config.gateway.public_base_url());
    match probe_connection(&probe_url).await {
        Ok(true) => println!("  Session: connected"),
        Ok(false) => println!("  Session: not connected"),
        Err(e) => println!("  Session: bridge not reachable ({})", e),
    }
    Ok(())
}

/// Human-readable summary of the effective configuration.
pub(crate) fn status_lines(config: &Config) -> Vec<String> {
    let webhook = if config.webhook.url.trim().is_empty() {
        "not set".to_string()
    } else {
        config.webhook.url.trim().to_string()
    };
    let media_dir = config
        .media
        .resolve_dir()
        .map_or_else(|e| format!("unresolved ({})", e), |d| d.display().to_string());
    let reconnect = &config.session.reconnect;

    vec![
        format!(
            "Webhook: {} (timeout {}s)",
            webhook, config.webhook.timeout_secs
        ),
        format!(
            "Gateway: {}:{} (public {})",
            config.gateway.host,
            config.gateway.port,
            config.gateway.public_base_url()
        ),
        format!(
            "Media: {} (retention {}s, sweep every {}s)",
            media_dir, config.media.retention_secs, config.media.sweep_interval_secs
        ),
        format!("Contacts cache TTL: {}s", config.contacts.cache_ttl_secs),
        format!(
            "Reconnect: up to {} attempts, {}s..{}s backoff",
            reconnect.max_attempts, reconnect.base_delay_secs, reconnect.max_delay_secs
        ),
    ]
}

async fn probe_connection(url: &str) -> Result<bool> {
    let client = crate::utils::http::webhook_http_client(STATUS_PROBE_TIMEOUT);
    let body: serde_json::Value = client
        .get(url)
        .send()
        .await?
        .error_for_status()?
        .json()
        .await?;
    Ok(body["isConnected"].as_bool().unwrap_or(false))
}

async fn sweep_command(config_path: Option<&Path>) -> Result<()> {
    let config = load_config(config_path)?;
    let media = MediaCache::from_config(&config)?;
    let report = media.sweep().await;
    println!(
        "Swept {}: {} scanned, {} removed, {} failed",
        media.dir().display(),
        report.scanned,
        report.removed,
        report.failed
    );
    Ok(())
}
