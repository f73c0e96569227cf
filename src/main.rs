//! IoT Studio live telemetry CLI
//!
//! - Watch live metrics of a session
//! - List sessions from the REST backend
//! - Generate a default config file

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use clap::{Parser, Subcommand};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use iotstudio_live::api::RestClient;
use iotstudio_live::config::{generate_default_config, Config, LoggingConfig};
use iotstudio_live::pipeline::{Pipeline, PipelineHandle};
use iotstudio_live::store::TelemetryStore;
use iotstudio_live::transport::WsConnector;

#[derive(Parser)]
#[command(name = "iotstudio-live")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Live telemetry client for IoT Studio")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Config file (default: search the usual locations)
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Stream a session and print its live metrics
    Watch {
        /// Session to subscribe to
        session: Option<String>,
        /// Telemetry socket URL (overrides config)
        #[arg(long)]
        url: Option<String>,
        /// Print interval in milliseconds
        #[arg(short, long, default_value = "1000")]
        interval_ms: u64,
        /// Output format (table, json)
        #[arg(short, long, default_value = "table")]
        format: String,
    },

    /// List sessions known to the backend
    Sessions,

    /// Generate default config file
    Config {
        /// Output path (default: stdout)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    if let Commands::Config { output } = &cli.command {
        let content = generate_default_config();
        match output {
            Some(path) => {
                std::fs::write(path, content)
                    .with_context(|| format!("writing {}", path.display()))?;
                println!("Config written to {}", path.display());
            }
            None => print!("{}", content),
        }
        return Ok(());
    }

    let config = match &cli.config {
        Some(path) => Config::load_with_env(path)?,
        None => Config::load_default()?,
    };
    init_logging(&config.logging);

    match cli.command {
        Commands::Watch {
            session,
            url,
            interval_ms,
            format,
        } => watch(config, session, url, interval_ms, &format).await,
        Commands::Sessions => list_sessions(&config).await,
        Commands::Config { .. } => Ok(()),
    }
}

fn init_logging(logging: &LoggingConfig) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&logging.level));

    // stdout belongs to the metrics output
    if logging.format == "json" {
        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer().json().with_writer(std::io::stderr))
            .init();
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
            .init();
    }
}

async fn list_sessions(config: &Config) -> anyhow::Result<()> {
    let client = RestClient::new(&config.api)?;
    let sessions = client
        .list_sessions()
        .await
        .with_context(|| format!("listing sessions from {}", client.base_url()))?;

    if sessions.is_empty() {
        println!("No sessions");
        return Ok(());
    }

    println!("{:<38} {:<10} {:<20} NAME", "ID", "STATUS", "UPDATED");
    for session in sessions {
        println!(
            "{:<38} {:<10} {:<20} {}",
            session.id,
            session.status,
            session.updated_at.format("%Y-%m-%d %H:%M:%S"),
            session.name
        );
    }
    Ok(())
}

async fn watch(
    mut config: Config,
    session: Option<String>,
    url: Option<String>,
    interval_ms: u64,
    format: &str,
) -> anyhow::Result<()> {
    if let Some(url) = url {
        config.transport.url = url;
        config.validate()?;
    }

    let store = TelemetryStore::new(config.store.clone());

    // The session list is optional; streaming works without the backend
    match RestClient::new(&config.api) {
        Ok(client) => match client.list_sessions().await {
            Ok(sessions) => {
                tracing::info!("Loaded {} sessions", sessions.len());
                store.set_sessions(sessions);
            }
            Err(e) => tracing::warn!("Could not load sessions: {}", e),
        },
        Err(e) => tracing::warn!("Could not create REST client: {}", e),
    }
    store.set_active_session(session.as_deref());

    let pipeline = Pipeline::from_config(&config.transport, store, Arc::new(WsConnector::new()));

    let mut ticker = tokio::time::interval(Duration::from_millis(interval_ms.max(50)));
    loop {
        tokio::select! {
            _ = ticker.tick() => print_snapshot(&pipeline, format)?,
            _ = tokio::signal::ctrl_c() => {
                tracing::info!("Shutting down...");
                break;
            }
        }
    }

    pipeline.shutdown().await?;
    Ok(())
}

fn print_snapshot(pipeline: &PipelineHandle, format: &str) -> anyhow::Result<()> {
    let store = pipeline.store();
    // Poll the mapping: fast-path updates are not announced
    let metrics = store.metrics();

    if format == "json" {
        let line = serde_json::json!({
            "link": store.link_status(),
            "session": store.active_session_id(),
            "metrics": metrics.snapshot(),
        });
        println!("{}", serde_json::to_string(&line)?);
        return Ok(());
    }

    println!("[{}] link: {}", chrono::Local::now().format("%H:%M:%S"), store.link_status());
    for key in metrics.keys() {
        if let Some(value) = metrics.get(&key) {
            println!("  {:<32} {}", key, value);
        }
    }
    Ok(())
}
