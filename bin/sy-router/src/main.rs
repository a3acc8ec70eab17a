//! Switchyard Routing Daemon
//!
//! Runs the routing core against a configured worker roster:
//! - Worker roster and core settings from a JSON file plus `SWITCHYARD_*` overrides
//! - Prometheus metrics endpoint
//! - Alert delivery to a webhook, or to the log
//! - Structured log line for every core event
//! - Optional synthetic traffic (`--simulate`) for local runs

mod simulate;

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use metrics_exporter_prometheus::PrometheusBuilder;
use serde::Deserialize;
use tokio::signal;
use tokio::sync::broadcast::{self, error::RecvError};
use tracing::{debug, info, warn};
use tracing_subscriber::EnvFilter;

use sy_common::{CoreConfig, CoreEvent, WorkerInfo};
use sy_router::{
    apply_env_overrides, load_config, LogNotificationChannel, NotificationChannel, Orchestrator,
    StaticWorkerDirectory, WebhookNotificationChannel,
};

/// Switchyard routing daemon
#[derive(Parser, Debug)]
#[command(name = "switchyard")]
#[command(about = "Switchyard - admission, queueing and routing of calls and messages")]
struct Args {
    /// JSON configuration file (core settings and worker roster)
    #[arg(long, env = "SWITCHYARD_CONFIG")]
    config: Option<PathBuf>,

    /// Prometheus exporter listen address
    #[arg(long, env = "SWITCHYARD_METRICS_ADDR", default_value = "0.0.0.0:9090")]
    metrics_addr: SocketAddr,

    /// Deliver alerts to this URL instead of the log
    #[arg(long, env = "SWITCHYARD_WEBHOOK_URL")]
    webhook_url: Option<String>,

    /// Generate synthetic calls and messages
    #[arg(long)]
    simulate: bool,

    /// Synthetic arrivals per second
    #[arg(long, default_value = "5")]
    simulate_rate: u32,
}

/// On-disk configuration: core settings with the worker roster alongside
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct DaemonConfig {
    #[serde(flatten)]
    core: CoreConfig,
    #[serde(default)]
    workers: Vec<WorkerInfo>,
}

fn init_tracing() {
    let filter = EnvFilter::from_default_env().add_directive(tracing::Level::INFO.into());
    let json = std::env::var("LOG_FORMAT")
        .map(|v| v.eq_ignore_ascii_case("json"))
        .unwrap_or(false);

    if json {
        tracing_subscriber::fmt().json().with_env_filter(filter).init();
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).init();
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    init_tracing();

    let args = Args::parse();
    info!("Starting Switchyard routing daemon");

    // 1. Configuration
    let mut config = match &args.config {
        Some(path) => load_config::<DaemonConfig>(path)
            .with_context(|| format!("failed to load configuration from {}", path.display()))?,
        None => {
            info!("No configuration file given, using defaults");
            DaemonConfig::default()
        }
    };
    apply_env_overrides(&mut config.core).context("invalid SWITCHYARD_* override")?;

    // 2. Metrics exporter
    PrometheusBuilder::new()
        .with_http_listener(args.metrics_addr)
        .install()
        .context("failed to install Prometheus exporter")?;
    info!("Metrics server listening on http://{}/metrics", args.metrics_addr);

    // 3. Alert delivery
    let notifier: Arc<dyn NotificationChannel> = match &args.webhook_url {
        Some(url) => {
            info!(url = %url, "Delivering alerts to webhook");
            Arc::new(WebhookNotificationChannel::new(url.clone())?)
        }
        None => Arc::new(LogNotificationChannel),
    };

    // 4. Worker roster
    if config.workers.is_empty() {
        warn!("No workers configured; all work will queue until it times out");
    }
    let directory = Arc::new(StaticWorkerDirectory::new(config.workers));
    info!(workers = directory.len(), "Worker directory seeded");

    // 5. Routing core
    let orchestrator = Arc::new(Orchestrator::new(directory.clone(), notifier));
    orchestrator.initialize(config.core).await?;

    let event_logger = spawn_event_logger(orchestrator.subscribe()?);

    // 6. Synthetic traffic
    let (shutdown_tx, _) = broadcast::channel::<()>(1);
    let simulator = if args.simulate {
        info!(rate = args.simulate_rate, "Simulating traffic");
        Some(simulate::spawn(
            orchestrator.clone(),
            args.simulate_rate,
            shutdown_tx.subscribe(),
        )?)
    } else {
        None
    };

    info!("Switchyard started. Press Ctrl+C to shutdown.");

    shutdown_signal().await;
    info!("Shutdown signal received...");

    let _ = shutdown_tx.send(());
    if let Some(simulator) = simulator {
        simulator.join().await;
    }

    let snapshot = orchestrator.shutdown().await?;
    info!(
        active_calls = snapshot.active_calls,
        queued_calls = snapshot.queued_calls,
        active_messages = snapshot.active_messages,
        queued_messages = snapshot.queued_messages,
        average_response_time_ms = snapshot.average_response_time_ms,
        "Final metrics"
    );

    event_logger.abort();
    info!("Switchyard shutdown complete");
    Ok(())
}

fn spawn_event_logger(mut events: broadcast::Receiver<CoreEvent>) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        loop {
            match events.recv().await {
                Ok(CoreEvent::MetricsUpdated { snapshot }) => {
                    debug!(
                        sequence = snapshot.sequence,
                        system_load = snapshot.system_load,
                        "Metrics updated"
                    );
                }
                Ok(event) => {
                    let detail = serde_json::to_string(&event).unwrap_or_default();
                    info!(event = event.name(), %detail, "Core event");
                }
                Err(RecvError::Lagged(skipped)) => {
                    warn!(skipped, "Event logger fell behind");
                }
                Err(RecvError::Closed) => break,
            }
        }
    })
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            warn!(error = %e, "Failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                warn!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
