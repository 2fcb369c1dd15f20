//! Venue Stream Ingest Binary
//!
//! Starts one supervisor per enabled venue and logs the canonical events
//! they publish.
//!
//! # Usage
//!
//! ```bash
//! cargo run --bin venue-stream-ingest
//! ```
//!
//! # Environment Variables
//!
//! - `INGEST_SYMBOLS`: Comma list of symbols (default: TONUSDT)
//! - `INGEST_VENUES`: Comma list of venues (default: all)
//! - `INGEST_METRICS_PORT`: Prometheus metrics port, 0 disables (default: 9090)
//! - `INGEST_OVERFLOW_POLICY`: block | drop_oldest (default: block)
//! - `LIGHTER_READONLY_AUTH` / `LIGHTER_AUTH`: Optional Lighter token
//! - `OTEL_ENABLED`: Export spans over OTLP (default: false)
//! - `RUST_LOG`: Log filter (default: venue_stream_ingest=info)

use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use tokio::signal;
use tokio_util::sync::CancellationToken;
use venue_stream_ingest::domain::symbol::SymbolCanonicalizer;
use venue_stream_ingest::infrastructure::broadcast::EventReceiver;
use venue_stream_ingest::infrastructure::venues::{
    DedustAdapter, ExtendedAdapter, LighterAdapter, VariationalAdapter, VestAdapter,
};
use venue_stream_ingest::{
    EventHub, IngestConfig, SupervisorSet, Venue, init_metrics, init_telemetry,
};

/// Upper bound on waiting for supervisors after cancellation.
const SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(30);

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    rustls::crypto::ring::default_provider()
        .install_default()
        .map_err(|_| anyhow::anyhow!("failed to install rustls crypto provider"))?;

    load_dotenv();

    let _telemetry_guard = init_telemetry().context("failed to initialize telemetry")?;

    tracing::info!("Starting venue stream ingest");

    let config = IngestConfig::from_env().context("invalid configuration")?;
    log_config(&config);

    if config.server.metrics_port == 0 {
        tracing::info!("Metrics exporter disabled");
    } else {
        let addr = init_metrics(config.server.metrics_port).context("failed to start metrics exporter")?;
        tracing::info!(addr = %addr, "Metrics exporter listening");
    }

    let shutdown_token = CancellationToken::new();
    let hub = Arc::new(EventHub::new(config.hub));

    let consumers = [
        hub.prices_rx().map(|rx| tokio::spawn(log_events(rx))),
        hub.orderbooks_rx().map(|rx| tokio::spawn(log_events(rx))),
        hub.trades_rx().map(|rx| tokio::spawn(log_events(rx))),
    ];

    let settings = config.supervisor_settings();
    let canonicalizer = SymbolCanonicalizer::default();
    let mut supervisors = SupervisorSet::new(shutdown_token.clone());

    for venue in Venue::ALL.into_iter().filter(|v| config.is_enabled(*v)) {
        let hub = Arc::clone(&hub);
        let settings = settings.clone();
        let canonicalizer = canonicalizer.clone();
        match venue {
            Venue::DeDust => supervisors.spawn(
                DedustAdapter::new(config.dedust.clone(), canonicalizer),
                settings,
                hub,
            ),
            Venue::Extended => supervisors.spawn(
                ExtendedAdapter::new(config.extended.clone(), canonicalizer),
                settings,
                hub,
            ),
            Venue::Lighter => supervisors.spawn(
                LighterAdapter::new(config.lighter.clone(), canonicalizer),
                settings,
                hub,
            ),
            Venue::Variational => supervisors.spawn(
                VariationalAdapter::new(config.variational.clone(), canonicalizer),
                settings,
                hub,
            ),
            Venue::Vest => supervisors.spawn(
                VestAdapter::new(config.vest.clone(), canonicalizer),
                settings,
                hub,
            ),
        }
        .with_context(|| format!("failed to start {venue} supervisor"))?;
    }

    if supervisors.is_empty() {
        tracing::warn!("No venue enabled, waiting for shutdown");
    } else {
        tracing::info!(supervisors = supervisors.len(), "Venue stream ingest ready");
    }

    await_shutdown(shutdown_token).await;

    if tokio::time::timeout(SHUTDOWN_TIMEOUT, supervisors.join_all())
        .await
        .is_err()
    {
        tracing::warn!(
            timeout_secs = SHUTDOWN_TIMEOUT.as_secs(),
            "Supervisors did not stop in time"
        );
    }

    drop(hub);
    for consumer in consumers.into_iter().flatten() {
        consumer.abort();
    }

    tracing::info!("Venue stream ingest stopped");
    Ok(())
}

/// Log every event from one output channel.
async fn log_events<T>(mut rx: EventReceiver<T>)
where
    T: Clone + std::fmt::Debug + Send + 'static,
{
    while let Some(event) = rx.recv().await {
        tracing::info!(channel = rx.channel(), event = ?event, "Market event");
    }
}

/// Load .env file from current or ancestor directories.
fn load_dotenv() {
    if dotenvy::dotenv().is_err() {
        load_dotenv_from_ancestors();
    }
}

/// Log the parsed configuration.
fn log_config(config: &IngestConfig) {
    let venues: Vec<&str> = config.venues.iter().map(|v| v.key()).collect();
    tracing::info!(
        symbols = ?config.symbols,
        venues = ?venues,
        overflow = config.hub.overflow.as_str(),
        metrics_port = config.server.metrics_port,
        lighter_auth = config.lighter.auth.is_some(),
        "Configuration loaded"
    );
    tracing::debug!(
        extended_ws = %config.extended.ws_url,
        lighter_ws = %config.lighter.ws_url,
        vest_ws = %config.vest.ws_url,
        dedust_pools = %config.dedust.pools_url,
        variational_stats = %config.variational.stats_url,
        "Venue endpoints"
    );
}

/// Load .env file from any ancestor directory.
fn load_dotenv_from_ancestors() {
    if let Ok(cwd) = std::env::current_dir() {
        let mut dir = cwd.as_path();
        while let Some(parent) = dir.parent() {
            let env_path = parent.join(".env");
            if env_path.exists() {
                let _ = dotenvy::from_path(&env_path);
                return;
            }
            dir = parent;
        }
    }
}

/// Wait for shutdown signal (SIGTERM or SIGINT), then cancel.
async fn await_shutdown(shutdown_token: CancellationToken) {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!(error = %e, "Ctrl+C handler failed");
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
                tracing::error!(error = %e, "SIGTERM handler installation failed");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {
            tracing::info!("Received Ctrl+C, initiating shutdown");
        }
        () = terminate => {
            tracing::info!("Received SIGTERM, initiating shutdown");
        }
    }

    shutdown_token.cancel();

    tracing::info!(
        timeout_secs = SHUTDOWN_TIMEOUT.as_secs(),
        "Graceful shutdown started"
    );
}
