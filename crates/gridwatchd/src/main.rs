//! gridwatchd — the GridWatch watchdog daemon.
//!
//! Hosts the three periodic engines (health checks, metric harvest,
//! diagnostic cleanup), the self-reporter, and the HTTP registration
//! surface, all under one cancellation domain.
//!
//! # Usage
//!
//! ```text
//! gridwatchd run --port 8081 --data-dir /var/lib/gridwatch --config /etc/gridwatch.toml
//! ```
//!
//! The configuration file is re-read on SIGHUP and applied without
//! restarting the engines.

mod coordinator;
mod reporter;

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use tracing::{info, warn};
use uuid::Uuid;

use gridwatch_api::{build_router, ApiState};
use gridwatch_core::{LogSink, NullSink, TelemetrySink, WatchdogSettings};
use gridwatch_platform::{
    EndpointRole, InMemoryPlatform, Listener, Partition, PartitionKind, PartitionStatus,
    PlatformHandle, ResolvedEndpoint,
};
use gridwatch_state::WatchdogStore;

use coordinator::{Coordinator, LifecycleHost};

#[derive(Parser)]
#[command(name = "gridwatchd", about = "GridWatch cluster watchdog")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run the watchdog.
    Run {
        /// Port for the registration API.
        #[arg(long, default_value = "8081")]
        port: u16,

        /// Data directory for durable state.
        #[arg(long, default_value = "/var/lib/gridwatch")]
        data_dir: PathBuf,

        /// Configuration file (toml sections). Defaults apply if absent.
        #[arg(long)]
        config: Option<PathBuf>,

        /// The watchdog's own service URI, used for the self probe.
        #[arg(long, default_value = "fabric:/GridWatch/Watchdog")]
        service_name: String,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,gridwatchd=debug,gridwatch=debug".parse().unwrap()),
        )
        .init();

    let cli = Cli::parse();
    match cli.command {
        Command::Run {
            port,
            data_dir,
            config,
            service_name,
        } => run(port, data_dir, config, service_name).await,
    }
}

async fn run(
    port: u16,
    data_dir: PathBuf,
    config: Option<PathBuf>,
    service_name: String,
) -> anyhow::Result<()> {
    info!("gridwatchd starting");

    let settings = match &config {
        Some(path) => WatchdogSettings::from_file(path)?,
        None => WatchdogSettings::default(),
    };

    // ── Durable store ──────────────────────────────────────────────
    std::fs::create_dir_all(&data_dir)?;
    let db_path = data_dir.join("gridwatch.redb");
    let store = WatchdogStore::open(&db_path)?;
    info!(path = ?db_path, "watchdog store opened");

    // ── Platform ───────────────────────────────────────────────────
    // The in-process platform directory; the watchdog registers itself
    // so the self probe resolves.
    let platform = Arc::new(InMemoryPlatform::new());
    let self_partition = Uuid::new_v4();
    platform.add_service(&service_name);
    platform.add_partition(Partition {
        id: self_partition,
        kind: PartitionKind::Singleton,
        status: PartitionStatus::Ready,
    });
    platform.set_endpoints(
        &service_name,
        vec![ResolvedEndpoint {
            role: EndpointRole::Stateless,
            listeners: vec![Listener {
                name: String::new(),
                address: format!("http://127.0.0.1:{port}"),
            }],
        }],
    );
    let handle = Arc::new(PlatformHandle::with_client(platform));

    // ── Telemetry ──────────────────────────────────────────────────
    let telemetry: Arc<dyn TelemetrySink> = match &settings.telemetry_key {
        Some(key) => Arc::new(LogSink::new(key)),
        None => Arc::new(NullSink),
    };

    if settings.diagnostic_endpoint.is_some() {
        // The tabular diagnostic store is bound per deployment; without a
        // backing client the cleanup engine stays idle.
        warn!("diagnostic endpoint configured but no table store backend is wired");
    }

    // ── Coordinator ────────────────────────────────────────────────
    let coordinator = Arc::new(Coordinator::new(
        store,
        handle,
        telemetry,
        None,
        settings,
        service_name,
        self_partition,
        port,
    ));
    coordinator.open().await?;
    coordinator.run_primary().await?;

    // ── Config reload on SIGHUP ────────────────────────────────────
    #[cfg(unix)]
    if let Some(config_path) = config.clone() {
        let reload_target = coordinator.clone();
        tokio::spawn(async move {
            let mut hangup = match tokio::signal::unix::signal(
                tokio::signal::unix::SignalKind::hangup(),
            ) {
                Ok(signal) => signal,
                Err(e) => {
                    warn!(error = %e, "could not install SIGHUP handler");
                    return;
                }
            };
            while hangup.recv().await.is_some() {
                match WatchdogSettings::from_file(&config_path) {
                    Ok(settings) => reload_target.apply_config(settings),
                    Err(e) => warn!(error = %e, "config reload failed"),
                }
            }
        });
    }

    // ── API server ─────────────────────────────────────────────────
    let router = build_router(ApiState {
        health: coordinator.health_engine(),
        metrics: coordinator.metrics_engine(),
    });
    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    info!(%addr, "API server starting");
    let listener = tokio::net::TcpListener::bind(addr).await?;

    let server = axum::serve(listener, router).with_graceful_shutdown(async {
        tokio::signal::ctrl_c()
            .await
            .expect("failed to install CTRL+C handler");
        info!("shutdown signal received");
    });
    server.await?;

    coordinator.close().await?;
    info!("gridwatchd stopped");
    Ok(())
}
