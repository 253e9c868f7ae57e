//! Lifecycle coordination.
//!
//! The coordinator owns the durable store, the platform handle, the three
//! engines, and the self-reporter. It drives replica-role transitions
//! into the store, spawns the periodic loops under one shared
//! cancellation channel, applies configuration reloads atomically per
//! engine, and registers the watchdog's own health probe through its own
//! HTTP listener so the service shows up as a monitored target.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use http_body_util::Full;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};
use uuid::Uuid;

use gridwatch_cleanup::{CleanupEngine, TableStore};
use gridwatch_core::{TelemetrySink, WatchdogSettings};
use gridwatch_health::HealthCheckEngine;
use gridwatch_metrics::MetricsEngine;
use gridwatch_platform::PlatformHandle;
use gridwatch_state::{ReplicaRole, WatchdogStore};

use crate::reporter::SelfReporter;

/// Replica lifecycle hooks, driven by the host process.
#[async_trait]
pub trait LifecycleHost: Send + Sync {
    /// The replica is opening; wire callbacks, take no role yet.
    async fn open(&self) -> anyhow::Result<()>;

    /// The replica became primary; start the periodic subsystems.
    async fn run_primary(&self) -> anyhow::Result<()>;

    /// The replica is closing; cancel everything and demote.
    async fn close(&self) -> anyhow::Result<()>;

    /// The platform reported potential data loss.
    async fn data_loss(&self) -> anyhow::Result<()>;
}

/// Owns the engines and their lifecycle.
pub struct Coordinator {
    store: WatchdogStore,
    platform: Arc<PlatformHandle>,
    telemetry: Arc<dyn TelemetrySink>,
    health_engine: Arc<HealthCheckEngine>,
    metrics_engine: Arc<MetricsEngine>,
    cleanup_engine: Arc<CleanupEngine>,
    reporter: Arc<SelfReporter>,
    settings_tx: watch::Sender<WatchdogSettings>,
    shutdown_tx: watch::Sender<bool>,
    tasks: Mutex<Vec<JoinHandle<()>>>,
    /// The watchdog's own service URI and listener port, used to register
    /// the self-probe.
    self_service: String,
    listener_port: u16,
}

impl Coordinator {
    pub fn new(
        store: WatchdogStore,
        platform: Arc<PlatformHandle>,
        telemetry: Arc<dyn TelemetrySink>,
        table_store: Option<Arc<dyn TableStore>>,
        settings: WatchdogSettings,
        self_service: String,
        self_partition: Uuid,
        listener_port: u16,
    ) -> Self {
        let health_engine = Arc::new(HealthCheckEngine::new(
            store.clone(),
            platform.clone(),
            telemetry.clone(),
        ));
        let metrics_engine = Arc::new(MetricsEngine::new(
            store.clone(),
            platform.clone(),
            telemetry.clone(),
        ));
        let cleanup_engine = Arc::new(CleanupEngine::new(table_store));
        let reporter = Arc::new(SelfReporter::new(
            platform.clone(),
            Some(telemetry.clone()),
            Some(health_engine.clone()),
            Some(metrics_engine.clone()),
            Some(cleanup_engine.clone()),
            1,
            self_partition,
        ));
        let (settings_tx, _) = watch::channel(settings);
        let (shutdown_tx, _) = watch::channel(false);

        Self {
            store,
            platform,
            telemetry,
            health_engine,
            metrics_engine,
            cleanup_engine,
            reporter,
            settings_tx,
            shutdown_tx,
            tasks: Mutex::new(Vec::new()),
            self_service,
            listener_port,
        }
    }

    pub fn health_engine(&self) -> Arc<HealthCheckEngine> {
        self.health_engine.clone()
    }

    pub fn metrics_engine(&self) -> Arc<MetricsEngine> {
        self.metrics_engine.clone()
    }

    pub fn cleanup_engine(&self) -> Arc<CleanupEngine> {
        self.cleanup_engine.clone()
    }

    pub fn store(&self) -> &WatchdogStore {
        &self.store
    }

    pub fn platform(&self) -> Arc<PlatformHandle> {
        self.platform.clone()
    }

    /// Current settings snapshot.
    pub fn settings(&self) -> WatchdogSettings {
        self.settings_tx.borrow().clone()
    }

    /// Apply a new configuration snapshot. Each loop samples the channel
    /// at its next iteration, so intervals change without tearing any
    /// engine state down.
    pub fn apply_config(&self, settings: WatchdogSettings) {
        if let Some(key) = &settings.telemetry_key {
            self.telemetry.set_key(key);
        }
        if self.settings_tx.send(settings).is_err() {
            debug!("no engine loops are observing settings");
        }
        info!("configuration applied");
    }

    /// Register the watchdog's own probe by POSTing to its own listener,
    /// the same path external services use. Retries a few times while the
    /// listener comes up; failure is logged, never fatal.
    async fn register_self_probe(self_service: String, port: u16) {
        let check = serde_json::json!({
            "name": "watchdog-self",
            "service_name": self_service,
            "suffix_path": "watchdog/health",
            "frequency_ms": 60_000,
        });
        let body = check.to_string();

        for attempt in 1..=5u32 {
            tokio::time::sleep(Duration::from_secs(1)).await;
            match post_json(port, "/healthcheck", &body).await {
                Ok(status) if status == 200 => {
                    info!("self probe registered");
                    return;
                }
                Ok(status) => {
                    debug!(attempt, status, "self probe registration rejected");
                }
                Err(e) => {
                    debug!(attempt, error = %e, "self probe registration failed");
                }
            }
        }
        warn!("giving up on self probe registration");
    }
}

#[async_trait]
impl LifecycleHost for Coordinator {
    async fn open(&self) -> anyhow::Result<()> {
        self.store.on_role_change(|role| {
            info!(?role, "replica role transition");
        });
        info!("coordinator opened");
        Ok(())
    }

    async fn run_primary(&self) -> anyhow::Result<()> {
        self.store.set_role(ReplicaRole::Primary);

        let mut tasks = self.tasks.lock().unwrap_or_else(|e| e.into_inner());

        let health = self.health_engine.clone();
        tasks.push(tokio::spawn(health.run(
            self.settings_tx.subscribe(),
            self.shutdown_tx.subscribe(),
        )));

        let metrics = self.metrics_engine.clone();
        tasks.push(tokio::spawn(metrics.run(
            self.settings_tx.subscribe(),
            self.shutdown_tx.subscribe(),
        )));

        let cleanup = self.cleanup_engine.clone();
        tasks.push(tokio::spawn(cleanup.run(
            self.settings_tx.subscribe(),
            self.shutdown_tx.subscribe(),
        )));

        let reporter = self.reporter.clone();
        tasks.push(tokio::spawn(reporter.run(
            self.settings_tx.subscribe(),
            self.shutdown_tx.subscribe(),
        )));

        tasks.push(tokio::spawn(Self::register_self_probe(
            self.self_service.clone(),
            self.listener_port,
        )));

        info!("periodic subsystems started");
        Ok(())
    }

    async fn close(&self) -> anyhow::Result<()> {
        let _ = self.shutdown_tx.send(true);
        self.store.set_role(ReplicaRole::None);

        let tasks: Vec<JoinHandle<()>> = {
            let mut guard = self.tasks.lock().unwrap_or_else(|e| e.into_inner());
            guard.drain(..).collect()
        };
        for task in tasks {
            task.abort();
            let _ = task.await;
        }
        info!("coordinator closed");
        Ok(())
    }

    async fn data_loss(&self) -> anyhow::Result<()> {
        // Registrations are re-created by their owners; nothing to restore.
        warn!("potential data loss reported by the platform");
        Ok(())
    }
}

/// POST a JSON body to the local listener and return the response status.
async fn post_json(port: u16, path: &str, body: &str) -> anyhow::Result<u16> {
    let address = format!("127.0.0.1:{port}");
    let stream = tokio::net::TcpStream::connect(&address).await?;
    let io = hyper_util::rt::TokioIo::new(stream);
    let (mut sender, conn) = hyper::client::conn::http1::handshake(io).await?;
    tokio::spawn(async move {
        let _ = conn.await;
    });

    let request = http::Request::builder()
        .method(http::Method::POST)
        .uri(format!("http://{address}{path}"))
        .header(http::header::HOST, &address)
        .header(http::header::CONTENT_TYPE, "application/json")
        .body(Full::new(Bytes::from(body.to_string())))?;

    let response = sender.send_request(request).await?;
    Ok(response.status().as_u16())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    use gridwatch_core::NullSink;
    use gridwatch_platform::InMemoryPlatform;
    use gridwatch_state::AccessStatus;

    fn coordinator() -> Coordinator {
        let store = WatchdogStore::open_in_memory().unwrap();
        let platform = Arc::new(PlatformHandle::with_client(Arc::new(
            InMemoryPlatform::new(),
        )));
        Coordinator::new(
            store,
            platform,
            Arc::new(NullSink),
            None,
            WatchdogSettings::default(),
            "fabric:/GridWatch/Watchdog".to_string(),
            Uuid::new_v4(),
            0,
        )
    }

    #[tokio::test]
    async fn run_primary_promotes_and_close_demotes() {
        let c = coordinator();
        c.open().await.unwrap();
        assert_eq!(c.store().write_status(), AccessStatus::NotPrimary);

        c.run_primary().await.unwrap();
        assert_eq!(c.store().write_status(), AccessStatus::Granted);

        c.close().await.unwrap();
        assert_eq!(c.store().write_status(), AccessStatus::NotPrimary);
    }

    #[tokio::test]
    async fn apply_config_reaches_running_loops() {
        let c = coordinator();
        let mut observer = c.settings_tx.subscribe();
        assert_eq!(
            observer.borrow().health_check_interval,
            Duration::from_secs(300)
        );

        let mut updated = WatchdogSettings::default();
        updated.health_check_interval = Duration::from_secs(30);
        c.apply_config(updated);

        assert!(observer.has_changed().unwrap());
        assert_eq!(
            observer.borrow_and_update().health_check_interval,
            Duration::from_secs(30)
        );
    }

    #[tokio::test]
    async fn close_is_idempotent_without_run() {
        let c = coordinator();
        c.close().await.unwrap();
        c.close().await.unwrap();
    }

    #[tokio::test]
    async fn data_loss_is_survivable() {
        let c = coordinator();
        c.data_loss().await.unwrap();
    }
}
