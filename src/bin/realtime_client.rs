//! Realtime notification client
//!
//! Connects to the configured WebSocket endpoint, logs everything the
//! server pushes and sends each stdin line as a notification. Lines that
//! parse as JSON are sent as-is, anything else as `{"text": line}`.
//!
//! Commands typed on stdin:
//!   /status   print connection status and metrics
//!   /retry    retry undelivered offline notifications now
//!   /clear    drop delivered notifications from the offline store
//!
//! Configuration: `config/realtime.yaml`, `REALTIME_CONFIG_PATH` or
//! `--config <path>`. `REALTIME_URL` overrides the url.
//!
//! Usage:
//!   cargo run --bin realtime-client

use anyhow::{Context, Result};
use campus_realtime::bin_common::{
    config_path_from_args, parse_args, BinaryRunner, RunConfig, ShutdownFlag,
};
use campus_realtime::config::RealtimeSettings;
use campus_realtime::logging::init_tracing;
use campus_realtime::realtime_link::{
    ConnectivityMonitor, JsonFileStorage, ProbeTarget, RealtimeManager, Subscription,
    TungsteniteTransport,
};
use serde_json::{json, Value};
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{error, info, warn};

struct RealtimeClientApp {
    run_config: RunConfig,
    settings: RealtimeSettings,
    shutdown: ShutdownFlag,
    sent: u64,
}

impl RealtimeClientApp {
    fn new(settings: RealtimeSettings) -> Self {
        Self {
            run_config: RunConfig::new("Realtime Client"),
            settings,
            shutdown: ShutdownFlag::new(),
            sent: 0,
        }
    }

    async fn build_manager(&self) -> Result<RealtimeManager> {
        let manager = RealtimeManager::builder()
            .config(self.settings.to_client_config())
            .transport(TungsteniteTransport::new())
            .storage(JsonFileStorage::new(self.settings.offline.storage_path.clone()))
            .build()
            .await
            .context("failed to start realtime manager")?;
        Ok(manager)
    }

    fn observe(manager: &RealtimeManager) -> Vec<Subscription> {
        vec![
            manager.on_status_change(|from, to| info!("Status: {} -> {}", from, to)),
            manager.on_connect(|| info!("Connected")),
            manager.on_disconnect(|| info!("Disconnected")),
            manager.on_error(|e| warn!("Realtime error: {}", e)),
            manager.on_message(|m| {
                info!("[{}] {} {}", m.kind(), m.id(), m.payload());
            }),
        ]
    }

    fn start_monitor(&self, manager: &RealtimeManager) -> Option<ConnectivityMonitor> {
        if !self.settings.connectivity.enabled {
            return None;
        }
        match ProbeTarget::from_url(&self.settings.url) {
            Ok(target) => {
                info!("Probing {}:{} for connectivity", target.host, target.port);
                Some(ConnectivityMonitor::spawn(
                    target,
                    self.settings.probe_config(),
                    manager.host_signal(),
                ))
            }
            Err(e) => {
                warn!("Connectivity monitor disabled: {}", e);
                None
            }
        }
    }

    async fn handle_line(&mut self, manager: &RealtimeManager, line: &str) -> Result<()> {
        match line {
            "" => {}
            "/status" => {
                let metrics = manager.metrics();
                info!(
                    "Status {} | online {} | sent {} | received {} | queued {} | reconnects {} | offline pending {}",
                    metrics.connection_status,
                    manager.is_online(),
                    metrics.messages_sent,
                    metrics.messages_received,
                    metrics.queued,
                    metrics.reconnect_count,
                    manager.pending_offline_count()
                );
            }
            "/retry" => manager.retry_offline()?,
            "/clear" => {
                let removed = manager.clear_delivered().await?;
                info!("Removed {} delivered notifications", removed);
            }
            text => {
                let payload = serde_json::from_str::<Value>(text)
                    .unwrap_or_else(|_| json!({ "text": text }));
                let id = manager.send_notification(payload)?;
                self.sent += 1;
                info!("Submitted notification {}", id);
            }
        }
        Ok(())
    }
}

impl BinaryRunner for RealtimeClientApp {
    async fn run(&mut self) -> Result<()> {
        self.shutdown.spawn_signal_handler();

        let manager = self.build_manager().await?;
        let _subscriptions = Self::observe(&manager);
        let monitor = self.start_monitor(&manager);

        manager.connect()?;

        let mut lines = BufReader::new(tokio::io::stdin()).lines();
        let mut stdin_open = true;
        let mut status_tick = tokio::time::interval(self.run_config.status_interval());
        status_tick.tick().await;

        let shutdown = self.shutdown.clone();
        loop {
            tokio::select! {
                _ = shutdown.wait() => break,
                line = lines.next_line(), if stdin_open => match line {
                    Ok(Some(line)) => {
                        if let Err(e) = self.handle_line(&manager, line.trim()).await {
                            error!("Command failed: {}", e);
                        }
                    }
                    Ok(None) => {
                        info!("stdin closed, waiting for Ctrl+C");
                        stdin_open = false;
                    }
                    Err(e) => {
                        warn!("stdin read failed: {}", e);
                        stdin_open = false;
                    }
                },
                _ = status_tick.tick() => {
                    let metrics = manager.metrics();
                    info!(
                        "Heartbeat: {} | sent {} | received {} | offline pending {}",
                        metrics.connection_status,
                        metrics.messages_sent,
                        metrics.messages_received,
                        manager.pending_offline_count()
                    );
                }
            }
        }

        if let Some(monitor) = monitor {
            monitor.stop();
        }
        manager.shutdown().await?;
        Ok(())
    }

    fn config(&self) -> &RunConfig {
        &self.run_config
    }

    fn stats(&self) -> Option<String> {
        Some(format!("Notifications submitted: {}", self.sent))
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenv::dotenv().ok();

    let config_path = config_path_from_args(&parse_args());
    let settings = RealtimeSettings::load(&config_path)
        .with_context(|| format!("failed to load {}", config_path.display()))?;

    init_tracing(&settings.log_level);
    settings.log();

    let mut app = RealtimeClientApp::new(settings);
    app.execute().await
}
