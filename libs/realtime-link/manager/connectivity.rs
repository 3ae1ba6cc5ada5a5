//! Host connectivity monitor
//!
//! For hosts without a platform online/offline signal: periodically try a
//! TCP connection to the server and report reachability changes through a
//! [`HostSignal`]. A successful probe reports online at once; offline is
//! reported only after `offline_after` consecutive failures, so one slow or
//! dropped probe never tears down a healthy connection.

use crate::manager::manager::HostSignal;
use crate::traits::{RealtimeError, Result};
use std::future::Future;
use std::time::Duration;
use tokio::net::TcpStream;
use tokio::task::JoinHandle;
use tokio::time::{interval, timeout, MissedTickBehavior};
use tokio_tungstenite::tungstenite::http::Uri;
use tracing::{debug, info};

/// Host and port to probe
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProbeTarget {
    pub host: String,
    pub port: u16,
}

impl ProbeTarget {
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
        }
    }

    /// Derive the target from a ws:// or wss:// URL
    pub fn from_url(url: &str) -> Result<Self> {
        let uri: Uri = url
            .parse()
            .map_err(|e| RealtimeError::Configuration(format!("invalid url {}: {}", url, e)))?;
        let host = uri
            .host()
            .ok_or_else(|| RealtimeError::Configuration(format!("url {} has no host", url)))?;
        let port = match (uri.port_u16(), uri.scheme_str()) {
            (Some(port), _) => port,
            (None, Some("wss")) | (None, Some("https")) => 443,
            (None, _) => 80,
        };
        Ok(Self::new(host.trim_start_matches('[').trim_end_matches(']'), port))
    }
}

/// Probe cadence
#[derive(Debug, Clone, Copy)]
pub struct ProbeConfig {
    pub interval: Duration,
    pub timeout: Duration,
    /// Consecutive failed probes before the host is reported offline
    pub offline_after: u32,
}

impl Default for ProbeConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(15),
            timeout: Duration::from_secs(3),
            offline_after: 3,
        }
    }
}

/// Debounced reachability state
#[derive(Debug, Clone)]
pub struct Reachability {
    offline_after: u32,
    failures: u32,
    reported: Option<bool>,
}

impl Reachability {
    pub fn new(offline_after: u32) -> Self {
        Self {
            offline_after: offline_after.max(1),
            failures: 0,
            reported: None,
        }
    }

    /// Feed one probe result; returns the state to report, if it changed
    pub fn observe(&mut self, reachable: bool) -> Option<bool> {
        let next = if reachable {
            self.failures = 0;
            true
        } else {
            self.failures = self.failures.saturating_add(1);
            if self.failures < self.offline_after {
                debug!("Probe failure {}/{}", self.failures, self.offline_after);
                return None;
            }
            false
        };

        if self.reported == Some(next) {
            return None;
        }
        self.reported = Some(next);
        Some(next)
    }
}

/// Background reachability probe; stops when dropped
pub struct ConnectivityMonitor {
    task: JoinHandle<()>,
}

impl ConnectivityMonitor {
    /// Spawn the probe task
    ///
    /// Must be called from within a tokio runtime.
    pub fn spawn(target: ProbeTarget, config: ProbeConfig, signal: HostSignal) -> Self {
        info!(
            "Monitoring connectivity to {}:{} every {:?}",
            target.host, target.port, config.interval
        );
        let task = tokio::spawn(run_monitor(target, config, signal));
        Self { task }
    }

    pub fn is_running(&self) -> bool {
        !self.task.is_finished()
    }

    pub fn stop(self) {
        self.task.abort();
        debug!("Connectivity monitor stopped");
    }
}

impl Drop for ConnectivityMonitor {
    fn drop(&mut self) {
        self.task.abort();
    }
}

/// One reachability check
pub async fn probe(target: &ProbeTarget, limit: Duration) -> bool {
    match timeout(limit, TcpStream::connect((target.host.as_str(), target.port))).await {
        Ok(Ok(_stream)) => true,
        Ok(Err(e)) => {
            debug!("Probe of {}:{} failed: {}", target.host, target.port, e);
            false
        }
        Err(_) => {
            debug!("Probe of {}:{} timed out", target.host, target.port);
            false
        }
    }
}

async fn run_monitor(target: ProbeTarget, config: ProbeConfig, signal: HostSignal) {
    let label = format!("{}:{}", target.host, target.port);
    let target = &target;
    run_checks(config, signal, &label, move || probe(target, config.timeout)).await;
}

async fn run_checks<F, Fut>(config: ProbeConfig, signal: HostSignal, label: &str, mut check: F)
where
    F: FnMut() -> Fut,
    Fut: Future<Output = bool>,
{
    let mut ticker = interval(config.interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    let mut state = Reachability::new(config.offline_after);

    loop {
        ticker.tick().await;
        let Some(reachable) = state.observe(check().await) else {
            continue;
        };

        let sent = if reachable {
            info!("{} reachable", label);
            signal.online()
        } else {
            info!("{} unreachable after {} probes", label, config.offline_after);
            signal.offline()
        };
        if sent.is_err() {
            debug!("Manager stopped, ending connectivity monitor");
            return;
        }
    }
}
