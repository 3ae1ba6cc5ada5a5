//! Heartbeat liveness detection
//!
//! # Timers
//!
//! While the connection is `connected` two deadlines are tracked:
//!
//! ```text
//!  open ──interval──> probe ──interval──> probe ──interval──> ...
//!                       │
//!                       └──timeout──> no response? -> unclean close
//! ```
//!
//! Every probe carries its own deadline. A matching response clears that
//! probe and every older one still waiting; the timeout that matters is the
//! oldest unanswered probe's, so a silent peer is detected at most `timeout`
//! after the first unanswered probe.
//!
//! The monitor owns no tasks: the engine asks for `next_deadline()`, sleeps
//! until it, then calls `poll(now)`. `stop()` cancels both deadlines, which
//! is what prevents a stale timeout from firing after the state changed.

use crate::traits::{Message, PongDetector};
use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tracing::debug;

/// Heartbeat timing
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HeartbeatConfig {
    /// Time between probes
    pub interval: Duration,
    /// Time allowed for a response to each probe
    pub timeout: Duration,
}

impl Default for HeartbeatConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(30),
            timeout: Duration::from_secs(10),
        }
    }
}

/// What the engine should do after `poll`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HeartbeatDue {
    /// Send a new probe
    Probe,
    /// Outstanding probe was not answered in time
    TimedOut,
    /// Nothing due yet
    Idle,
}

struct Outstanding {
    probe: Message,
    deadline: Instant,
}

/// Probe scheduling and response tracking for one connection
pub struct HeartbeatMonitor {
    config: HeartbeatConfig,
    detector: Arc<dyn PongDetector>,
    next_probe: Option<Instant>,
    /// Unanswered probes, oldest first
    outstanding: VecDeque<Outstanding>,
    last_response: Option<Instant>,
}

impl HeartbeatMonitor {
    pub fn new(config: HeartbeatConfig, detector: Arc<dyn PongDetector>) -> Self {
        Self {
            config,
            detector,
            next_probe: None,
            outstanding: VecDeque::new(),
            last_response: None,
        }
    }

    pub fn config(&self) -> HeartbeatConfig {
        self.config
    }

    /// Arm the probe timer; the first probe goes out one interval from now
    pub fn start(&mut self, now: Instant) {
        self.next_probe = Some(now + self.config.interval);
        self.outstanding.clear();
        self.last_response = None;
        debug!("Heartbeat started with interval {:?}", self.config.interval);
    }

    /// Cancel both timers
    pub fn stop(&mut self) {
        if self.next_probe.is_some() || !self.outstanding.is_empty() {
            debug!("Heartbeat stopped");
        }
        self.next_probe = None;
        self.outstanding.clear();
    }

    pub fn is_running(&self) -> bool {
        self.next_probe.is_some()
    }

    /// Check if a probe is waiting for its response
    pub fn is_awaiting_response(&self) -> bool {
        !self.outstanding.is_empty()
    }

    /// Number of probes still waiting for a response
    pub fn outstanding_count(&self) -> usize {
        self.outstanding.len()
    }

    /// Earliest instant at which `poll` has something to do
    pub fn next_deadline(&self) -> Option<Instant> {
        let timeout = self.outstanding.front().map(|o| o.deadline);
        match (self.next_probe, timeout) {
            (Some(a), Some(b)) => Some(a.min(b)),
            (a, b) => a.or(b),
        }
    }

    /// Decide what is due at `now`; a timeout wins over a probe
    pub fn poll(&self, now: Instant) -> HeartbeatDue {
        if let Some(outstanding) = self.outstanding.front() {
            if outstanding.deadline <= now {
                return HeartbeatDue::TimedOut;
            }
        }
        match self.next_probe {
            Some(at) if at <= now => HeartbeatDue::Probe,
            _ => HeartbeatDue::Idle,
        }
    }

    /// Record that `probe` was written to the transport
    pub fn probe_sent(&mut self, probe: Message, now: Instant) {
        self.next_probe = Some(now + self.config.interval);
        self.outstanding.push_back(Outstanding {
            probe,
            deadline: now + self.config.timeout,
        });
    }

    /// Feed an incoming heartbeat message
    ///
    /// Returns true if it answered an outstanding probe. The answered probe
    /// and all older ones are cleared; newer ones keep their deadlines.
    pub fn on_response(&mut self, received: &Message, now: Instant) -> bool {
        let matched = self
            .outstanding
            .iter()
            .rposition(|o| self.detector.is_pong(&o.probe, received));

        match matched {
            Some(index) => {
                self.outstanding.drain(..=index);
                self.last_response = Some(now);
                debug!(
                    "Heartbeat response received, {} probes still outstanding",
                    self.outstanding.len()
                );
                true
            }
            None => false,
        }
    }

    /// Time since the last matching response
    pub fn time_since_last_response(&self, now: Instant) -> Option<Duration> {
        self.last_response.map(|at| now.saturating_duration_since(at))
    }
}
