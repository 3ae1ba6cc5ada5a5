//! Offline Notification Store
//!
//! Durable log of notifications that could not be transmitted because the
//! host was offline. Guarantees:
//!
//! - every record is persisted before `record` returns (best effort)
//! - an item is retried at most `max_retries` times, then left in place
//! - delivered items are never retried and only removed by `clear_delivered`
//! - a persistence failure is logged and never blocks the in-memory view

use crate::traits::{Message, NotificationStorage, OfflineNotification, Result};
use tracing::{debug, error, info, warn};

/// Outcome of one retry sweep
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RetryReport {
    /// Items whose retry count was incremented
    pub attempted: usize,
    /// Attempts that were transmitted
    pub delivered: usize,
    /// Attempts that failed to transmit
    pub failed: usize,
    /// Undelivered items skipped because their retries are used up
    pub exhausted: usize,
}

pub struct OfflineNotificationStore {
    items: Vec<OfflineNotification>,
    storage: Box<dyn NotificationStorage>,
    max_retries: u32,
}

impl OfflineNotificationStore {
    /// Load the persisted collection
    ///
    /// A corrupt or unreadable store is treated as empty.
    pub fn load(storage: Box<dyn NotificationStorage>, max_retries: u32) -> Self {
        let items = match storage.read_all() {
            Ok(items) => {
                debug!("Loaded {} offline notifications", items.len());
                items
            }
            Err(e) => {
                warn!("Offline store unreadable, starting empty: {}", e);
                Vec::new()
            }
        };

        Self {
            items,
            storage,
            max_retries,
        }
    }

    pub fn max_retries(&self) -> u32 {
        self.max_retries
    }

    pub fn items(&self) -> &[OfflineNotification] {
        &self.items
    }

    pub fn get(&self, id: &str) -> Option<&OfflineNotification> {
        self.items.iter().find(|item| item.id == id)
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Items a sweep would still try
    pub fn pending_count(&self) -> usize {
        self.items.iter().filter(|item| item.is_retryable()).count()
    }

    /// Record a notification that could not be sent
    ///
    /// Returns false if an item with the same id is already stored.
    pub fn record(&mut self, message: &Message) -> bool {
        if self.get(message.id()).is_some() {
            debug!("Offline notification {} already recorded", message.id());
            return false;
        }

        self.items
            .push(OfflineNotification::from_message(message, self.max_retries));
        info!(
            "Stored offline notification {} ({} in store)",
            message.id(),
            self.items.len()
        );
        self.persist();
        true
    }

    /// Retry every undelivered item that still has retries left
    ///
    /// `send` is the transmission attempt; `Ok` marks the item delivered.
    /// The store is persisted once after the sweep.
    pub fn retry_all<F>(&mut self, mut send: F) -> RetryReport
    where
        F: FnMut(&Message) -> Result<()>,
    {
        let mut report = RetryReport::default();

        for item in self.items.iter_mut() {
            if item.delivered {
                continue;
            }
            if item.retry_count >= item.max_retries {
                report.exhausted += 1;
                continue;
            }

            item.retry_count += 1;
            report.attempted += 1;

            match send(&item.to_message()) {
                Ok(()) => {
                    item.delivered = true;
                    report.delivered += 1;
                    debug!("Offline notification {} delivered", item.id);
                }
                Err(e) => {
                    report.failed += 1;
                    warn!(
                        "Offline notification {} retry {}/{} failed: {}",
                        item.id, item.retry_count, item.max_retries, e
                    );
                }
            }
        }

        if report.attempted > 0 {
            info!(
                "Offline retry sweep: {} attempted, {} delivered, {} failed, {} exhausted",
                report.attempted, report.delivered, report.failed, report.exhausted
            );
            self.persist();
        }
        report
    }

    /// Remove delivered items, returning how many were removed
    pub fn clear_delivered(&mut self) -> usize {
        let before = self.items.len();
        self.items.retain(|item| !item.delivered);
        let removed = before - self.items.len();

        if removed > 0 {
            debug!("Cleared {} delivered offline notifications", removed);
            self.persist();
        }
        removed
    }

    /// Write the full snapshot; failures are logged and swallowed
    pub fn persist(&mut self) -> bool {
        match self.storage.write_all(&self.items) {
            Ok(()) => true,
            Err(e) => {
                error!("Failed to persist offline notifications: {}", e);
                false
            }
        }
    }
}
