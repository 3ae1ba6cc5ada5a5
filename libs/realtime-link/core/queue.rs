//! Outbound message queue
//!
//! FIFO holding area for messages submitted while the channel is not open.
//! Not persisted: a shutdown drops whatever is still queued. Notifications
//! that must survive go to the offline store instead.

use crate::traits::{Message, Result};
use std::collections::VecDeque;
use tracing::{debug, warn};

/// What to do when a bounded queue is full
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OverflowPolicy {
    /// Evict the oldest queued message to make room
    #[default]
    DropOldest,
    /// Discard the incoming message quietly
    DropNewest,
    /// Discard the incoming message and report it
    Reject,
}

/// Capacity and overflow behavior
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct QueuePolicy {
    /// Maximum queued messages (None = unbounded)
    pub capacity: Option<usize>,
    pub overflow: OverflowPolicy,
}

impl QueuePolicy {
    pub fn unbounded() -> Self {
        Self::default()
    }

    pub fn bounded(capacity: usize, overflow: OverflowPolicy) -> Self {
        Self {
            capacity: Some(capacity),
            overflow,
        }
    }
}

/// Result of `enqueue`
#[derive(Debug, Clone, PartialEq)]
pub enum EnqueueOutcome {
    Queued,
    /// Queued after evicting this message
    Evicted(Message),
    /// Incoming message was discarded quietly
    Discarded(Message),
    /// Incoming message was discarded and should be reported
    Rejected(Message),
}

/// Result of `flush`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FlushReport {
    pub sent: usize,
    pub remaining: usize,
}

/// FIFO of messages waiting for an open channel
///
/// No deduplication: the same message enqueued twice is sent twice.
#[derive(Debug, Default)]
pub struct MessageQueue {
    items: VecDeque<Message>,
    policy: QueuePolicy,
}

impl MessageQueue {
    pub fn new(policy: QueuePolicy) -> Self {
        Self {
            items: VecDeque::new(),
            policy,
        }
    }

    pub fn policy(&self) -> QueuePolicy {
        self.policy
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Ids in send order
    pub fn ids(&self) -> Vec<String> {
        self.items.iter().map(|m| m.id().to_string()).collect()
    }

    pub fn enqueue(&mut self, message: Message) -> EnqueueOutcome {
        let full = self
            .policy
            .capacity
            .map_or(false, |cap| self.items.len() >= cap);

        if !full {
            debug!("Queued message {} ({} pending)", message.id(), self.items.len() + 1);
            self.items.push_back(message);
            return EnqueueOutcome::Queued;
        }

        match self.policy.overflow {
            OverflowPolicy::DropOldest => match self.items.pop_front() {
                Some(evicted) => {
                    warn!("Queue full, evicting oldest message {}", evicted.id());
                    self.items.push_back(message);
                    EnqueueOutcome::Evicted(evicted)
                }
                // capacity 0: nothing to evict, nowhere to put it
                None => EnqueueOutcome::Rejected(message),
            },
            OverflowPolicy::DropNewest => {
                debug!("Queue full, discarding message {}", message.id());
                EnqueueOutcome::Discarded(message)
            }
            OverflowPolicy::Reject => {
                warn!("Queue full, rejecting message {}", message.id());
                EnqueueOutcome::Rejected(message)
            }
        }
    }

    /// Send queued messages in enqueue order
    ///
    /// Stops at the first failed send; that message and everything after it
    /// stay queued in their original order.
    pub fn flush<F>(&mut self, mut send: F) -> FlushReport
    where
        F: FnMut(&Message) -> Result<()>,
    {
        let mut sent = 0;
        while let Some(message) = self.items.pop_front() {
            if let Err(e) = send(&message) {
                warn!("Flush stopped at message {}: {}", message.id(), e);
                self.items.push_front(message);
                break;
            }
            sent += 1;
        }

        if sent > 0 {
            debug!("Flushed {} queued messages ({} remaining)", sent, self.items.len());
        }
        FlushReport {
            sent,
            remaining: self.items.len(),
        }
    }

    /// Drop everything, returning how many messages were lost
    pub fn clear(&mut self) -> usize {
        let dropped = self.items.len();
        self.items.clear();
        dropped
    }
}
