use std::collections::VecDeque;
use std::sync::{Arc, Mutex, PoisonError};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::message::{Metadata, Source};

pub const DEFAULT_CAPACITY: usize = 100;

/// A decoded webhook, kept for debugging only. Never persisted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawWebhookEvent {
    pub content: String,
    pub source: Source,
    pub metadata: Metadata,
    pub timestamp: DateTime<Utc>,
}

/// Fixed-capacity FIFO of recent webhook events, local to this process.
///
/// Appending and evicting happen under a single lock acquisition, so the
/// buffer never holds more than `capacity` events even under concurrent
/// requests.
#[derive(Clone)]
pub struct EventLog {
    capacity: usize,
    events: Arc<Mutex<VecDeque<RawWebhookEvent>>>,
}

impl EventLog {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            capacity,
            events: Arc::new(Mutex::new(VecDeque::with_capacity(capacity))),
        }
    }

    pub fn push(&self, event: RawWebhookEvent) {
        // A panic while holding the lock cannot leave the deque half-updated
        let mut events = self.events.lock().unwrap_or_else(PoisonError::into_inner);
        events.push_back(event);
        while events.len() > self.capacity {
            events.pop_front();
        }
    }

    /// Oldest first.
    pub fn snapshot(&self) -> Vec<RawWebhookEvent> {
        let events = self.events.lock().unwrap_or_else(PoisonError::into_inner);
        events.iter().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.events
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

impl Default for EventLog {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}
