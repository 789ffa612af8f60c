//! Event log — bounded, append-only history of mode changes.

use std::collections::VecDeque;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tokio::sync::RwLock;

use toll_core::epoch_millis;

/// Entries retained before the oldest are discarded.
pub const EVENT_LOG_CAPACITY: usize = 500;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    CanaryStart,
    Rollback,
    Promote,
    ModeSet,
    CanaryTraffic,
    ShadowStart,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Event {
    pub ts_ms: u64,
    pub kind: EventKind,
    pub payload: Map<String, Value>,
}

/// Shared handle to the event history.
#[derive(Clone)]
pub struct EventLog {
    entries: Arc<RwLock<VecDeque<Event>>>,
    capacity: usize,
}

impl Default for EventLog {
    fn default() -> Self {
        Self::new()
    }
}

impl EventLog {
    pub fn new() -> Self {
        Self::with_capacity(EVENT_LOG_CAPACITY)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            entries: Arc::new(RwLock::new(VecDeque::with_capacity(capacity))),
            capacity,
        }
    }

    /// Append an event stamped with the current time.
    ///
    /// A non-object payload is stored under a `value` key.
    pub async fn append(&self, kind: EventKind, payload: Value) -> Event {
        let payload = match payload {
            Value::Object(map) => map,
            Value::Null => Map::new(),
            other => Map::from_iter([("value".to_string(), other)]),
        };
        let event = Event {
            ts_ms: epoch_millis(),
            kind,
            payload,
        };

        let mut entries = self.entries.write().await;
        entries.push_back(event.clone());
        while entries.len() > self.capacity {
            entries.pop_front();
        }
        event
    }

    /// The last `n` events, oldest first.
    pub async fn recent(&self, n: usize) -> Vec<Event> {
        let entries = self.entries.read().await;
        let skip = entries.len().saturating_sub(n);
        entries.iter().skip(skip).cloned().collect()
    }

    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.entries.read().await.is_empty()
    }
}
