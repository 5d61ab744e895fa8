//! Stage event emission.
//!
//! The engine publishes one `(stage, delta)` event per merged stage. The
//! realtime transport is an external collaborator: it consumes these
//! through an [`EventSink`] or the engine's broadcast channel, and the
//! core only guarantees ordering.

use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock};

use crate::state::StateDelta;

/// Event envelope with run metadata.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StageEvent {
    pub sequence: u64,
    pub run_id: String,
    pub sprint: u32,
    pub stage: String,
    pub timestamp: u64,
    pub delta: StateDelta,
}

/// Event sink trait for emitting stage events.
pub trait EventSink: Send + Sync {
    fn emit(&self, event: &StageEvent);
}

/// A simple logging event sink.
pub struct LoggingEventSink;

impl EventSink for LoggingEventSink {
    fn emit(&self, event: &StageEvent) {
        tracing::debug!(
            sequence = event.sequence,
            stage = %event.stage,
            sprint = event.sprint,
            "stage event"
        );
    }
}

/// A buffering event sink that collects events, mostly for tests and
/// post-run inspection.
#[derive(Clone, Default)]
pub struct BufferingEventSink {
    events: Arc<RwLock<Vec<StageEvent>>>,
}

impl BufferingEventSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<StageEvent> {
        self.events.read().expect("event buffer poisoned").clone()
    }

    pub fn stage_names(&self) -> Vec<String> {
        self.events().into_iter().map(|e| e.stage).collect()
    }

    pub fn clear(&self) {
        self.events.write().expect("event buffer poisoned").clear();
    }
}

impl EventSink for BufferingEventSink {
    fn emit(&self, event: &StageEvent) {
        self.events
            .write()
            .expect("event buffer poisoned")
            .push(event.clone());
    }
}

/// Global sequence counter for events.
static EVENT_SEQUENCE: AtomicU64 = AtomicU64::new(0);

pub fn next_sequence() -> u64 {
    EVENT_SEQUENCE.fetch_add(1, Ordering::SeqCst)
}

pub fn now_ms() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn event(stage: &str) -> StageEvent {
        StageEvent {
            sequence: next_sequence(),
            run_id: "run".into(),
            sprint: 1,
            stage: stage.into(),
            timestamp: now_ms(),
            delta: StateDelta::default(),
        }
    }

    #[test]
    fn buffering_sink_keeps_order() {
        let sink = BufferingEventSink::new();
        sink.emit(&event("product_owner"));
        sink.emit(&event("architect"));
        assert_eq!(sink.stage_names(), vec!["product_owner", "architect"]);
        sink.clear();
        assert!(sink.events().is_empty());
    }

    #[test]
    fn sequence_is_monotonic() {
        let a = next_sequence();
        let b = next_sequence();
        assert!(b > a);
    }
}
