//! Store status broadcasting.
//!
//! The store reports what it is doing (recoveries, flushes, backups) as plain
//! status messages. Whoever streams diagnostics to the UI subscribes here; the
//! store never depends on anyone listening.
//!
//! # Example
//!
//! ```rust
//! use keeper_core::event_bus::{StatusBus, StatusKind};
//!
//! let bus = StatusBus::new();
//! let mut rx = bus.subscribe();
//!
//! bus.emit(StatusKind::BackupCreated, "keeper-20260101T000000000000Z-manual.json");
//!
//! // In async context:
//! // let event = rx.recv().await.unwrap();
//! ```

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

/// Default channel capacity for the bus.
/// Slow subscribers lag once more than this many messages are buffered.
const DEFAULT_CAPACITY: usize = 256;

/// What a status message is about.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum StatusKind {
    Loaded,
    Recovered,
    Repaired,
    Flushed,
    FlushFailed,
    BackupCreated,
    BackupFailed,
    Compacted,
    Shutdown,
}

/// A single status message.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusEvent {
    pub kind: StatusKind,
    pub message: String,
    pub timestamp: DateTime<Utc>,
}

impl StatusEvent {
    pub fn new(kind: StatusKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            timestamp: Utc::now(),
        }
    }
}

/// Broadcast channel for store status messages.
pub struct StatusBus {
    sender: broadcast::Sender<StatusEvent>,
}

impl StatusBus {
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_CAPACITY)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    /// Publish a message to all subscribers.
    ///
    /// Returns the number of subscribers that received it (0 when nobody
    /// is listening, in which case the message is dropped).
    pub fn emit(&self, kind: StatusKind, message: impl Into<String>) -> usize {
        self.sender
            .send(StatusEvent::new(kind, message))
            .unwrap_or(0)
    }

    /// Subscribe to future messages. Past messages are not replayed.
    pub fn subscribe(&self) -> broadcast::Receiver<StatusEvent> {
        self.sender.subscribe()
    }

    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl Default for StatusBus {
    fn default() -> Self {
        Self::new()
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn emit_without_subscribers_is_dropped() {
        let bus = StatusBus::new();
        assert_eq!(bus.emit(StatusKind::Flushed, "wrote 1 document"), 0);
    }

    #[test]
    fn subscribe_and_drop_track_count() {
        let bus = StatusBus::default();
        let rx = bus.subscribe();
        assert_eq!(bus.subscriber_count(), 1);

        drop(rx);
        assert_eq!(bus.subscriber_count(), 0);
    }

    #[test]
    fn kind_serializes_camel_case() {
        let event = StatusEvent::new(StatusKind::BackupCreated, "ok");
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["kind"], "backupCreated");
        assert_eq!(json["message"], "ok");
    }

    #[tokio::test]
    async fn subscribers_receive_in_order() {
        let bus = StatusBus::new();
        let mut rx = bus.subscribe();

        bus.emit(StatusKind::Loaded, "first");
        bus.emit(StatusKind::Shutdown, "second");

        let first = rx.recv().await.unwrap();
        let second = rx.recv().await.unwrap();
        assert_eq!(first.kind, StatusKind::Loaded);
        assert_eq!(second.message, "second");
    }

    #[tokio::test]
    async fn late_subscriber_misses_earlier_messages() {
        let bus = StatusBus::new();
        bus.emit(StatusKind::Loaded, "before");

        let mut rx = bus.subscribe();
        bus.emit(StatusKind::Flushed, "after");

        let event = rx.recv().await.unwrap();
        assert_eq!(event.message, "after");
    }
}
