//! Session change notifications
//!
//! The coordinator emits one event per session save and per processing log
//! row. Delivery is fire-and-forget: a sink never blocks or fails a run.

use serde::{Deserialize, Serialize};
use std::sync::Mutex;
use tokio::sync::broadcast;

use crate::domain::{ProcessingLog, Session};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", content = "payload", rename_all = "snake_case")]
pub enum ScrapeEvent {
    SessionCreated(Session),
    SessionUpdated(Session),
    ProcessingLogCreated(ProcessingLog),
}

impl ScrapeEvent {
    #[must_use]
    pub fn session_id(&self) -> &str {
        match self {
            Self::SessionCreated(s) | Self::SessionUpdated(s) => &s.session_id,
            Self::ProcessingLogCreated(log) => &log.session_id,
        }
    }
}

pub trait EventSink: Send + Sync {
    fn emit(&self, event: ScrapeEvent);
}

/// Fans events out to any number of subscribers
#[derive(Debug, Clone)]
pub struct BroadcastEventSink {
    sender: broadcast::Sender<ScrapeEvent>,
}

impl BroadcastEventSink {
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self { sender }
    }

    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<ScrapeEvent> {
        self.sender.subscribe()
    }
}

impl Default for BroadcastEventSink {
    fn default() -> Self {
        Self::new(256)
    }
}

impl EventSink for BroadcastEventSink {
    fn emit(&self, event: ScrapeEvent) {
        // No subscribers is not an error
        let _ = self.sender.send(event);
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct NoopEventSink;

impl EventSink for NoopEventSink {
    fn emit(&self, _event: ScrapeEvent) {}
}

/// Keeps every event in memory; used by tests and the CLI summary
#[derive(Debug, Default)]
pub struct RecordingEventSink {
    events: Mutex<Vec<ScrapeEvent>>,
}

impl RecordingEventSink {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn events(&self) -> Vec<ScrapeEvent> {
        self.events
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .clone()
    }
}

impl EventSink for RecordingEventSink {
    fn emit(&self, event: ScrapeEvent) {
        self.events
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .push(event);
    }
}
