//! Progress events
//!
//! The orchestrator pushes one event per stage boundary plus a terminal
//! event. Sinks are consumer-owned; a sink that panics or whose receiver is
//! gone never affects the turn.

use super::routing::Node;
use crate::state::FinalState;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Mutex;
use tokio::sync::mpsc;
use tracing::warn;
use uuid::Uuid;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProgressEvent {
    pub turn_id: Uuid,
    pub timestamp: DateTime<Utc>,
    #[serde(flatten)]
    pub kind: EventKind,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum EventKind {
    StageStarted { stage: Node },
    StageCompleted { stage: Node, summary: String },
    TurnCompleted { state: FinalState },
    TurnFailed { error: String },
}

impl ProgressEvent {
    pub fn new(turn_id: Uuid, kind: EventKind) -> Self {
        Self {
            turn_id,
            timestamp: Utc::now(),
            kind,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self.kind, EventKind::TurnCompleted { .. } | EventKind::TurnFailed { .. })
    }
}

pub trait EventSink: Send + Sync {
    fn emit(&self, event: ProgressEvent);
}

/// Hand `event` to `sink`, containing any panic raised by the consumer.
pub(crate) fn dispatch(sink: &dyn EventSink, event: ProgressEvent) {
    if catch_unwind(AssertUnwindSafe(|| sink.emit(event))).is_err() {
        warn!("Progress sink panicked; event dropped");
    }
}

pub struct NoopSink;

impl EventSink for NoopSink {
    fn emit(&self, _event: ProgressEvent) {}
}

/// Keeps every event in memory, in emission order.
#[derive(Default)]
pub struct CollectingSink {
    events: Mutex<Vec<ProgressEvent>>,
}

impl CollectingSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<ProgressEvent> {
        match self.events.lock() {
            Ok(events) => events.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }
}

impl EventSink for CollectingSink {
    fn emit(&self, event: ProgressEvent) {
        match self.events.lock() {
            Ok(mut events) => events.push(event),
            Err(poisoned) => poisoned.into_inner().push(event),
        }
    }
}

/// Forwards events to a tokio channel; the receiver may go away at any time.
pub struct ChannelSink {
    tx: mpsc::UnboundedSender<ProgressEvent>,
}

impl ChannelSink {
    pub fn new(tx: mpsc::UnboundedSender<ProgressEvent>) -> Self {
        Self { tx }
    }

    pub fn channel() -> (Self, mpsc::UnboundedReceiver<ProgressEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }
}

impl EventSink for ChannelSink {
    fn emit(&self, event: ProgressEvent) {
        if self.tx.send(event).is_err() {
            warn!("Progress receiver closed; event dropped");
        }
    }
}

pub struct CallbackSink<F> {
    callback: F,
}

impl<F> CallbackSink<F>
where
    F: Fn(&ProgressEvent) + Send + Sync,
{
    pub fn new(callback: F) -> Self {
        Self { callback }
    }
}

impl<F> EventSink for CallbackSink<F>
where
    F: Fn(&ProgressEvent) + Send + Sync,
{
    fn emit(&self, event: ProgressEvent) {
        (self.callback)(&event);
    }
}
