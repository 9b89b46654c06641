//! Event sink for object-level events.
//!
//! Events are fire-and-forget: the engine records them and never reads them
//! back.

use std::fmt;
use std::sync::{Mutex, PoisonError};

use operator_api::{Object, ObjectKind};
use tracing::{info, warn};

/// Severity of an event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventType {
    Normal,
    Warning,
}

impl fmt::Display for EventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Normal => f.write_str("Normal"),
            Self::Warning => f.write_str("Warning"),
        }
    }
}

/// Something that happened to an object.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ObjectEvent {
    pub kind: ObjectKind,
    pub name: String,
    pub event_type: EventType,
    pub reason: String,
    pub message: String,
}

impl ObjectEvent {
    /// A normal event about `object`.
    pub fn normal<T: Object>(
        object: &T,
        reason: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self::new(object, EventType::Normal, reason, message)
    }

    /// A warning about `object`.
    pub fn warning<T: Object>(
        object: &T,
        reason: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self::new(object, EventType::Warning, reason, message)
    }

    fn new<T: Object>(
        object: &T,
        event_type: EventType,
        reason: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self {
            kind: T::KIND,
            name: object.name().to_string(),
            event_type,
            reason: reason.into(),
            message: message.into(),
        }
    }

    /// Event for a pause flag flipping on `object`, if it flips.
    ///
    /// Reasons are `<Kind>Paused` and `<Kind>Restarted`.
    pub fn pause_change<T: Object>(object: &T, current: bool, new: bool, cause: &str) -> Option<Self> {
        if current == new {
            return None;
        }
        let (verb, action) = if new {
            ("Paused", "set to pause")
        } else {
            ("Restarted", "set for restart")
        };
        let message = if cause.is_empty() {
            format!("{} {action}", T::KIND)
        } else {
            format!("{} {action} {cause}", T::KIND)
        };
        Some(Self::normal(object, format!("{}{verb}", T::KIND), message))
    }
}

/// Destination for object events.
pub trait EventRecorder: Send + Sync {
    fn record(&self, event: ObjectEvent);
}

/// Writes events to the tracing subscriber.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingEventRecorder;

impl EventRecorder for TracingEventRecorder {
    fn record(&self, event: ObjectEvent) {
        match event.event_type {
            EventType::Normal => info!(
                kind = %event.kind,
                name = %event.name,
                reason = %event.reason,
                "{}", event.message
            ),
            EventType::Warning => warn!(
                kind = %event.kind,
                name = %event.name,
                reason = %event.reason,
                "{}", event.message
            ),
        }
    }
}

/// Keeps every event in memory.
#[derive(Debug, Default)]
pub struct InMemoryEventRecorder {
    events: Mutex<Vec<ObjectEvent>>,
}

impl InMemoryEventRecorder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of the recorded events, oldest first.
    pub fn events(&self) -> Vec<ObjectEvent> {
        self.events
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Reasons of the events recorded for one object, oldest first.
    pub fn reasons_for(&self, name: &str) -> Vec<String> {
        self.events()
            .into_iter()
            .filter(|e| e.name == name)
            .map(|e| e.reason)
            .collect()
    }
}

impl EventRecorder for InMemoryEventRecorder {
    fn record(&self, event: ObjectEvent) {
        self.events
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(event);
    }
}
