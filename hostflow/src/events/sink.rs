//! Event sink trait and implementations.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::Serialize;
use serde_json::Value;
use tracing::{debug, info, Level};

/// Receives pipeline and install lifecycle events.
///
/// Event types are dotted names such as `stage.started` or
/// `install.drained`. Payloads are JSON objects keyed by `stage`,
/// `package`, `target` and so on.
#[async_trait]
pub trait EventSink: Send + Sync {
    /// Emits an event from async code.
    async fn emit(&self, event_type: &str, data: Option<Value>);

    /// Emits an event from a synchronous callback, such as an install
    /// queue tick. Must never block or panic.
    fn try_emit(&self, event_type: &str, data: Option<Value>);
}

/// Discards everything. The default sink.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoOpEventSink;

#[async_trait]
impl EventSink for NoOpEventSink {
    async fn emit(&self, _event_type: &str, _data: Option<Value>) {}

    fn try_emit(&self, _event_type: &str, _data: Option<Value>) {}
}

fn str_field<'a>(data: Option<&'a Value>, key: &str) -> Option<&'a str> {
    data.and_then(|d| d.get(key)).and_then(Value::as_str)
}

/// Forwards events to `tracing`, lifting the `stage` and `package`
/// payload keys into structured fields.
#[derive(Debug, Clone)]
pub struct LoggingEventSink {
    level: Level,
}

impl Default for LoggingEventSink {
    fn default() -> Self {
        Self { level: Level::INFO }
    }
}

impl LoggingEventSink {
    /// Logs at `level`. Anything more verbose than INFO logs at DEBUG.
    #[must_use]
    pub fn new(level: Level) -> Self {
        Self { level }
    }

    /// Logs at DEBUG.
    #[must_use]
    pub fn debug() -> Self {
        Self::new(Level::DEBUG)
    }

    fn log_event(&self, event_type: &str, data: Option<&Value>) {
        let stage = str_field(data, "stage").unwrap_or_default();
        let package = str_field(data, "package").unwrap_or_default();
        if self.level > Level::INFO {
            debug!(event = event_type, stage, package, payload = ?data, "Pipeline event");
        } else {
            info!(event = event_type, stage, package, payload = ?data, "Pipeline event");
        }
    }
}

#[async_trait]
impl EventSink for LoggingEventSink {
    async fn emit(&self, event_type: &str, data: Option<Value>) {
        self.log_event(event_type, data.as_ref());
    }

    fn try_emit(&self, event_type: &str, data: Option<Value>) {
        self.log_event(event_type, data.as_ref());
    }
}

/// One event captured by [`CollectingEventSink`].
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RecordedEvent {
    /// Dotted event type.
    pub event_type: String,
    /// Payload, if any.
    pub data: Option<Value>,
    /// When the sink received it.
    pub received_at: DateTime<Utc>,
}

impl RecordedEvent {
    /// String value of a payload key.
    #[must_use]
    pub fn field(&self, key: &str) -> Option<&str> {
        str_field(self.data.as_ref(), key)
    }
}

/// Records events in arrival order.
#[derive(Debug, Default)]
pub struct CollectingEventSink {
    events: Mutex<Vec<RecordedEvent>>,
}

impl CollectingEventSink {
    /// Creates an empty sink.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// All recorded events.
    #[must_use]
    pub fn events(&self) -> Vec<RecordedEvent> {
        self.events.lock().clone()
    }

    /// Recorded event types, in order.
    #[must_use]
    pub fn event_types(&self) -> Vec<String> {
        self.events.lock().iter().map(|e| e.event_type.clone()).collect()
    }

    /// Number of recorded events.
    #[must_use]
    pub fn len(&self) -> usize {
        self.events.lock().len()
    }

    /// Returns true if nothing was recorded.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.events.lock().is_empty()
    }

    /// Events whose type starts with `type_prefix`.
    #[must_use]
    pub fn events_of_type(&self, type_prefix: &str) -> Vec<RecordedEvent> {
        self.filtered(|e| e.event_type.starts_with(type_prefix))
    }

    /// Events whose payload names `stage`.
    #[must_use]
    pub fn for_stage(&self, stage: &str) -> Vec<RecordedEvent> {
        self.filtered(|e| e.field("stage") == Some(stage))
    }

    /// Packages named by events of exactly `event_type`, in order.
    #[must_use]
    pub fn packages(&self, event_type: &str) -> Vec<String> {
        self.events
            .lock()
            .iter()
            .filter(|e| e.event_type == event_type)
            .filter_map(|e| e.field("package").map(str::to_string))
            .collect()
    }

    fn filtered(&self, keep: impl Fn(&RecordedEvent) -> bool) -> Vec<RecordedEvent> {
        self.events.lock().iter().filter(|e| keep(e)).cloned().collect()
    }

    fn record(&self, event_type: &str, data: Option<Value>) {
        self.events.lock().push(RecordedEvent {
            event_type: event_type.to_string(),
            data,
            received_at: Utc::now(),
        });
    }
}

#[async_trait]
impl EventSink for CollectingEventSink {
    async fn emit(&self, event_type: &str, data: Option<Value>) {
        self.record(event_type, data);
    }

    fn try_emit(&self, event_type: &str, data: Option<Value>) {
        self.record(event_type, data);
    }
}
