//! Event sinks for pipeline observability.
//!
//! The sequencer and the install queue report lifecycle events through an
//! [`EventSink`]. Sinks are passed explicitly; there is no global sink.

mod sink;

pub use sink::{CollectingEventSink, EventSink, LoggingEventSink, NoOpEventSink, RecordedEvent};

use std::sync::Arc;

/// Shared handle to an event sink.
pub type SharedEventSink = Arc<dyn EventSink>;

/// Returns the default sink, which discards events.
#[must_use]
pub fn noop_sink() -> SharedEventSink {
    Arc::new(NoOpEventSink)
}
