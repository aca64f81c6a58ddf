//! Tracing layer that captures facility lines into a [`TraceBuffer`].

use std::sync::Arc;

use tracing::{Event, Subscriber};
use tracing_subscriber::{layer::Context, registry::LookupSpan, Layer};

use super::{Facility, TraceBuffer, TraceRecord};

/// Captures events logged on the `proxy_rpc` and `proxy_rpc_ctxt` targets.
///
/// Events on any other target are ignored. The layer sees whatever the subscriber's
/// filter lets through, so a facility switched off by the filter is not captured.
pub struct TraceBufferLayer {
    buffer: Arc<TraceBuffer>,
}

impl TraceBufferLayer {
    #[must_use]
    pub fn new(buffer: Arc<TraceBuffer>) -> Self {
        Self { buffer }
    }
}

#[derive(Default)]
struct MessageVisitor {
    message: Option<String>,
}

impl tracing::field::Visit for MessageVisitor {
    fn record_debug(&mut self, field: &tracing::field::Field, value: &dyn std::fmt::Debug) {
        if field.name() == "message" {
            self.message = Some(format!("{value:?}"));
        }
    }

    fn record_str(&mut self, field: &tracing::field::Field, value: &str) {
        if field.name() == "message" {
            self.message = Some(value.to_string());
        }
    }
}

impl<S> Layer<S> for TraceBufferLayer
where
    S: Subscriber + for<'a> LookupSpan<'a>,
{
    fn on_event(&self, event: &Event<'_>, _ctx: Context<'_, S>) {
        let Some(facility) = Facility::from_target(event.metadata().target()) else {
            return;
        };

        let mut visitor = MessageVisitor::default();
        event.record(&mut visitor);

        if let Some(message) = visitor.message {
            self.buffer.push(TraceRecord::new(facility, message));
        }
    }
}
