//! Tracing layer that forwards events into a [`Logger`].
//!
//! The host application keeps using `tracing` macros; every event becomes a
//! [`LogRecord`] and goes through the logger's transports.

use std::fmt::Write as FmtWrite;
use std::sync::Arc;

use tracing::field::{Field, Visit};
use tracing::{Event, Subscriber};
use tracing_subscriber::layer::Context;
use tracing_subscriber::registry::LookupSpan;
use tracing_subscriber::Layer;

use crate::dispatch::Logger;
use crate::level::Severity;
use crate::record::LogRecord;

/// Diagnostics from this crate are never forwarded, so a failing transport
/// cannot feed its own warnings back into itself.
const SELF_TARGET: &str = "applog_core";

/// A tracing Layer that delivers events to a shared [`Logger`].
pub struct TransportLayer {
    logger: Arc<Logger>,
}

impl TransportLayer {
    pub fn new(logger: Arc<Logger>) -> Self {
        Self { logger }
    }

    pub fn logger(&self) -> &Arc<Logger> {
        &self.logger
    }
}

impl<S> Layer<S> for TransportLayer
where
    S: Subscriber + for<'a> LookupSpan<'a>,
{
    fn on_event(&self, event: &Event<'_>, ctx: Context<'_, S>) {
        let metadata = event.metadata();
        let target = metadata.target();
        if target == SELF_TARGET || target.starts_with("applog_core::") {
            return;
        }

        let mut visitor = MessageVisitor::default();
        event.record(&mut visitor);

        let function = ctx
            .event_span(event)
            .map(|span| span.name().to_string())
            .unwrap_or_else(|| "-".to_string());

        let mut record = LogRecord::new(Severity::from(*metadata.level()), visitor.finish())
            .with_module(target)
            .with_function(function);
        if let Some(file) = metadata.file() {
            record = record.with_location(file);
        }

        // Outcomes are already reported through this crate's own diagnostics
        let _ = self.logger.emit(record);
    }
}

/// Collects the `message` field and renders the rest as `key=value`.
#[derive(Default)]
struct MessageVisitor {
    message: String,
    fields: String,
}

impl MessageVisitor {
    fn finish(self) -> String {
        match (self.message.is_empty(), self.fields.is_empty()) {
            (_, true) => self.message,
            (true, false) => self.fields,
            (false, false) => format!("{} {}", self.message, self.fields),
        }
    }

    fn push_field(&mut self, name: &str, value: &dyn std::fmt::Display) {
        if !self.fields.is_empty() {
            self.fields.push(' ');
        }
        let _ = write!(&mut self.fields, "{}={}", name, value);
    }
}

impl Visit for MessageVisitor {
    fn record_debug(&mut self, field: &Field, value: &dyn std::fmt::Debug) {
        if field.name() == "message" {
            let _ = write!(&mut self.message, "{:?}", value);
        } else {
            let rendered = format!("{:?}", value);
            self.push_field(field.name(), &rendered);
        }
    }

    fn record_str(&mut self, field: &Field, value: &str) {
        if field.name() == "message" {
            self.message.push_str(value);
        } else {
            self.push_field(field.name(), &value);
        }
    }

    fn record_error(&mut self, field: &Field, value: &(dyn std::error::Error + 'static)) {
        self.push_field(field.name(), &value);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;
    use tracing_subscriber::prelude::*;

    fn capturing_logger() -> (Arc<Logger>, Arc<Mutex<Vec<LogRecord>>>) {
        let logger = Logger::new("app");
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();
        logger
            .add_transport(crate::Transport::callback("hook", move |r: &LogRecord| {
                sink.lock().push(r.clone());
                Ok(())
            }))
            .unwrap();
        (Arc::new(logger), seen)
    }

    #[test]
    fn test_layer_forwards_events() {
        let (logger, seen) = capturing_logger();
        let subscriber = tracing_subscriber::registry().with(TransportLayer::new(logger));

        tracing::subscriber::with_default(subscriber, || {
            tracing::info!(target: "server::http", "Test message");
            let span = tracing::info_span!("handle_request");
            let _guard = span.enter();
            tracing::warn!(target: "server::http", count = 42, "Warning with field");
        });

        let seen = seen.lock();
        assert_eq!(seen.len(), 2);
        assert_eq!(seen[0].message, "Test message");
        assert_eq!(seen[0].level, Severity::Info);
        assert_eq!(seen[0].module, "server::http");
        assert_eq!(seen[0].function, "-");
        assert_eq!(seen[1].message, "Warning with field count=42");
        assert_eq!(seen[1].level, Severity::Warn);
        assert_eq!(seen[1].function, "handle_request");
    }

    #[test]
    fn test_layer_skips_own_diagnostics() {
        let (logger, seen) = capturing_logger();
        let subscriber = tracing_subscriber::registry().with(TransportLayer::new(logger));

        tracing::subscriber::with_default(subscriber, || {
            tracing::warn!(target: "applog_core::dispatch", "internal");
            tracing::trace!(target: "worker", "traced");
        });

        let seen = seen.lock();
        assert_eq!(seen.len(), 1);
        assert_eq!(seen[0].level, Severity::Debug);
    }
}
