// In app/src/tracing_layer.rs

use chrono::Utc;
use events::{BotEvent, EventSender, LogMessage};
use tracing::{Event, Subscriber};
use tracing_subscriber::Layer;

/// Mirrors every tracing event into the bot-event broadcast so the
/// operational WebSocket carries log lines alongside structured events.
pub struct EventBroadcastLayer {
    tx: EventSender,
}

impl EventBroadcastLayer {
    pub fn new(tx: EventSender) -> Self {
        Self { tx }
    }
}

impl<S> Layer<S> for EventBroadcastLayer
where
    S: Subscriber,
{
    fn on_event(&self, event: &Event<'_>, _ctx: tracing_subscriber::layer::Context<'_, S>) {
        // Create a visitor to extract the message from the event's fields.
        let mut visitor = LogMessageVisitor::new();
        event.record(&mut visitor);
        let log_message = LogMessage {
            timestamp: Utc::now(),
            level: event.metadata().level().to_string(),
            message: visitor.message,
        };
        let _ = self.tx.send(BotEvent::Log(log_message));
    }
}

// A simple visitor to capture the `message` field of a log event.
struct LogMessageVisitor {
    message: String,
}

impl LogMessageVisitor {
    fn new() -> Self {
        Self {
            message: String::new(),
        }
    }
}

impl tracing::field::Visit for LogMessageVisitor {
    fn record_debug(&mut self, _field: &tracing::field::Field, value: &dyn std::fmt::Debug) {
        self.message = format!("{:?}", value);
    }
}
