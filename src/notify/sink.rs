//! Delivery endpoints for progress events.

use super::Channel;
use thiserror::Error;

/// Sink delivery errors.
#[derive(Debug, Error)]
pub enum SinkError {
    /// The downstream transport rejected the event.
    #[error("delivery failed: {0}")]
    Delivery(String),
}

/// Receives encoded progress events, e.g. a websocket gateway or a message bus.
pub trait NotificationSink: Send {
    /// Delivers one payload. Failures are logged by the dispatcher and the
    /// event is lost.
    fn publish(&mut self, channel: Channel, payload: &str) -> Result<(), SinkError>;
}

/// Sink that writes every event to the log.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogSink;

impl NotificationSink for LogSink {
    fn publish(&mut self, channel: Channel, payload: &str) -> Result<(), SinkError> {
        tracing::info!(target: "notify", %channel, payload, "Progress");
        Ok(())
    }
}
