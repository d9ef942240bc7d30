//! Cross-context status signaling
//!
//! When one context (the webhook ingestor, or a checkout popup landing back
//! on the callback page) learns a payment's terminal status, it tells every
//! other interested context through this channel instead of making each of
//! them poll on its own. Delivery is fire-and-forget and at most once per
//! terminal state; publishing with nobody listening is a no-op, never an
//! error; the context that started the checkout may be long gone.

use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use tracing::debug;

/// Buffered signals per channel before slow receivers start lagging.
const SIGNAL_BUFFER_SIZE: usize = 100;

const MESSAGE_TYPE: &str = "payment_status";

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum SignalStatus {
    Success,
    Failed,
}

/// Wire shape: `{"type": "payment_status", "reference": ..., "status": ...}`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct StatusMessage {
    #[serde(rename = "type")]
    pub message_type: String,
    pub reference: String,
    pub status: SignalStatus,
}

impl StatusMessage {
    pub fn new(reference: impl Into<String>, status: SignalStatus) -> Self {
        Self {
            message_type: MESSAGE_TYPE.to_string(),
            reference: reference.into(),
            status,
        }
    }
}

#[derive(Clone)]
pub struct StatusChannel {
    tx: broadcast::Sender<StatusMessage>,
}

impl Default for StatusChannel {
    fn default() -> Self {
        Self::new()
    }
}

impl StatusChannel {
    pub fn new() -> Self {
        let (tx, _) = broadcast::channel(SIGNAL_BUFFER_SIZE);
        Self { tx }
    }

    /// Publish a terminal status. A send error only means no receiver is
    /// currently subscribed, which is fine.
    pub fn publish(&self, reference: &str, status: SignalStatus) {
        let message = StatusMessage::new(reference, status);
        match self.tx.send(message) {
            Ok(receivers) => {
                debug!(reference = %reference, receivers, "status signal published");
            }
            Err(_) => {
                debug!(reference = %reference, "status signal dropped: no subscribers");
            }
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<StatusMessage> {
        self.tx.subscribe()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn publishing_without_subscribers_does_not_panic() {
        let channel = StatusChannel::new();
        channel.publish("ORD-100-1", SignalStatus::Success);
    }

    #[tokio::test]
    async fn subscribers_receive_published_signals() {
        let channel = StatusChannel::new();
        let mut rx = channel.subscribe();
        channel.publish("ORD-100-1", SignalStatus::Failed);

        let message = rx.recv().await.expect("signal should arrive");
        assert_eq!(message.reference, "ORD-100-1");
        assert_eq!(message.status, SignalStatus::Failed);
        assert_eq!(message.message_type, "payment_status");
    }

    #[test]
    fn message_serializes_to_the_agreed_shape() {
        let message = StatusMessage::new("ORD-100-1", SignalStatus::Success);
        let json = serde_json::to_value(&message).expect("serialization should succeed");
        assert_eq!(json["type"], "payment_status");
        assert_eq!(json["reference"], "ORD-100-1");
        assert_eq!(json["status"], "success");
    }
}
