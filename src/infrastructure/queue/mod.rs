//! Message broker contracts.
//!
//! Work queues are durable and consumed with manual acknowledgement. A
//! message that must be retried is republished with its delivery attempt
//! carried in the [`ATTEMPT_HEADER`] header and a delay before it becomes
//! visible again; one that must be discarded is rejected without requeue and
//! lands in the queue's dead-letter queue.

use async_trait::async_trait;
use futures_util::stream::BoxStream;
use std::time::Duration;
use thiserror::Error;

pub mod rabbitmq;

/// Header carrying the 1-based delivery attempt of a job.
pub const ATTEMPT_HEADER: &str = "x-attempt";

#[derive(Debug, Error)]
pub enum QueueError {
    #[error("Failed to connect to broker: {0}")]
    Connection(String),

    #[error("Failed to declare queue: {0}")]
    Declare(String),

    #[error("Failed to publish message: {0}")]
    Publish(String),

    #[error("Broker refused to confirm publication")]
    NotConfirmed,

    #[error("Failed to settle delivery: {0}")]
    Acknowledge(String),

    #[error("Failed to start consumer: {0}")]
    Consume(String),
}

/// Message to be published.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutboundMessage {
    pub payload: Vec<u8>,
    pub attempt: u32,
    /// Held back by the broker for this long before consumers see it.
    pub delay: Option<Duration>,
}

impl OutboundMessage {
    pub fn new(payload: Vec<u8>) -> Self {
        Self {
            payload,
            attempt: 1,
            delay: None,
        }
    }

    /// Copy of a received message scheduled for its next attempt.
    pub fn retry_of(message: &InboundMessage, delay: Duration) -> Self {
        Self {
            payload: message.payload.clone(),
            attempt: message.attempt.saturating_add(1),
            delay: Some(delay),
        }
    }
}

/// Message received from a work queue.
#[derive(Debug, Clone)]
pub struct InboundMessage {
    pub queue: String,
    pub payload: Vec<u8>,
    pub attempt: u32,
    pub redelivered: bool,
}

#[async_trait]
pub trait Publisher: Send + Sync {
    /// Publishes a persistent message and returns once the broker has
    /// confirmed it.
    async fn publish(&self, queue: &str, message: OutboundMessage) -> Result<(), QueueError>;
}

/// Settles a single delivery.
#[async_trait]
pub trait Acknowledger: Send + Sync {
    async fn ack(&self) -> Result<(), QueueError>;

    /// With `requeue = false` the broker dead-letters the message.
    async fn nack(&self, requeue: bool) -> Result<(), QueueError>;
}

/// A received message and the handle that settles it.
pub struct Delivery {
    pub message: InboundMessage,
    pub acker: Box<dyn Acknowledger>,
}

/// Deliveries of one subscription. The stream ending, or yielding an
/// error, means the subscription is gone.
pub type DeliveryStream = BoxStream<'static, Result<Delivery, QueueError>>;

#[async_trait]
pub trait Subscriber: Send + Sync {
    /// Starts a manual-ack consumer on `queue` with at most `prefetch`
    /// unsettled deliveries.
    async fn subscribe(
        &self,
        queue: &str,
        consumer_tag: &str,
        prefetch: u16,
    ) -> Result<DeliveryStream, QueueError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_messages_start_at_first_attempt() {
        let message = OutboundMessage::new(b"{}".to_vec());
        assert_eq!(message.attempt, 1);
        assert_eq!(message.delay, None);
    }

    #[test]
    fn retry_increments_attempt_and_keeps_payload() {
        let received = InboundMessage {
            queue: "video".to_string(),
            payload: b"{\"a\":1}".to_vec(),
            attempt: 3,
            redelivered: false,
        };

        let retry = OutboundMessage::retry_of(&received, Duration::from_secs(20));
        assert_eq!(retry.attempt, 4);
        assert_eq!(retry.payload, received.payload);
        assert_eq!(retry.delay, Some(Duration::from_secs(20)));
    }
}
