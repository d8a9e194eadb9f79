use super::{
    ATTEMPT_HEADER, Acknowledger, Delivery, DeliveryStream, InboundMessage, OutboundMessage,
    Publisher, QueueError, Subscriber,
};
use async_trait::async_trait;
use futures_util::{StreamExt, stream};
use lapin::{
    BasicProperties, Channel, Connection, ConnectionProperties,
    acker::Acker,
    message::Delivery as AmqpDelivery,
    options::*,
    types::{AMQPValue, FieldTable},
};
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{info, warn};

/// Name of the queue receiving messages rejected from `queue`.
pub fn dead_letter_queue(queue: &str) -> String {
    format!("{}.dead", queue)
}

/// Name of the holding queue for delayed retries of `queue`. It has no
/// consumers; messages expire out of it back into `queue`.
pub fn retry_queue(queue: &str) -> String {
    format!("{}.retry", queue)
}

fn dead_letter_to(target: &str) -> FieldTable {
    let mut arguments = FieldTable::default();
    arguments.insert(
        "x-dead-letter-exchange".into(),
        AMQPValue::LongString("".into()),
    );
    arguments.insert(
        "x-dead-letter-routing-key".into(),
        AMQPValue::LongString(target.into()),
    );
    arguments
}

/// Arguments routing rejected messages through the default exchange into
/// the queue's dead-letter queue.
pub fn dead_letter_arguments(queue: &str) -> FieldTable {
    dead_letter_to(&dead_letter_queue(queue))
}

/// Arguments returning expired messages from the holding queue to `queue`.
pub fn retry_arguments(queue: &str) -> FieldTable {
    dead_letter_to(queue)
}

/// Routing key and per-message expiration (milliseconds) for `message`.
/// Delayed messages are parked in the holding queue until they expire.
pub fn publish_target(queue: &str, message: &OutboundMessage) -> (String, Option<String>) {
    match message.delay {
        Some(delay) => (retry_queue(queue), Some(delay.as_millis().to_string())),
        None => (queue.to_string(), None),
    }
}

/// Declares a durable work queue together with its dead-letter and retry
/// holding queues. Every producer and consumer declares with the same
/// arguments.
pub async fn declare_work_queue(channel: &Channel, queue: &str) -> Result<(), QueueError> {
    let durable = QueueDeclareOptions {
        durable: true,
        ..QueueDeclareOptions::default()
    };
    let dead_letter = dead_letter_queue(queue);
    let retry = retry_queue(queue);

    channel
        .queue_declare(dead_letter.as_str(), durable, FieldTable::default())
        .await
        .map_err(|e| QueueError::Declare(format!("{}: {}", dead_letter, e)))?;

    channel
        .queue_declare(retry.as_str(), durable, retry_arguments(queue))
        .await
        .map_err(|e| QueueError::Declare(format!("{}: {}", retry, e)))?;

    channel
        .queue_declare(queue, durable, dead_letter_arguments(queue))
        .await
        .map_err(|e| QueueError::Declare(format!("{}: {}", queue, e)))?;

    Ok(())
}

/// Reads the delivery attempt header, defaulting to the first attempt.
pub fn attempt_from_headers(headers: Option<&FieldTable>) -> u32 {
    let value = headers.and_then(|table| {
        table
            .inner()
            .iter()
            .find(|(key, _)| key.as_str() == ATTEMPT_HEADER)
            .map(|(_, value)| value)
    });

    let attempt = match value {
        Some(AMQPValue::LongUInt(n)) => Some(*n),
        Some(AMQPValue::LongInt(n)) => u32::try_from(*n).ok(),
        Some(AMQPValue::LongLongInt(n)) => u32::try_from(*n).ok(),
        Some(AMQPValue::ShortUInt(n)) => Some(u32::from(*n)),
        Some(AMQPValue::ShortInt(n)) => u32::try_from(*n).ok(),
        Some(AMQPValue::ShortShortUInt(n)) => Some(u32::from(*n)),
        _ => None,
    };

    attempt.unwrap_or(1).max(1)
}

impl InboundMessage {
    pub fn from_delivery(queue: &str, delivery: &AmqpDelivery) -> Self {
        Self {
            queue: queue.to_string(),
            payload: delivery.data.clone(),
            attempt: attempt_from_headers(delivery.properties.headers().as_ref()),
            redelivered: delivery.redelivered,
        }
    }
}

#[derive(Clone)]
pub struct RabbitMqService {
    url: String,
    queues: Arc<Vec<String>>,
    conn: Arc<Mutex<Connection>>,
    channel: Arc<Mutex<Channel>>,
}

impl RabbitMqService {
    async fn connect(url: &str, queues: &[String]) -> Result<(Connection, Channel), QueueError> {
        info!("Connecting to RabbitMQ");
        let conn = Connection::connect(url, ConnectionProperties::default())
            .await
            .map_err(|e| QueueError::Connection(e.to_string()))?;

        let channel = conn
            .create_channel()
            .await
            .map_err(|e| QueueError::Connection(format!("Failed to create channel: {}", e)))?;

        // Publisher confirms: a publish only succeeds once the broker has
        // taken responsibility for the message.
        channel
            .confirm_select(ConfirmSelectOptions::default())
            .await
            .map_err(|e| QueueError::Connection(format!("Failed to enable confirms: {}", e)))?;

        for queue in queues {
            declare_work_queue(&channel, queue).await?;
        }

        info!("✅ Connected to RabbitMQ");
        Ok((conn, channel))
    }

    /// Opens the connection and declares `queues` with their dead-letter
    /// topology.
    pub async fn new(url: &str, queues: &[&str]) -> Result<Self, QueueError> {
        let queues: Vec<String> = queues.iter().map(|q| q.to_string()).collect();
        let (conn, channel) = Self::connect(url, &queues).await?;

        Ok(Self {
            url: url.to_string(),
            queues: Arc::new(queues),
            conn: Arc::new(Mutex::new(conn)),
            channel: Arc::new(Mutex::new(channel)),
        })
    }

    pub async fn reconnect(&self) -> Result<(), QueueError> {
        warn!("RabbitMQ connection dropped, reconnecting...");
        let (conn, channel) = Self::connect(&self.url, &self.queues).await?;
        *self.conn.lock().await = conn;
        *self.channel.lock().await = channel;
        Ok(())
    }

    async fn publish_internal(&self, queue: &str, message: &OutboundMessage) -> Result<(), QueueError> {
        let channel = self.channel.lock().await;

        let mut headers = FieldTable::default();
        headers.insert(ATTEMPT_HEADER.into(), AMQPValue::LongUInt(message.attempt));

        let (routing_key, expiration) = publish_target(queue, message);
        let mut properties = BasicProperties::default()
            .with_delivery_mode(2) // Persistent
            .with_content_type("application/json".into())
            .with_headers(headers);
        if let Some(expiration) = expiration {
            properties = properties.with_expiration(expiration.into());
        }

        let confirmation = channel
            .basic_publish(
                "",
                routing_key.as_str(),
                BasicPublishOptions::default(),
                &message.payload,
                properties,
            )
            .await
            .map_err(|e| QueueError::Publish(e.to_string()))?
            .await
            .map_err(|e| QueueError::Publish(format!("Failed to confirm publication: {}", e)))?;

        if confirmation.is_nack() {
            return Err(QueueError::NotConfirmed);
        }

        Ok(())
    }

    async fn open_subscription(
        &self,
        queue: &str,
        consumer_tag: &str,
        prefetch: u16,
    ) -> Result<DeliveryStream, QueueError> {
        let channel = {
            let conn = self.conn.lock().await;
            conn.create_channel()
                .await
                .map_err(|e| QueueError::Consume(format!("Failed to create channel: {}", e)))?
        };

        channel
            .basic_qos(prefetch, BasicQosOptions::default())
            .await
            .map_err(|e| QueueError::Consume(format!("Failed to set prefetch: {}", e)))?;

        declare_work_queue(&channel, queue).await?;

        let consumer = channel
            .basic_consume(
                queue,
                consumer_tag,
                BasicConsumeOptions::default(),
                FieldTable::default(),
            )
            .await
            .map_err(|e| QueueError::Consume(e.to_string()))?;

        // The channel travels with the stream so it outlives every delivery
        // still waiting to be settled.
        let queue = queue.to_string();
        let deliveries = stream::unfold((channel, consumer), move |(channel, mut consumer)| {
            let queue = queue.clone();
            async move {
                let item = consumer
                    .next()
                    .await?
                    .map(|delivery| Delivery {
                        message: InboundMessage::from_delivery(&queue, &delivery),
                        acker: Box::new(delivery.acker),
                    })
                    .map_err(|e| QueueError::Consume(e.to_string()));
                Some((item, (channel, consumer)))
            }
        });

        Ok(deliveries.boxed())
    }
}

#[async_trait]
impl Subscriber for RabbitMqService {
    /// Consumes on a channel of its own, reconnecting once if the current
    /// connection is unusable.
    async fn subscribe(
        &self,
        queue: &str,
        consumer_tag: &str,
        prefetch: u16,
    ) -> Result<DeliveryStream, QueueError> {
        match self.open_subscription(queue, consumer_tag, prefetch).await {
            Ok(deliveries) => Ok(deliveries),
            Err(e) => {
                warn!("RabbitMQ subscribe failed: {}. Retrying after reconnect.", e);
                self.reconnect().await?;
                self.open_subscription(queue, consumer_tag, prefetch).await
            }
        }
    }
}

#[async_trait]
impl Publisher for RabbitMqService {
    async fn publish(&self, queue: &str, message: OutboundMessage) -> Result<(), QueueError> {
        if let Err(e) = self.publish_internal(queue, &message).await {
            warn!("RabbitMQ publish failed: {}. Retrying after reconnect.", e);
            self.reconnect().await?;
            self.publish_internal(queue, &message).await?;
        }

        Ok(())
    }
}

#[async_trait]
impl Acknowledger for Acker {
    async fn ack(&self) -> Result<(), QueueError> {
        Acker::ack(self, BasicAckOptions::default())
            .await
            .map(|_| ())
            .map_err(|e| QueueError::Acknowledge(e.to_string()))
    }

    async fn nack(&self, requeue: bool) -> Result<(), QueueError> {
        Acker::nack(
            self,
            BasicNackOptions {
                requeue,
                ..BasicNackOptions::default()
            },
        )
        .await
        .map(|_| ())
        .map_err(|e| QueueError::Acknowledge(e.to_string()))
    }
}
