use crate::common::error::PipelineError;
use crate::infrastructure::queue::{
    Acknowledger, DeliveryStream, InboundMessage, OutboundMessage, Publisher, Subscriber,
};
use crate::workers::retry::Disposition;
use async_trait::async_trait;
use futures_util::StreamExt;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

const INITIAL_BACKOFF: Duration = Duration::from_secs(1);
const MAX_BACKOFF: Duration = Duration::from_secs(30);

#[async_trait]
pub trait MessageHandler: Send + Sync {
    /// Processes one message. Returning `Ok` means every side effect the
    /// message requires is durable and the delivery may be acknowledged.
    async fn handle(&self, message: &InboundMessage) -> Result<(), PipelineError>;

    fn on_failure(&self, error: &PipelineError, attempt: u32) -> Disposition;
}

/// Runs the handler on one delivery and settles it.
pub async fn process<H, A, P>(
    handler: &H,
    message: &InboundMessage,
    acker: &A,
    publisher: &P,
) -> Disposition
where
    H: MessageHandler + ?Sized,
    A: Acknowledger + ?Sized,
    P: Publisher + ?Sized,
{
    let disposition = match handler.handle(message).await {
        Ok(()) => Disposition::Ack,
        Err(err) => {
            let disposition = handler.on_failure(&err, message.attempt);
            match disposition {
                Disposition::DeadLetter => error!(
                    queue = %message.queue,
                    attempt = message.attempt,
                    "❌ Dead-lettering message: {}", err
                ),
                _ => warn!(
                    queue = %message.queue,
                    attempt = message.attempt,
                    redelivered = message.redelivered,
                    ?disposition,
                    "Message failed: {}", err
                ),
            }
            disposition
        }
    };

    settle(disposition, message, acker, publisher).await;
    disposition
}

async fn settle<A, P>(disposition: Disposition, message: &InboundMessage, acker: &A, publisher: &P)
where
    A: Acknowledger + ?Sized,
    P: Publisher + ?Sized,
{
    let result = match disposition {
        Disposition::Ack => acker.ack().await,
        Disposition::DeadLetter => acker.nack(false).await,
        Disposition::Retry(delay) => {
            let retry = OutboundMessage::retry_of(message, delay);
            match publisher.publish(&message.queue, retry).await {
                Ok(()) => acker.ack().await,
                Err(e) => {
                    // The original stays on the queue; the broker redelivers it.
                    warn!(queue = %message.queue, "Failed to schedule retry: {}", e);
                    acker.nack(true).await
                }
            }
        }
    };

    if let Err(e) = result {
        error!(queue = %message.queue, "Failed to settle delivery: {}", e);
    }
}

/// Consume loop for one work queue.
///
/// Re-subscribes with capped exponential back-off whenever the delivery
/// stream ends. Cancelling `shutdown` stops intake of new deliveries; a
/// message already being processed is settled first.
pub struct QueueConsumer {
    subscriber: Arc<dyn Subscriber>,
    publisher: Arc<dyn Publisher>,
    queue: String,
    consumer_tag: String,
    prefetch: u16,
    initial_backoff: Duration,
}

impl QueueConsumer {
    /// `publisher` schedules retries back onto `queue`.
    pub fn new(
        subscriber: Arc<dyn Subscriber>,
        publisher: Arc<dyn Publisher>,
        queue: &str,
        consumer_tag: &str,
        prefetch: u16,
    ) -> Self {
        Self {
            subscriber,
            publisher,
            queue: queue.to_string(),
            consumer_tag: consumer_tag.to_string(),
            prefetch: prefetch.max(1),
            initial_backoff: INITIAL_BACKOFF,
        }
    }

    #[cfg(test)]
    fn with_initial_backoff(mut self, backoff: Duration) -> Self {
        self.initial_backoff = backoff.min(MAX_BACKOFF);
        self
    }

    pub async fn run<H: MessageHandler>(&self, handler: &H, shutdown: CancellationToken) {
        let mut backoff = self.initial_backoff;

        while !shutdown.is_cancelled() {
            match self
                .subscriber
                .subscribe(&self.queue, &self.consumer_tag, self.prefetch)
                .await
            {
                Ok(deliveries) => {
                    info!("🎧 Listening on '{}'", self.queue);
                    backoff = self.initial_backoff;
                    self.drain(deliveries, handler, &shutdown).await;
                }
                Err(e) => error!("Failed to subscribe to '{}': {}", self.queue, e),
            }

            if shutdown.is_cancelled() {
                break;
            }

            warn!("Consumer for '{}' stopped, retrying in {:?}", self.queue, backoff);
            tokio::select! {
                _ = shutdown.cancelled() => break,
                _ = tokio::time::sleep(backoff) => {}
            }
            backoff = next_backoff(backoff);
        }

        info!("Consumer for '{}' shut down", self.queue);
    }

    async fn drain<H: MessageHandler>(
        &self,
        mut deliveries: DeliveryStream,
        handler: &H,
        shutdown: &CancellationToken,
    ) {
        loop {
            let next = tokio::select! {
                biased;
                _ = shutdown.cancelled() => return,
                next = deliveries.next() => next,
            };

            match next {
                Some(Ok(delivery)) => {
                    process(
                        handler,
                        &delivery.message,
                        delivery.acker.as_ref(),
                        self.publisher.as_ref(),
                    )
                    .await;
                }
                Some(Err(e)) => {
                    error!("Delivery error on '{}': {}", self.queue, e);
                    return;
                }
                None => {
                    warn!("Delivery stream for '{}' closed", self.queue);
                    return;
                }
            }
        }
    }
}

/// Unique tag naming the worker role in the broker's consumer list.
pub fn consumer_tag(role: &str) -> String {
    let id = uuid::Uuid::new_v4().simple().to_string();
    format!("{}-{}", role, &id[..8])
}

fn next_backoff(current: Duration) -> Duration {
    (current * 2).min(MAX_BACKOFF)
}
