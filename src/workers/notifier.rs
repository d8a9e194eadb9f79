use crate::common::error::{PipelineError, PipelineResult};
use crate::config::env::EnvKey;
use crate::config::settings::AppConfig;
use crate::infrastructure::mail::Notifier;
use crate::infrastructure::mail::relay::MailRelayNotifier;
use crate::infrastructure::queue::InboundMessage;
use crate::infrastructure::queue::rabbitmq::RabbitMqService;
use crate::modules::jobs::CompletionJob;
use crate::workers::consumer::{MessageHandler, QueueConsumer, consumer_tag};
use crate::workers::retry::{Disposition, RetryPolicy};
use anyhow::Context;
use async_trait::async_trait;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

/// What happens to a CompletionJob whose notification could not be sent.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NotifyFailurePolicy {
    /// Log and acknowledge. The user is never told.
    Drop,
    /// Redeliver up to the attempt limit, then dead-letter.
    Retry,
    /// Dead-letter on the first failure.
    DeadLetter,
}

impl FromStr for NotifyFailurePolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "drop" => Ok(Self::Drop),
            "retry" => Ok(Self::Retry),
            "dead_letter" | "dead-letter" => Ok(Self::DeadLetter),
            other => Err(format!("unknown notification failure policy: {}", other)),
        }
    }
}

impl fmt::Display for NotifyFailurePolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Drop => "drop",
            Self::Retry => "retry",
            Self::DeadLetter => "dead_letter",
        };
        f.write_str(name)
    }
}

pub struct NotificationWorker {
    notifier: Arc<dyn Notifier>,
    policy: NotifyFailurePolicy,
    retry: RetryPolicy,
}

impl NotificationWorker {
    pub fn new(notifier: Arc<dyn Notifier>, policy: NotifyFailurePolicy, retry: RetryPolicy) -> Self {
        Self {
            notifier,
            policy,
            retry,
        }
    }

    pub async fn deliver(&self, payload: &[u8]) -> PipelineResult<CompletionJob> {
        let job = CompletionJob::decode(payload)?;

        self.notifier
            .notify(&job.username, &job.mp3_file_id)
            .await
            .map_err(|e| PipelineError::NotificationFailed(e.to_string()))?;

        info!(
            video_file_id = %job.video_file_id,
            mp3_file_id = %job.mp3_file_id,
            "📧 Notified {}", job.username
        );
        Ok(job)
    }
}

#[async_trait]
impl MessageHandler for NotificationWorker {
    async fn handle(&self, message: &InboundMessage) -> Result<(), PipelineError> {
        self.deliver(&message.payload).await.map(|_| ())
    }

    fn on_failure(&self, error: &PipelineError, attempt: u32) -> Disposition {
        match (error, self.policy) {
            (PipelineError::NotificationFailed(_), NotifyFailurePolicy::Drop) => {
                warn!("Dropping undeliverable notification: {}", error);
                Disposition::Ack
            }
            (PipelineError::NotificationFailed(_), NotifyFailurePolicy::DeadLetter) => {
                Disposition::DeadLetter
            }
            _ => self.retry.disposition(error, attempt),
        }
    }
}

pub async fn start_notification_worker(
    config: AppConfig,
    shutdown: CancellationToken,
) -> anyhow::Result<()> {
    info!(
        policy = %config.notify_failure_policy,
        "📧 Starting Notification Worker..."
    );

    let relay_url = AppConfig::require(&config.mail_relay_url, EnvKey::MailRelayUrl)?;
    let sender = AppConfig::require(&config.mail_sender, EnvKey::MailSender)?;
    let notifier = MailRelayNotifier::new(relay_url, sender).context("Failed to build mail client")?;

    let broker = RabbitMqService::new(&config.rabbitmq_url, &[config.mp3_queue.as_str()])
        .await
        .context("Failed to connect to RabbitMQ")?;

    let worker = NotificationWorker::new(
        Arc::new(notifier),
        config.notify_failure_policy,
        RetryPolicy::new(config.max_delivery_attempts, config.retry_delay),
    );

    let broker = Arc::new(broker);
    let consumer = QueueConsumer::new(
        broker.clone(),
        broker,
        &config.mp3_queue,
        &consumer_tag("notifier"),
        config.prefetch_count,
    );
    consumer.run(&worker, shutdown).await;

    info!("📧 Notification Worker stopped");
    Ok(())
}
