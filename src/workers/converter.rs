use crate::common::error::{PipelineError, PipelineResult};
use crate::config::settings::AppConfig;
use crate::infrastructure::codec::ffmpeg::FfmpegExtractor;
use crate::infrastructure::codec::{AudioExtractor, ExtractError};
use crate::infrastructure::queue::rabbitmq::RabbitMqService;
use crate::infrastructure::queue::{InboundMessage, OutboundMessage, Publisher};
use crate::infrastructure::storage::s3::S3BlobStore;
use crate::infrastructure::storage::{BlobStore, discard};
use crate::modules::jobs::{CompletionJob, ConversionJob};
use crate::workers::consumer::{MessageHandler, QueueConsumer, consumer_tag};
use crate::workers::retry::{Disposition, RetryPolicy};
use anyhow::Context;
use async_trait::async_trait;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Turns ConversionJobs from the video queue into CompletionJobs on the mp3
/// queue.
pub struct ConversionWorker {
    video_store: Arc<dyn BlobStore>,
    audio_store: Arc<dyn BlobStore>,
    extractor: Arc<dyn AudioExtractor>,
    publisher: Arc<dyn Publisher>,
    mp3_queue: String,
    retry: RetryPolicy,
}

impl ConversionWorker {
    pub fn new(
        video_store: Arc<dyn BlobStore>,
        audio_store: Arc<dyn BlobStore>,
        extractor: Arc<dyn AudioExtractor>,
        publisher: Arc<dyn Publisher>,
        mp3_queue: &str,
        retry: RetryPolicy,
    ) -> Self {
        Self {
            video_store,
            audio_store,
            extractor,
            publisher,
            mp3_queue: mp3_queue.to_string(),
            retry,
        }
    }

    /// Runs one ConversionJob through fetch, extract, store and publish.
    ///
    /// Returns only after the CompletionJob is confirmed by the broker. If
    /// the hand-off fails the stored audio is deleted again before the error
    /// is returned.
    pub async fn convert(&self, payload: &[u8]) -> PipelineResult<CompletionJob> {
        let job = ConversionJob::decode(payload)?;
        let video_file_id = job.video_file_id.clone();
        debug!(video_file_id = %video_file_id, "Job received");

        let video = self.video_store.get(&video_file_id).await?;
        debug!(video_file_id = %video_file_id, bytes = video.len(), "Video fetched");

        let audio = self
            .extractor
            .extract(video)
            .await
            .map_err(conversion_error)?;
        debug!(video_file_id = %video_file_id, bytes = audio.len(), "Audio extracted");

        let mp3_file_id = self.audio_store.put(audio).await?;
        info!(video_file_id = %video_file_id, mp3_file_id = %mp3_file_id, "💾 Audio stored");

        let completion = job.complete(mp3_file_id);
        if let Err(e) = self.hand_off(&completion).await {
            warn!(
                video_file_id = %video_file_id,
                mp3_file_id = %completion.mp3_file_id,
                "Publish failed, deleting stored audio"
            );
            if discard(self.audio_store.as_ref(), &completion.mp3_file_id).await {
                debug!(video_file_id = %video_file_id, "Stored audio compensated");
            }
            return Err(e);
        }

        info!(
            video_file_id = %video_file_id,
            mp3_file_id = %completion.mp3_file_id,
            "✅ Completion published"
        );
        Ok(completion)
    }

    async fn hand_off(&self, completion: &CompletionJob) -> PipelineResult<()> {
        let payload = completion.encode()?;
        self.publisher
            .publish(&self.mp3_queue, OutboundMessage::new(payload))
            .await
            .map_err(|e| PipelineError::PublishFailed(e.to_string()))
    }
}

/// Scratch-space and missing-binary failures belong to the host and are
/// retried. A non-zero exit or a timeout is a property of the input and
/// will not improve on redelivery.
fn conversion_error(err: ExtractError) -> PipelineError {
    match err {
        ExtractError::Io(e) => PipelineError::StorageUnavailable(format!("scratch space: {}", e)),
        ExtractError::BinaryNotFound(path) => PipelineError::CodecUnavailable(path),
        err @ (ExtractError::Failed { .. } | ExtractError::Timeout(_)) => {
            PipelineError::ConversionFailed(err.to_string())
        }
    }
}

#[async_trait]
impl MessageHandler for ConversionWorker {
    async fn handle(&self, message: &InboundMessage) -> Result<(), PipelineError> {
        self.convert(&message.payload).await.map(|_| ())
    }

    fn on_failure(&self, error: &PipelineError, attempt: u32) -> Disposition {
        self.retry.disposition(error, attempt)
    }
}

pub async fn start_converter_worker(
    config: AppConfig,
    shutdown: CancellationToken,
) -> anyhow::Result<()> {
    info!("🎥 Starting Conversion Worker...");

    let extractor = FfmpegExtractor::locate(config.ffmpeg_path.as_deref(), config.extraction_timeout)
        .context("Failed to locate ffmpeg")?;
    if !extractor.has_mp3_encoder().await? {
        anyhow::bail!(
            "{} has no libmp3lame encoder",
            extractor.binary().display()
        );
    }

    let client = S3BlobStore::client_from_config(&config)?;
    let video_store = S3BlobStore::new(client.clone(), &config.minio_bucket_videos);
    let audio_store = S3BlobStore::new(client, &config.minio_bucket_mp3s);
    video_store.ensure_bucket().await?;
    audio_store.ensure_bucket().await?;

    let broker = RabbitMqService::new(
        &config.rabbitmq_url,
        &[config.video_queue.as_str(), config.mp3_queue.as_str()],
    )
    .await
    .context("Failed to connect to RabbitMQ")?;

    let broker = Arc::new(broker);
    let worker = ConversionWorker::new(
        Arc::new(video_store),
        Arc::new(audio_store),
        Arc::new(extractor),
        broker.clone(),
        &config.mp3_queue,
        RetryPolicy::new(config.max_delivery_attempts, config.retry_delay),
    );

    let consumer = QueueConsumer::new(
        broker.clone(),
        broker,
        &config.video_queue,
        &consumer_tag("converter"),
        config.prefetch_count,
    );
    consumer.run(&worker, shutdown).await;

    info!("🎥 Conversion Worker stopped");
    Ok(())
}
