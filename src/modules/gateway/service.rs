use crate::common::error::{PipelineError, PipelineResult};
use crate::infrastructure::queue::{OutboundMessage, Publisher};
use crate::infrastructure::storage::{BlobId, BlobStore, discard};
use crate::modules::jobs::ConversionJob;
use bytes::Bytes;
use tracing::{info, warn};

pub struct GatewayService;

impl GatewayService {
    /// Stores an uploaded video and enqueues its ConversionJob.
    ///
    /// If the job cannot be handed to the broker the stored video is deleted
    /// before the error is returned.
    pub async fn submit(
        video_store: &dyn BlobStore,
        publisher: &dyn Publisher,
        video_queue: &str,
        video: Bytes,
        username: &str,
    ) -> PipelineResult<ConversionJob> {
        let size = video.len();
        let video_file_id = video_store.put(video).await?;
        let job = ConversionJob::new(video_file_id, username);

        let published = match job.encode() {
            Ok(payload) => publisher
                .publish(video_queue, OutboundMessage::new(payload))
                .await
                .map_err(|e| PipelineError::PublishFailed(e.to_string())),
            Err(e) => Err(e),
        };

        if let Err(e) = published {
            warn!(video_file_id = %job.video_file_id, "Enqueue failed, deleting stored video");
            discard(video_store, &job.video_file_id).await;
            return Err(e);
        }

        info!(
            video_file_id = %job.video_file_id,
            bytes = size,
            "📤 Conversion queued for {}", job.username
        );
        Ok(job)
    }

    pub async fn fetch_audio(audio_store: &dyn BlobStore, mp3_file_id: &str) -> PipelineResult<Bytes> {
        let id = BlobId::from(mp3_file_id);
        if id.is_empty() {
            return Err(PipelineError::NotFound(id));
        }
        Ok(audio_store.get(&id).await?)
    }
}
