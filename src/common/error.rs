use crate::infrastructure::storage::{BlobId, StorageError};
use thiserror::Error;

pub type PipelineResult<T> = Result<T, PipelineError>;

/// Failure of one pipeline step for one message.
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("Malformed message: {0}")]
    MalformedMessage(String),

    #[error("Storage unavailable: {0}")]
    StorageUnavailable(String),

    #[error("Blob not found: {0}")]
    NotFound(BlobId),

    #[error("Conversion failed: {0}")]
    ConversionFailed(String),

    /// The codec itself is missing from the host, independent of the input.
    #[error("Codec unavailable: {0}")]
    CodecUnavailable(String),

    #[error("Publish failed: {0}")]
    PublishFailed(String),

    #[error("Notification failed: {0}")]
    NotificationFailed(String),
}

impl PipelineError {
    /// Transient failures worth another delivery. The message content never
    /// changes between deliveries, so parse and codec failures are final.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            PipelineError::StorageUnavailable(_)
                | PipelineError::CodecUnavailable(_)
                | PipelineError::PublishFailed(_)
                | PipelineError::NotificationFailed(_)
        )
    }
}

impl From<StorageError> for PipelineError {
    fn from(err: StorageError) -> Self {
        match err {
            StorageError::NotFound(id) => PipelineError::NotFound(id),
            StorageError::Unavailable(message) => PipelineError::StorageUnavailable(message),
        }
    }
}
