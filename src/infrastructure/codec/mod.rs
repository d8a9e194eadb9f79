use async_trait::async_trait;
use bytes::Bytes;
use std::time::Duration;
use thiserror::Error;

pub mod ffmpeg;

#[derive(Debug, Error)]
pub enum ExtractError {
    #[error("ffmpeg not found: {0}")]
    BinaryNotFound(String),

    #[error("ffmpeg exited with status {code:?}: {stderr}")]
    Failed { code: Option<i32>, stderr: String },

    #[error("Extraction timed out after {0:?}")]
    Timeout(Duration),

    #[error("Scratch space error: {0}")]
    Io(#[from] std::io::Error),
}

/// Turns a complete video file into MP3 audio.
#[async_trait]
pub trait AudioExtractor: Send + Sync {
    async fn extract(&self, video: Bytes) -> Result<Bytes, ExtractError>;
}
