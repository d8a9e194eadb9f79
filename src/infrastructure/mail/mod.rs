use crate::infrastructure::storage::BlobId;
use async_trait::async_trait;
use thiserror::Error;

pub mod relay;

#[derive(Debug, Error)]
pub enum NotifyError {
    #[error("Mail relay unreachable: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("Mail relay rejected message with status {status}: {body}")]
    Rejected { status: u16, body: String },
}

/// Tells a user their MP3 is ready. `recipient` is the job's `username`,
/// passed through as an opaque delivery address.
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn notify(&self, recipient: &str, mp3_file_id: &BlobId) -> Result<(), NotifyError>;
}
