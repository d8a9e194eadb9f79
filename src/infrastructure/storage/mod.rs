//! Content-addressable blob storage.
//!
//! The pipeline runs two independent stores with the same contract: one for
//! uploaded videos and one for derived MP3 audio. Identifiers are assigned by
//! the store on `put` and are never reused.

use async_trait::async_trait;
use bytes::Bytes;
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;
use tracing::{error, warn};
use uuid::Uuid;

#[cfg(test)]
pub mod memory;
pub mod s3;

/// Store-assigned identifier of an immutable blob.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct BlobId(String);

impl BlobId {
    pub fn generate() -> Self {
        Self(Uuid::new_v4().simple().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.trim().is_empty()
    }
}

impl fmt::Display for BlobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<String> for BlobId {
    fn from(value: String) -> Self {
        Self(value)
    }
}

impl From<&str> for BlobId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Blob not found: {0}")]
    NotFound(BlobId),

    #[error("Storage unavailable: {0}")]
    Unavailable(String),
}

impl StorageError {
    pub fn unavailable(message: impl Into<String>) -> Self {
        Self::Unavailable(message.into())
    }
}

#[async_trait]
pub trait BlobStore: Send + Sync {
    /// Human-readable store name, used in logs.
    fn name(&self) -> &str;

    /// Stores an immutable blob and returns its fresh identifier.
    async fn put(&self, data: Bytes) -> Result<BlobId, StorageError>;

    async fn get(&self, id: &BlobId) -> Result<Bytes, StorageError>;

    /// Removes a blob. Stores may report `NotFound` for an id that is already
    /// gone; compensating callers should go through [`discard`].
    async fn delete(&self, id: &BlobId) -> Result<(), StorageError>;
}

/// Deletes a blob created by a step that later failed.
///
/// Returns `true` when the blob is gone afterwards, including when it was
/// already deleted. A `false` return means the blob is orphaned and has been
/// logged for manual cleanup.
pub async fn discard(store: &dyn BlobStore, id: &BlobId) -> bool {
    match store.delete(id).await {
        Ok(()) => true,
        Err(StorageError::NotFound(_)) => {
            warn!(store = store.name(), blob_id = %id, "Blob already deleted");
            true
        }
        Err(e) => {
            error!(store = store.name(), blob_id = %id, error = %e, "Failed to delete orphaned blob");
            false
        }
    }
}
