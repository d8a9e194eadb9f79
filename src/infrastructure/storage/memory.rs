use super::{BlobId, BlobStore, StorageError};
use async_trait::async_trait;
use bytes::Bytes;
use std::collections::HashMap;
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};

/// In-process blob store used by tests.
pub struct MemoryBlobStore {
    name: String,
    blobs: Mutex<HashMap<BlobId, Bytes>>,
    unavailable: AtomicBool,
}

impl MemoryBlobStore {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            blobs: Mutex::new(HashMap::new()),
            unavailable: AtomicBool::new(false),
        }
    }

    /// Seeds a blob under a caller-chosen id.
    pub fn insert(&self, id: &str, data: &[u8]) -> BlobId {
        let id = BlobId::from(id);
        self.blobs
            .lock()
            .unwrap()
            .insert(id.clone(), Bytes::copy_from_slice(data));
        id
    }

    pub fn contains(&self, id: &BlobId) -> bool {
        self.blobs.lock().unwrap().contains_key(id)
    }

    pub fn len(&self) -> usize {
        self.blobs.lock().unwrap().len()
    }

    /// Makes every operation fail with `Unavailable` until reset.
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    fn check(&self) -> Result<(), StorageError> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(StorageError::unavailable(format!("{} is offline", self.name)));
        }
        Ok(())
    }
}

#[async_trait]
impl BlobStore for MemoryBlobStore {
    fn name(&self) -> &str {
        &self.name
    }

    async fn put(&self, data: Bytes) -> Result<BlobId, StorageError> {
        self.check()?;
        let id = BlobId::generate();
        self.blobs.lock().unwrap().insert(id.clone(), data);
        Ok(id)
    }

    async fn get(&self, id: &BlobId) -> Result<Bytes, StorageError> {
        self.check()?;
        self.blobs
            .lock()
            .unwrap()
            .get(id)
            .cloned()
            .ok_or_else(|| StorageError::NotFound(id.clone()))
    }

    async fn delete(&self, id: &BlobId) -> Result<(), StorageError> {
        self.check()?;
        self.blobs
            .lock()
            .unwrap()
            .remove(id)
            .map(|_| ())
            .ok_or_else(|| StorageError::NotFound(id.clone()))
    }
}
