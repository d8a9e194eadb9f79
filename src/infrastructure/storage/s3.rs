use super::{BlobId, BlobStore, StorageError};
use crate::config::env::EnvKey;
use crate::config::settings::{AppConfig, ConfigError};
use async_trait::async_trait;
use aws_sdk_s3::config::Builder;
use aws_sdk_s3::error::DisplayErrorContext;
use aws_sdk_s3::operation::create_bucket::CreateBucketError;
use aws_sdk_s3::operation::get_object::GetObjectError;
use aws_sdk_s3::primitives::ByteStream;
use aws_sdk_s3::{Client, config::BehaviorVersion, config::Credentials, config::Region};
use bytes::Bytes;
use tracing::{debug, info};

/// Blob store backed by one bucket of an S3-compatible server (MinIO).
#[derive(Clone)]
pub struct S3BlobStore {
    client: Client,
    bucket: String,
}

impl S3BlobStore {
    pub fn client(endpoint: &str, access_key: &str, secret_key: &str) -> Client {
        let credentials = Credentials::new(access_key, secret_key, None, None, "static");

        let config = Builder::new()
            .behavior_version(BehaviorVersion::latest())
            .region(Region::new("us-east-1"))
            .endpoint_url(endpoint)
            .credentials_provider(credentials)
            .force_path_style(true) // Required for MinIO
            .build();

        Client::from_conf(config)
    }

    /// Builds a client from the `MINIO_*` settings.
    pub fn client_from_config(config: &AppConfig) -> Result<Client, ConfigError> {
        let endpoint = AppConfig::require(&config.minio_url, EnvKey::MinioUrl)?;
        let access_key = AppConfig::require(&config.minio_access_key, EnvKey::MinioAccessKey)?;
        let secret_key = AppConfig::require(&config.minio_secret_key, EnvKey::MinioSecretKey)?;
        Ok(Self::client(endpoint, access_key, secret_key))
    }

    pub fn new(client: Client, bucket: &str) -> Self {
        Self {
            client,
            bucket: bucket.to_string(),
        }
    }

    /// Creates the bucket if it does not exist yet.
    pub async fn ensure_bucket(&self) -> Result<(), StorageError> {
        if self
            .client
            .head_bucket()
            .bucket(&self.bucket)
            .send()
            .await
            .is_ok()
        {
            info!("✅ Bucket '{}' ready", self.bucket);
            return Ok(());
        }

        match self.client.create_bucket().bucket(&self.bucket).send().await {
            Ok(_) => {
                info!("✅ Created bucket '{}'", self.bucket);
                Ok(())
            }
            Err(err) => {
                let message = DisplayErrorContext(&err).to_string();
                match err.into_service_error() {
                    CreateBucketError::BucketAlreadyOwnedByYou(_)
                    | CreateBucketError::BucketAlreadyExists(_) => Ok(()),
                    _ => Err(StorageError::unavailable(message)),
                }
            }
        }
    }
}

#[async_trait]
impl BlobStore for S3BlobStore {
    fn name(&self) -> &str {
        &self.bucket
    }

    async fn put(&self, data: Bytes) -> Result<BlobId, StorageError> {
        let id = BlobId::generate();
        let size = data.len();

        self.client
            .put_object()
            .bucket(&self.bucket)
            .key(id.as_str())
            .body(ByteStream::from(data))
            .send()
            .await
            .map_err(|e| StorageError::unavailable(DisplayErrorContext(&e).to_string()))?;

        debug!(bucket = %self.bucket, blob_id = %id, size, "Stored blob");
        Ok(id)
    }

    async fn get(&self, id: &BlobId) -> Result<Bytes, StorageError> {
        let output = self
            .client
            .get_object()
            .bucket(&self.bucket)
            .key(id.as_str())
            .send()
            .await
            .map_err(|err| {
                let message = DisplayErrorContext(&err).to_string();
                match err.into_service_error() {
                    GetObjectError::NoSuchKey(_) => StorageError::NotFound(id.clone()),
                    _ => StorageError::unavailable(message),
                }
            })?;

        let body = output
            .body
            .collect()
            .await
            .map_err(|e| StorageError::unavailable(format!("Failed to read blob {}: {}", id, e)))?;

        Ok(body.into_bytes())
    }

    async fn delete(&self, id: &BlobId) -> Result<(), StorageError> {
        // S3 answers 204 for missing keys too, so deletes are naturally idempotent.
        self.client
            .delete_object()
            .bucket(&self.bucket)
            .key(id.as_str())
            .send()
            .await
            .map_err(|e| StorageError::unavailable(DisplayErrorContext(&e).to_string()))?;

        debug!(bucket = %self.bucket, blob_id = %id, "Deleted blob");
        Ok(())
    }
}
