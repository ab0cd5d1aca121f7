//! AWS S3 blob storage implementation.
//!
//! Document bytes are written to `s3://{bucket}/{key}`, where the key already
//! carries the configured prefix and data set.

use async_trait::async_trait;
use aws_sdk_s3::Client;
use aws_sdk_s3::primitives::ByteStream;

use crate::error::{AppError, Result};
use crate::models::StorageConfig;
use crate::storage::BlobStore;

const PDF_CONTENT_TYPE: &str = "application/pdf";

/// S3-backed blob store.
pub struct S3BlobStore {
    client: Client,
    bucket: String,
}

impl S3BlobStore {
    /// Create a new S3 blob store instance.
    pub fn new(client: Client, bucket: impl Into<String>) -> Self {
        Self {
            client,
            bucket: bucket.into(),
        }
    }

    /// Create S3 storage from the ambient AWS environment.
    ///
    /// `S3_BUCKET` overrides the configured bucket.
    pub async fn from_env(config: &StorageConfig) -> Result<Self> {
        let aws_config = aws_config::load_defaults(aws_config::BehaviorVersion::latest()).await;
        let client = Client::new(&aws_config);

        let bucket = std::env::var("S3_BUCKET").unwrap_or_else(|_| config.bucket.clone());
        if bucket.is_empty() {
            return Err(AppError::config("S3 bucket must not be empty"));
        }

        Ok(Self::new(client, bucket))
    }
}

#[async_trait]
impl BlobStore for S3BlobStore {
    async fn put(&self, bytes: &[u8], key: &str) -> Result<String> {
        self.client
            .put_object()
            .bucket(&self.bucket)
            .key(key)
            .body(ByteStream::from(bytes.to_vec()))
            .content_type(PDF_CONTENT_TYPE)
            .send()
            .await
            .map_err(|e| AppError::storage(key, e.into_service_error()))?;

        log::debug!(
            "Uploaded {} bytes to s3://{}/{}",
            bytes.len(),
            self.bucket,
            key
        );
        Ok(key.to_string())
    }
}
