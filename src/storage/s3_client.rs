//! S3-compatible storage client
//!
//! Wraps the AWS SDK for S3-compatible storage access.

use aws_config::BehaviorVersion;
use aws_sdk_s3::{
    config::{Credentials, Region},
    error::DisplayErrorContext,
    primitives::ByteStream,
    Client,
};
use bytes::Bytes;
use chrono::DateTime;
use futures::StreamExt;

use crate::config::StorageConfig;
use crate::error::StoreError;

use super::types::{BlobStore, BlobStream, Metadata, ObjectMetadata};

/// S3-compatible storage client
#[derive(Clone)]
pub struct S3Client {
    client: Client,
    bucket: String,
}

impl S3Client {
    /// Create a new S3 client from configuration
    pub async fn new(config: &StorageConfig) -> Result<Self, StoreError> {
        let credentials = Credentials::new(
            &config.access_key,
            &config.secret_key,
            None,
            None,
            "file-transfer",
        );

        let region = config
            .region
            .clone()
            .unwrap_or_else(|| "us-east-1".to_string());

        let s3_config = aws_sdk_s3::Config::builder()
            .behavior_version(BehaviorVersion::latest())
            .endpoint_url(&config.endpoint)
            .region(Region::new(region))
            .credentials_provider(credentials)
            .force_path_style(config.force_path_style) // MinIO and S3Ninja need path style
            .build();

        let client = Client::from_conf(s3_config);

        // Test connection by checking if bucket exists
        let bucket = config.bucket.clone();
        match client.head_bucket().bucket(&bucket).send().await {
            Ok(_) => {
                tracing::info!("Connected to S3 bucket: {}", bucket);
            }
            Err(e) => {
                tracing::warn!(
                    "Could not verify bucket {}: {}. Will attempt operations anyway.",
                    bucket,
                    DisplayErrorContext(&e)
                );
            }
        }

        Ok(Self { client, bucket })
    }
}

/// Missing-key detection for errors the SDK could not model.
///
/// The HTTP status decides when a raw response exists; the error code text
/// is only consulted without one.
fn looks_like_not_found(status: Option<u16>, message: &str) -> bool {
    match status {
        Some(status) => status == 404,
        None => message.contains("NoSuchKey") || message.contains("NotFound"),
    }
}

#[async_trait::async_trait]
impl BlobStore for S3Client {
    async fn put(&self, key: &str, body: Bytes, metadata: Metadata) -> Result<(), StoreError> {
        tracing::info!(key = %key, size = body.len(), "Uploading file to S3");

        self.client
            .put_object()
            .bucket(&self.bucket)
            .key(key)
            .content_type("application/octet-stream")
            .set_metadata(Some(metadata))
            .body(ByteStream::from(body))
            .send()
            .await
            .map_err(|e| {
                let message = DisplayErrorContext(&e).to_string();
                tracing::error!(key = %key, "File upload failed: {}", message);
                StoreError::Unavailable(format!("Failed to put object {}: {}", key, message))
            })?;

        tracing::info!(key = %key, "File uploaded successfully");
        Ok(())
    }

    async fn get(&self, key: &str) -> Result<BlobStream, StoreError> {
        let response = self
            .client
            .get_object()
            .bucket(&self.bucket)
            .key(key)
            .send()
            .await
            .map_err(|e| {
                let message = DisplayErrorContext(&e).to_string();
                let missing = e
                    .as_service_error()
                    .map(|se| se.is_no_such_key())
                    .unwrap_or(false);
                let status = e.raw_response().map(|r| r.status().as_u16());
                if missing || looks_like_not_found(status, &message) {
                    StoreError::NotFound(key.to_string())
                } else {
                    tracing::error!(key = %key, "Failed to get object: {}", message);
                    StoreError::Unavailable(format!("Failed to get object {}: {}", key, message))
                }
            })?;

        let stream = futures::stream::unfold(response.body, |mut body| async move {
            body.next().await.map(|part| {
                let part = part.map_err(|e| {
                    StoreError::Unavailable(format!("Failed to read object body: {}", e))
                });
                (part, body)
            })
        });

        Ok(stream.boxed())
    }

    async fn stat(&self, key: &str) -> Result<ObjectMetadata, StoreError> {
        let response = self
            .client
            .head_object()
            .bucket(&self.bucket)
            .key(key)
            .send()
            .await
            .map_err(|e| {
                let message = DisplayErrorContext(&e).to_string();
                let missing = e
                    .as_service_error()
                    .map(|se| se.is_not_found())
                    .unwrap_or(false);
                let status = e.raw_response().map(|r| r.status().as_u16());
                if missing || looks_like_not_found(status, &message) {
                    tracing::debug!(key = %key, "Object not found");
                    StoreError::NotFound(key.to_string())
                } else {
                    tracing::error!(key = %key, "Failed to get metadata: {}", message);
                    StoreError::Unavailable(format!("Failed to head object {}: {}", key, message))
                }
            })?;

        Ok(ObjectMetadata {
            key: key.to_string(),
            size: response.content_length().unwrap_or(0),
            last_modified: response
                .last_modified()
                .and_then(|dt| DateTime::from_timestamp(dt.secs(), dt.subsec_nanos())),
            content_type: response.content_type().map(|s| s.to_string()),
            metadata: response.metadata().cloned(),
        })
    }
}
