//! Storage types

use std::collections::HashMap;

use bytes::Bytes;
use chrono::{DateTime, Utc};
use futures::stream::BoxStream;
use futures::TryStreamExt;
use serde::Serialize;

use crate::error::StoreError;

/// Metadata key under which the source file's extension is kept
pub const ORIGINAL_EXTENSION_KEY: &str = "original-extension";

/// User metadata attached to a stored object
pub type Metadata = HashMap<String, String>;

/// Lazily-read, forward-only body of a stored object
pub type BlobStream = BoxStream<'static, Result<Bytes, StoreError>>;

/// Metadata about a storage object (HEAD result)
#[derive(Debug, Clone, Serialize)]
pub struct ObjectMetadata {
    pub key: String,
    pub size: i64,
    pub last_modified: Option<DateTime<Utc>>,
    pub content_type: Option<String>,
    /// User metadata map, `None` when the backend returned none
    pub metadata: Option<Metadata>,
}

impl ObjectMetadata {
    /// Extension recorded at upload time, if any
    pub fn original_extension(&self) -> Option<&str> {
        self.metadata
            .as_ref()
            .and_then(|m| m.get(ORIGINAL_EXTENSION_KEY))
            .map(String::as_str)
    }
}

/// Durable object storage keyed by file name
#[async_trait::async_trait]
pub trait BlobStore: Send + Sync {
    /// Upload `body` under `key`, replacing any existing object
    async fn put(&self, key: &str, body: Bytes, metadata: Metadata) -> Result<(), StoreError>;

    /// Open the object's body as a stream
    async fn get(&self, key: &str) -> Result<BlobStream, StoreError>;

    /// Fetch only the object's metadata
    async fn stat(&self, key: &str) -> Result<ObjectMetadata, StoreError>;
}

/// Drain a blob stream into memory
pub async fn read_to_end(stream: BlobStream) -> Result<Vec<u8>, StoreError> {
    stream
        .try_fold(Vec::new(), |mut acc, chunk| async move {
            acc.extend_from_slice(&chunk);
            Ok(acc)
        })
        .await
}
