//! In-process object store
//!
//! Backs the `memory` storage provider and the test suites. Contents are
//! lost when the process exits.

use std::collections::HashMap;
use std::sync::Arc;

use bytes::Bytes;
use chrono::{DateTime, Utc};
use futures::StreamExt;
use parking_lot::RwLock;

use crate::error::StoreError;

use super::types::{BlobStore, BlobStream, Metadata, ObjectMetadata};

/// Size of the pieces `get` yields, so readers see a real multi-part stream
const READ_PART_SIZE: usize = 64 * 1024;

#[derive(Debug, Clone)]
struct StoredObject {
    body: Bytes,
    metadata: Metadata,
    last_modified: DateTime<Utc>,
}

/// Thread-safe in-memory blob store
#[derive(Clone, Default)]
pub struct MemoryStore {
    objects: Arc<RwLock<HashMap<String, StoredObject>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored objects
    pub fn object_count(&self) -> usize {
        self.objects.read().len()
    }
}

#[async_trait::async_trait]
impl BlobStore for MemoryStore {
    async fn put(&self, key: &str, body: Bytes, metadata: Metadata) -> Result<(), StoreError> {
        tracing::debug!(key = %key, size = body.len(), "Storing object in memory");
        self.objects.write().insert(
            key.to_string(),
            StoredObject {
                body,
                metadata,
                last_modified: Utc::now(),
            },
        );
        Ok(())
    }

    async fn get(&self, key: &str) -> Result<BlobStream, StoreError> {
        let body = self
            .objects
            .read()
            .get(key)
            .map(|obj| obj.body.clone())
            .ok_or_else(|| StoreError::NotFound(key.to_string()))?;

        let parts: Vec<Result<Bytes, StoreError>> = (0..body.len())
            .step_by(READ_PART_SIZE)
            .map(|start| Ok(body.slice(start..(start + READ_PART_SIZE).min(body.len()))))
            .collect();

        Ok(futures::stream::iter(parts).boxed())
    }

    async fn stat(&self, key: &str) -> Result<ObjectMetadata, StoreError> {
        let objects = self.objects.read();
        let obj = objects
            .get(key)
            .ok_or_else(|| StoreError::NotFound(key.to_string()))?;

        Ok(ObjectMetadata {
            key: key.to_string(),
            size: obj.body.len() as i64,
            last_modified: Some(obj.last_modified),
            content_type: Some("application/octet-stream".to_string()),
            metadata: Some(obj.metadata.clone()),
        })
    }
}
