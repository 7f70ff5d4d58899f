//! Chunk types for the upload topic

use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use bytes::Bytes;
use serde::{Deserialize, Serialize};

use crate::error::TransferError;

// ============================================================================
// Wire Types
// ============================================================================

/// Chunk record as carried on the message channel.
///
/// Every field is optional on the way in so that a record missing one of
/// them is reported as a validation failure instead of a decode failure.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChunkMessage {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub file_name: Option<String>,

    /// Base64-encoded slice of the file
    #[serde(skip_serializing_if = "Option::is_none")]
    pub file_chunk: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub chunk_index: Option<u64>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub total_chunks: Option<u64>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub original_extension: Option<String>,
}

impl ChunkMessage {
    /// Build the record for one slice of an outgoing file
    pub fn new(
        file_name: &str,
        chunk_index: usize,
        total_chunks: usize,
        data: &[u8],
        original_extension: &str,
    ) -> Self {
        Self {
            file_name: Some(file_name.to_string()),
            file_chunk: Some(BASE64.encode(data)),
            chunk_index: Some(chunk_index as u64),
            total_chunks: Some(total_chunks as u64),
            original_extension: Some(original_extension.to_string()),
        }
    }

    /// Decode a record from a channel payload
    pub fn from_payload(payload: &[u8]) -> Result<Self, TransferError> {
        serde_json::from_slice(payload)
            .map_err(|e| TransferError::Validation(format!("Malformed chunk record: {}", e)))
    }

    /// Check required fields and decode the payload.
    pub fn validate(self) -> Result<Chunk, TransferError> {
        let file_name = self
            .file_name
            .filter(|name| !name.is_empty())
            .ok_or_else(|| missing("fileName"))?;
        let encoded = self.file_chunk.ok_or_else(|| missing("fileChunk"))?;
        let index = self.chunk_index.ok_or_else(|| missing("chunkIndex"))?;
        let total = self
            .total_chunks
            .filter(|total| *total > 0)
            .ok_or_else(|| missing("totalChunks"))?;

        if index >= total {
            return Err(TransferError::Assembly(format!(
                "Chunk index out of bounds for {}: {} (total: {})",
                file_name, index, total
            )));
        }

        let total = usize::try_from(total).map_err(|_| {
            TransferError::Validation(format!("totalChunks out of range for {}", file_name))
        })?;

        let payload = BASE64.decode(encoded.as_bytes()).map_err(|e| {
            TransferError::Validation(format!("Invalid fileChunk encoding for {}: {}", file_name, e))
        })?;

        Ok(Chunk {
            file_name,
            index: index as usize,
            total_chunks: total,
            payload: Bytes::from(payload),
            original_extension: self.original_extension.unwrap_or_default(),
        })
    }
}

fn missing(field: &str) -> TransferError {
    TransferError::Validation(format!("Missing file upload data: {}", field))
}

// ============================================================================
// Validated Types
// ============================================================================

/// A validated chunk, `index < total_chunks` holds
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Chunk {
    pub file_name: String,
    pub index: usize,
    pub total_chunks: usize,
    pub payload: Bytes,
    pub original_extension: String,
}

/// A file whose chunks were all received and which has been persisted
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AssembledFile {
    pub file_name: String,
    pub original_extension: String,
    pub size: usize,
    pub total_chunks: usize,
}

/// Progress of a live session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionProgress {
    pub received: usize,
    pub total_chunks: usize,
}
