//! Chunk Sender
//!
//! Splits a buffer into fixed-size slices and publishes each one as an
//! independent chunk record. All publishes run concurrently; the call
//! returns once the channel accepted every one of them.

use std::sync::Arc;

use bytes::Bytes;
use futures::future::try_join_all;

use crate::channel::MessageChannel;
use crate::config::DEFAULT_CHUNK_SIZE;
use crate::error::{ChannelError, Result};

use super::types::ChunkMessage;

/// Number of chunks a buffer of `len` bytes splits into.
///
/// An empty buffer still produces one (empty) chunk so the receiver sees a
/// complete session.
pub fn chunk_count(len: usize, chunk_size: usize) -> usize {
    if len == 0 {
        1
    } else {
        len.div_ceil(chunk_size)
    }
}

/// Slice `buffer` into `chunk_size` pieces, the last one possibly shorter
pub fn split_chunks(buffer: &[u8], chunk_size: usize) -> Vec<&[u8]> {
    if buffer.is_empty() {
        vec![buffer]
    } else {
        buffer.chunks(chunk_size).collect()
    }
}

/// Publishes files as chunk records on the upload topic
#[derive(Clone)]
pub struct ChunkSender {
    channel: Arc<dyn MessageChannel>,
    topic: String,
    chunk_size: usize,
}

impl ChunkSender {
    /// If `chunk_size` is 0, [`DEFAULT_CHUNK_SIZE`] is used.
    pub fn new(channel: Arc<dyn MessageChannel>, topic: impl Into<String>, chunk_size: usize) -> Self {
        let chunk_size = if chunk_size == 0 {
            DEFAULT_CHUNK_SIZE
        } else {
            chunk_size
        };
        Self {
            channel,
            topic: topic.into(),
            chunk_size,
        }
    }

    pub fn chunk_size(&self) -> usize {
        self.chunk_size
    }

    /// Split `buffer` and publish every chunk. Returns the chunk count.
    ///
    /// A failed publish fails the whole call; chunks already handed to the
    /// channel are not recalled.
    pub async fn split_and_send(
        &self,
        original_extension: &str,
        buffer: &[u8],
        file_name: &str,
    ) -> Result<usize> {
        let slices = split_chunks(buffer, self.chunk_size);
        let total_chunks = slices.len();

        let publishes = slices.into_iter().enumerate().map(|(index, slice)| {
            let record = ChunkMessage::new(file_name, index, total_chunks, slice, original_extension);
            async move {
                let payload = serde_json::to_vec(&record).map_err(ChannelError::from)?;
                self.channel.publish(&self.topic, Bytes::from(payload)).await
            }
        });

        if let Err(e) = try_join_all(publishes).await {
            tracing::error!(
                file_name = %file_name,
                total_chunks = total_chunks,
                "Failed to upload file chunks: {}",
                e
            );
            return Err(e.into());
        }

        tracing::debug!(
            file_name = %file_name,
            size = buffer.len(),
            total_chunks = total_chunks,
            "Published all chunks"
        );

        Ok(total_chunks)
    }
}
