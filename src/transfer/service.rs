//! Transfer Facade
//!
//! Entry points used by the upload and download handlers.

use std::path::Path;
use std::sync::Arc;

use crate::error::{Result, StoreError, TransferError};
use crate::storage::{BlobStore, BlobStream};

use super::sender::ChunkSender;

/// A stored file ready to be relayed to a client
pub struct Download {
    pub stream: BlobStream,
    /// File name plus its original extension, for `Content-Disposition`
    pub download_name: String,
}

impl std::fmt::Debug for Download {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Download")
            .field("download_name", &self.download_name)
            .finish_non_exhaustive()
    }
}

/// Extension of a client-side file name, with its leading dot (`.pdf`), or empty
pub fn original_extension(client_file_name: &str) -> String {
    Path::new(client_file_name)
        .extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| format!(".{}", ext))
        .unwrap_or_default()
}

/// Upload dispatch and download preparation
#[derive(Clone)]
pub struct TransferService {
    sender: ChunkSender,
    store: Arc<dyn BlobStore>,
    max_upload_size: usize,
}

impl TransferService {
    pub fn new(sender: ChunkSender, store: Arc<dyn BlobStore>, max_upload_size: usize) -> Self {
        Self {
            sender,
            store,
            max_upload_size,
        }
    }

    pub fn max_upload_size(&self) -> usize {
        self.max_upload_size
    }

    /// Dispatch `buffer` as chunks under `file_name`.
    ///
    /// Succeeds once every chunk was accepted by the channel; the file is
    /// persisted later, when the receiving side has all of them.
    pub async fn upload(
        &self,
        file_name: &str,
        original_extension: &str,
        buffer: &[u8],
    ) -> Result<usize> {
        if file_name.is_empty() {
            return Err(TransferError::Validation("fileName is required".to_string()));
        }
        if buffer.len() > self.max_upload_size {
            return Err(TransferError::FileTooLarge {
                size: buffer.len(),
                max: self.max_upload_size,
            });
        }

        tracing::info!(file_name = %file_name, size = buffer.len(), "Uploading file");

        let total_chunks = self
            .sender
            .split_and_send(original_extension, buffer, file_name)
            .await?;

        tracing::info!(
            file_name = %file_name,
            total_chunks = total_chunks,
            "Upload request sent successfully"
        );

        Ok(total_chunks)
    }

    /// Resolve the download name and open the stored body
    pub async fn prepare_download(&self, file_name: &str) -> Result<Download> {
        tracing::info!("Attempting to download file: {}", file_name);

        let stat = self.store.stat(file_name).await.map_err(|e| match e {
            StoreError::NotFound(_) => TransferError::NotFound(file_name.to_string()),
            other => {
                tracing::error!("Error retrieving metadata for {}: {}", file_name, other);
                TransferError::Store(other)
            }
        })?;

        if stat.metadata.is_none() {
            return Err(TransferError::NotFound(file_name.to_string()));
        }

        let download_name = format!("{}{}", file_name, stat.original_extension().unwrap_or(""));

        let stream = self.store.get(file_name).await.map_err(|e| match e {
            StoreError::NotFound(_) => TransferError::NotFound(download_name.clone()),
            other => TransferError::Store(other),
        })?;

        tracing::info!("File download initiated for: {}", download_name);

        Ok(Download {
            stream,
            download_name,
        })
    }
}
