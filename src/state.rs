//! Application state management

use std::sync::Arc;

use crate::channel::MessageChannel;
use crate::config::Config;
use crate::storage::BlobStore;
use crate::transfer::{chunk_count, ChunkSender, ReassemblyEngine, TransferService};

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    inner: Arc<AppStateInner>,
}

struct AppStateInner {
    config: Config,
    channel: Arc<dyn MessageChannel>,
    transfer: TransferService,
    engine: ReassemblyEngine,
}

impl AppState {
    /// Wire the sending and receiving sides over one channel and one store
    pub fn new(config: Config, store: Arc<dyn BlobStore>, channel: Arc<dyn MessageChannel>) -> Self {
        let sender = ChunkSender::new(
            channel.clone(),
            config.transfer.upload_topic.clone(),
            config.transfer.chunk_size,
        );
        let max_total_chunks = chunk_count(config.transfer.max_upload_size, sender.chunk_size());
        let engine = ReassemblyEngine::with_session_ttl(store.clone(), config.transfer.session_ttl)
            .with_max_total_chunks(max_total_chunks);
        let transfer = TransferService::new(sender, store, config.transfer.max_upload_size);

        Self {
            inner: Arc::new(AppStateInner {
                config,
                channel,
                transfer,
                engine,
            }),
        }
    }

    /// Get the configuration
    pub fn config(&self) -> &Config {
        &self.inner.config
    }

    /// Get the message channel
    pub fn channel(&self) -> &Arc<dyn MessageChannel> {
        &self.inner.channel
    }

    /// Get the upload/download facade
    pub fn transfer(&self) -> &TransferService {
        &self.inner.transfer
    }

    /// Get the receiving-side reassembly engine
    pub fn engine(&self) -> &ReassemblyEngine {
        &self.inner.engine
    }
}
