//! Subscriber loop feeding the reassembly engine
//!
//! Every delivered message is handled on its own task, so chunks of one
//! file can be processed in parallel. The engine serializes per file name.

use std::sync::Arc;

use tokio::task::{JoinError, JoinHandle, JoinSet};

use crate::channel::MessageChannel;
use crate::error::ChannelError;

use super::reassembly::ReassemblyEngine;

/// Subscribe to `topic` and hand each message to `engine`.
///
/// The returned task ends when the subscription does (channel closed),
/// after the in-flight messages finished.
pub async fn spawn_reassembly_worker(
    channel: Arc<dyn MessageChannel>,
    engine: ReassemblyEngine,
    topic: &str,
) -> Result<JoinHandle<()>, ChannelError> {
    let mut subscription = channel.subscribe(topic).await?;
    tracing::info!(topic = %topic, "Reassembly worker subscribed");

    Ok(tokio::spawn(async move {
        let mut in_flight = JoinSet::new();

        loop {
            tokio::select! {
                message = subscription.recv() => {
                    let Some(message) = message else { break };
                    let engine = engine.clone();
                    in_flight.spawn(async move {
                        match engine.handle_message(&message.payload).await {
                            Ok(Some(file)) => {
                                tracing::debug!(
                                    file_name = %file.file_name,
                                    size = file.size,
                                    "Assembled file persisted"
                                );
                            }
                            Ok(None) => {}
                            Err(e) => {
                                tracing::warn!(
                                    topic = %message.topic,
                                    "Error handling file upload request: {}",
                                    e
                                );
                            }
                        }
                    });
                }
                Some(joined) = in_flight.join_next(), if !in_flight.is_empty() => {
                    report_handler_exit(joined);
                }
            }
        }

        while let Some(joined) = in_flight.join_next().await {
            report_handler_exit(joined);
        }
        tracing::info!("Upload subscription closed, reassembly worker stopped");
    }))
}

/// A panicking handler loses its chunk; make that visible
fn report_handler_exit(joined: Result<(), JoinError>) {
    if let Err(e) = joined {
        tracing::error!("Chunk handler panicked: {}", e);
    }
}
