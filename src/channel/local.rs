//! In-process channel on tokio mpsc queues
//!
//! Fire-and-forget fan-out: a message published while nobody subscribes to
//! its topic is dropped, like a non-retained MQTT publish.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use bytes::Bytes;
use parking_lot::RwLock;
use tokio::sync::mpsc;

use crate::config::DEFAULT_CHANNEL_CAPACITY;
use crate::error::ChannelError;

use super::{topic_matches, DeliveryGuarantees, Message, MessageChannel, Subscription};

struct Subscriber {
    filter: String,
    sender: mpsc::Sender<Message>,
}

/// Process-local publish/subscribe channel
#[derive(Clone)]
pub struct LocalChannel {
    inner: Arc<LocalChannelInner>,
}

struct LocalChannelInner {
    subscribers: RwLock<Vec<Subscriber>>,
    /// Per-subscriber queue length; a full queue makes publishers wait
    capacity: usize,
    closed: AtomicBool,
}

impl LocalChannel {
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_CHANNEL_CAPACITY)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            inner: Arc::new(LocalChannelInner {
                subscribers: RwLock::new(Vec::new()),
                capacity: capacity.max(1),
                closed: AtomicBool::new(false),
            }),
        }
    }

    /// Stop accepting publishes and end every subscription once drained
    pub fn close(&self) {
        self.inner.closed.store(true, Ordering::SeqCst);
        self.inner.subscribers.write().clear();
        tracing::debug!("Local channel closed");
    }

    pub fn subscriber_count(&self) -> usize {
        self.inner.subscribers.read().len()
    }
}

impl Default for LocalChannel {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait::async_trait]
impl MessageChannel for LocalChannel {
    async fn publish(&self, topic: &str, payload: Bytes) -> Result<(), ChannelError> {
        if self.inner.closed.load(Ordering::SeqCst) {
            return Err(ChannelError::Closed);
        }

        // Never hold the lock across the sends below.
        let targets: Vec<mpsc::Sender<Message>> = self
            .inner
            .subscribers
            .read()
            .iter()
            .filter(|s| topic_matches(&s.filter, topic))
            .map(|s| s.sender.clone())
            .collect();

        if targets.is_empty() {
            tracing::trace!(topic = %topic, "No subscribers, message dropped");
            return Ok(());
        }

        let mut stale = false;
        for sender in targets {
            let message = Message {
                topic: topic.to_string(),
                payload: payload.clone(),
            };
            if sender.send(message).await.is_err() {
                stale = true;
            }
        }

        if stale {
            self.inner
                .subscribers
                .write()
                .retain(|s| !s.sender.is_closed());
        }

        Ok(())
    }

    async fn subscribe(&self, filter: &str) -> Result<Subscription, ChannelError> {
        if self.inner.closed.load(Ordering::SeqCst) {
            return Err(ChannelError::Closed);
        }

        let (sender, receiver) = mpsc::channel(self.inner.capacity);
        self.inner.subscribers.write().push(Subscriber {
            filter: filter.to_string(),
            sender,
        });

        tracing::debug!(filter = %filter, "Subscribed to topic");
        Ok(Subscription::new(receiver))
    }

    fn guarantees(&self) -> DeliveryGuarantees {
        // A single queue per subscriber keeps one publisher's messages in order.
        DeliveryGuarantees {
            ordered: true,
            at_least_once: false,
            acknowledged: false,
        }
    }
}
