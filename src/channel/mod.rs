//! Publish/subscribe message channel
//!
//! The transfer core only relies on the contract below: a publish either
//! hands the payload to the transport or fails, and subscribers receive
//! payloads asynchronously. Nothing is promised about ordering across
//! messages, duplicate delivery, or acknowledgment from the subscriber back
//! to the publisher. Each implementation states what it does provide through
//! [`DeliveryGuarantees`], so an ordered or at-least-once transport can be
//! swapped in without touching the reassembly side.

mod local;

pub use local::LocalChannel;

use bytes::Bytes;
use tokio::sync::mpsc;

use crate::error::ChannelError;

/// A payload delivered on a topic
#[derive(Debug, Clone)]
pub struct Message {
    pub topic: String,
    pub payload: Bytes,
}

/// What a channel implementation promises about delivery
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DeliveryGuarantees {
    /// Messages from one publisher arrive in publish order
    pub ordered: bool,
    /// A message that was accepted is delivered at least once, even across restarts
    pub at_least_once: bool,
    /// Publishers learn when a subscriber has processed a message
    pub acknowledged: bool,
}

/// Publish/subscribe transport
#[async_trait::async_trait]
pub trait MessageChannel: Send + Sync {
    /// Hand `payload` to the transport. Returns once the transport accepted it,
    /// not once any subscriber processed it.
    async fn publish(&self, topic: &str, payload: Bytes) -> Result<(), ChannelError>;

    /// Receive every later message whose topic matches `filter`
    async fn subscribe(&self, filter: &str) -> Result<Subscription, ChannelError>;

    fn guarantees(&self) -> DeliveryGuarantees {
        DeliveryGuarantees::default()
    }
}

/// Receiving end of a subscription
pub struct Subscription {
    receiver: mpsc::Receiver<Message>,
}

impl Subscription {
    pub fn new(receiver: mpsc::Receiver<Message>) -> Self {
        Self { receiver }
    }

    /// Next delivered message. Returns `None` once the channel is closed.
    pub async fn recv(&mut self) -> Option<Message> {
        self.receiver.recv().await
    }
}

/// MQTT-style topic matching: `+` matches one level, a trailing `#` the rest
pub fn topic_matches(filter: &str, topic: &str) -> bool {
    let mut filter_levels = filter.split('/');
    let mut topic_levels = topic.split('/');

    loop {
        match (filter_levels.next(), topic_levels.next()) {
            (Some("#"), _) => return filter_levels.next().is_none(),
            (Some("+"), Some(_)) => continue,
            (Some(f), Some(t)) if f == t => continue,
            (None, None) => return true,
            _ => return false,
        }
    }
}
