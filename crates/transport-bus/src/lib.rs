//! Topic-addressed pub/sub seam between the overlay protocol and whatever
//! real-time transport carries it.
//!
//! A transport offers three primitives: publish a payload on a named channel,
//! deliver inbound payloads tagged with their source channel, and report
//! connection lifecycle changes. [`LocalBus`] is the in-process implementation
//! used by tests and the harness.

use std::collections::HashMap;

use bytes::Bytes;
use parking_lot::RwLock;
use thiserror::Error;
use tokio::sync::broadcast;

const TOPIC_CAPACITY: usize = 64;
const FIREHOSE_CAPACITY: usize = 256;
const LIFECYCLE_CAPACITY: usize = 16;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BusMessage {
    pub topic: String,
    pub payload: Bytes,
    pub reliable: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PublishOptions {
    pub reliable: bool,
}

impl PublishOptions {
    pub const RELIABLE: PublishOptions = PublishOptions { reliable: true };
    pub const LOSSY: PublishOptions = PublishOptions { reliable: false };
}

impl Default for PublishOptions {
    fn default() -> Self {
        Self::RELIABLE
    }
}

/// Connection lifecycle as reported by the transport.
///
/// `Connected` fires once for the first successful join; `Reconnected` fires
/// after every recovery from a drop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportEvent {
    Connected,
    Reconnected,
    Disconnected,
}

#[derive(Debug, Error)]
pub enum BusError {
    #[error("bus channel closed")]
    Closed,
    #[error("transport not ready")]
    NotReady,
    #[error("bus transport error: {0}")]
    Transport(String),
}

pub type BusResult<T> = Result<T, BusError>;

pub trait Bus: Send + Sync {
    fn subscribe(&self, topic: &str) -> broadcast::Receiver<BusMessage>;
    /// Every message on every topic, in the order the transport delivered them.
    fn subscribe_all(&self) -> broadcast::Receiver<BusMessage>;
    fn lifecycle(&self) -> broadcast::Receiver<TransportEvent>;
    fn publish(&self, topic: &str, payload: Bytes, options: PublishOptions) -> BusResult<()>;
}

/// Simple in-memory bus for tests and non-transport contexts.
#[derive(Debug)]
pub struct LocalBus {
    topics: RwLock<HashMap<String, broadcast::Sender<BusMessage>>>,
    firehose: broadcast::Sender<BusMessage>,
    lifecycle: broadcast::Sender<TransportEvent>,
    ready: RwLock<bool>,
}

impl Default for LocalBus {
    fn default() -> Self {
        Self {
            topics: RwLock::new(HashMap::new()),
            firehose: broadcast::channel(FIREHOSE_CAPACITY).0,
            lifecycle: broadcast::channel(LIFECYCLE_CAPACITY).0,
            ready: RwLock::new(true),
        }
    }
}

impl LocalBus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Toggles whether `publish` accepts messages. A bus that is not ready
    /// behaves like a transport mid-reconnect.
    pub fn set_ready(&self, ready: bool) {
        *self.ready.write() = ready;
    }

    pub fn is_ready(&self) -> bool {
        *self.ready.read()
    }

    /// Emits a lifecycle event to every lifecycle subscriber.
    pub fn signal(&self, event: TransportEvent) {
        match event {
            TransportEvent::Disconnected => self.set_ready(false),
            TransportEvent::Connected | TransportEvent::Reconnected => self.set_ready(true),
        }
        let _ = self.lifecycle.send(event);
    }

    fn sender_for(&self, topic: &str) -> broadcast::Sender<BusMessage> {
        if let Some(sender) = self.topics.read().get(topic) {
            return sender.clone();
        }
        let mut guard = self.topics.write();
        guard
            .entry(topic.to_string())
            .or_insert_with(|| broadcast::channel(TOPIC_CAPACITY).0)
            .clone()
    }
}

impl Bus for LocalBus {
    fn subscribe(&self, topic: &str) -> broadcast::Receiver<BusMessage> {
        self.sender_for(topic).subscribe()
    }

    fn subscribe_all(&self) -> broadcast::Receiver<BusMessage> {
        self.firehose.subscribe()
    }

    fn lifecycle(&self) -> broadcast::Receiver<TransportEvent> {
        self.lifecycle.subscribe()
    }

    fn publish(&self, topic: &str, payload: Bytes, options: PublishOptions) -> BusResult<()> {
        if !self.is_ready() {
            return Err(BusError::NotReady);
        }
        let message = BusMessage {
            topic: topic.to_string(),
            payload,
            reliable: options.reliable,
        };
        // No subscribers is not an error: a peer that has not joined yet simply
        // misses the message, as with a real room.
        let _ = self.firehose.send(message.clone());
        let _ = self.sender_for(topic).send(message);
        Ok(())
    }
}
