//! # Message Bus Module
//!
//! In-process publish/subscribe fabric standing in for an external broker.
//!
//! This module handles:
//! - Topic-addressed message fan-out to any number of subscribers
//! - MQTT-style subscription filters (`+` single level, `#` multi-level tail)
//! - Lag handling: a slow subscriber drops the oldest messages and keeps
//!   going, which the statistics path observes as ordinary transport loss

use bytes::Bytes;
use tokio::sync::broadcast;
use tracing::warn;

/// Default broadcast channel capacity
const DEFAULT_CAPACITY: usize = 1024;

/// One message in flight on the bus
#[derive(Debug, Clone)]
pub struct Message {
    /// Topic the message was published on
    pub topic: String,

    /// Opaque payload bytes
    pub payload: Bytes,
}

/// In-process pub/sub bus
///
/// Cloning is cheap; all clones publish into the same channel.
#[derive(Debug, Clone)]
pub struct Bus {
    tx: broadcast::Sender<Message>,
}

impl Bus {
    /// Create a bus with the default capacity
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_CAPACITY)
    }

    /// Create a bus buffering at most `capacity` undelivered messages
    /// per subscriber
    pub fn with_capacity(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self { tx }
    }

    /// Publish a payload on a topic
    ///
    /// Returns the number of subscribers the message was delivered to.
    /// Zero subscribers is not an error: from the producer's point of view
    /// it is simply "no message observed" downstream.
    pub fn publish(&self, topic: impl Into<String>, payload: impl Into<Bytes>) -> usize {
        let msg = Message {
            topic: topic.into(),
            payload: payload.into(),
        };
        self.tx.send(msg).unwrap_or(0)
    }

    /// Subscribe with a set of topic filters
    ///
    /// The returned subscriber only yields messages whose topic matches at
    /// least one filter.
    pub fn subscribe(&self, filters: &[&str]) -> Subscriber {
        Subscriber {
            rx: self.tx.subscribe(),
            filters: filters.iter().map(|f| f.to_string()).collect(),
        }
    }
}

impl Default for Bus {
    fn default() -> Self {
        Self::new()
    }
}

/// A filtered subscription to the bus
#[derive(Debug)]
pub struct Subscriber {
    rx: broadcast::Receiver<Message>,
    filters: Vec<String>,
}

impl Subscriber {
    /// Receive the next message matching this subscription's filters
    ///
    /// Returns `None` once every publisher handle has been dropped. A
    /// lagged receiver logs a warning and skips to the oldest retained
    /// message rather than failing.
    pub async fn recv(&mut self) -> Option<Message> {
        loop {
            match self.rx.recv().await {
                Ok(msg) => {
                    if self.filters.iter().any(|f| topic_matches(&msg.topic, f)) {
                        return Some(msg);
                    }
                }
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    warn!("Subscriber lagged, {} messages dropped by the bus", skipped);
                }
                Err(broadcast::error::RecvError::Closed) => return None,
            }
        }
    }
}

/// Match a concrete topic against an MQTT-style filter
///
/// `+` matches exactly one level, `#` matches the rest of the topic
/// (including zero levels) and is only meaningful as the final filter level.
pub fn topic_matches(topic: &str, filter: &str) -> bool {
    let mut topic_levels = topic.split('/');
    let mut filter_levels = filter.split('/').peekable();

    loop {
        match (topic_levels.next(), filter_levels.next()) {
            (_, Some("#")) => return filter_levels.peek().is_none(),
            (Some(t), Some(f)) => {
                if f != "+" && f != t {
                    return false;
                }
            }
            (None, None) => return true,
            _ => return false,
        }
    }
}
