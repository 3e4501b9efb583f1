//! # Delivery Statistics Module
//!
//! Per-topic sequence tracking over an unordered, possibly-duplicating,
//! possibly-lossy delivery channel.
//!
//! This module handles:
//! - Counting every arrival per topic, sequenced or not
//! - Classifying sequenced arrivals as first-seen or duplicate
//! - Deriving a missing-count estimate from the observed sequence range
//! - Consistent point-in-time snapshots for the shutdown report
//!
//! The missing estimate `max(0, (max - min + 1) - unique)` assumes
//! contiguous, monotonically assigned sequence numbers per topic. It cannot
//! distinguish "never sent" from "sent but lost", and a producer that resets
//! its counter mid-run undercounts loss across the reset boundary. Both are
//! inherent estimator limitations, not defects.

pub mod report;

use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::Mutex;

/// Mutable per-topic tracking state
#[derive(Debug, Default)]
struct SequenceTracker {
    recv_total: u64,
    seen: HashSet<u64>,
    duplicates: u64,
    min_seq: Option<u64>,
    max_seq: Option<u64>,
}

impl SequenceTracker {
    /// Record one arrival
    ///
    /// An absent sequence number increments the total only (duplicate and
    /// loss detection are disabled for that message). Bounds track the
    /// literal minimum and maximum observed, not arrival order, since
    /// out-of-order delivery is expected.
    fn record(&mut self, seq: Option<u64>) {
        self.recv_total += 1;

        let Some(seq) = seq else { return };

        if self.seen.contains(&seq) {
            self.duplicates += 1;
        } else {
            self.seen.insert(seq);
            self.min_seq = Some(self.min_seq.map_or(seq, |m| m.min(seq)));
            self.max_seq = Some(self.max_seq.map_or(seq, |m| m.max(seq)));
        }
    }

    fn summary(&self) -> ChannelSummary {
        let unique = self.seen.len() as u64;
        let missing = match (self.min_seq, self.max_seq) {
            // The span saturates rather than overflowing when the observed
            // range covers the whole u64 domain
            (Some(min), Some(max)) => (max - min).saturating_add(1).saturating_sub(unique),
            _ => 0,
        };

        ChannelSummary {
            recv_total: self.recv_total,
            unique,
            duplicates: self.duplicates,
            missing,
            min_seq: self.min_seq,
            max_seq: self.max_seq,
        }
    }
}

/// Read-only per-topic statistics at a point in time
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChannelSummary {
    /// Total messages received, duplicates included
    pub recv_total: u64,

    /// Distinct sequence numbers seen
    pub unique: u64,

    /// Arrivals whose sequence number had been seen before
    pub duplicates: u64,

    /// Estimated messages missing from the observed sequence range
    pub missing: u64,

    /// Smallest sequence number observed
    pub min_seq: Option<u64>,

    /// Largest sequence number observed
    pub max_seq: Option<u64>,
}

/// Aggregates delivery statistics across topics
///
/// Safe to share across tasks behind an `Arc`: the whole topic map sits
/// behind one mutex, so lazy entry creation on first sight and per-arrival
/// updates are race-free, and a snapshot can never observe a half-applied
/// update.
#[derive(Debug, Default)]
pub struct StatCollector {
    channels: Mutex<HashMap<String, SequenceTracker>>,
}

impl StatCollector {
    /// Create an empty collector
    pub fn new() -> Self {
        Self::default()
    }

    /// Record one arrival on a topic
    ///
    /// Always succeeds: the statistics path exists precisely to characterize
    /// channel quality, so malformed arrivals (no parseable sequence) are
    /// counted rather than rejected.
    pub fn record(&self, topic: &str, seq: Option<u64>) {
        let mut channels = self.channels.lock().expect("stats mutex poisoned");
        channels.entry(topic.to_string()).or_default().record(seq);
    }

    /// Take a consistent point-in-time snapshot of every topic
    pub fn snapshot(&self) -> BTreeMap<String, ChannelSummary> {
        let channels = self.channels.lock().expect("stats mutex poisoned");
        channels
            .iter()
            .map(|(topic, tracker)| (topic.clone(), tracker.summary()))
            .collect()
    }
}
