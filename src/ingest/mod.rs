//! # Ingestion Module
//!
//! The ingestion pipeline: decode, validate, rotate, persist.
//!
//! This module handles:
//! - The coordinator state machine (`Starting → Running → Draining → Stopped`)
//! - Per-message orchestration of codec, validator and rotator
//! - Crash-safe, idempotent shutdown from any trigger (signal, budget
//!   exhaustion, transport closure)

pub mod rotator;
pub mod validator;

use chrono::{DateTime, Utc};
use tokio::sync::watch;
use tracing::{debug, error, info, warn};

use crate::bus::{Message, Subscriber};
use crate::codec;
use crate::error::{IngestError, Result};
use rotator::{FileRotator, SinkStatus};

/// Consecutive storage failures tolerated before ingestion is declared
/// unrecoverable
const MAX_CONSECUTIVE_IO_FAILURES: u32 = 10;

/// Coordinator lifecycle states
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IngestState {
    /// Created, initial sink not yet opened
    Starting,

    /// Accepting and persisting messages
    Running,

    /// Terminal condition reached, releasing resources
    Draining,

    /// All resources released; further triggers are no-ops
    Stopped,
}

/// Orchestrates the ingestion path
///
/// Sole owner of the [`FileRotator`] (and therefore of the open sink and the
/// bucket budget counter). Every accepted record causes exactly one durable
/// row write; rejected or undecodable messages cause none.
#[derive(Debug)]
pub struct Coordinator {
    rotator: FileRotator,
    state: IngestState,
    rows_written: u64,
    rows_rejected: u64,
    io_failures: u32,
}

impl Coordinator {
    /// Create a coordinator in the `Starting` state
    pub fn new(rotator: FileRotator) -> Self {
        Self {
            rotator,
            state: IngestState::Starting,
            rows_written: 0,
            rows_rejected: 0,
            io_failures: 0,
        }
    }

    /// Open the initial sink and transition to `Running`
    ///
    /// Called before any message is accepted, so either a sink is ready for
    /// the first write or the process fails fast.
    ///
    /// # Errors
    ///
    /// Returns error if the environment cannot produce even one bucket
    /// (filesystem failure, or a budget of zero).
    pub fn start(&mut self) -> Result<()> {
        match self.rotator.ensure_sink(Utc::now())? {
            SinkStatus::Ready => {
                self.state = IngestState::Running;
                Ok(())
            }
            SinkStatus::Unavailable => {
                self.shutdown();
                Err(IngestError::Storage(
                    "initial bucket unavailable".to_string(),
                ))
            }
            SinkStatus::BudgetExhausted => {
                self.shutdown();
                Err(IngestError::Storage(
                    "bucket budget exhausted before ingestion started".to_string(),
                ))
            }
        }
    }

    /// Process one inbound message
    ///
    /// Decode → validate → rotate → write one row, flushed before returning.
    /// Rejected records are logged and discarded without rotating or
    /// writing. A write failure invalidates the current bucket until the
    /// next rotation boundary, escalating to a terminal condition only when
    /// failures persist across many consecutive boundaries.
    ///
    /// # Returns
    ///
    /// `true` while ingestion may continue, `false` once a terminal
    /// condition (budget exhaustion, unrecoverable storage) has been reached
    /// and the coordinator has drained.
    pub fn handle_message(&mut self, msg: &Message, received_at: DateTime<Utc>) -> bool {
        if self.state != IngestState::Running {
            return false;
        }

        let record = codec::decode(&msg.payload, received_at);

        if let Err(reason) = validator::validate(&record) {
            warn!(
                "Rejected record on {}: {} (raw: {:?}) | SKIP",
                msg.topic, reason, record.battery
            );
            self.rows_rejected += 1;
            return true;
        }

        match self.rotator.ensure_sink(received_at) {
            Ok(SinkStatus::Ready) => {}
            Ok(SinkStatus::Unavailable) => {
                debug!(
                    "Current bucket unusable, dropping row until the next rotation boundary"
                );
                return true;
            }
            Ok(SinkStatus::BudgetExhausted) => {
                info!("Bucket budget exhausted, draining ingestion");
                self.shutdown();
                return false;
            }
            Err(e) => {
                error!("Failed to rotate bucket: {}", e);
                return self.note_io_failure();
            }
        }

        // Build the complete row in memory before touching the sink so a
        // failure never leaves a partial row behind
        let row = record.csv_row();
        match self.rotator.write_row(&row) {
            Ok(()) => {
                self.io_failures = 0;
                self.rows_written += 1;
                debug!("Saved row: {}", row);
                true
            }
            Err(e) => {
                error!("Failed to write row: {}", e);
                // The bucket is unusable until the next rotation boundary
                self.rotator.invalidate_current();
                self.note_io_failure()
            }
        }
    }

    /// Drain and stop; idempotent
    ///
    /// Closes the sink exactly once regardless of how many triggers fire
    /// (external signal, budget exhaustion, natural completion).
    pub fn shutdown(&mut self) {
        if self.state == IngestState::Stopped {
            return;
        }
        self.state = IngestState::Draining;
        self.rotator.close();
        self.state = IngestState::Stopped;
        info!(
            "Ingestion stopped: {} rows written, {} rejected, {} buckets created",
            self.rows_written,
            self.rows_rejected,
            self.rotator.created_count()
        );
    }

    /// Drive the coordinator from a bus subscription until shutdown
    ///
    /// The shutdown token is observed between message-processing steps, so
    /// no in-flight write is abandoned mid-row. Returns the coordinator so
    /// the caller can inspect its counters after the run.
    ///
    /// # Errors
    ///
    /// Returns error if the initial sink cannot be opened (fail fast).
    pub async fn run(
        mut self,
        mut sub: Subscriber,
        mut shutdown: watch::Receiver<bool>,
    ) -> Result<Self> {
        self.start()?;
        info!("Ingestion running");

        loop {
            tokio::select! {
                msg = sub.recv() => {
                    match msg {
                        Some(msg) => {
                            if !self.handle_message(&msg, Utc::now()) {
                                break;
                            }
                        }
                        None => {
                            info!("Transport closed, draining ingestion");
                            break;
                        }
                    }
                }
                changed = shutdown.changed() => {
                    // A dropped sender counts as a shutdown request
                    if changed.is_err() || *shutdown.borrow() {
                        info!("Shutdown requested, draining ingestion");
                        break;
                    }
                }
            }
        }

        self.shutdown();
        Ok(self)
    }

    /// Current lifecycle state
    pub fn state(&self) -> IngestState {
        self.state
    }

    /// Rows durably written this session
    pub fn rows_written(&self) -> u64 {
        self.rows_written
    }

    /// Records rejected by validation this session
    pub fn rows_rejected(&self) -> u64 {
        self.rows_rejected
    }

    fn note_io_failure(&mut self) -> bool {
        self.io_failures += 1;
        if self.io_failures >= MAX_CONSECUTIVE_IO_FAILURES {
            error!(
                "{} consecutive storage failures, declaring ingestion unrecoverable",
                self.io_failures
            );
            self.shutdown();
            return false;
        }
        true
    }
}
