//! # File Rotator
//!
//! Owns the currently open output sink and rotates it across minute buckets
//! under a bounded file budget.
//!
//! This module handles:
//! - Deriving the bucket key (one-minute granularity) for a timestamp
//! - Closing the previous sink and opening the next on a key change
//! - Idempotent header initialization (an existing bucket file is appended
//!   to, never truncated or re-headered)
//! - Enforcing the maximum-file budget; exhaustion is terminal for the
//!   ingestion session, not a retryable condition

use chrono::{DateTime, Utc};
use std::fs::{self, File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

use crate::codec::CSV_HEADER;
use crate::error::Result;

/// Outcome of [`FileRotator::ensure_sink`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SinkStatus {
    /// A sink for the requested bucket is open and writable
    Ready,

    /// The bucket for the requested key failed earlier and stays unusable
    /// until the next rotation boundary
    Unavailable,

    /// The file budget is spent; nothing was opened and no further
    /// buckets will ever be created this session
    BudgetExhausted,
}

/// One open output bucket
#[derive(Debug)]
struct Bucket {
    key: String,
    file: File,
}

/// Rotating CSV sink with a bounded bucket budget
///
/// At most one bucket is open at a time. The rotator is the sole owner of
/// the sink handle and the created-bucket counter; callers interact with it
/// from a single task only.
#[derive(Debug)]
pub struct FileRotator {
    dir: PathBuf,
    prefix: String,
    max_files: usize,
    created: usize,
    current: Option<Bucket>,
    poisoned_key: Option<String>,
}

/// Derive the bucket key for a timestamp at one-minute granularity
pub fn minute_key(ts: DateTime<Utc>) -> String {
    ts.format("%Y%m%d_%H%M").to_string()
}

impl FileRotator {
    /// Create a rotator writing `<dir>/<prefix>_<minute_key>.csv` buckets
    ///
    /// # Arguments
    ///
    /// * `dir` - Output directory (created if absent)
    /// * `prefix` - Bucket file name prefix
    /// * `max_files` - Maximum number of buckets this session may create
    ///
    /// # Errors
    ///
    /// Returns error if the output directory cannot be created.
    pub fn new<P: AsRef<Path>>(dir: P, prefix: &str, max_files: usize) -> Result<Self> {
        fs::create_dir_all(&dir)?;
        Ok(Self {
            dir: dir.as_ref().to_path_buf(),
            prefix: prefix.to_string(),
            max_files,
            created: 0,
            current: None,
            poisoned_key: None,
        })
    }

    /// Ensure a sink is open for the bucket containing `for_timestamp`
    ///
    /// Repeated calls within the same minute are no-ops. Crossing into a new
    /// minute closes the current sink and opens (or reopens) the bucket for
    /// the new key, writing the CSV header only when the file did not
    /// previously exist.
    ///
    /// # Returns
    ///
    /// * `SinkStatus::Ready` - a writable sink is open
    /// * `SinkStatus::Unavailable` - the bucket for this key was invalidated
    ///   after a write failure; the caller must skip the write and wait for
    ///   the next boundary
    /// * `SinkStatus::BudgetExhausted` - the budget is spent; the caller
    ///   must treat this as fatal for further ingestion
    ///
    /// # Errors
    ///
    /// Returns error on filesystem failures while opening the new bucket;
    /// the caller may retry at the next rotation boundary.
    pub fn ensure_sink(&mut self, for_timestamp: DateTime<Utc>) -> Result<SinkStatus> {
        let key = minute_key(for_timestamp);

        if let Some(bucket) = &self.current {
            if bucket.key == key {
                return Ok(SinkStatus::Ready);
            }
        }

        if self.poisoned_key.as_deref() == Some(key.as_str()) {
            return Ok(SinkStatus::Unavailable);
        }

        self.close();

        if self.created >= self.max_files {
            info!(
                "Bucket budget exhausted ({}/{}), no further files will be created",
                self.created, self.max_files
            );
            return Ok(SinkStatus::BudgetExhausted);
        }

        let path = self.bucket_path(&key);
        let is_new = !path.exists();

        let mut file = OpenOptions::new().create(true).append(true).open(&path)?;
        if is_new {
            writeln!(file, "{}", CSV_HEADER)?;
            file.flush()?;
        }

        self.created += 1;
        info!(
            "Rotated to bucket {} (#{}/{})",
            path.display(),
            self.created,
            self.max_files
        );

        self.current = Some(Bucket { key, file });
        Ok(SinkStatus::Ready)
    }

    /// Append one row to the open sink and flush immediately
    ///
    /// Flush-per-row trades throughput for durability, which is the right
    /// call at telemetry rates.
    ///
    /// # Errors
    ///
    /// Returns error if no sink is open or the write/flush fails; the
    /// current bucket should then be considered unusable until the next
    /// rotation boundary.
    pub fn write_row(&mut self, row: &str) -> Result<()> {
        let bucket = self.current.as_mut().ok_or_else(|| {
            crate::error::IngestError::Storage("no open bucket to write to".to_string())
        })?;

        writeln!(bucket.file, "{}", row)?;
        bucket.file.flush()?;
        Ok(())
    }

    /// Close the current sink, if any
    ///
    /// Idempotent; flushes before releasing the handle. Flush failures on
    /// close are not recoverable and are deliberately ignored.
    pub fn close(&mut self) {
        if let Some(mut bucket) = self.current.take() {
            let _ = bucket.file.flush();
        }
    }

    /// Drop the current sink and mark its key unusable
    ///
    /// Called after a write failure: the bucket stays closed and
    /// `ensure_sink` reports `Unavailable` for its key until the next
    /// rotation boundary opens a fresh bucket.
    pub fn invalidate_current(&mut self) {
        if let Some(bucket) = self.current.take() {
            warn!("Bucket {} invalidated until the next rotation boundary", bucket.key);
            self.poisoned_key = Some(bucket.key);
        }
    }

    /// Number of buckets created since the session started
    pub fn created_count(&self) -> usize {
        self.created
    }

    /// Key of the currently open bucket, if any
    pub fn current_key(&self) -> Option<&str> {
        self.current.as_ref().map(|b| b.key.as_str())
    }

    fn bucket_path(&self, key: &str) -> PathBuf {
        self.dir.join(format!("{}_{}.csv", self.prefix, key))
    }
}
