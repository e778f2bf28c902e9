//! Batch sink between scan workers and the record store
//!
//! Workers hand every record to [`BatchSink::offer`]. Records accumulate in
//! a pending set until it reaches the threshold, then the whole set goes to
//! the store as one `insert_batch` call.
//!
//! Two locks, always taken in this order:
//! - `flush_lock`: held for the duration of one flush, so at most one batch
//!   is in flight per sink
//! - `pending`: held only to push a record or swap the pending set out
//!
//! Records offered while a flush is in flight land in the fresh pending set
//! and join the next batch. An offer that fills the pending set performs the
//! flush itself and so waits for any in-flight flush first; this bounds the
//! pending set to roughly threshold + number of concurrent offerers.

use crate::db::RecordStore;
use crate::error::FlushError;
use crate::record::Record;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::{debug, warn};

/// Default number of records per batch
pub const DEFAULT_BATCH_SIZE: usize = 100;

/// Default number of retries for a failed batch
pub const DEFAULT_FLUSH_RETRIES: u32 = 1;

/// Statistics about flushes
#[derive(Debug, Default)]
pub struct SinkStats {
    /// Backend insert calls that succeeded
    pub batches_flushed: AtomicU64,

    /// Batches dropped after exhausting retries
    pub batches_failed: AtomicU64,

    /// Records written by successful batches
    pub records_written: AtomicU64,

    /// Records lost with failed batches
    pub records_dropped: AtomicU64,
}

impl SinkStats {
    pub fn batches_flushed(&self) -> u64 {
        self.batches_flushed.load(Ordering::Relaxed)
    }

    pub fn batches_failed(&self) -> u64 {
        self.batches_failed.load(Ordering::Relaxed)
    }

    pub fn records_written(&self) -> u64 {
        self.records_written.load(Ordering::Relaxed)
    }

    pub fn records_dropped(&self) -> u64 {
        self.records_dropped.load(Ordering::Relaxed)
    }
}

/// Groups records into threshold-sized batches for the store
pub struct BatchSink {
    store: Arc<dyn RecordStore>,
    threshold: usize,
    retries: u32,
    pending: Mutex<Vec<Record>>,
    flush_lock: Mutex<()>,
    stats: SinkStats,
}

impl BatchSink {
    /// Create a sink flushing every `threshold` records (minimum 1)
    pub fn new(store: Arc<dyn RecordStore>, threshold: usize) -> Self {
        let threshold = threshold.max(1);
        Self {
            store,
            threshold,
            retries: DEFAULT_FLUSH_RETRIES,
            pending: Mutex::new(Vec::with_capacity(threshold)),
            flush_lock: Mutex::new(()),
            stats: SinkStats::default(),
        }
    }

    /// Set how many times a failed batch is retried before it is dropped
    pub fn with_retries(mut self, retries: u32) -> Self {
        self.retries = retries;
        self
    }

    /// Accept a record, flushing if the pending set reached the threshold
    ///
    /// The record is always accepted. An error means a batch (possibly
    /// containing this record) was dropped; the sink stays usable.
    pub fn offer(&self, record: Record) -> Result<(), FlushError> {
        let full = {
            let mut pending = self.pending.lock();
            pending.push(record);
            pending.len() >= self.threshold
        };

        if full {
            self.flush_if_full()?;
        }
        Ok(())
    }

    /// Write every pending record as one batch
    ///
    /// Returns the number of records written. An empty pending set is a
    /// no-op and makes no backend call.
    pub fn flush(&self) -> Result<usize, FlushError> {
        let _in_flight = self.flush_lock.lock();
        let batch = std::mem::take(&mut *self.pending.lock());
        if batch.is_empty() {
            return Ok(0);
        }
        self.write_batch(batch)
    }

    /// Number of records waiting for the next flush
    pub fn pending_len(&self) -> usize {
        self.pending.lock().len()
    }

    /// Batch threshold
    pub fn threshold(&self) -> usize {
        self.threshold
    }

    /// Flush statistics
    pub fn stats(&self) -> &SinkStats {
        &self.stats
    }

    /// Flush only if the pending set is still full once we hold the lock;
    /// a concurrent offerer may already have taken it.
    fn flush_if_full(&self) -> Result<usize, FlushError> {
        let _in_flight = self.flush_lock.lock();
        let batch = {
            let mut pending = self.pending.lock();
            if pending.len() < self.threshold {
                return Ok(0);
            }
            std::mem::replace(&mut *pending, Vec::with_capacity(self.threshold))
        };
        self.write_batch(batch)
    }

    /// Insert a batch, retrying it as a unit. Caller holds `flush_lock`.
    fn write_batch(&self, batch: Vec<Record>) -> Result<usize, FlushError> {
        let mut attempts = 0;
        loop {
            attempts += 1;
            match self.store.insert_batch(&batch) {
                Ok(written) => {
                    self.stats.batches_flushed.fetch_add(1, Ordering::Relaxed);
                    self.stats
                        .records_written
                        .fetch_add(written as u64, Ordering::Relaxed);
                    debug!(records = written, "Batch flushed");
                    return Ok(written);
                }
                Err(e) if attempts <= self.retries => {
                    warn!(records = batch.len(), attempt = attempts, error = %e, "Batch insert failed, retrying");
                }
                Err(e) => {
                    self.stats.batches_failed.fetch_add(1, Ordering::Relaxed);
                    self.stats
                        .records_dropped
                        .fetch_add(batch.len() as u64, Ordering::Relaxed);
                    return Err(FlushError {
                        records: batch.len(),
                        attempts,
                        source: e,
                    });
                }
            }
        }
    }
}
