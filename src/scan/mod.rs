//! Parallel directory scan
//!
//! # Architecture
//!
//! ```text
//!                 ┌─────────────────────────┐
//!                 │     ScanCoordinator     │
//!                 │  - validates the root   │
//!                 │  - seeds the queue      │
//!                 │  - final flush          │
//!                 └───────────┬─────────────┘
//!                             │ WorkQueue (bounded, DirTask | Stop)
//!       ┌─────────────────────┼─────────────────────┐
//!       │                     │                     │
//! ┌─────▼─────┐         ┌─────▼─────┐         ┌─────▼─────┐
//! │  Worker 0 │         │  Worker 1 │         │  Worker N │
//! │  read_dir │         │  read_dir │         │  read_dir │
//! └─────┬─────┘         └─────┬─────┘         └─────┬─────┘
//!       └──────────── offer(Record) ────────────────┘
//!                             │
//!                   ┌─────────▼─────────┐
//!                   │     BatchSink     │──── insert_batch ───▶ RecordStore
//!                   └───────────────────┘
//! ```

pub mod coordinator;
pub mod queue;
pub mod sink;
pub mod stats;
mod worker;

pub use coordinator::{ScanCoordinator, ScanOptions, ScanResult};
pub use sink::{BatchSink, SinkStats, DEFAULT_BATCH_SIZE};
pub use stats::{ScanProgress, ScanStats};

/// Default number of scan workers
pub const DEFAULT_WORKERS: usize = 4;

/// Upper bound on scan workers
pub const MAX_WORKERS: usize = 32;

/// Map an out-of-range worker count onto a usable one, with a warning
///
/// 0 selects [`DEFAULT_WORKERS`]; anything above [`MAX_WORKERS`] is clamped.
pub fn normalize_worker_count(requested: usize) -> usize {
    if requested == 0 {
        tracing::warn!(
            requested,
            using = DEFAULT_WORKERS,
            "Invalid worker count, using default"
        );
        DEFAULT_WORKERS
    } else if requested > MAX_WORKERS {
        tracing::warn!(requested, using = MAX_WORKERS, "Worker count too high, clamping");
        MAX_WORKERS
    } else {
        requested
    }
}
