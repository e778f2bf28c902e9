//! Storage backend for indexed records
//!
//! Both pipelines talk to storage through the [`RecordStore`] trait:
//!
//! ```text
//! ┌──────────────────────┐          ┌──────────────────────┐
//! │   Scan workers (N)   │          │  Session tasks (M)   │
//! │   BatchSink::flush   │          │   QueryExecutor      │
//! └──────────┬───────────┘          └──────────┬───────────┘
//!            │ insert_batch                    │ find_* / aggregate_stats
//!            ▼                                 ▼
//! ┌─────────────────────────────────────────────────────────┐
//! │                  RecordStore (SqliteStore)               │
//! │   - one transaction per batch (all-or-nothing)          │
//! │   - WAL mode, reads interleave with batch writes        │
//! └─────────────────────────────────────────────────────────┘
//! ```
//!
//! All calls are synchronous. Async callers go through
//! `tokio::task::spawn_blocking`.

pub mod schema;
pub mod store;

pub use schema::{create_database, get_index_info, keys, set_index_info};
pub use store::SqliteStore;

use crate::error::StoreResult;
use crate::record::Record;

/// Direction of a size comparison
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SizeComparison {
    /// Strictly larger than the threshold
    GreaterThan,
    /// Strictly smaller than the threshold
    LessThan,
}

impl SizeComparison {
    /// Operator symbol as written in the query grammar
    pub fn symbol(self) -> &'static str {
        match self {
            SizeComparison::GreaterThan => ">",
            SizeComparison::LessThan => "<",
        }
    }

    /// Check a size against the threshold
    pub fn matches(self, size: u64, threshold: i64) -> bool {
        let size = i128::from(size);
        let threshold = i128::from(threshold);
        match self {
            SizeComparison::GreaterThan => size > threshold,
            SizeComparison::LessThan => size < threshold,
        }
    }
}

/// Number of records sharing one extension
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExtensionCount {
    /// Lowercase extension, empty for files without one
    pub extension: String,

    /// Number of records
    pub count: u64,
}

/// Aggregate statistics over the whole index
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IndexStats {
    /// Number of records
    pub count: u64,

    /// Sum of sizes in bytes
    pub total_size: u64,

    /// Average size in bytes, truncated
    pub avg_size: u64,

    /// Largest size in bytes
    pub max_size: u64,

    /// Number of distinct extensions (the empty extension counts once)
    pub distinct_extensions: u64,

    /// Records per extension, most common first
    pub histogram: Vec<ExtensionCount>,
}

/// Storage backend consumed by the scan and query pipelines
pub trait RecordStore: Send + Sync {
    /// Insert a batch atomically, returning the number of rows written
    ///
    /// Either every record is written or none is.
    fn insert_batch(&self, records: &[Record]) -> StoreResult<usize>;

    /// Records whose path contains `text`
    fn find_by_name_substring(&self, text: &str) -> StoreResult<Vec<Record>>;

    /// Records with exactly this (lowercase) extension
    fn find_by_extension(&self, extension: &str) -> StoreResult<Vec<Record>>;

    /// Records strictly larger or smaller than `threshold` bytes
    fn find_by_size(&self, threshold: i64, direction: SizeComparison) -> StoreResult<Vec<Record>>;

    /// Aggregate statistics and extension histogram
    fn aggregate_stats(&self) -> StoreResult<IndexStats>;
}
