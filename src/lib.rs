//! file-indexer - Concurrent Filesystem Indexer and Query Server
//!
//! Walks a directory tree with a pool of worker threads, batches one record
//! per regular file into SQLite, and answers line-oriented queries from many
//! TCP clients at once.
//!
//! # Features
//!
//! - **Parallel Scanning**: Worker threads share a bounded directory queue.
//!   A full queue never blocks a worker; it walks the subtree itself.
//!
//! - **Batched Writes**: Records are buffered and written one transaction
//!   per batch, so a batch is either fully stored or fully dropped.
//!
//! - **Query Server**: Tokio-based, one task per session, bounded admission,
//!   graceful drain on shutdown.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────┐    DirTask     ┌──────────────┐   Record   ┌────────────┐
//! │ ScanCoord.   │ ─────────────▶ │ Workers (N)  │ ─────────▶ │ BatchSink  │
//! │ (seed root)  │ ◀── pending ── │ read_dir     │            │ threshold  │
//! └──────────────┘                └──────────────┘            └─────┬──────┘
//!                                                                   │ insert_batch
//!                                                                   ▼
//! ┌──────────────┐    lines       ┌──────────────┐  queries   ┌────────────┐
//! │ TCP clients  │ ◀────────────▶ │ QueryServer  │ ─────────▶ │ SQLite     │
//! │ (M sessions) │                │ + executor   │            │ (WAL)      │
//! └──────────────┘                └──────────────┘            └────────────┘
//! ```
//!
//! # Example
//!
//! ```bash
//! # Index a tree
//! file-indexer scan /data -w 8 --db index.db
//!
//! # Serve queries
//! file-indexer serve --db index.db --port 9000
//!
//! # One-off query
//! file-indexer query --db index.db FIND ext is pdf
//! ```

pub mod config;
pub mod db;
pub mod error;
pub mod progress;
pub mod protocol;
pub mod record;
pub mod scan;
pub mod server;

pub use config::{CliArgs, ScanConfig, ServeConfig};
pub use db::{RecordStore, SqliteStore};
pub use error::{IndexerError, Result};
pub use protocol::{Command, QueryExecutor};
pub use record::Record;
pub use scan::{ScanCoordinator, ScanOptions, ScanResult};
pub use server::{QueryServer, ServerHandle};
