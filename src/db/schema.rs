//! Database schema definitions and creation
//!
//! This module defines the SQLite schema for indexed file records
//! and provides functions to create and configure the database.

use crate::error::StoreResult;
use rusqlite::Connection;

/// Current schema version, stored in `PRAGMA user_version`
pub const SCHEMA_VERSION: u32 = 1;

/// SQL to create the main files table
/// Note: `id` is the surrogate key; `path` is the natural unique key.
const CREATE_FILES_TABLE: &str = r#"
CREATE TABLE IF NOT EXISTS files (
    id INTEGER PRIMARY KEY,
    path TEXT NOT NULL UNIQUE,
    size INTEGER NOT NULL,
    modified_at INTEGER NOT NULL,   -- ms since Unix epoch
    extension TEXT NOT NULL DEFAULT '',  -- lowercase, without dot
    indexed_at INTEGER NOT NULL     -- ms since Unix epoch
)
"#;

/// SQL to create index metadata table
const CREATE_INDEX_INFO_TABLE: &str = r#"
CREATE TABLE IF NOT EXISTS index_info (
    key TEXT PRIMARY KEY,
    value TEXT
)
"#;

/// SQL to create indexes for the query grammar
const CREATE_INDEXES: &[&str] = &[
    "CREATE INDEX IF NOT EXISTS idx_files_extension ON files(extension)",
    "CREATE INDEX IF NOT EXISTS idx_files_size ON files(size)",
];

/// SQLite pragmas; WAL lets readers proceed during a scan's batch writes
const PRAGMAS: &str = r#"
PRAGMA journal_mode = WAL;
PRAGMA synchronous = NORMAL;
PRAGMA cache_size = -64000;
PRAGMA temp_store = MEMORY;
PRAGMA busy_timeout = 5000;
"#;

/// Create and configure the database
pub fn create_database(conn: &Connection) -> StoreResult<()> {
    conn.execute_batch(PRAGMAS)?;

    conn.execute(CREATE_FILES_TABLE, [])?;
    conn.execute(CREATE_INDEX_INFO_TABLE, [])?;

    for sql in CREATE_INDEXES {
        conn.execute(sql, [])?;
    }

    conn.pragma_update(None, "user_version", SCHEMA_VERSION)?;
    Ok(())
}

/// Read the stored schema version
pub fn schema_version(conn: &Connection) -> StoreResult<u32> {
    Ok(conn.query_row("PRAGMA user_version", [], |row| row.get(0))?)
}

/// Store index metadata
pub fn set_index_info(conn: &Connection, key: &str, value: &str) -> StoreResult<()> {
    conn.execute(
        "INSERT OR REPLACE INTO index_info (key, value) VALUES (?1, ?2)",
        [key, value],
    )?;
    Ok(())
}

/// Get index metadata
pub fn get_index_info(conn: &Connection, key: &str) -> StoreResult<Option<String>> {
    let result = conn.query_row(
        "SELECT value FROM index_info WHERE key = ?1",
        [key],
        |row| row.get(0),
    );

    match result {
        Ok(value) => Ok(Some(value)),
        Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
        Err(e) => Err(e.into()),
    }
}

/// Metadata keys describing the last scan
pub mod keys {
    /// Root directory that was scanned
    pub const SCAN_ROOT: &str = "scan_root";

    /// Timestamp when the scan started (RFC 3339)
    pub const START_TIME: &str = "start_time";

    /// Timestamp when the scan finished (RFC 3339)
    pub const END_TIME: &str = "end_time";

    /// Total duration in milliseconds
    pub const DURATION_MS: &str = "duration_ms";

    /// Number of worker threads used
    pub const WORKER_COUNT: &str = "worker_count";

    /// Files found by the scan
    pub const TOTAL_FILES: &str = "total_files";

    /// Sum of file sizes
    pub const TOTAL_BYTES: &str = "total_bytes";

    /// Number of errors encountered
    pub const ERROR_COUNT: &str = "error_count";

    /// Indexer version that wrote the database
    pub const INDEXER_VERSION: &str = "indexer_version";

    /// Scan status: "running", "completed", "interrupted", "failed"
    pub const STATUS: &str = "status";
}
