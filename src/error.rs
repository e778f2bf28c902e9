//! Error types for file-indexer
//!
//! This module defines the error hierarchy for both pipelines:
//! - Scan errors (fatal root-path problems and non-fatal traversal problems)
//! - Storage errors from the SQLite backend
//! - Protocol errors reported back to a single client
//! - Server and configuration errors
//!
//! Fatal errors abort only the operation that raised them (one scan, one
//! session). Non-fatal errors are counted and logged, never returned.

use std::path::PathBuf;
use thiserror::Error;

/// Top-level error type for the file-indexer application
#[derive(Error, Debug)]
pub enum IndexerError {
    /// Scan could not start
    #[error("Scan error: {0}")]
    Scan(#[from] ScanError),

    /// Storage backend errors
    #[error("Storage error: {0}")]
    Store(#[from] StoreError),

    /// Query server errors
    #[error("Server error: {0}")]
    Server(#[from] ServerError),

    /// Configuration errors
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// I/O errors outside of a scan or session
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Fatal scan errors, raised before any worker is started
#[derive(Error, Debug)]
pub enum ScanError {
    /// Root path does not exist
    #[error("Path does not exist: '{path}'")]
    NotFound { path: PathBuf },

    /// Root path exists but is not a directory
    #[error("Path is not a directory: '{path}'")]
    NotADirectory { path: PathBuf },

    /// Root directory cannot be listed
    #[error("Directory is not readable: '{path}': {reason}")]
    Unreadable { path: PathBuf, reason: String },

    /// A worker thread could not be spawned
    #[error("Failed to spawn scan worker {id}: {reason}")]
    WorkerSpawn { id: usize, reason: String },
}

/// Non-fatal problems with a single entry during traversal
///
/// These are logged and counted in the scan statistics; the walk continues.
#[derive(Error, Debug)]
pub enum TraversalError {
    /// A directory could not be listed, its subtree is skipped
    #[error("Cannot read directory '{path}': {source}")]
    ReadDir {
        path: PathBuf,
        source: std::io::Error,
    },

    /// An entry in a directory listing could not be read
    #[error("Cannot read entry in '{dir}': {source}")]
    Entry {
        dir: PathBuf,
        source: std::io::Error,
    },

    /// File metadata could not be extracted (file vanished, etc.)
    #[error("Cannot stat '{path}': {source}")]
    Metadata {
        path: PathBuf,
        source: std::io::Error,
    },
}

impl TraversalError {
    /// Path associated with this error
    pub fn path(&self) -> &std::path::Path {
        match self {
            TraversalError::ReadDir { path, .. } => path,
            TraversalError::Entry { dir, .. } => dir,
            TraversalError::Metadata { path, .. } => path,
        }
    }

    /// Vanished entries are routine on live filesystems
    pub fn is_not_found(&self) -> bool {
        let source = match self {
            TraversalError::ReadDir { source, .. }
            | TraversalError::Entry { source, .. }
            | TraversalError::Metadata { source, .. } => source,
        };
        source.kind() == std::io::ErrorKind::NotFound
    }
}

/// Storage backend errors
#[derive(Error, Debug)]
pub enum StoreError {
    /// SQLite error
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    /// Failed to open or create the database file
    #[error("Failed to open database at '{path}': {reason}")]
    Open { path: PathBuf, reason: String },
}

/// A batch that could not be persisted
#[derive(Error, Debug)]
#[error("Batch of {records} records dropped after {attempts} attempt(s): {source}")]
pub struct FlushError {
    /// Number of records lost with this batch
    pub records: usize,

    /// Number of insert attempts made
    pub attempts: u32,

    /// Last backend error
    pub source: StoreError,
}

/// Malformed client commands
///
/// The display text is the line sent back to the client.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ProtocolError {
    /// First token is not a known verb
    #[error("Unknown command: '{0}'. Type HELP for available commands")]
    UnknownCommand(String),

    /// FIND without field, operator and operand
    #[error("Invalid FIND syntax. Usage: FIND <field> <operator> <value>")]
    FindSyntax,

    /// FIND on a field that does not exist
    #[error("Unknown field: '{0}'. Supported fields: name, ext, size")]
    UnknownField(String),

    /// Operator not valid for the field
    #[error("Invalid operator '{operator}' for '{field}'. Use {expected}")]
    InvalidOperator {
        field: String,
        operator: String,
        expected: &'static str,
    },

    /// Size operand is not an integer
    #[error("Invalid size value: '{0}'. Must be a whole number of bytes")]
    InvalidSize(String),

    /// Request line longer than the session accepts
    #[error("Line too long: requests are limited to {max} bytes")]
    LineTooLong { max: usize },
}

/// Query server errors
#[derive(Error, Debug)]
pub enum ServerError {
    /// Could not bind the listening socket
    #[error("Failed to bind {addr}: {source}")]
    Bind {
        addr: String,
        source: std::io::Error,
    },

    /// I/O error on the listener or a session
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Configuration and CLI errors
#[derive(Error, Debug)]
pub enum ConfigError {
    /// Port outside the unprivileged range
    #[error("Invalid port {port}: must be between {min} and {max}")]
    InvalidPort { port: u16, min: u16, max: u16 },

    /// Invalid batch size
    #[error("Invalid batch size {size}: must be between {min} and {max}")]
    InvalidBatchSize { size: usize, min: usize, max: usize },

    /// Invalid limit (results, sessions)
    #[error("Invalid {name} {value}: must be at least 1")]
    InvalidLimit { name: &'static str, value: usize },

    /// Database path error
    #[error("Invalid database path '{path}': {reason}")]
    InvalidDbPath { path: PathBuf, reason: String },

    /// Bind address is not an IP address
    #[error("Invalid bind address '{addr}'")]
    InvalidBindAddress { addr: String },
}

/// Result type alias for IndexerError
pub type Result<T> = std::result::Result<T, IndexerError>;

/// Result type alias for StoreError
pub type StoreResult<T> = std::result::Result<T, StoreError>;

/// Result type alias for ServerError
pub type ServerResult<T> = std::result::Result<T, ServerError>;
