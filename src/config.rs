//! Configuration types for file-indexer
//!
//! This module defines:
//! - CLI argument parsing using clap derive macros
//! - Runtime configuration with validation

use crate::error::ConfigError;
use crate::protocol::DEFAULT_MAX_RESULTS;
pub use crate::scan::normalize_worker_count;
use crate::scan::{ScanOptions, DEFAULT_BATCH_SIZE, DEFAULT_WORKERS};
use crate::server::{ServerOptions, DEFAULT_MAX_SESSIONS};
use clap::{Args, Parser, Subcommand};
use std::net::{IpAddr, SocketAddr};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Batch size limits
const MIN_BATCH_SIZE: usize = 1;
const MAX_BATCH_SIZE: usize = 100_000;

/// Unprivileged port range accepted by `serve`
const MIN_PORT: u16 = 1024;
const MAX_PORT: u16 = 65535;

/// Default index database file
const DEFAULT_DB: &str = "file_index.db";

/// Index a directory tree into SQLite and serve queries over TCP
#[derive(Parser, Debug, Clone)]
#[command(
    name = "file-indexer",
    version,
    about = "Index a directory tree into SQLite and serve queries over TCP",
    after_help = "EXAMPLES:\n    \
        file-indexer scan /data -w 8\n    \
        file-indexer serve --port 9000\n    \
        file-indexer query FIND ext is pdf\n    \
        file-indexer check --db /var/lib/index.db"
)]
pub struct CliArgs {
    /// Verbose output (debug logging)
    #[arg(short = 'v', long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Command,
}

/// Subcommands
#[derive(Subcommand, Debug, Clone)]
pub enum Command {
    /// Scan a directory tree into the index
    Scan(ScanArgs),

    /// Start the query server
    Serve(ServeArgs),

    /// Run one protocol command against the index and print the response
    Query(QueryArgs),

    /// Check the index database and show the last scan
    Check(CheckArgs),
}

#[derive(Args, Debug, Clone)]
pub struct ScanArgs {
    /// Directory to scan
    #[arg(value_name = "DIR")]
    pub dir: PathBuf,

    /// Number of worker threads (1-32)
    #[arg(short = 'w', long, default_value_t = DEFAULT_WORKERS, value_name = "NUM")]
    pub threads: usize,

    /// Records per database batch
    #[arg(short = 'b', long, default_value_t = DEFAULT_BATCH_SIZE, value_name = "NUM")]
    pub batch_size: usize,

    /// Index database file
    #[arg(long, default_value = DEFAULT_DB, value_name = "FILE")]
    pub db: PathBuf,

    /// Remove existing records before scanning
    #[arg(long)]
    pub fresh: bool,

    /// Quiet mode - suppress progress output
    #[arg(short = 'q', long)]
    pub quiet: bool,

    /// Seconds to wait for workers after an interrupt
    #[arg(long, default_value = "60", value_name = "SECS")]
    pub shutdown_timeout: u64,
}

#[derive(Args, Debug, Clone)]
pub struct ServeArgs {
    /// Bind address
    #[arg(long, default_value = "0.0.0.0")]
    pub bind: String,

    /// Port to listen on
    #[arg(short = 'p', long, default_value = "8080")]
    pub port: u16,

    /// Index database file
    #[arg(long, default_value = DEFAULT_DB, value_name = "FILE")]
    pub db: PathBuf,

    /// Maximum records listed per response
    #[arg(long, default_value_t = DEFAULT_MAX_RESULTS, value_name = "NUM")]
    pub max_results: usize,

    /// Maximum concurrent sessions
    #[arg(long, default_value_t = DEFAULT_MAX_SESSIONS, value_name = "NUM")]
    pub max_sessions: usize,

    /// Seconds sessions get to finish after shutdown
    #[arg(long, default_value = "10", value_name = "SECS")]
    pub grace_secs: u64,
}

#[derive(Args, Debug, Clone)]
pub struct QueryArgs {
    /// Index database file
    #[arg(long, default_value = DEFAULT_DB, value_name = "FILE")]
    pub db: PathBuf,

    /// Maximum records listed
    #[arg(long, default_value_t = DEFAULT_MAX_RESULTS, value_name = "NUM")]
    pub max_results: usize,

    /// Protocol command, e.g. FIND name contains report
    #[arg(required = true, trailing_var_arg = true, allow_hyphen_values = true, value_name = "COMMAND")]
    pub command: Vec<String>,
}

impl QueryArgs {
    /// The command words joined back into one protocol line
    pub fn line(&self) -> String {
        self.command.join(" ")
    }
}

#[derive(Args, Debug, Clone)]
pub struct CheckArgs {
    /// Index database file
    #[arg(long, default_value = DEFAULT_DB, value_name = "FILE")]
    pub db: PathBuf,
}

/// Validated configuration for `scan`
#[derive(Debug, Clone)]
pub struct ScanConfig {
    /// Directory to scan
    pub root: PathBuf,

    /// Index database file
    pub db_path: PathBuf,

    /// Coordinator tuning
    pub options: ScanOptions,

    /// Clear the index first
    pub fresh: bool,

    /// Show spinner and summary
    pub show_progress: bool,
}

impl ScanConfig {
    /// Create and validate configuration from CLI arguments
    pub fn from_args(args: ScanArgs) -> Result<Self, ConfigError> {
        if args.batch_size < MIN_BATCH_SIZE || args.batch_size > MAX_BATCH_SIZE {
            return Err(ConfigError::InvalidBatchSize {
                size: args.batch_size,
                min: MIN_BATCH_SIZE,
                max: MAX_BATCH_SIZE,
            });
        }

        validate_db_path(&args.db)?;

        let options = ScanOptions {
            worker_count: normalize_worker_count(args.threads),
            batch_size: args.batch_size,
            shutdown_timeout: Duration::from_secs(args.shutdown_timeout),
            ..ScanOptions::default()
        };

        Ok(Self {
            root: args.dir,
            db_path: args.db,
            options,
            fresh: args.fresh,
            show_progress: !args.quiet,
        })
    }
}

/// Validated configuration for `serve`
#[derive(Debug, Clone)]
pub struct ServeConfig {
    /// Listen address
    pub addr: SocketAddr,

    /// Index database file
    pub db_path: PathBuf,

    /// Records listed per response
    pub max_results: usize,

    /// Dispatcher limits
    pub server: ServerOptions,
}

impl ServeConfig {
    /// Create and validate configuration from CLI arguments
    pub fn from_args(args: ServeArgs) -> Result<Self, ConfigError> {
        if args.port < MIN_PORT {
            return Err(ConfigError::InvalidPort {
                port: args.port,
                min: MIN_PORT,
                max: MAX_PORT,
            });
        }

        let ip: IpAddr = args
            .bind
            .trim()
            .parse()
            .map_err(|_| ConfigError::InvalidBindAddress {
                addr: args.bind.clone(),
            })?;

        if args.max_results == 0 {
            return Err(ConfigError::InvalidLimit {
                name: "max-results",
                value: 0,
            });
        }
        if args.max_sessions == 0 {
            return Err(ConfigError::InvalidLimit {
                name: "max-sessions",
                value: 0,
            });
        }

        validate_db_path(&args.db)?;

        Ok(Self {
            addr: SocketAddr::new(ip, args.port),
            db_path: args.db,
            max_results: args.max_results,
            server: ServerOptions {
                max_sessions: args.max_sessions,
                grace: Duration::from_secs(args.grace_secs),
            },
        })
    }
}

/// The database file's parent directory must exist
fn validate_db_path(path: &Path) -> Result<(), ConfigError> {
    if path.as_os_str().is_empty() {
        return Err(ConfigError::InvalidDbPath {
            path: path.to_path_buf(),
            reason: "path is empty".to_string(),
        });
    }

    if path.is_dir() {
        return Err(ConfigError::InvalidDbPath {
            path: path.to_path_buf(),
            reason: "path is a directory".to_string(),
        });
    }

    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() && !parent.exists() {
            return Err(ConfigError::InvalidDbPath {
                path: path.to_path_buf(),
                reason: format!("Parent directory '{}' does not exist", parent.display()),
            });
        }
    }

    Ok(())
}
