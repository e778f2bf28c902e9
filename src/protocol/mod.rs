//! Line-oriented query protocol
//!
//! One request per line, one multi-line response block per request. The
//! parser ([`Command`]) is pure; the [`QueryExecutor`] maps commands onto a
//! [`RecordStore`](crate::db::RecordStore) and shapes the text response.

pub mod command;
pub mod executor;

pub use command::{normalize_extension, Command, Query};
pub use executor::{format_error, help_text, QueryExecutor, DEFAULT_MAX_RESULTS};
