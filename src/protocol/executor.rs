//! Query execution and response formatting
//!
//! Responses are plain text blocks without the trailing `END` framing line;
//! the session adds that when writing to the socket.

use crate::db::{IndexStats, RecordStore};
use crate::error::{ProtocolError, StoreError};
use crate::protocol::command::{Command, Query};
use crate::record::Record;
use chrono::{Local, TimeZone};
use humansize::{format_size, BINARY};
use std::fmt::Write as _;
use std::sync::Arc;
use tracing::error;

/// Default cap on listed records per response
pub const DEFAULT_MAX_RESULTS: usize = 100;

/// Line sent instead of internal storage details
const STORAGE_FAILURE: &str = "ERROR: query failed due to a storage error";

const RULE: &str = "========================================";

/// Runs parsed commands against a record store
#[derive(Clone)]
pub struct QueryExecutor {
    store: Arc<dyn RecordStore>,
    max_results: usize,
}

impl QueryExecutor {
    pub fn new(store: Arc<dyn RecordStore>) -> Self {
        Self {
            store,
            max_results: DEFAULT_MAX_RESULTS,
        }
    }

    /// Set the maximum number of records listed per response (minimum 1)
    pub fn with_max_results(mut self, max_results: usize) -> Self {
        self.max_results = max_results.max(1);
        self
    }

    pub fn max_results(&self) -> usize {
        self.max_results
    }

    /// Parse and execute one line, always producing a response block
    ///
    /// Syntax errors become a specific `ERROR:` line. Storage errors are
    /// logged and reported to the client generically.
    pub fn respond(&self, line: &str) -> String {
        match Command::parse(line) {
            Ok(command) => match self.execute(&command) {
                Ok(response) => response,
                Err(e) => {
                    error!(command = line.trim(), error = %e, "Query failed");
                    STORAGE_FAILURE.to_string()
                }
            },
            Err(e) => format_error(&e),
        }
    }

    /// Execute a parsed command
    pub fn execute(&self, command: &Command) -> Result<String, StoreError> {
        match command {
            Command::Help => Ok(help_text()),
            Command::Quit => Ok("BYE".to_string()),
            Command::Stats => Ok(format_stats(&self.store.aggregate_stats()?)),
            Command::Find(query) => {
                let records = self.find(query)?;
                Ok(self.format_records(query, &records))
            }
        }
    }

    /// Run a query against the store
    pub fn find(&self, query: &Query) -> Result<Vec<Record>, StoreError> {
        match query {
            Query::NameContains(text) => self.store.find_by_name_substring(text),
            Query::ExtensionIs(ext) => self.store.find_by_extension(ext),
            Query::Size { direction, bytes } => self.store.find_by_size(*bytes, *direction),
        }
    }

    fn format_records(&self, query: &Query, records: &[Record]) -> String {
        if records.is_empty() {
            return format!("{}\nNo files found matching your criteria.", query);
        }

        let total = records.len();
        let shown = total.min(self.max_results);

        let mut out = String::new();
        let _ = writeln!(out, "{}", query);
        if shown < total {
            let _ = writeln!(out, "Found {} file(s) (showing first {} of {})", total, shown, total);
        } else {
            let _ = writeln!(out, "Found {} file(s)", total);
        }
        out.push_str(RULE);

        for (i, record) in records.iter().take(shown).enumerate() {
            let _ = write!(
                out,
                "\n{}. {}\n   Size: {} | Modified: {}",
                i + 1,
                record.path(),
                format_size(record.size(), BINARY),
                format_timestamp(record.modified_at()),
            );
        }

        out
    }
}

/// Client-facing error line
pub fn format_error(err: &ProtocolError) -> String {
    format!("ERROR: {}", err)
}

fn format_stats(stats: &IndexStats) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "Database Statistics");
    let _ = writeln!(out, "{}", RULE);
    let _ = writeln!(out, "Total Files:   {}", stats.count);
    let _ = writeln!(out, "Total Size:    {}", format_size(stats.total_size, BINARY));
    let _ = writeln!(out, "Average Size:  {}", format_size(stats.avg_size, BINARY));
    let _ = writeln!(out, "Largest File:  {}", format_size(stats.max_size, BINARY));
    let _ = write!(out, "Extensions:    {}", stats.distinct_extensions);

    if !stats.histogram.is_empty() {
        let _ = write!(out, "\n{}\nFiles by extension:", RULE);
        for entry in &stats.histogram {
            let name = if entry.extension.is_empty() {
                "(none)"
            } else {
                entry.extension.as_str()
            };
            let _ = write!(out, "\n  {:<12} {}", name, entry.count);
        }
    }

    out
}

fn format_timestamp(millis: i64) -> String {
    match Local.timestamp_millis_opt(millis).earliest() {
        Some(time) => time.format("%Y-%m-%d %H:%M:%S").to_string(),
        None => "unknown".to_string(),
    }
}

/// Text returned by HELP
pub fn help_text() -> String {
    [
        "Available Commands",
        RULE,
        "FIND name contains <keyword>",
        "  Example: FIND name contains report",
        "FIND ext is <extension>",
        "  Example: FIND ext is pdf",
        "FIND size > <bytes>",
        "  Example: FIND size > 1048576",
        "FIND size < <bytes>",
        "  Example: FIND size < 1024",
        "STATS",
        "  Show index statistics",
        "HELP",
        "  Show this help message",
        "QUIT",
        "  Disconnect from server",
    ]
    .join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::SqliteStore;

    fn executor() -> QueryExecutor {
        let store = SqliteStore::open_in_memory().unwrap();
        store
            .insert_batch(&[
                Record::new("/docs/report.pdf", 2_000_000, 1_700_000_000_000),
                Record::new("/docs/notes.PDF", 1_048_576, 1_700_000_000_000),
                Record::new("/src/App.java", 512, 1_700_000_000_000),
                Record::new("/README", 100, 1_700_000_000_000),
            ])
            .unwrap();
        QueryExecutor::new(Arc::new(store))
    }

    #[test]
    fn test_extension_is_case_insensitive() {
        let exec = executor();
        let upper = exec.respond("FIND ext is PDF");
        let lower = exec.respond("FIND ext is pdf");
        assert_eq!(upper, lower);
        assert!(upper.contains("Found 2 file(s)"));
        assert!(upper.contains("/docs/report.pdf"));
        assert!(upper.contains("/docs/notes.PDF"));
    }

    #[test]
    fn test_size_boundary_is_excluded() {
        let exec = executor();
        let response = exec.respond("FIND size > 1048576");
        assert!(response.contains("Found 1 file(s)"));
        assert!(response.contains("/docs/report.pdf"));
        assert!(!response.contains("notes"));
    }

    #[test]
    fn test_truncation_indicator() {
        let exec = executor().with_max_results(1);
        let response = exec.respond("FIND name contains /");
        assert!(response.contains("Found 4 file(s) (showing first 1 of 4)"));
        assert!(response.contains("\n1. "));
        assert!(!response.contains("\n2. "));
    }

    #[test]
    fn test_no_results() {
        let exec = executor();
        let response = exec.respond("FIND name contains nothing-matches");
        assert!(response.contains("No files found"));
    }

    #[test]
    fn test_stats_response() {
        let exec = executor();
        let response = exec.respond("STATS");
        assert!(response.contains("Total Files:   4"));
        assert!(response.contains("Extensions:    3"));
        assert!(response.contains("pdf"));
        assert!(response.contains("(none)"));

        let pdf = response.find("pdf").unwrap();
        let java = response.find("java").unwrap();
        assert!(pdf < java, "histogram must be sorted by count");
    }

    #[test]
    fn test_errors_are_single_lines() {
        let exec = executor();
        for line in ["BOGUS", "FIND name", "FIND size > abc", "FIND color is red"] {
            let response = exec.respond(line);
            assert!(response.starts_with("ERROR: "), "{}", response);
            assert!(!response.contains('\n'));
        }
    }

    #[test]
    fn test_help_and_quit() {
        let exec = executor();
        assert!(exec.respond("help").contains("FIND size > <bytes>"));
        assert_eq!(exec.respond("QUIT"), "BYE");
    }
}
