//! Progress reporting for the scanner
//!
//! Provides real-time progress display using indicatif spinners and the
//! end-of-scan summary.

use crate::db::IndexStats;
use crate::scan::{ScanProgress, ScanResult};
use console::style;
use humansize::{format_size, BINARY};
use indicatif::{ProgressBar, ProgressStyle};
use std::path::Path;
use std::time::Duration;

/// Extensions listed in the summary
const TOP_EXTENSIONS: usize = 10;

/// Spinner showing live scan counters
pub struct ProgressReporter {
    bar: ProgressBar,
}

impl ProgressReporter {
    pub fn new() -> Self {
        let bar = ProgressBar::new_spinner();

        // A static template; fall back to the default style if it is rejected
        let style = ProgressStyle::default_spinner()
            .template("{spinner:.green} [{elapsed_precise}] {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner())
            .tick_chars("⠋⠙⠹⠸⠼⠴⠦⠧⠇⠏");
        bar.set_style(style);
        bar.enable_steady_tick(Duration::from_millis(100));

        Self { bar }
    }

    /// Update the progress display
    pub fn update(&self, progress: &ScanProgress) {
        let mut msg = format!(
            "Dirs: {} | Files: {} | Size: {} | Rate: {:.0}/s",
            format_number(progress.dirs),
            format_number(progress.files),
            format_size(progress.bytes, BINARY),
            progress.files_per_second(),
        );
        if progress.errors > 0 {
            msg.push_str(&format!(" | Errors: {}", format_number(progress.errors)));
        }

        self.bar.set_message(msg);
    }

    pub fn set_status(&self, status: &str) {
        self.bar.set_message(status.to_string());
    }

    /// Finish and clear the progress display
    pub fn finish_and_clear(&self) {
        self.bar.finish_and_clear();
    }
}

impl Default for ProgressReporter {
    fn default() -> Self {
        Self::new()
    }
}

/// Format a number with thousands separators
pub fn format_number(n: u64) -> String {
    let digits = n.to_string();
    let mut out = String::with_capacity(digits.len() + digits.len() / 3);

    for (i, ch) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            out.push(',');
        }
        out.push(ch);
    }

    out
}

/// Print a header at the start of the scan
pub fn print_header(root: &Path, workers: usize, batch_size: usize, db_path: &Path) {
    println!();
    println!(
        "{} {}",
        style("file-indexer").cyan().bold(),
        env!("CARGO_PKG_VERSION")
    );
    println!("{}", style("─".repeat(50)).dim());
    println!("  {} {}", style("Root:").bold(), root.display());
    println!("  {} {}", style("Workers:").bold(), workers);
    println!("  {} {}", style("Batch size:").bold(), batch_size);
    println!("  {} {}", style("Database:").bold(), db_path.display());
    println!();
}

/// Print a summary of the scan results
pub fn print_summary(result: &ScanResult, db_path: &Path) {
    let secs = result.duration.as_secs_f64();
    let rate = if secs > 0.0 {
        result.files_found as f64 / secs
    } else {
        0.0
    };

    let title = if result.completed {
        style("Scan Complete").green().bold()
    } else {
        style("Scan Interrupted").yellow().bold()
    };

    println!();
    println!("{}", title);
    println!("{}", style("─".repeat(50)).dim());
    println!(
        "  {} {}",
        style("Directories:").bold(),
        format_number(result.dirs_scanned)
    );
    println!("  {} {}", style("Files:").bold(), format_number(result.files_found));
    println!(
        "  {} {}",
        style("Total Size:").bold(),
        format_size(result.total_bytes, BINARY)
    );
    println!(
        "  {} {:.1}s ({:.0} files/sec)",
        style("Duration:").bold(),
        secs,
        rate
    );
    println!(
        "  {} {} in {} batches",
        style("Written:").bold(),
        format_number(result.records_written),
        format_number(result.batches_flushed)
    );
    if result.batches_failed > 0 {
        println!(
            "  {} {}",
            style("Failed batches:").red().bold(),
            format_number(result.batches_failed)
        );
    }
    if result.errors > 0 {
        println!(
            "  {} {}",
            style("Errors:").yellow().bold(),
            format_number(result.errors)
        );
    }

    match std::fs::metadata(db_path) {
        Ok(meta) => println!(
            "  {} {} ({})",
            style("Database:").bold(),
            db_path.display(),
            format_size(meta.len(), BINARY)
        ),
        Err(_) => println!("  {} {}", style("Database:").bold(), db_path.display()),
    }
    println!();
}

/// Print index totals and the most common extensions
pub fn print_top_extensions(stats: &IndexStats) {
    println!(
        "  {} {} files, {}",
        style("Index:").bold(),
        format_number(stats.count),
        format_size(stats.total_size, BINARY)
    );
    println!();

    if stats.histogram.is_empty() {
        return;
    }

    println!("{}", style("Top Extensions").bold());
    for entry in stats.histogram.iter().take(TOP_EXTENSIONS) {
        let name = if entry.extension.is_empty() {
            "(none)"
        } else {
            entry.extension.as_str()
        };
        println!("  {:<12} {:>12}", name, format_number(entry.count));
    }
    println!();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_number() {
        assert_eq!(format_number(0), "0");
        assert_eq!(format_number(999), "999");
        assert_eq!(format_number(1000), "1,000");
        assert_eq!(format_number(1234567), "1,234,567");
        assert_eq!(format_number(1234567890), "1,234,567,890");
    }
}
