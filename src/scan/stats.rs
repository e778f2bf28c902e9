//! Thread-safe scan counters
//!
//! Every worker shares one [`ScanStats`]; counters are plain atomics so
//! updating them never contends with the batch sink or the store.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

/// Counters accumulated over one scan
#[derive(Debug, Default)]
pub struct ScanStats {
    files_found: AtomicU64,
    total_bytes: AtomicU64,
    dirs_scanned: AtomicU64,
    errors: AtomicU64,
}

impl ScanStats {
    pub fn new() -> Self {
        Self::default()
    }

    /// Count one discovered file, returning the new file count
    pub fn record_file(&self, size: u64) -> u64 {
        self.total_bytes.fetch_add(size, Ordering::Relaxed);
        self.files_found.fetch_add(1, Ordering::Relaxed) + 1
    }

    /// Count one fully listed directory
    pub fn record_dir(&self) {
        self.dirs_scanned.fetch_add(1, Ordering::Relaxed);
    }

    /// Count one non-fatal error
    pub fn record_error(&self) {
        self.errors.fetch_add(1, Ordering::Relaxed);
    }

    pub fn files_found(&self) -> u64 {
        self.files_found.load(Ordering::Relaxed)
    }

    pub fn total_bytes(&self) -> u64 {
        self.total_bytes.load(Ordering::Relaxed)
    }

    pub fn dirs_scanned(&self) -> u64 {
        self.dirs_scanned.load(Ordering::Relaxed)
    }

    pub fn errors(&self) -> u64 {
        self.errors.load(Ordering::Relaxed)
    }

    /// Point-in-time view for progress display
    pub fn snapshot(&self, elapsed: Duration) -> ScanProgress {
        ScanProgress {
            files: self.files_found(),
            bytes: self.total_bytes(),
            dirs: self.dirs_scanned(),
            errors: self.errors(),
            elapsed,
        }
    }
}

/// Progress information for display
#[derive(Debug, Clone, Default)]
pub struct ScanProgress {
    /// Files found so far
    pub files: u64,

    /// Bytes found so far
    pub bytes: u64,

    /// Directories listed so far
    pub dirs: u64,

    /// Errors so far
    pub errors: u64,

    /// Time since the scan started
    pub elapsed: Duration,
}

impl ScanProgress {
    /// Files per second since the scan started
    pub fn files_per_second(&self) -> f64 {
        let secs = self.elapsed.as_secs_f64();
        if secs > 0.0 {
            self.files as f64 / secs
        } else {
            0.0
        }
    }
}
