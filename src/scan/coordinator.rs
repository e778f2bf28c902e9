//! Scan coordinator - orchestrates the parallel directory scan
//!
//! The coordinator is responsible for:
//! - Validating the root before any worker starts
//! - Setting up the work queue, batch sink and workers
//! - Waiting for completion or shutdown
//! - The final flush and the [`ScanResult`]

use crate::db::RecordStore;
use crate::error::ScanError;
use crate::scan::queue::WorkQueue;
use crate::scan::sink::{BatchSink, DEFAULT_BATCH_SIZE, DEFAULT_FLUSH_RETRIES};
use crate::scan::stats::{ScanProgress, ScanStats};
use crate::scan::worker::{self, WorkerContext, WorkerExit};
use crate::scan::{normalize_worker_count, DEFAULT_WORKERS};
use crossbeam_channel::{unbounded, Receiver, RecvTimeoutError};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

/// How often the coordinator checks the shutdown flag while waiting
const POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Tuning for one scan
#[derive(Debug, Clone)]
pub struct ScanOptions {
    /// Number of worker threads (0 means the default, clamped to 32)
    pub worker_count: usize,

    /// Records per batch
    pub batch_size: usize,

    /// Retries for a failed batch before it is dropped
    pub flush_retries: u32,

    /// Capacity of the directory queue
    pub queue_capacity: usize,

    /// Log a progress line every this many files (0 disables)
    pub progress_interval: u64,

    /// How long to wait for workers after a shutdown request
    pub shutdown_timeout: Duration,

    /// Stop the scan after this long
    pub max_duration: Option<Duration>,
}

impl Default for ScanOptions {
    fn default() -> Self {
        Self {
            worker_count: DEFAULT_WORKERS,
            batch_size: DEFAULT_BATCH_SIZE,
            flush_retries: DEFAULT_FLUSH_RETRIES,
            queue_capacity: 10_000,
            progress_interval: 100,
            shutdown_timeout: Duration::from_secs(60),
            max_duration: None,
        }
    }
}

/// Result of a finished scan
#[derive(Debug, Clone)]
pub struct ScanResult {
    /// Regular files discovered
    pub files_found: u64,

    /// Sum of their sizes
    pub total_bytes: u64,

    /// Directories listed
    pub dirs_scanned: u64,

    /// Non-fatal errors (unreadable entries, dropped batches)
    pub errors: u64,

    /// Records persisted
    pub records_written: u64,

    /// Successful batch writes
    pub batches_flushed: u64,

    /// Batches dropped after their retries
    pub batches_failed: u64,

    /// Wall-clock time of the scan
    pub duration: Duration,

    /// False if the scan was interrupted or timed out
    pub completed: bool,

    /// Worker threads actually used
    pub workers: usize,
}

impl ScanResult {
    pub fn duration_ms(&self) -> u128 {
        self.duration.as_millis()
    }
}

/// Coordinates one parallel directory scan
///
/// Counters live for the lifetime of the coordinator, so use a fresh
/// coordinator per scan.
pub struct ScanCoordinator {
    store: Arc<dyn RecordStore>,
    options: ScanOptions,
    shutdown: Arc<AtomicBool>,
    stats: Arc<ScanStats>,
}

impl ScanCoordinator {
    pub fn new(store: Arc<dyn RecordStore>, options: ScanOptions) -> Self {
        Self {
            store,
            options,
            shutdown: Arc::new(AtomicBool::new(false)),
            stats: Arc::new(ScanStats::new()),
        }
    }

    /// Get a clone of the shutdown flag (for signal handlers)
    pub fn shutdown_flag(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.shutdown)
    }

    pub fn options(&self) -> &ScanOptions {
        &self.options
    }

    /// Current progress
    pub fn progress(&self, elapsed: Duration) -> ScanProgress {
        self.stats.snapshot(elapsed)
    }

    /// Scan `root` and persist a record for every regular file below it
    ///
    /// Fails only if the root itself is unusable. Everything that goes
    /// wrong below the root is counted in [`ScanResult::errors`].
    pub fn scan(&self, root: &Path) -> Result<ScanResult, ScanError> {
        let root = validate_root(root)?;
        let start = Instant::now();
        let worker_count = normalize_worker_count(self.options.worker_count);

        info!(
            root = %root.display(),
            workers = worker_count,
            batch_size = self.options.batch_size,
            "Starting scan"
        );

        let sink = Arc::new(
            BatchSink::new(Arc::clone(&self.store), self.options.batch_size)
                .with_retries(self.options.flush_retries),
        );
        let queue = WorkQueue::new(self.options.queue_capacity, worker_count);
        let ctx = Arc::new(WorkerContext {
            sink: Arc::clone(&sink),
            stats: Arc::clone(&self.stats),
            shutdown: Arc::clone(&self.shutdown),
            progress_interval: self.options.progress_interval,
            started: start,
        });

        queue.seed(root.clone());

        let (done_tx, done_rx) = unbounded();
        let mut handles = Vec::with_capacity(worker_count);
        for id in 0..worker_count {
            match worker::spawn(id, Arc::clone(&ctx), queue.handle(), done_tx.clone()) {
                Ok(handle) => handles.push(handle),
                Err(e) => {
                    self.shutdown.store(true, Ordering::SeqCst);
                    queue.stop_all();
                    join_workers(handles);
                    return Err(ScanError::WorkerSpawn {
                        id,
                        reason: e.to_string(),
                    });
                }
            }
        }
        drop(done_tx);
        debug!(count = handles.len(), "Workers spawned");

        let outcome = self.wait_for_workers(&done_rx, worker_count, start, &queue);
        if outcome == WaitOutcome::Abandoned {
            // Detached workers keep running until their current entry is done
            drop(handles);
        } else {
            join_workers(handles);
        }
        let completed = outcome == WaitOutcome::Finished;

        // Final flush, even of a partial batch
        if let Err(e) = sink.flush() {
            self.stats.record_error();
            warn!(error = %e, "Final batch dropped");
        }

        let sink_stats = sink.stats();
        let result = ScanResult {
            files_found: self.stats.files_found(),
            total_bytes: self.stats.total_bytes(),
            dirs_scanned: self.stats.dirs_scanned(),
            errors: self.stats.errors(),
            records_written: sink_stats.records_written(),
            batches_flushed: sink_stats.batches_flushed(),
            batches_failed: sink_stats.batches_failed(),
            duration: start.elapsed(),
            completed,
            workers: worker_count,
        };

        info!(
            files = result.files_found,
            bytes = result.total_bytes,
            dirs = result.dirs_scanned,
            errors = result.errors,
            batches = result.batches_flushed,
            duration_ms = result.duration_ms() as u64,
            completed = result.completed,
            "Scan finished"
        );

        Ok(result)
    }

    /// Run [`scan`](Self::scan) while a background thread reports progress
    /// every 100ms
    pub fn scan_with_progress<F>(&self, root: &Path, progress_callback: F) -> Result<ScanResult, ScanError>
    where
        F: Fn(ScanProgress) + Send + 'static,
    {
        let start = Instant::now();
        let finished = Arc::new(AtomicBool::new(false));
        let stats = Arc::clone(&self.stats);
        let done = Arc::clone(&finished);

        let progress_handle = thread::Builder::new()
            .name("scan-progress".into())
            .spawn(move || {
                while !done.load(Ordering::Relaxed) {
                    progress_callback(stats.snapshot(start.elapsed()));
                    thread::sleep(POLL_INTERVAL);
                }
            });

        if let Err(e) = &progress_handle {
            warn!(error = %e, "Progress reporting unavailable");
        }

        let result = self.scan(root);

        finished.store(true, Ordering::SeqCst);
        if let Ok(handle) = progress_handle {
            let _ = handle.join();
        }

        result
    }

    /// Wait until every worker has exited
    ///
    /// After a shutdown request workers get `shutdown_timeout` to stop
    /// before they are abandoned.
    fn wait_for_workers(
        &self,
        done_rx: &Receiver<WorkerExit>,
        mut running: usize,
        start: Instant,
        queue: &WorkQueue,
    ) -> WaitOutcome {
        let mut deadline: Option<Instant> = None;

        while running > 0 {
            match done_rx.recv_timeout(POLL_INTERVAL) {
                Ok(exit) => {
                    running -= 1;
                    if exit.panicked {
                        // Its task never completes, so the others would idle forever
                        warn!(worker = exit.id, "Worker panicked, stopping scan");
                        self.shutdown.store(true, Ordering::SeqCst);
                    } else {
                        debug!(worker = exit.id, "Worker exited");
                    }
                    continue;
                }
                Err(RecvTimeoutError::Timeout) => {}
                Err(RecvTimeoutError::Disconnected) => break,
            }

            match deadline {
                None => {
                    let timed_out = self
                        .options
                        .max_duration
                        .is_some_and(|max| start.elapsed() >= max);

                    if timed_out {
                        warn!("Scan exceeded its maximum duration, stopping workers");
                        self.shutdown.store(true, Ordering::SeqCst);
                    }

                    if self.shutdown.load(Ordering::Relaxed) {
                        info!(pending = queue.pending(), "Shutdown requested, stopping workers");
                        queue.stop_all();
                        deadline = Some(Instant::now() + self.options.shutdown_timeout);
                    }
                }
                Some(deadline) if Instant::now() >= deadline => {
                    warn!(
                        running,
                        timeout_secs = self.options.shutdown_timeout.as_secs(),
                        "Workers did not stop in time, abandoning them"
                    );
                    return WaitOutcome::Abandoned;
                }
                Some(_) => {}
            }
        }

        if queue.is_complete() && !self.shutdown.load(Ordering::Relaxed) {
            WaitOutcome::Finished
        } else {
            WaitOutcome::Interrupted
        }
    }
}

/// How the wait for workers ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum WaitOutcome {
    /// All work done
    Finished,
    /// Stopped early, every worker exited
    Interrupted,
    /// Stopped early, some workers did not exit in time
    Abandoned,
}

/// Join finished worker threads, logging panics
fn join_workers(handles: Vec<JoinHandle<()>>) {
    for handle in handles {
        let name = handle.thread().name().unwrap_or("scan-worker").to_string();
        if handle.join().is_err() {
            warn!(worker = %name, "Worker panicked");
        }
    }
}

/// Check the root exists, is a directory and can be listed
fn validate_root(root: &Path) -> Result<PathBuf, ScanError> {
    let metadata = fs::metadata(root).map_err(|e| match e.kind() {
        io::ErrorKind::NotFound => ScanError::NotFound {
            path: root.to_path_buf(),
        },
        _ => ScanError::Unreadable {
            path: root.to_path_buf(),
            reason: e.to_string(),
        },
    })?;

    if !metadata.is_dir() {
        return Err(ScanError::NotADirectory {
            path: root.to_path_buf(),
        });
    }

    let unreadable = |e: io::Error| ScanError::Unreadable {
        path: root.to_path_buf(),
        reason: e.to_string(),
    };
    fs::read_dir(root).map_err(unreadable)?;
    root.canonicalize().map_err(unreadable)
}
