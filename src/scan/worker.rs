//! Worker thread logic for the parallel directory scan
//!
//! Each worker:
//! - Pulls directory tasks from the shared work queue
//! - Lists the directory with `std::fs::read_dir`
//! - Offers a [`Record`] for every regular file to the batch sink
//! - Pushes subdirectories back to the queue, or walks them inline when
//!   the queue is full

use crate::error::TraversalError;
use crate::record::Record;
use crate::scan::queue::{DirTask, Message, QueueHandle};
use crate::scan::sink::BatchSink;
use crate::scan::stats::ScanStats;
use crossbeam_channel::Sender;
use std::fs;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};
use tracing::{debug, info, trace, warn};

/// How long a worker waits for a task before re-checking the shutdown flag
const RECV_TIMEOUT: Duration = Duration::from_millis(100);

/// State shared by every worker of one scan
pub(crate) struct WorkerContext {
    pub sink: Arc<BatchSink>,
    pub stats: Arc<ScanStats>,
    pub shutdown: Arc<AtomicBool>,
    pub progress_interval: u64,
    pub started: Instant,
}

/// Sent by a worker thread when it exits
#[derive(Debug, Clone, Copy)]
pub(crate) struct WorkerExit {
    pub id: usize,
    pub panicked: bool,
}

/// Spawn a named worker thread
///
/// The worker reports on `done` when it exits, however it exits.
pub(crate) fn spawn(
    id: usize,
    ctx: Arc<WorkerContext>,
    queue: QueueHandle,
    done: Sender<WorkerExit>,
) -> std::io::Result<JoinHandle<()>> {
    thread::Builder::new()
        .name(format!("scan-worker-{}", id))
        .spawn(move || {
            let _exit = ExitNotice { id, done };
            worker_loop(id, &ctx, &queue);
        })
}

/// Reports worker exit to the coordinator, including on panic
struct ExitNotice {
    id: usize,
    done: Sender<WorkerExit>,
}

impl Drop for ExitNotice {
    fn drop(&mut self) {
        let _ = self.done.send(WorkerExit {
            id: self.id,
            panicked: thread::panicking(),
        });
    }
}

fn worker_loop(id: usize, ctx: &WorkerContext, queue: &QueueHandle) {
    debug!(worker = id, "Worker starting");
    let mut dirs = 0u64;

    while !ctx.shutdown.load(Ordering::Relaxed) {
        let task = match queue.recv_timeout(RECV_TIMEOUT) {
            Some(Message::Dir(task)) => task,
            Some(Message::Stop) => break,
            None => continue,
        };

        dirs += walk_task(id, task, ctx, queue);
        queue.complete();
    }

    debug!(worker = id, dirs, "Worker shutting down");
}

/// Walk a dequeued task plus whatever backpressure kept local
///
/// Returns the number of directories listed.
fn walk_task(id: usize, task: DirTask, ctx: &WorkerContext, queue: &QueueHandle) -> u64 {
    let mut local = vec![task];
    let mut listed = 0;

    while let Some(task) = local.pop() {
        if ctx.shutdown.load(Ordering::Relaxed) {
            trace!(worker = id, remaining = local.len() + 1, "Abandoning local work");
            break;
        }

        if process_directory(id, &task, ctx, queue, &mut local) {
            listed += 1;
        }
    }

    listed
}

/// List one directory
///
/// Returns false when the directory could not be read; its subtree is
/// skipped and one error is counted.
fn process_directory(
    worker_id: usize,
    task: &DirTask,
    ctx: &WorkerContext,
    queue: &QueueHandle,
    local: &mut Vec<DirTask>,
) -> bool {
    let entries = match fs::read_dir(&task.path) {
        Ok(entries) => entries,
        Err(source) => {
            report(
                worker_id,
                ctx,
                TraversalError::ReadDir {
                    path: task.path.clone(),
                    source,
                },
            );
            return false;
        }
    };

    ctx.stats.record_dir();

    for entry in entries {
        let entry = match entry {
            Ok(entry) => entry,
            Err(source) => {
                report(
                    worker_id,
                    ctx,
                    TraversalError::Entry {
                        dir: task.path.clone(),
                        source,
                    },
                );
                continue;
            }
        };

        let path = entry.path();

        // file_type() does not follow symlinks
        let file_type = match entry.file_type() {
            Ok(file_type) => file_type,
            Err(source) => {
                report(worker_id, ctx, TraversalError::Metadata { path, source });
                continue;
            }
        };

        if file_type.is_dir() {
            if let Err(subtask) = queue.try_push(task.child(path)) {
                trace!(worker = worker_id, path = %subtask.path.display(), "Backpressure, walking inline");
                local.push(subtask);
            }
        } else if file_type.is_file() {
            let record = entry
                .metadata()
                .and_then(|metadata| Record::from_metadata(&path, &metadata));

            match record {
                Ok(record) => offer(worker_id, ctx, record),
                Err(source) => report(worker_id, ctx, TraversalError::Metadata { path, source }),
            }
        }
    }

    true
}

/// Count a file and hand its record to the sink
fn offer(worker_id: usize, ctx: &WorkerContext, record: Record) {
    let files = ctx.stats.record_file(record.size());

    if ctx.progress_interval > 0 && files % ctx.progress_interval == 0 {
        let progress = ctx.stats.snapshot(ctx.started.elapsed());
        info!(
            files = progress.files,
            bytes = progress.bytes,
            dirs = progress.dirs,
            errors = progress.errors,
            files_per_sec = progress.files_per_second() as u64,
            "Scan progress"
        );
    }

    if let Err(e) = ctx.sink.offer(record) {
        ctx.stats.record_error();
        warn!(worker = worker_id, error = %e, "Batch dropped");
    }
}

/// Count and log a non-fatal traversal error
fn report(worker_id: usize, ctx: &WorkerContext, err: TraversalError) {
    ctx.stats.record_error();
    if err.is_not_found() {
        debug!(worker = worker_id, error = %err, "Entry vanished during scan");
    } else {
        warn!(worker = worker_id, error = %err, "Skipping entry");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::SqliteStore;
    use crate::scan::queue::WorkQueue;
    use std::fs::File;
    use std::io::Write;

    fn context(store: Arc<SqliteStore>) -> WorkerContext {
        WorkerContext {
            sink: Arc::new(BatchSink::new(store, 10)),
            stats: Arc::new(ScanStats::new()),
            shutdown: Arc::new(AtomicBool::new(false)),
            progress_interval: 0,
            started: Instant::now(),
        }
    }

    #[test]
    fn test_process_directory_with_full_queue() {
        let dir = tempfile::tempdir().unwrap();
        File::create(dir.path().join("a.txt"))
            .unwrap()
            .write_all(b"0123456789")
            .unwrap();
        fs::create_dir(dir.path().join("sub")).unwrap();
        fs::create_dir(dir.path().join("sub2")).unwrap();

        let store = Arc::new(SqliteStore::open_in_memory().unwrap());
        let ctx = context(store.clone());

        // Capacity 1: the second subdirectory has to stay local
        let queue = WorkQueue::new(1, 1);
        let handle = queue.handle();
        let mut local = Vec::new();

        let task = DirTask::root(dir.path().to_path_buf());
        assert!(process_directory(0, &task, &ctx, &handle, &mut local));

        assert_eq!(queue.len(), 1);
        assert_eq!(local.len(), 1);
        assert_eq!(local[0].depth, 1);
        assert_eq!(ctx.stats.files_found(), 1);
        assert_eq!(ctx.stats.total_bytes(), 10);

        ctx.sink.flush().unwrap();
        assert_eq!(store.count().unwrap(), 1);
    }

    #[test]
    fn test_missing_directory_counts_one_error() {
        let dir = tempfile::tempdir().unwrap();
        let store = Arc::new(SqliteStore::open_in_memory().unwrap());
        let ctx = context(store);
        let queue = WorkQueue::new(4, 1);
        let mut local = Vec::new();

        let task = DirTask::root(dir.path().join("gone"));
        assert!(!process_directory(0, &task, &ctx, &queue.handle(), &mut local));
        assert_eq!(ctx.stats.errors(), 1);
        assert_eq!(ctx.stats.dirs_scanned(), 0);
    }

    #[cfg(unix)]
    #[test]
    fn test_symlinks_are_not_followed() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("real.txt"), b"abc").unwrap();
        std::os::unix::fs::symlink(dir.path().join("real.txt"), dir.path().join("link.txt"))
            .unwrap();
        std::os::unix::fs::symlink(dir.path(), dir.path().join("loop")).unwrap();

        let store = Arc::new(SqliteStore::open_in_memory().unwrap());
        let ctx = context(store);
        let queue = WorkQueue::new(4, 1);
        let mut local = Vec::new();

        let task = DirTask::root(dir.path().to_path_buf());
        process_directory(0, &task, &ctx, &queue.handle(), &mut local);

        assert_eq!(ctx.stats.files_found(), 1);
        assert!(queue.is_empty());
        assert!(local.is_empty());
    }
}
