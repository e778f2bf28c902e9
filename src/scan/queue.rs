//! Directory work queue with backpressure support
//!
//! Scan workers share one bounded channel of directory tasks. When the
//! channel is full, a worker keeps the subdirectory on its own local stack
//! and walks it inline instead of blocking.
//!
//! Completion is tracked with a pending-task counter: it counts tasks that
//! are queued or being processed. The counter starts at 1 for the root. The
//! worker that brings it back to zero broadcasts one [`Message::Stop`] per
//! worker.

use crossbeam_channel::{bounded, Receiver, RecvTimeoutError, Sender, TrySendError};
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// A directory to list
#[derive(Debug, Clone)]
pub struct DirTask {
    /// Full path to the directory
    pub path: PathBuf,

    /// Depth from root (0 = root)
    pub depth: u32,
}

impl DirTask {
    pub fn new(path: PathBuf, depth: u32) -> Self {
        Self { path, depth }
    }

    /// Create the root task
    pub fn root(path: PathBuf) -> Self {
        Self { path, depth: 0 }
    }

    /// Task for a subdirectory of this one
    pub fn child(&self, path: PathBuf) -> Self {
        Self {
            path,
            depth: self.depth + 1,
        }
    }
}

/// Item carried by the work queue
#[derive(Debug)]
pub enum Message {
    /// List a directory
    Dir(DirTask),

    /// No work left; the receiving worker exits
    Stop,
}

/// Statistics for the work queue
#[derive(Debug, Default)]
pub struct QueueStats {
    /// Tasks enqueued
    pub enqueued: AtomicU64,

    /// Tasks dequeued
    pub dequeued: AtomicU64,

    /// Subdirectories walked inline because the queue was full
    pub inline_processed: AtomicU64,
}

impl QueueStats {
    pub fn inline_count(&self) -> u64 {
        self.inline_processed.load(Ordering::Relaxed)
    }
}

/// Bounded directory queue shared by the scan workers
pub struct WorkQueue {
    sender: Sender<Message>,
    receiver: Receiver<Message>,
    pending: Arc<AtomicU64>,
    worker_count: usize,
    stats: Arc<QueueStats>,
}

impl WorkQueue {
    /// Create a queue for `worker_count` workers
    ///
    /// Capacity is raised to at least `worker_count` so the final stop
    /// broadcast always fits.
    pub fn new(capacity: usize, worker_count: usize) -> Self {
        let (sender, receiver) = bounded(capacity.max(worker_count).max(1));

        Self {
            sender,
            receiver,
            pending: Arc::new(AtomicU64::new(0)),
            worker_count,
            stats: Arc::new(QueueStats::default()),
        }
    }

    /// Get a handle for a worker (clone per worker)
    pub fn handle(&self) -> QueueHandle {
        QueueHandle {
            sender: self.sender.clone(),
            receiver: self.receiver.clone(),
            pending: Arc::clone(&self.pending),
            worker_count: self.worker_count,
            stats: Arc::clone(&self.stats),
        }
    }

    /// Seed the queue with the root directory
    pub fn seed(&self, root: PathBuf) {
        self.pending.fetch_add(1, Ordering::SeqCst);
        // The queue owns a receiver, so this cannot disconnect
        let _ = self.sender.send(Message::Dir(DirTask::root(root)));
        self.stats.enqueued.fetch_add(1, Ordering::Relaxed);
    }

    /// Wake every worker with a stop message
    ///
    /// Used on interrupt; messages that do not fit are skipped since workers
    /// also poll the shutdown flag.
    pub fn stop_all(&self) {
        for _ in 0..self.worker_count {
            if self.sender.try_send(Message::Stop).is_err() {
                break;
            }
        }
    }

    /// Tasks queued or in progress
    pub fn pending(&self) -> u64 {
        self.pending.load(Ordering::SeqCst)
    }

    /// Check if all work is complete
    pub fn is_complete(&self) -> bool {
        self.pending() == 0
    }

    /// Current number of queued messages
    pub fn len(&self) -> usize {
        self.receiver.len()
    }

    pub fn is_empty(&self) -> bool {
        self.receiver.is_empty()
    }

    pub fn stats(&self) -> Arc<QueueStats> {
        Arc::clone(&self.stats)
    }
}

/// Per-worker handle for sending and receiving tasks
#[derive(Clone)]
pub struct QueueHandle {
    sender: Sender<Message>,
    receiver: Receiver<Message>,
    pending: Arc<AtomicU64>,
    worker_count: usize,
    stats: Arc<QueueStats>,
}

impl QueueHandle {
    /// Try to queue a subdirectory
    ///
    /// Returns the task back when the queue is full (backpressure) so the
    /// caller can walk it inline.
    pub fn try_push(&self, task: DirTask) -> Result<(), DirTask> {
        self.pending.fetch_add(1, Ordering::SeqCst);
        match self.sender.try_send(Message::Dir(task)) {
            Ok(()) => {
                self.stats.enqueued.fetch_add(1, Ordering::Relaxed);
                Ok(())
            }
            Err(TrySendError::Full(msg)) | Err(TrySendError::Disconnected(msg)) => {
                self.pending.fetch_sub(1, Ordering::SeqCst);
                self.stats.inline_processed.fetch_add(1, Ordering::Relaxed);
                match msg {
                    Message::Dir(task) => Err(task),
                    Message::Stop => unreachable!("only directory tasks are pushed"),
                }
            }
        }
    }

    /// Receive the next message, `None` on timeout or disconnect
    pub fn recv_timeout(&self, timeout: Duration) -> Option<Message> {
        match self.receiver.recv_timeout(timeout) {
            Ok(msg) => {
                if matches!(msg, Message::Dir(_)) {
                    self.stats.dequeued.fetch_add(1, Ordering::Relaxed);
                }
                Some(msg)
            }
            Err(RecvTimeoutError::Timeout) | Err(RecvTimeoutError::Disconnected) => None,
        }
    }

    /// Mark one dequeued task as finished
    ///
    /// Returns true if this was the last outstanding task, in which case
    /// the stop broadcast has been sent.
    pub fn complete(&self) -> bool {
        if self.pending.fetch_sub(1, Ordering::SeqCst) == 1 {
            for _ in 0..self.worker_count {
                // Queue holds no directory tasks at this point, so this fits
                let _ = self.sender.try_send(Message::Stop);
            }
            true
        } else {
            false
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn recv_dir(handle: &QueueHandle) -> DirTask {
        match handle.recv_timeout(Duration::from_millis(100)) {
            Some(Message::Dir(task)) => task,
            other => panic!("expected a directory task, got {:?}", other),
        }
    }

    #[test]
    fn test_queue_basic() {
        let queue = WorkQueue::new(10, 2);
        queue.seed("/test".into());
        assert_eq!(queue.len(), 1);
        assert_eq!(queue.pending(), 1);

        let handle = queue.handle();
        let task = recv_dir(&handle);
        assert_eq!(task.path, PathBuf::from("/test"));
        assert_eq!(task.depth, 0);
        assert_eq!(task.child("/test/a".into()).depth, 1);
    }

    #[test]
    fn test_queue_backpressure() {
        let queue = WorkQueue::new(2, 1);
        let handle = queue.handle();

        assert!(handle.try_push(DirTask::new("/a".into(), 1)).is_ok());
        assert!(handle.try_push(DirTask::new("/b".into(), 1)).is_ok());

        // Queue is full, the task comes back for inline processing
        let rejected = handle.try_push(DirTask::new("/c".into(), 1)).unwrap_err();
        assert_eq!(rejected.path, PathBuf::from("/c"));
        assert_eq!(queue.pending(), 2);
        assert_eq!(queue.stats().inline_count(), 1);
    }

    #[test]
    fn test_completion_broadcasts_stop() {
        let queue = WorkQueue::new(10, 3);
        let handle = queue.handle();
        queue.seed("/root".into());

        let _root = recv_dir(&handle);
        handle.try_push(DirTask::new("/root/a".into(), 1)).unwrap();
        assert!(!handle.complete());
        assert!(!queue.is_complete());

        let _a = recv_dir(&handle);
        assert!(handle.complete());
        assert!(queue.is_complete());

        for _ in 0..3 {
            assert!(matches!(
                handle.recv_timeout(Duration::from_millis(100)),
                Some(Message::Stop)
            ));
        }
        assert!(handle.recv_timeout(Duration::from_millis(10)).is_none());
    }

    #[test]
    fn test_queue_stats() {
        let queue = WorkQueue::new(10, 1);
        let handle = queue.handle();

        handle.try_push(DirTask::new("/a".into(), 0)).unwrap();
        handle.try_push(DirTask::new("/b".into(), 0)).unwrap();
        recv_dir(&handle);
        recv_dir(&handle);

        let stats = queue.stats();
        assert_eq!(stats.enqueued.load(Ordering::Relaxed), 2);
        assert_eq!(stats.dequeued.load(Ordering::Relaxed), 2);
    }
}
