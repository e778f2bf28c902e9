//! Connection dispatcher
//!
//! Accepts TCP connections and runs one session task per connection.
//! Admission is bounded by a semaphore of `max_sessions` permits; a
//! connection beyond capacity gets one busy error block and is closed.

use crate::error::{ServerError, ServerResult};
use crate::protocol::QueryExecutor;
use crate::server::session::{self, LiveSession, Session};
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{watch, Semaphore};
use tokio::task::JoinSet;
use tracing::{debug, error, info, warn};

/// Default cap on concurrent sessions
pub const DEFAULT_MAX_SESSIONS: usize = 256;

/// Default time sessions get to finish after shutdown
pub const DEFAULT_GRACE: Duration = Duration::from_secs(10);

/// Pause after a failed accept (e.g. out of file descriptors)
const ACCEPT_BACKOFF: Duration = Duration::from_millis(50);

/// Dispatcher limits
#[derive(Debug, Clone)]
pub struct ServerOptions {
    /// Concurrent sessions admitted
    pub max_sessions: usize,

    /// Grace period for in-flight sessions on shutdown
    pub grace: Duration,
}

impl Default for ServerOptions {
    fn default() -> Self {
        Self {
            max_sessions: DEFAULT_MAX_SESSIONS,
            grace: DEFAULT_GRACE,
        }
    }
}

/// Handle to stop a running server
///
/// Cheap to clone. [`shutdown`](Self::shutdown) never blocks, is idempotent
/// and may be called from any thread, including a signal handler thread.
#[derive(Clone)]
pub struct ServerHandle {
    shutdown: Arc<watch::Sender<bool>>,
    live: Arc<AtomicUsize>,
}

impl ServerHandle {
    /// Stop accepting connections and close sessions after the grace period
    pub fn shutdown(&self) {
        if !self.shutdown.send_replace(true) {
            info!("Server shutdown requested");
        }
    }

    pub fn is_shutdown(&self) -> bool {
        *self.shutdown.borrow()
    }

    /// Sessions currently open
    pub fn live_sessions(&self) -> usize {
        self.live.load(Ordering::SeqCst)
    }
}

/// Multi-client query server
pub struct QueryServer {
    listener: TcpListener,
    executor: QueryExecutor,
    options: ServerOptions,
    shutdown: Arc<watch::Sender<bool>>,
    live: Arc<AtomicUsize>,
    next_id: AtomicU64,
    permits: Arc<Semaphore>,
}

impl QueryServer {
    /// Bind the listening socket
    pub async fn bind(
        addr: SocketAddr,
        executor: QueryExecutor,
        options: ServerOptions,
    ) -> ServerResult<Self> {
        let listener = TcpListener::bind(addr)
            .await
            .map_err(|source| ServerError::Bind {
                addr: addr.to_string(),
                source,
            })?;

        let (shutdown, _) = watch::channel(false);
        let max_sessions = options.max_sessions.max(1);

        Ok(Self {
            listener,
            executor,
            options,
            shutdown: Arc::new(shutdown),
            live: Arc::new(AtomicUsize::new(0)),
            next_id: AtomicU64::new(1),
            permits: Arc::new(Semaphore::new(max_sessions)),
        })
    }

    /// Address actually bound (useful with port 0)
    pub fn local_addr(&self) -> ServerResult<SocketAddr> {
        Ok(self.listener.local_addr()?)
    }

    pub fn handle(&self) -> ServerHandle {
        ServerHandle {
            shutdown: Arc::clone(&self.shutdown),
            live: Arc::clone(&self.live),
        }
    }

    /// Accept connections until shutdown, then drain sessions
    pub async fn run(self) -> ServerResult<()> {
        let mut shutdown = self.shutdown.subscribe();
        let mut sessions = JoinSet::new();

        info!(
            addr = %self.local_addr()?,
            max_sessions = self.options.max_sessions,
            "Query server listening"
        );

        loop {
            tokio::select! {
                _ = session::wait_for_shutdown(&mut shutdown) => break,

                Some(joined) = sessions.join_next(), if !sessions.is_empty() => {
                    if let Err(e) = joined {
                        if e.is_panic() {
                            error!(error = %e, "Session task panicked");
                        }
                    }
                }

                accepted = self.listener.accept() => match accepted {
                    Ok((stream, peer)) => self.admit(stream, peer, &mut sessions),
                    Err(e) => {
                        warn!(error = %e, "Failed to accept connection");
                        tokio::time::sleep(ACCEPT_BACKOFF).await;
                    }
                },
            }
        }

        // Stop accepting before waiting on sessions
        drop(self.listener);

        info!(
            sessions = sessions.len(),
            grace_secs = self.options.grace.as_secs(),
            "Shutting down, waiting for sessions"
        );

        let drained = tokio::time::timeout(self.options.grace, async {
            while sessions.join_next().await.is_some() {}
        })
        .await;

        if drained.is_err() {
            warn!(remaining = sessions.len(), "Grace period expired, closing sessions");
            sessions.abort_all();
            while sessions.join_next().await.is_some() {}
        }

        info!("Query server stopped");
        Ok(())
    }

    fn admit(&self, stream: TcpStream, peer: SocketAddr, sessions: &mut JoinSet<()>) {
        let permit = match Arc::clone(&self.permits).try_acquire_owned() {
            Ok(permit) => permit,
            Err(_) => {
                warn!(peer = %peer, "Session limit reached, rejecting connection");
                tokio::spawn(reject_busy(stream));
                return;
            }
        };

        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        let (live, count) = LiveSession::enter(&self.live);
        info!(session = id, peer = %peer, live = count, "Session opened");

        let session = Session {
            id,
            peer,
            executor: self.executor.clone(),
            shutdown: self.shutdown.subscribe(),
            permit,
            live,
        };

        sessions.spawn(async move {
            let reason = session::run(stream, session).await;
            debug!(session = id, reason = ?reason, "Session task finished");
        });
    }
}

async fn reject_busy(mut stream: TcpStream) {
    use tokio::io::AsyncWriteExt;

    if session::write_block(&mut stream, "ERROR: server busy").await.is_ok() {
        let _ = stream.shutdown().await;
    }
}
