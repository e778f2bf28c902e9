//! Per-connection session handling
//!
//! A session moves through an explicit state machine:
//!
//! ```text
//! Greeting ──Greeted──▶ Reading ──Line──▶ Executing ──ResponseWritten──┐
//!                         ▲  │                                          │
//!                         │  └─ empty line (stays)                      │
//!                         └─────────────────────────────────────────────┘
//!
//! QUIT, end of stream, I/O error or shutdown ──▶ Closed(reason)
//! ```
//!
//! [`SessionState::on`] is pure so the transitions can be tested without a
//! socket; [`run`] drives it over a TCP stream.
//!
//! Input is read as raw bytes. Lines are decoded lossily (invalid UTF-8
//! becomes U+FFFD) and capped at [`MAX_LINE_LEN`]; an over-long line is
//! discarded up to its newline and answered with an error block.

use crate::error::ProtocolError;
use crate::protocol::{format_error, QueryExecutor};
use std::io;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::net::TcpStream;
use tokio::sync::{watch, OwnedSemaphorePermit};
use tracing::{debug, error, info, warn};

/// Line terminating every response block
pub const END_MARKER: &str = "END";

/// Line sent in reply to QUIT
pub const FAREWELL: &str = "BYE";

/// Longest accepted request line in bytes, excluding the line terminator
pub const MAX_LINE_LEN: usize = 8 * 1024;

/// Why a session ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CloseReason {
    /// Client sent QUIT
    Quit,
    /// Client closed the stream
    EndOfStream,
    /// Read or write failed
    IoError,
    /// Server is shutting down
    Shutdown,
}

impl CloseReason {
    /// Terminated by an I/O failure
    pub fn is_abnormal(self) -> bool {
        matches!(self, CloseReason::IoError)
    }
}

/// Session lifecycle state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Greeting,
    Reading,
    Executing,
    Closed(CloseReason),
}

/// Inputs to the session state machine
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionEvent<'a> {
    /// Banner written
    Greeted,
    /// One line received
    Line(&'a str),
    /// Line exceeded [`MAX_LINE_LEN`] and was discarded
    Oversized,
    /// Response block written
    ResponseWritten,
    EndOfStream,
    IoError,
    Shutdown,
}

impl SessionState {
    /// Apply one event
    pub fn on(self, event: SessionEvent<'_>) -> SessionState {
        use SessionEvent as E;
        use SessionState as S;

        match (self, event) {
            (S::Closed(reason), _) => S::Closed(reason),
            (_, E::EndOfStream) => S::Closed(CloseReason::EndOfStream),
            (_, E::IoError) => S::Closed(CloseReason::IoError),
            (_, E::Shutdown) => S::Closed(CloseReason::Shutdown),
            (S::Greeting, E::Greeted) => S::Reading,
            (S::Reading, E::Line(line)) => {
                let line = line.trim();
                if line.is_empty() {
                    S::Reading
                } else if line.eq_ignore_ascii_case("QUIT") {
                    S::Closed(CloseReason::Quit)
                } else {
                    S::Executing
                }
            }
            (S::Reading, E::Oversized) => S::Executing,
            (S::Executing, E::ResponseWritten) => S::Reading,
            (state, _) => state,
        }
    }

    pub fn is_closed(self) -> bool {
        matches!(self, SessionState::Closed(_))
    }
}

/// Live-session counter entry, decremented exactly once on drop
pub(crate) struct LiveSession {
    live: Arc<AtomicUsize>,
}

impl LiveSession {
    pub(crate) fn enter(live: &Arc<AtomicUsize>) -> (Self, usize) {
        let count = live.fetch_add(1, Ordering::SeqCst) + 1;
        (
            Self {
                live: Arc::clone(live),
            },
            count,
        )
    }
}

impl Drop for LiveSession {
    fn drop(&mut self) {
        self.live.fetch_sub(1, Ordering::SeqCst);
    }
}

/// Everything a session task owns
pub(crate) struct Session {
    pub id: u64,
    pub peer: SocketAddr,
    pub executor: QueryExecutor,
    pub shutdown: watch::Receiver<bool>,
    pub permit: OwnedSemaphorePermit,
    pub live: LiveSession,
}

/// Serve one connection until it closes
pub(crate) async fn run(stream: TcpStream, mut session: Session) -> CloseReason {
    let id = session.id;
    let (reader, mut writer) = stream.into_split();
    let mut reader = BufReader::new(reader);
    let mut buf = Vec::new();

    let mut state = SessionState::Greeting;
    state = match write_block(&mut writer, &banner(id)).await {
        Ok(()) => state.on(SessionEvent::Greeted),
        Err(_) => state.on(SessionEvent::IoError),
    };

    while !state.is_closed() {
        let next = tokio::select! {
            _ = wait_for_shutdown(&mut session.shutdown) => {
                state = state.on(SessionEvent::Shutdown);
                continue;
            }
            next = read_request(&mut reader, &mut buf) => next,
        };

        let response = match next {
            Ok(Inbound::Line(line)) => {
                state = state.on(SessionEvent::Line(&line));
                match state {
                    SessionState::Executing => {
                        debug!(session = id, command = line.trim(), "Command received");
                        execute(&session.executor, id, line).await
                    }
                    SessionState::Closed(CloseReason::Quit) => {
                        let _ = write_line(&mut writer, FAREWELL).await;
                        continue;
                    }
                    _ => continue,
                }
            }
            Ok(Inbound::TooLong) => {
                debug!(session = id, max = MAX_LINE_LEN, "Over-long line discarded");
                state = state.on(SessionEvent::Oversized);
                format_error(&ProtocolError::LineTooLong { max: MAX_LINE_LEN })
            }
            Ok(Inbound::Eof) => {
                state = state.on(SessionEvent::EndOfStream);
                continue;
            }
            Err(e) => {
                debug!(session = id, error = %e, "Read failed");
                state = state.on(SessionEvent::IoError);
                continue;
            }
        };

        state = match write_block(&mut writer, &response).await {
            Ok(()) => state.on(SessionEvent::ResponseWritten),
            Err(e) => {
                debug!(session = id, error = %e, "Write failed");
                state.on(SessionEvent::IoError)
            }
        };
    }

    let _ = writer.shutdown().await;

    let reason = match state {
        SessionState::Closed(reason) => reason,
        _ => CloseReason::IoError,
    };
    if reason.is_abnormal() {
        warn!(session = id, peer = %session.peer, reason = ?reason, "Session terminated abnormally");
    } else {
        info!(session = id, peer = %session.peer, reason = ?reason, "Session closed");
    }

    drop(session.permit);
    drop(session.live);
    reason
}

/// One unit of client input
#[derive(Debug, PartialEq, Eq)]
pub(crate) enum Inbound {
    /// A complete line, lossily decoded, terminator stripped
    Line(String),
    /// A line longer than [`MAX_LINE_LEN`], already skipped
    TooLong,
    /// Client closed its side
    Eof,
}

/// Read one request line without buffering more than [`MAX_LINE_LEN`] bytes
///
/// A final line without a newline is still returned before `Eof`.
pub(crate) async fn read_request<R>(reader: &mut R, buf: &mut Vec<u8>) -> io::Result<Inbound>
where
    R: AsyncBufRead + Unpin,
{
    buf.clear();
    let mut oversized = false;
    let mut saw_bytes = false;

    loop {
        let available = reader.fill_buf().await?;
        if available.is_empty() {
            if !saw_bytes {
                return Ok(Inbound::Eof);
            }
            break;
        }
        saw_bytes = true;

        let (part, used, complete) = match available.iter().position(|&b| b == b'\n') {
            Some(i) => (&available[..i], i + 1, true),
            None => (available, available.len(), false),
        };

        if !oversized {
            if buf.len() + part.len() > MAX_LINE_LEN {
                oversized = true;
                buf.clear();
            } else {
                buf.extend_from_slice(part);
            }
        }

        reader.consume(used);
        if complete {
            break;
        }
    }

    if oversized {
        return Ok(Inbound::TooLong);
    }

    if buf.last() == Some(&b'\r') {
        buf.pop();
    }
    Ok(Inbound::Line(String::from_utf8_lossy(buf).into_owned()))
}

/// Run one command on the blocking pool
async fn execute(executor: &QueryExecutor, id: u64, line: String) -> String {
    let executor = executor.clone();
    match tokio::task::spawn_blocking(move || executor.respond(&line)).await {
        Ok(response) => response,
        Err(e) => {
            error!(session = id, error = %e, "Query task failed");
            "ERROR: internal error".to_string()
        }
    }
}

/// Resolve once shutdown has been requested
pub(crate) async fn wait_for_shutdown(shutdown: &mut watch::Receiver<bool>) {
    loop {
        let requested = *shutdown.borrow_and_update();
        if requested {
            return;
        }
        if shutdown.changed().await.is_err() {
            // Sender gone without a shutdown request
            std::future::pending::<()>().await;
        }
    }
}

fn banner(id: u64) -> String {
    format!(
        "File Indexer Query Server\nSession #{}\nType HELP for commands, QUIT to exit",
        id
    )
}

/// Write a response block followed by the END marker
pub(crate) async fn write_block<W>(writer: &mut W, body: &str) -> std::io::Result<()>
where
    W: AsyncWrite + Unpin,
{
    let mut block = String::with_capacity(body.len() + END_MARKER.len() + 2);
    block.push_str(body);
    block.push('\n');
    block.push_str(END_MARKER);
    block.push('\n');
    writer.write_all(block.as_bytes()).await?;
    writer.flush().await
}

async fn write_line<W>(writer: &mut W, line: &str) -> std::io::Result<()>
where
    W: AsyncWrite + Unpin,
{
    writer.write_all(line.as_bytes()).await?;
    writer.write_all(b"\n").await?;
    writer.flush().await
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_happy_path() {
        let state = SessionState::Greeting.on(SessionEvent::Greeted);
        assert_eq!(state, SessionState::Reading);

        let state = state.on(SessionEvent::Line("STATS"));
        assert_eq!(state, SessionState::Executing);

        let state = state.on(SessionEvent::ResponseWritten);
        assert_eq!(state, SessionState::Reading);

        let state = state.on(SessionEvent::Line("  quit "));
        assert_eq!(state, SessionState::Closed(CloseReason::Quit));
    }

    #[test]
    fn test_empty_lines_are_ignored() {
        let state = SessionState::Reading;
        assert_eq!(state.on(SessionEvent::Line("")), SessionState::Reading);
        assert_eq!(state.on(SessionEvent::Line("   \t")), SessionState::Reading);
    }

    #[test]
    fn test_garbage_still_executes() {
        // Errors are reported by the executor, the session stays open
        let state = SessionState::Reading.on(SessionEvent::Line("xyzzy"));
        assert_eq!(state, SessionState::Executing);
        assert_eq!(state.on(SessionEvent::ResponseWritten), SessionState::Reading);
    }

    #[test]
    fn test_termination_events() {
        for state in [SessionState::Greeting, SessionState::Reading, SessionState::Executing] {
            assert_eq!(
                state.on(SessionEvent::EndOfStream),
                SessionState::Closed(CloseReason::EndOfStream)
            );
            assert_eq!(
                state.on(SessionEvent::IoError),
                SessionState::Closed(CloseReason::IoError)
            );
            assert_eq!(
                state.on(SessionEvent::Shutdown),
                SessionState::Closed(CloseReason::Shutdown)
            );
        }
    }

    #[test]
    fn test_closed_is_terminal() {
        let closed = SessionState::Closed(CloseReason::Quit);
        assert_eq!(closed.on(SessionEvent::Line("STATS")), closed);
        assert_eq!(closed.on(SessionEvent::IoError), closed);
        assert!(closed.is_closed());
    }

    #[test]
    fn test_out_of_order_events_are_ignored() {
        assert_eq!(
            SessionState::Greeting.on(SessionEvent::Line("STATS")),
            SessionState::Greeting
        );
        assert_eq!(
            SessionState::Executing.on(SessionEvent::Line("STATS")),
            SessionState::Executing
        );
    }

    #[test]
    fn test_live_session_decrements_once() {
        let live = Arc::new(AtomicUsize::new(0));
        let (first, count) = LiveSession::enter(&live);
        assert_eq!(count, 1);
        let (second, count) = LiveSession::enter(&live);
        assert_eq!(count, 2);

        drop(first);
        assert_eq!(live.load(Ordering::SeqCst), 1);
        drop(second);
        assert_eq!(live.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_oversized_line_gets_a_response() {
        let state = SessionState::Reading.on(SessionEvent::Oversized);
        assert_eq!(state, SessionState::Executing);
        assert_eq!(state.on(SessionEvent::ResponseWritten), SessionState::Reading);
        assert_eq!(
            SessionState::Greeting.on(SessionEvent::Oversized),
            SessionState::Greeting
        );
    }

    async fn read_all(input: &[u8]) -> Vec<Inbound> {
        let mut reader = BufReader::with_capacity(16, input);
        let mut buf = Vec::new();
        let mut out = Vec::new();
        loop {
            let next = read_request(&mut reader, &mut buf).await.unwrap();
            let done = next == Inbound::Eof;
            out.push(next);
            if done {
                return out;
            }
        }
    }

    #[tokio::test]
    async fn test_read_request_splits_lines() {
        let got = read_all(b"STATS\r\nHELP\n\nQUIT").await;
        assert_eq!(
            got,
            vec![
                Inbound::Line("STATS".into()),
                Inbound::Line("HELP".into()),
                Inbound::Line(String::new()),
                Inbound::Line("QUIT".into()),
                Inbound::Eof,
            ]
        );
    }

    #[tokio::test]
    async fn test_read_request_replaces_invalid_utf8() {
        let got = read_all(b"FIND name contains \xff\xfe\nSTATS\n").await;
        assert_eq!(
            got,
            vec![
                Inbound::Line("FIND name contains \u{FFFD}\u{FFFD}".into()),
                Inbound::Line("STATS".into()),
                Inbound::Eof,
            ]
        );
    }

    #[tokio::test]
    async fn test_read_request_caps_line_length() {
        let mut input = vec![b'a'; MAX_LINE_LEN + 1];
        input.push(b'\n');
        input.extend_from_slice(&vec![b'b'; MAX_LINE_LEN]);
        input.extend_from_slice(b"\nSTATS\n");

        let got = read_all(&input).await;
        assert_eq!(got.len(), 4);
        assert_eq!(got[0], Inbound::TooLong);
        assert_eq!(got[1], Inbound::Line("b".repeat(MAX_LINE_LEN)));
        assert_eq!(got[2], Inbound::Line("STATS".into()));
        assert_eq!(got[3], Inbound::Eof);
    }

    #[tokio::test]
    async fn test_write_block_appends_end() {
        let mut out = Vec::new();
        write_block(&mut out, "hello\nworld").await.unwrap();
        assert_eq!(String::from_utf8(out).unwrap(), "hello\nworld\nEND\n");
    }
}
