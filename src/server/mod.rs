//! Multi-client query server
//!
//! # Architecture
//!
//! ```text
//! TcpListener ──accept──▶ QueryServer (dispatcher)
//!                           │  semaphore: max_sessions permits
//!                           │  session ids: 1, 2, 3, ...
//!                           ▼
//!                 JoinSet of session tasks
//!                 ┌──────────┐ ┌──────────┐
//!                 │ Session 1│ │ Session 2│ ...
//!                 └────┬─────┘ └────┬─────┘
//!                      │ spawn_blocking
//!                      ▼
//!               QueryExecutor ──▶ RecordStore
//! ```
//!
//! Wire format: UTF-8 lines. Every server block (banner, response, error)
//! ends with a line containing only `END`. `QUIT` is answered with a single
//! `BYE` line before the connection closes. Request lines are capped at
//! [`MAX_LINE_LEN`] bytes.

pub mod dispatcher;
pub mod session;

pub use dispatcher::{QueryServer, ServerHandle, ServerOptions, DEFAULT_GRACE, DEFAULT_MAX_SESSIONS};
pub use session::{CloseReason, SessionEvent, SessionState, END_MARKER, FAREWELL, MAX_LINE_LEN};
