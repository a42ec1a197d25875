//! Socket transport for the broodlink game bridge.
//!
//! Provides the blocking stream types everything else builds on:
//! - [`TcpEndpoint`] — TCP listener with port probing for the server role
//! - [`UnixEndpoint`] — local IPC path listener (Unix only)
//! - [`BridgeStream`] — a connected stream, TCP or Unix, with timeout and
//!   readiness-poll support
//! - [`TransportContext`] — the process-wide shared I/O context

pub mod context;
pub mod error;
pub mod stream;
pub mod tcp;

#[cfg(unix)]
pub mod unix;

pub use context::TransportContext;
pub use error::{Result, TransportError};
pub use stream::{BridgeStream, TimeoutMs};
pub use tcp::{TcpEndpoint, PORT_RANGE, STARTING_PORT};

#[cfg(unix)]
pub use unix::UnixEndpoint;
