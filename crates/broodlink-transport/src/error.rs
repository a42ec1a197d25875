use std::path::PathBuf;

/// Errors that can occur in transport operations.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    /// Failed to bind to the specified TCP port.
    #[error("failed to bind to port {port}: {source}")]
    Bind { port: u16, source: std::io::Error },

    /// No free port found in the probing range.
    #[error("no free port in {start}..{end}")]
    PortRangeExhausted { start: u16, end: u16 },

    /// Failed to bind to the specified IPC path.
    #[error("failed to bind to {path}: {source}")]
    BindPath {
        path: PathBuf,
        source: std::io::Error,
    },

    /// Failed to connect to the specified address.
    #[error("failed to connect to {addr}: {source}")]
    Connect { addr: String, source: std::io::Error },

    /// Failed to accept an incoming connection.
    #[error("failed to accept connection: {0}")]
    Accept(std::io::Error),

    /// The socket path is too long for the platform.
    #[error("socket path too long ({len} bytes, max {max}): {path}")]
    PathTooLong {
        path: PathBuf,
        len: usize,
        max: usize,
    },

    /// An I/O error occurred on the stream.
    #[error("transport I/O error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, TransportError>;
