use broodlink_state::StateError;
use broodlink_transport::TransportError;
use broodlink_wire::WireError;

/// Errors from the session layer.
///
/// The fatal-vs-transient split matters to callers: `ProtocolMismatch` and
/// transport bind failures abort the session, while `Timeout` leaves the
/// connection intact for retry. A malformed command record is never an error
/// at all — batch decoding logs and skips it.
#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    /// The peer announced a protocol version other than ours. Fatal.
    #[error("protocol version mismatch (expected {expected}, peer sent {actual})")]
    ProtocolMismatch { expected: i32, actual: i32 },

    /// The welcome message carried a malformed `protocol=` token. Fatal.
    #[error("malformed welcome message: {0}")]
    MalformedWelcome(String),

    /// A second send was attempted without an intervening receive.
    #[error("send already pending (receive the response first)")]
    SendAlreadyPending,

    /// A send or receive did not complete within the configured timeout.
    ///
    /// The connection stays usable; the caller decides retry vs. close.
    #[error("operation timed out")]
    Timeout,

    /// A message arrived that this role does not handle in its current state.
    #[error("unexpected message: {0}")]
    UnexpectedMessage(&'static str),

    /// The session is not in a state that permits the requested operation.
    #[error("invalid session state: {0}")]
    InvalidState(&'static str),

    #[error(transparent)]
    Transport(#[from] TransportError),

    #[error(transparent)]
    Wire(WireError),

    #[error(transparent)]
    State(#[from] StateError),
}

impl From<WireError> for SessionError {
    fn from(err: WireError) -> Self {
        // Socket-timeout reads surface as WouldBlock/TimedOut I/O errors;
        // fold them into the transient Timeout variant.
        match err {
            WireError::Io(io)
                if io.kind() == std::io::ErrorKind::WouldBlock
                    || io.kind() == std::io::ErrorKind::TimedOut =>
            {
                SessionError::Timeout
            }
            other => SessionError::Wire(other),
        }
    }
}

impl SessionError {
    /// Whether this error aborts the session (vs. a transient condition the
    /// caller may retry).
    pub fn is_fatal(&self) -> bool {
        match self {
            SessionError::ProtocolMismatch { .. } | SessionError::MalformedWelcome(_) => true,
            SessionError::Transport(TransportError::PortRangeExhausted { .. }) => true,
            SessionError::Timeout | SessionError::SendAlreadyPending => false,
            _ => false,
        }
    }
}

pub type Result<T> = std::result::Result<T, SessionError>;
