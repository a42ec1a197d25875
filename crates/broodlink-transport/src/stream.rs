use std::io::{Read, Write};
use std::net::TcpStream;
use std::time::Duration;

use crate::error::{Result, TransportError};

/// Timeout in milliseconds with the protocol's three-way semantics:
/// `-1` blocks indefinitely, `0` fails immediately when not ready, and a
/// positive value bounds the wait.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimeoutMs(pub i32);

impl TimeoutMs {
    /// Block indefinitely.
    pub const BLOCKING: TimeoutMs = TimeoutMs(-1);

    /// Convert to the `Option<Duration>` the std socket API expects.
    ///
    /// `0` maps to a 1 ms wait — std treats a zero duration as an error,
    /// and the immediate-failure semantics are preserved because the read
    /// surfaces `WouldBlock`/`TimedOut` right away when nothing is queued.
    pub fn as_socket_timeout(self) -> Option<Duration> {
        match self.0 {
            t if t < 0 => None,
            0 => Some(Duration::from_millis(1)),
            t => Some(Duration::from_millis(t as u64)),
        }
    }
}

impl Default for TimeoutMs {
    fn default() -> Self {
        TimeoutMs::BLOCKING
    }
}

/// A connected bridge stream — TCP or local IPC.
///
/// This is the fundamental I/O type the wire and session layers build on.
pub struct BridgeStream {
    inner: StreamInner,
}

enum StreamInner {
    Tcp(TcpStream),
    #[cfg(unix)]
    Unix(std::os::unix::net::UnixStream),
}

impl Read for BridgeStream {
    fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        match &mut self.inner {
            StreamInner::Tcp(stream) => stream.read(buf),
            #[cfg(unix)]
            StreamInner::Unix(stream) => stream.read(buf),
        }
    }
}

impl Write for BridgeStream {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        match &mut self.inner {
            StreamInner::Tcp(stream) => stream.write(buf),
            #[cfg(unix)]
            StreamInner::Unix(stream) => stream.write(buf),
        }
    }

    fn flush(&mut self) -> std::io::Result<()> {
        match &mut self.inner {
            StreamInner::Tcp(stream) => stream.flush(),
            #[cfg(unix)]
            StreamInner::Unix(stream) => stream.flush(),
        }
    }
}

impl BridgeStream {
    pub(crate) fn from_tcp(stream: TcpStream) -> Self {
        Self {
            inner: StreamInner::Tcp(stream),
        }
    }

    #[cfg(unix)]
    pub(crate) fn from_unix(stream: std::os::unix::net::UnixStream) -> Self {
        Self {
            inner: StreamInner::Unix(stream),
        }
    }

    /// Connect to a TCP endpoint.
    pub fn connect_tcp(host: &str, port: u16) -> Result<Self> {
        let addr = format!("{host}:{port}");
        let stream = TcpStream::connect(&addr).map_err(|source| TransportError::Connect {
            addr: addr.clone(),
            source,
        })?;
        stream.set_nodelay(true)?;
        tracing::debug!(%addr, "connected over tcp");
        Ok(Self::from_tcp(stream))
    }

    /// Connect to a local IPC path.
    #[cfg(unix)]
    pub fn connect_unix(path: impl AsRef<std::path::Path>) -> Result<Self> {
        let path = path.as_ref();
        let stream = std::os::unix::net::UnixStream::connect(path).map_err(|source| {
            TransportError::Connect {
                addr: path.display().to_string(),
                source,
            }
        })?;
        tracing::debug!(?path, "connected over unix socket");
        Ok(Self::from_unix(stream))
    }

    /// Set the receive timeout.
    pub fn set_read_timeout(&self, timeout: TimeoutMs) -> Result<()> {
        let dur = timeout.as_socket_timeout();
        match &self.inner {
            StreamInner::Tcp(stream) => stream.set_read_timeout(dur)?,
            #[cfg(unix)]
            StreamInner::Unix(stream) => stream.set_read_timeout(dur)?,
        }
        Ok(())
    }

    /// Set the send timeout.
    pub fn set_write_timeout(&self, timeout: TimeoutMs) -> Result<()> {
        let dur = timeout.as_socket_timeout();
        match &self.inner {
            StreamInner::Tcp(stream) => stream.set_write_timeout(dur)?,
            #[cfg(unix)]
            StreamInner::Unix(stream) => stream.set_write_timeout(dur)?,
        }
        Ok(())
    }

    /// Try to clone this stream (creates a new file descriptor).
    pub fn try_clone(&self) -> Result<Self> {
        match &self.inner {
            StreamInner::Tcp(stream) => Ok(Self::from_tcp(stream.try_clone()?)),
            #[cfg(unix)]
            StreamInner::Unix(stream) => Ok(Self::from_unix(stream.try_clone()?)),
        }
    }

    /// Block until inbound data is ready, without consuming it.
    ///
    /// Returns `true` if a subsequent read will not block for data arrival.
    /// Timeout semantics follow [`TimeoutMs`].
    #[cfg(unix)]
    pub fn poll(&self, timeout: TimeoutMs) -> Result<bool> {
        use std::os::fd::AsRawFd;

        let fd = match &self.inner {
            StreamInner::Tcp(stream) => stream.as_raw_fd(),
            StreamInner::Unix(stream) => stream.as_raw_fd(),
        };

        let mut pfd = libc::pollfd {
            fd,
            events: libc::POLLIN,
            revents: 0,
        };

        loop {
            // SAFETY: `pfd` is a valid pollfd for the duration of the call
            // and `fd` is an open socket descriptor owned by this stream.
            let rc = unsafe { libc::poll(&mut pfd, 1, timeout.0) };
            if rc < 0 {
                let err = std::io::Error::last_os_error();
                if err.kind() == std::io::ErrorKind::Interrupted {
                    continue;
                }
                return Err(TransportError::Io(err));
            }
            return Ok(rc > 0 && (pfd.revents & libc::POLLIN) != 0);
        }
    }
}

impl std::fmt::Debug for BridgeStream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let kind = match &self.inner {
            StreamInner::Tcp(_) => "tcp",
            #[cfg(unix)]
            StreamInner::Unix(_) => "unix",
        };
        f.debug_struct("BridgeStream").field("type", &kind).finish()
    }
}
