use std::os::unix::fs::FileTypeExt;
use std::os::unix::net::UnixListener;
use std::path::{Path, PathBuf};

use tracing::{debug, info};

use crate::error::{Result, TransportError};
use crate::stream::BridgeStream;

/// Local IPC listening endpoint over a Unix domain socket path.
///
/// Used when the controller runs on the same host and a TCP port is
/// undesirable. The socket file is removed on drop.
pub struct UnixEndpoint {
    listener: UnixListener,
    path: PathBuf,
}

impl UnixEndpoint {
    /// Maximum socket path length (`sockaddr_un.sun_path` budget).
    #[cfg(target_os = "linux")]
    const MAX_PATH_LEN: usize = 108;
    #[cfg(not(target_os = "linux"))]
    const MAX_PATH_LEN: usize = 104;

    /// Bind and listen on a filesystem-path Unix domain socket.
    ///
    /// A pre-existing socket file at `path` is treated as stale and removed;
    /// any other kind of file is an error.
    pub fn bind(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();

        let path_bytes = path.as_os_str().len();
        if path_bytes >= Self::MAX_PATH_LEN {
            return Err(TransportError::PathTooLong {
                path,
                len: path_bytes,
                max: Self::MAX_PATH_LEN,
            });
        }

        if path.exists() {
            let metadata =
                std::fs::symlink_metadata(&path).map_err(|e| TransportError::BindPath {
                    path: path.clone(),
                    source: e,
                })?;
            if metadata.file_type().is_socket() {
                debug!(?path, "removing stale socket");
                std::fs::remove_file(&path).map_err(|e| TransportError::BindPath {
                    path: path.clone(),
                    source: e,
                })?;
            } else {
                return Err(TransportError::BindPath {
                    path: path.clone(),
                    source: std::io::Error::new(
                        std::io::ErrorKind::AlreadyExists,
                        "existing path is not a unix socket",
                    ),
                });
            }
        }

        let listener = UnixListener::bind(&path).map_err(|e| TransportError::BindPath {
            path: path.clone(),
            source: e,
        })?;

        info!(?path, "listening on unix domain socket");
        Ok(Self { listener, path })
    }

    /// Accept an incoming connection (blocking).
    pub fn accept(&self) -> Result<BridgeStream> {
        let (stream, _addr) = self.listener.accept().map_err(TransportError::Accept)?;
        debug!("accepted unix connection");
        Ok(BridgeStream::from_unix(stream))
    }

    /// The path this socket is bound to.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Transport name for diagnostics.
    pub fn transport_name(&self) -> &'static str {
        "unix-domain-socket"
    }
}

impl Drop for UnixEndpoint {
    fn drop(&mut self) {
        debug!(path = ?self.path, "cleaning up socket file");
        let _ = std::fs::remove_file(&self.path);
    }
}

#[cfg(test)]
mod tests {
    use std::io::{Read, Write};

    use super::*;

    fn sock_path(tag: &str) -> PathBuf {
        let dir = std::env::temp_dir().join(format!("broodlink-{}-{}", tag, std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        dir.join("bridge.sock")
    }

    #[test]
    fn bind_accept_connect() {
        let path = sock_path("uds");
        let endpoint = UnixEndpoint::bind(&path).unwrap();
        assert!(path.exists());

        let path_clone = path.clone();
        let handle = std::thread::spawn(move || {
            let mut client = BridgeStream::connect_unix(&path_clone).unwrap();
            client.write_all(b"ping").unwrap();
        });

        let mut server = endpoint.accept().unwrap();
        let mut buf = [0u8; 4];
        server.read_exact(&mut buf).unwrap();
        assert_eq!(&buf, b"ping");

        handle.join().unwrap();
        drop(endpoint);
        assert!(!path.exists(), "socket file should be removed on drop");
        let _ = std::fs::remove_dir_all(path.parent().unwrap());
    }

    #[test]
    fn rejects_overlong_path() {
        let long_path = "/tmp/".to_string() + &"b".repeat(200) + ".sock";
        let result = UnixEndpoint::bind(&long_path);
        assert!(matches!(result, Err(TransportError::PathTooLong { .. })));
    }

    #[test]
    fn rejects_existing_non_socket_file() {
        let path = sock_path("notsock");
        std::fs::write(&path, b"regular-file").unwrap();

        let result = UnixEndpoint::bind(&path);
        assert!(matches!(result, Err(TransportError::BindPath { .. })));

        let _ = std::fs::remove_dir_all(path.parent().unwrap());
    }
}
