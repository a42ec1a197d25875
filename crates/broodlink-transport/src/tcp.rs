use std::net::{Ipv4Addr, SocketAddrV4, TcpListener};
use std::time::Duration;

use tracing::{debug, info, warn};

use crate::error::{Result, TransportError};
use crate::stream::BridgeStream;

/// First port tried when no explicit port is requested.
pub const STARTING_PORT: u16 = 11111;

/// Number of candidate ports probed forward from [`STARTING_PORT`].
pub const PORT_RANGE: u16 = 1000;

/// Backoff between bind retries on an explicitly requested port.
const BIND_RETRY_BACKOFF: Duration = Duration::from_millis(500);

/// TCP listening endpoint for the server role.
///
/// Binding follows the bridge's port policy: with a requested port of `0`,
/// candidate ports are probed forward through a bounded range and exhaustion
/// is a fatal initialization error; with an explicit port, binding retries
/// on that exact port with a fixed backoff until it succeeds.
pub struct TcpEndpoint {
    listener: TcpListener,
    port: u16,
}

impl TcpEndpoint {
    /// Bind according to the port policy described above.
    pub fn bind(requested_port: u16) -> Result<Self> {
        if requested_port != 0 {
            return Self::bind_exact(requested_port);
        }

        let end = STARTING_PORT.saturating_add(PORT_RANGE);
        for port in STARTING_PORT..end {
            match TcpListener::bind(SocketAddrV4::new(Ipv4Addr::UNSPECIFIED, port)) {
                Ok(listener) => {
                    info!(port, "listening on probed tcp port");
                    return Ok(Self { listener, port });
                }
                Err(err) => {
                    debug!(port, %err, "port occupied, probing next");
                }
            }
        }
        Err(TransportError::PortRangeExhausted {
            start: STARTING_PORT,
            end,
        })
    }

    /// Retry binding the exact port until the address frees up.
    ///
    /// Only `AddrInUse` is retried; any other bind failure (permissions,
    /// exhausted descriptors) will not resolve by waiting.
    fn bind_exact(port: u16) -> Result<Self> {
        loop {
            match TcpListener::bind(SocketAddrV4::new(Ipv4Addr::UNSPECIFIED, port)) {
                Ok(listener) => {
                    info!(port, "listening on requested tcp port");
                    return Ok(Self { listener, port });
                }
                Err(err) if err.kind() == std::io::ErrorKind::AddrInUse => {
                    warn!(port, %err, "port in use, retrying");
                    std::thread::sleep(BIND_RETRY_BACKOFF);
                }
                Err(source) => return Err(TransportError::Bind { port, source }),
            }
        }
    }

    /// Accept an incoming connection (blocking).
    pub fn accept(&self) -> Result<BridgeStream> {
        let (stream, addr) = self.listener.accept().map_err(TransportError::Accept)?;
        stream.set_nodelay(true).map_err(TransportError::Accept)?;
        debug!(%addr, "accepted tcp connection");
        Ok(BridgeStream::from_tcp(stream))
    }

    /// The port this endpoint is bound to.
    pub fn port(&self) -> u16 {
        self.port
    }

    /// Transport name for diagnostics.
    pub fn transport_name(&self) -> &'static str {
        "tcp"
    }
}

#[cfg(test)]
mod tests {
    use std::io::{Read, Write};

    use super::*;

    #[test]
    fn bind_accept_connect() {
        let endpoint = TcpEndpoint::bind(0).unwrap();
        let port = endpoint.port();

        let handle = std::thread::spawn(move || {
            let mut client = BridgeStream::connect_tcp("127.0.0.1", port).unwrap();
            client.write_all(b"hello").unwrap();
        });

        let mut server = endpoint.accept().unwrap();
        let mut buf = [0u8; 5];
        server.read_exact(&mut buf).unwrap();
        assert_eq!(&buf, b"hello");

        handle.join().unwrap();
    }

    #[test]
    fn probing_skips_occupied_ports() {
        // Occupy a prefix of the probing range, then ask for an automatic
        // port; the endpoint must land past the occupied block.
        let occupied: Vec<TcpListener> = (STARTING_PORT..STARTING_PORT + 3)
            .filter_map(|p| TcpListener::bind(SocketAddrV4::new(Ipv4Addr::UNSPECIFIED, p)).ok())
            .collect();

        let endpoint = TcpEndpoint::bind(0).unwrap();
        for listener in &occupied {
            assert_ne!(endpoint.port(), listener.local_addr().unwrap().port());
        }
        assert!(endpoint.port() >= STARTING_PORT);
        assert!(endpoint.port() < STARTING_PORT + PORT_RANGE);
    }

    #[test]
    fn bind_error_names_the_port() {
        let err = TransportError::Bind {
            port: 11111,
            source: std::io::Error::from(std::io::ErrorKind::PermissionDenied),
        };
        assert!(err.to_string().contains("11111"));
    }

    #[test]
    fn explicit_port_bind_reports_port() {
        // Find a free port by binding to 0 first, then request it exactly.
        let probe = TcpListener::bind("127.0.0.1:0").unwrap();
        let port = probe.local_addr().unwrap().port();
        drop(probe);

        let endpoint = TcpEndpoint::bind(port).unwrap();
        assert_eq!(endpoint.port(), port);
    }
}
