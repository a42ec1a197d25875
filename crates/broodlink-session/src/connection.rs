use std::sync::Arc;

use broodlink_transport::{BridgeStream, TimeoutMs, TransportContext};
use broodlink_wire::{Message, MessageReader, MessageWriter, WireConfig};
use tracing::debug;

use crate::error::{Result, SessionError};

/// One request/response channel to the peer.
///
/// The protocol is strictly alternating: every send must be answered by
/// exactly one receive before the next send. The `sent` flag enforces this —
/// a second [`send`](Connection::send) without an intervening receive is
/// rejected, and a [`receive`](Connection::receive) without a prior send
/// first sends an implicit empty command batch.
pub struct Connection {
    reader: MessageReader<BridgeStream>,
    writer: MessageWriter<BridgeStream>,
    send_timeout: TimeoutMs,
    receive_timeout: TimeoutMs,
    sent: bool,
    implicit_empty_send: bool,
    // Held so the process-wide context lives while any connection does.
    _context: Arc<TransportContext>,
}

impl Connection {
    /// Wrap a connected stream.
    pub fn from_stream(stream: BridgeStream) -> Result<Self> {
        Self::with_config(stream, WireConfig::default())
    }

    /// Wrap a connected stream with explicit wire configuration.
    ///
    /// The config's timeouts are applied to the socket; they can be changed
    /// later through the `set_*_timeout` methods.
    pub fn with_config(stream: BridgeStream, config: WireConfig) -> Result<Self> {
        let context = TransportContext::shared();
        let receive_timeout = duration_to_timeout(config.read_timeout);
        let send_timeout = duration_to_timeout(config.write_timeout);

        let reader_stream = stream.try_clone()?;
        reader_stream.set_read_timeout(receive_timeout)?;
        stream.set_write_timeout(send_timeout)?;

        Ok(Self {
            reader: MessageReader::with_config(reader_stream, config.clone()),
            writer: MessageWriter::with_config(stream, config),
            send_timeout,
            receive_timeout,
            sent: false,
            implicit_empty_send: true,
            _context: context,
        })
    }

    /// Toggle the implicit empty command batch on receive-without-send.
    ///
    /// The consumer role keeps this on; the producer role receives first by
    /// design and must not acknowledge unprompted.
    pub fn with_implicit_empty_send(mut self, enabled: bool) -> Self {
        self.implicit_empty_send = enabled;
        self
    }

    /// Connect to a TCP peer.
    pub fn connect_tcp(host: &str, port: u16) -> Result<Self> {
        Self::from_stream(BridgeStream::connect_tcp(host, port)?)
    }

    /// Connect to a local IPC path.
    #[cfg(unix)]
    pub fn connect_unix(path: impl AsRef<std::path::Path>) -> Result<Self> {
        Self::from_stream(BridgeStream::connect_unix(path)?)
    }

    /// Set the send timeout (`-1` blocks, `0` fails immediately, `>0` ms).
    pub fn set_send_timeout(&mut self, timeout: TimeoutMs) -> Result<()> {
        self.writer.get_ref().set_write_timeout(timeout)?;
        self.send_timeout = timeout;
        Ok(())
    }

    /// Set the receive timeout (`-1` blocks, `0` fails immediately, `>0` ms).
    pub fn set_receive_timeout(&mut self, timeout: TimeoutMs) -> Result<()> {
        self.reader.get_ref().set_read_timeout(timeout)?;
        self.receive_timeout = timeout;
        Ok(())
    }

    pub fn send_timeout(&self) -> TimeoutMs {
        self.send_timeout
    }

    pub fn receive_timeout(&self) -> TimeoutMs {
        self.receive_timeout
    }

    /// Send one message.
    ///
    /// Rejected with [`SessionError::SendAlreadyPending`] if the previous
    /// send has not been answered yet.
    pub fn send(&mut self, message: &Message) -> Result<()> {
        if self.sent {
            return Err(SessionError::SendAlreadyPending);
        }
        self.writer.send(message)?;
        self.sent = true;
        Ok(())
    }

    /// Receive one message.
    ///
    /// If nothing was sent since the last receive, an empty command batch is
    /// sent first so the request/response cadence is preserved.
    pub fn receive(&mut self) -> Result<Message> {
        if !self.sent && self.implicit_empty_send {
            debug!("receive without pending send, sending empty command batch");
            self.send(&Message::empty_commands())?;
        }
        let message = self.reader.read_message()?;
        self.sent = false;
        Ok(message)
    }

    /// Whether a send is awaiting its response.
    pub fn send_pending(&self) -> bool {
        self.sent
    }

    /// Block until a response is ready, without consuming it.
    #[cfg(unix)]
    pub fn poll(&mut self, timeout: TimeoutMs) -> Result<bool> {
        if self.reader.has_buffered_message() {
            return Ok(true);
        }
        Ok(self.reader.get_ref().poll(timeout)?)
    }
}

fn duration_to_timeout(duration: Option<std::time::Duration>) -> TimeoutMs {
    match duration {
        None => TimeoutMs::BLOCKING,
        Some(d) => TimeoutMs(d.as_millis().min(i32::MAX as u128) as i32),
    }
}

impl std::fmt::Debug for Connection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Connection")
            .field("send_timeout", &self.send_timeout)
            .field("receive_timeout", &self.receive_timeout)
            .field("sent", &self.sent)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use std::io::Write;
    use std::thread;

    use broodlink_transport::TcpEndpoint;
    use broodlink_wire::{encode_message, DEFAULT_MAX_PAYLOAD};
    use bytes::BytesMut;

    use super::*;

    fn loopback_pair() -> (Connection, BridgeStream) {
        let endpoint = TcpEndpoint::bind(0).unwrap();
        let port = endpoint.port();
        let handle = thread::spawn(move || BridgeStream::connect_tcp("127.0.0.1", port).unwrap());
        let server = endpoint.accept().unwrap();
        let client = handle.join().unwrap();
        (Connection::from_stream(client).unwrap(), server)
    }

    #[test]
    fn double_send_rejected() {
        let (mut conn, _peer) = loopback_pair();
        conn.send(&Message::empty_commands()).unwrap();
        let err = conn.send(&Message::empty_commands()).unwrap_err();
        assert!(matches!(err, SessionError::SendAlreadyPending));
    }

    #[test]
    fn receive_without_send_sends_implicit_empty_batch() {
        let (mut conn, mut peer) = loopback_pair();

        let mut wire = BytesMut::new();
        encode_message(
            &Message::PlayerLeft {
                player_left: "1".to_string(),
            },
            DEFAULT_MAX_PAYLOAD,
            &mut wire,
        )
        .unwrap();
        peer.write_all(&wire).unwrap();

        let received = conn.receive().unwrap();
        assert_eq!(
            received,
            Message::PlayerLeft {
                player_left: "1".to_string()
            }
        );

        // The implicit empty batch must be on the peer's side of the wire.
        let mut reader = MessageReader::new(peer);
        assert_eq!(reader.read_message().unwrap(), Message::empty_commands());
    }

    #[test]
    fn receive_timeout_leaves_connection_usable() {
        let (mut conn, mut peer) = loopback_pair();
        conn.set_receive_timeout(TimeoutMs(50)).unwrap();

        conn.send(&Message::empty_commands()).unwrap();
        let err = conn.receive().unwrap_err();
        assert!(matches!(err, SessionError::Timeout));

        // Peer answers late; the same connection still works.
        let mut wire = BytesMut::new();
        encode_message(&Message::empty_commands(), DEFAULT_MAX_PAYLOAD, &mut wire).unwrap();
        peer.write_all(&wire).unwrap();

        conn.set_receive_timeout(TimeoutMs::BLOCKING).unwrap();
        // The earlier failed receive did not consume the pending-send slot.
        assert!(conn.send_pending());
        assert_eq!(conn.receive().unwrap(), Message::empty_commands());
    }

    #[cfg(unix)]
    #[test]
    fn poll_sees_pending_response() {
        let (mut conn, mut peer) = loopback_pair();
        assert!(!conn.poll(TimeoutMs(0)).unwrap());

        let mut wire = BytesMut::new();
        encode_message(&Message::empty_commands(), DEFAULT_MAX_PAYLOAD, &mut wire).unwrap();
        peer.write_all(&wire).unwrap();

        assert!(conn.poll(TimeoutMs(1000)).unwrap());
        conn.send(&Message::empty_commands()).unwrap();
        assert_eq!(conn.receive().unwrap(), Message::empty_commands());
    }
}
