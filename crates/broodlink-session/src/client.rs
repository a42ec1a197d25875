use broodlink_transport::TimeoutMs;
use broodlink_wire::Message;
use tracing::debug;

use crate::command::{encode_batch, Command};
use crate::connection::Connection;
use crate::error::{Result, SessionError};
use crate::stateview::StateView;
use crate::welcome::{format_welcome, Welcome, PROTOCOL_VERSION};

/// Consumer-side options sent in the welcome.
#[derive(Debug, Clone, Default)]
pub struct ClientOptions {
    pub map: Option<String>,
    pub window_size: Option<(i32, i32)>,
    pub window_pos: Option<(i32, i32)>,
    pub micro_mode: bool,
}

/// Consumer (controller) side of the bridge.
///
/// Owns the request/response connection and a [`StateView`] mirror. The
/// typical loop is `connect → init → (send_commands → receive)*`, where
/// `receive` without a prior send delivers an implicit empty batch so the
/// cadence never stalls.
pub struct Client {
    connection: Connection,
    view: StateView,
}

impl Client {
    /// Connect to a producer over TCP.
    pub fn connect_tcp(host: &str, port: u16) -> Result<Self> {
        Ok(Self {
            connection: Connection::connect_tcp(host, port)?,
            view: StateView::new(),
        })
    }

    /// Connect to a producer over a local IPC path.
    #[cfg(unix)]
    pub fn connect_unix(path: impl AsRef<std::path::Path>) -> Result<Self> {
        Ok(Self {
            connection: Connection::connect_unix(path)?,
            view: StateView::new(),
        })
    }

    /// Send the welcome and receive the handshake facts into the view.
    ///
    /// Uses the legacy text form of the welcome, which every producer
    /// version accepts.
    pub fn init(&mut self, options: ClientOptions) -> Result<Vec<&'static str>> {
        let welcome = Welcome {
            protocol: PROTOCOL_VERSION,
            map: options.map,
            window_size: options.window_size,
            window_pos: options.window_pos,
            micro_mode: options.micro_mode,
        };
        let text = format_welcome(&welcome);
        debug!(%text, "sending welcome");
        self.connection.send(&Message::Commands { text })?;

        let message = self.connection.receive()?;
        match message {
            Message::HandshakeServer { .. } => self.view.update(&message),
            other => Err(SessionError::UnexpectedMessage(other.kind())),
        }
    }

    /// Send a command batch.
    pub fn send_commands(&mut self, commands: &[Command]) -> Result<()> {
        self.connection.send(&Message::Commands {
            text: encode_batch(commands),
        })
    }

    /// Receive the next state update and apply it to the view.
    ///
    /// Returns the changed logical field names. If nothing has been sent
    /// since the last receive, an empty batch goes out first.
    pub fn receive(&mut self) -> Result<Vec<&'static str>> {
        let message = self.connection.receive()?;
        self.view.update(&message)
    }

    /// The mirrored state.
    pub fn view(&self) -> &StateView {
        &self.view
    }

    /// Mutable access, e.g. for [`StateView::set_considered_types`].
    pub fn view_mut(&mut self) -> &mut StateView {
        &mut self.view
    }

    pub fn set_timeouts(&mut self, send: TimeoutMs, receive: TimeoutMs) -> Result<()> {
        self.connection.set_send_timeout(send)?;
        self.connection.set_receive_timeout(receive)?;
        Ok(())
    }

    /// Block until a state update is pending, without consuming it.
    #[cfg(unix)]
    pub fn poll(&mut self, timeout: TimeoutMs) -> Result<bool> {
        self.connection.poll(timeout)
    }
}

impl std::fmt::Debug for Client {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Client")
            .field("connection", &self.connection)
            .finish()
    }
}
