use broodlink_state::{diff, Frame};
use broodlink_transport::{TcpEndpoint, TimeoutMs};
use broodlink_wire::Message;
use tracing::{debug, info, warn};

use crate::command::{decode_batch, Command};
use crate::connection::Connection;
use crate::error::{Result, SessionError};
use crate::welcome::{classify, Classified, Welcome, PROTOCOL_VERSION};

/// Where the session is in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Disconnected,
    Bound,
    AwaitingWelcome,
    Handshaking,
    Streaming,
    EndGame,
    Closed,
}

/// What to do after the end-of-game exchange.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum EndMode {
    /// Close the socket after sending the final snapshot (authoritative role).
    #[default]
    Close,
    /// Perform one more receive — the consumer drives a restart.
    ReceiveRestart,
}

/// Server-side session configuration.
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// Requested listen port; `0` probes the standard range.
    pub port: u16,
    pub protocol_version: i32,
    /// Send frame deltas against the last transmitted frame instead of full
    /// snapshots.
    pub send_diffs: bool,
    pub lag_frames: i32,
    pub map_data: Vec<u8>,
    pub map_name: String,
    pub is_replay: bool,
    pub player_id: i32,
    pub neutral_id: i32,
    pub end_mode: EndMode,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            port: 0,
            protocol_version: PROTOCOL_VERSION,
            send_diffs: true,
            lag_frames: 2,
            map_data: Vec::new(),
            map_name: String::new(),
            is_replay: false,
            player_id: 0,
            neutral_id: 11,
            end_mode: EndMode::default(),
        }
    }
}

/// The first meaningful thing the consumer said.
#[derive(Debug)]
pub enum WelcomeEvent {
    /// A welcome with a matching protocol token; handshake may proceed.
    Welcome(Welcome),
    /// Not a welcome at all — an ordinary command batch.
    Commands(Vec<Command>),
}

/// Server-side protocol session.
///
/// Drives the lifecycle `Bound → AwaitingWelcome → Handshaking → Streaming →
/// EndGame → Closed`. Fatal conditions (version mismatch, port exhaustion)
/// surface as errors; a timeout leaves the session intact.
pub struct Session {
    endpoint: TcpEndpoint,
    connection: Option<Connection>,
    config: SessionConfig,
    state: SessionState,
    last_sent: Option<Frame>,
    welcome: Option<Welcome>,
    frame_from_bwapi: i32,
    battle_frame_count: i32,
}

impl Session {
    /// Bind the listening endpoint per the port policy.
    ///
    /// Probing exhaustion (requested port `0`, whole range occupied) is the
    /// fatal initialization error of the protocol design.
    pub fn bind(config: SessionConfig) -> Result<Self> {
        let endpoint = TcpEndpoint::bind(config.port)?;
        info!(port = endpoint.port(), "session bound");
        Ok(Self {
            endpoint,
            connection: None,
            config,
            state: SessionState::Bound,
            last_sent: None,
            welcome: None,
            frame_from_bwapi: 0,
            battle_frame_count: 0,
        })
    }

    /// The actually bound port.
    pub fn port(&self) -> u16 {
        self.endpoint.port()
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    /// Facts parsed from the most recent welcome, if any.
    pub fn welcome(&self) -> Option<&Welcome> {
        self.welcome.as_ref()
    }

    /// Set send/receive timeouts on the live connection.
    pub fn set_timeouts(&mut self, send: TimeoutMs, receive: TimeoutMs) -> Result<()> {
        let connection = self.connection_mut()?;
        connection.set_send_timeout(send)?;
        connection.set_receive_timeout(receive)?;
        Ok(())
    }

    /// Accept one consumer connection (blocking).
    pub fn accept(&mut self) -> Result<()> {
        let stream = self.endpoint.accept()?;
        self.connection = Some(Connection::from_stream(stream)?.with_implicit_empty_send(false));
        self.last_sent = None;
        self.state = SessionState::AwaitingWelcome;
        debug!("consumer connected, awaiting welcome");
        Ok(())
    }

    /// Receive and classify the consumer's first message.
    ///
    /// Empty probes are acknowledged and re-received transparently. A
    /// mismatched protocol version aborts with a best-effort error
    /// notification to the peer.
    pub fn await_welcome(&mut self) -> Result<WelcomeEvent> {
        if self.state != SessionState::AwaitingWelcome {
            return Err(SessionError::InvalidState("expected AwaitingWelcome"));
        }

        loop {
            let message = self.connection_mut()?.receive()?;
            match message {
                Message::Commands { text } => {
                    match self.classify_text(&text)? {
                        Classified::Welcome(welcome) => {
                            return Ok(self.apply_welcome(welcome));
                        }
                        Classified::Commands(text) => {
                            debug!("first message is a command batch, not a welcome");
                            return Ok(WelcomeEvent::Commands(decode_batch(&text)));
                        }
                        Classified::Probe => {
                            // Liveness check: ack and wait for the real welcome.
                            debug!("empty probe, acknowledging");
                            self.connection_mut()?.send(&Message::empty_commands())?;
                        }
                    }
                }
                Message::HandshakeClient {
                    protocol,
                    map,
                    window_size,
                    window_pos,
                    micro_mode,
                } => {
                    if protocol != self.config.protocol_version {
                        return Err(self.protocol_mismatch(protocol));
                    }
                    return Ok(self.apply_welcome(Welcome {
                        protocol,
                        map,
                        window_size,
                        window_pos,
                        micro_mode,
                    }));
                }
                other => return Err(SessionError::UnexpectedMessage(other.kind())),
            }
        }
    }

    /// Push the setup-fact bag, then block for the first command batch.
    pub fn handshake(&mut self) -> Result<Vec<Command>> {
        if self.state != SessionState::Handshaking {
            return Err(SessionError::InvalidState("expected Handshaking"));
        }

        let micro_mode = self.welcome.as_ref().is_some_and(|w| w.micro_mode);
        let message = Message::HandshakeServer {
            lag_frames: self.config.lag_frames,
            map_data: self.config.map_data.clone(),
            map_name: self.config.map_name.clone(),
            is_replay: self.config.is_replay,
            player_id: self.config.player_id,
            neutral_id: self.config.neutral_id,
            battle_frame_count: micro_mode.then_some(self.battle_frame_count),
        };
        self.connection_mut()?.send(&message)?;
        debug!("handshake pushed");

        let commands = self.receive_commands()?;
        self.state = SessionState::Streaming;
        Ok(commands)
    }

    /// Send one frame (full or diffed), then block for the command batch.
    pub fn send_frame(
        &mut self,
        frame: &Frame,
        deaths: Vec<i32>,
        image: Option<Vec<u8>>,
    ) -> Result<Vec<Command>> {
        if self.state != SessionState::Streaming {
            return Err(SessionError::InvalidState("expected Streaming"));
        }

        self.frame_from_bwapi += 1;
        if self.welcome.as_ref().is_some_and(|w| w.micro_mode) {
            self.battle_frame_count += 1;
        }

        let message = match (&self.last_sent, self.config.send_diffs) {
            (Some(base), true) => Message::FrameDiff {
                diff: diff(frame, base)?,
                deaths,
                frame_from_bwapi: self.frame_from_bwapi,
                battle_frame_count: self.battle_frame_count,
                image,
            },
            _ => Message::Frame {
                frame: frame.clone(),
                deaths,
                frame_from_bwapi: self.frame_from_bwapi,
                battle_frame_count: self.battle_frame_count,
                image,
            },
        };
        self.connection_mut()?.send(&message)?;
        self.last_sent = Some(frame.clone());

        self.receive_commands()
    }

    /// Send the final snapshot and outcome, then finish per the end mode.
    pub fn end_game(&mut self, frame: &Frame, game_won: bool) -> Result<()> {
        if self.state != SessionState::Streaming {
            return Err(SessionError::InvalidState("expected Streaming"));
        }
        self.state = SessionState::EndGame;

        self.connection_mut()?.send(&Message::EndGame {
            frame: frame.clone(),
            game_won,
        })?;
        info!(game_won, "end of game sent");

        match self.config.end_mode {
            EndMode::ReceiveRestart => {
                let _ = self.connection_mut()?.receive()?;
            }
            EndMode::Close => {
                self.connection = None;
            }
        }
        self.state = SessionState::Closed;
        Ok(())
    }

    /// Send a best-effort error notification if the channel is writable.
    pub fn notify_error(&mut self, message: &str) {
        if let Some(connection) = self.connection.as_mut() {
            let _ = connection.send(&Message::Error {
                message: message.to_string(),
            });
        }
    }

    /// Blocking receive of a command batch.
    ///
    /// A batch matching the welcome pattern means the consumer restarted;
    /// the session re-handshakes in place and hands back that fresh first
    /// batch (reconnection without restarting the producer).
    fn receive_commands(&mut self) -> Result<Vec<Command>> {
        loop {
            let message = self.connection_mut()?.receive()?;
            match message {
                Message::Commands { text } => match self.classify_text(&text)? {
                    Classified::Commands(text) => return Ok(decode_batch(&text)),
                    Classified::Probe => return Ok(Vec::new()),
                    Classified::Welcome(welcome) => {
                        info!("welcome received mid-stream, consumer reconnected");
                        self.apply_welcome(welcome);
                        self.last_sent = None;
                        self.state = SessionState::Handshaking;
                        return self.handshake();
                    }
                },
                Message::PlayerLeft { player_left } => {
                    warn!(%player_left, "player left during exchange");
                    // Not a command batch; keep waiting for the response.
                    continue;
                }
                other => return Err(SessionError::UnexpectedMessage(other.kind())),
            }
        }
    }

    fn classify_text(&mut self, text: &str) -> Result<Classified> {
        match classify(text, self.config.protocol_version) {
            Ok(classified) => Ok(classified),
            Err(err @ SessionError::ProtocolMismatch { .. }) => {
                self.notify_error(&err.to_string());
                Err(err)
            }
            Err(err) => Err(err),
        }
    }

    fn apply_welcome(&mut self, welcome: Welcome) -> WelcomeEvent {
        info!(
            micro_mode = welcome.micro_mode,
            map = welcome.map.as_deref().unwrap_or(""),
            "welcome accepted"
        );
        self.battle_frame_count = 0;
        self.welcome = Some(welcome.clone());
        self.state = SessionState::Handshaking;
        WelcomeEvent::Welcome(welcome)
    }

    fn protocol_mismatch(&mut self, actual: i32) -> SessionError {
        let err = SessionError::ProtocolMismatch {
            expected: self.config.protocol_version,
            actual,
        };
        self.notify_error(&err.to_string());
        err
    }

    fn connection_mut(&mut self) -> Result<&mut Connection> {
        self.connection
            .as_mut()
            .ok_or(SessionError::InvalidState("no live connection"))
    }
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("port", &self.endpoint.port())
            .field("state", &self.state)
            .field("send_diffs", &self.config.send_diffs)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use std::thread;

    use super::*;

    fn client_connection(port: u16) -> Connection {
        Connection::connect_tcp("127.0.0.1", port).unwrap()
    }

    #[test]
    fn welcome_then_handshake() {
        let mut session = Session::bind(SessionConfig {
            map_name: "maps/micro.scm".to_string(),
            map_data: vec![9, 9],
            ..SessionConfig::default()
        })
        .unwrap();
        let port = session.port();

        let client = thread::spawn(move || {
            let mut conn = client_connection(port);
            conn.send(&Message::Commands {
                text: "protocol=22,micro_mode=true".to_string(),
            })
            .unwrap();
            let handshake = conn.receive().unwrap();
            conn.send(&Message::empty_commands()).unwrap();
            handshake
        });

        session.accept().unwrap();
        let event = session.await_welcome().unwrap();
        let WelcomeEvent::Welcome(welcome) = event else {
            panic!("expected welcome");
        };
        assert!(welcome.micro_mode);

        let first = session.handshake().unwrap();
        assert!(first.is_empty());
        assert_eq!(session.state(), SessionState::Streaming);

        let handshake = client.join().unwrap();
        assert!(matches!(
            handshake,
            Message::HandshakeServer {
                lag_frames: 2,
                battle_frame_count: Some(0),
                ..
            }
        ));
    }

    #[test]
    fn version_mismatch_is_fatal() {
        let mut session = Session::bind(SessionConfig::default()).unwrap();
        let port = session.port();

        let client = thread::spawn(move || {
            let mut conn = client_connection(port);
            conn.send(&Message::Commands {
                text: "protocol=7".to_string(),
            })
            .unwrap();
            // The server answers with a best-effort error notification.
            conn.receive().unwrap()
        });

        session.accept().unwrap();
        let err = session.await_welcome().unwrap_err();
        assert!(matches!(
            err,
            SessionError::ProtocolMismatch {
                expected: 22,
                actual: 7
            }
        ));
        assert!(err.is_fatal());

        let notification = client.join().unwrap();
        assert!(matches!(notification, Message::Error { .. }));
    }

    #[test]
    fn empty_probe_is_acknowledged() {
        let mut session = Session::bind(SessionConfig::default()).unwrap();
        let port = session.port();

        let client = thread::spawn(move || {
            let mut conn = client_connection(port);
            conn.send(&Message::empty_commands()).unwrap();
            let ack = conn.receive().unwrap();
            conn.send(&Message::Commands {
                text: "protocol=22".to_string(),
            })
            .unwrap();
            ack
        });

        session.accept().unwrap();
        let event = session.await_welcome().unwrap();
        assert!(matches!(event, WelcomeEvent::Welcome(_)));
        assert_eq!(client.join().unwrap(), Message::empty_commands());
    }

    #[test]
    fn non_welcome_first_message_is_commands() {
        let mut session = Session::bind(SessionConfig::default()).unwrap();
        let port = session.port();

        let client = thread::spawn(move || {
            let mut conn = client_connection(port);
            conn.send(&Message::Commands {
                text: "5,3:7,1,2".to_string(),
            })
            .unwrap();
        });

        session.accept().unwrap();
        let WelcomeEvent::Commands(commands) = session.await_welcome().unwrap() else {
            panic!("expected commands");
        };
        assert_eq!(commands.len(), 2);
        client.join().unwrap();
    }
}
