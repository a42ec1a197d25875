use broodlink_state::{Frame, FrameDiff};
use serde::{Deserialize, Serialize};

/// The closed wire union.
///
/// Every inbound message is dispatched through exactly one exhaustive match
/// on this enum; a variant a role does not handle surfaces as an explicit
/// unexpected-message error, never a silent default branch.
///
/// Externally tagged. Internal or adjacent tagging buffers the payload
/// through serde's content representation, which stringifies the integer
/// map keys in `units`/`resources` and makes frames undecodable.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Message {
    /// Structured form of the consumer's welcome.
    ///
    /// The legacy text path sends the same facts as a `Commands` text
    /// containing a `protocol=<version>` token; both are accepted.
    HandshakeClient {
        protocol: i32,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        map: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        window_size: Option<(i32, i32)>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        window_pos: Option<(i32, i32)>,
        #[serde(default)]
        micro_mode: bool,
    },

    /// Setup facts pushed once per connection (and again on reconnect).
    HandshakeServer {
        lag_frames: i32,
        map_data: Vec<u8>,
        map_name: String,
        is_replay: bool,
        player_id: i32,
        neutral_id: i32,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        battle_frame_count: Option<i32>,
    },

    /// A command batch in the legacy colon/comma text format.
    Commands { text: String },

    /// A full frame snapshot plus step extras.
    Frame {
        frame: Frame,
        #[serde(default, skip_serializing_if = "Vec::is_empty")]
        deaths: Vec<i32>,
        frame_from_bwapi: i32,
        battle_frame_count: i32,
        /// Raw image bytes in the marker convention, see [`crate::image`].
        #[serde(default, skip_serializing_if = "Option::is_none")]
        image: Option<Vec<u8>>,
    },

    /// A frame delta against the previously transmitted frame.
    FrameDiff {
        diff: FrameDiff,
        #[serde(default, skip_serializing_if = "Vec::is_empty")]
        deaths: Vec<i32>,
        frame_from_bwapi: i32,
        battle_frame_count: i32,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        image: Option<Vec<u8>>,
    },

    /// A player left the game.
    PlayerLeft { player_left: String },

    /// Final snapshot and outcome.
    EndGame { frame: Frame, game_won: bool },

    /// Best-effort error notification.
    Error { message: String },
}

impl Message {
    /// Short variant name for logs and unexpected-message errors.
    pub fn kind(&self) -> &'static str {
        match self {
            Message::HandshakeClient { .. } => "handshake_client",
            Message::HandshakeServer { .. } => "handshake_server",
            Message::Commands { .. } => "commands",
            Message::Frame { .. } => "frame",
            Message::FrameDiff { .. } => "frame_diff",
            Message::PlayerLeft { .. } => "player_left",
            Message::EndGame { .. } => "end_game",
            Message::Error { .. } => "error",
        }
    }

    /// An empty command batch — the implicit acknowledgement.
    pub fn empty_commands() -> Self {
        Message::Commands {
            text: String::new(),
        }
    }
}
