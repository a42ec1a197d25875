//! Protocol session layer: the request/response state machine between a
//! simulation producer and a controller consumer.
//!
//! The producer side is [`Session`]; the consumer side is [`Client`] with a
//! [`StateView`] mirror. Both sides speak the strictly alternating
//! send/receive discipline enforced by [`Connection`].

pub mod client;
pub mod command;
pub mod connection;
pub mod error;
pub mod producer;
pub mod session;
pub mod stateview;
pub mod welcome;

pub use client::{Client, ClientOptions};
pub use command::{codes, decode_batch, encode_batch, Command};
pub use connection::Connection;
pub use error::{Result, SessionError};
pub use producer::FrameProducer;
pub use session::{EndMode, Session, SessionConfig, SessionState, WelcomeEvent};
pub use stateview::StateView;
pub use welcome::{classify, format_welcome, Classified, Welcome, PROTOCOL_VERSION};
