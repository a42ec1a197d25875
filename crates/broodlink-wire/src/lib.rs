//! Length-prefixed message framing and the wire message union.
//!
//! Every protocol message is framed with:
//! - A 2-byte magic number ("BL") for stream synchronization
//! - A 4-byte little-endian payload length
//!
//! The payload is one serialized [`Message`] — the closed tagged union the
//! bridge speaks. No partial reads, no buffer management in user code.

pub mod codec;
pub mod error;
pub mod image;
pub mod message;
pub mod reader;
pub mod writer;

pub use codec::{decode_message, encode_message, WireConfig, DEFAULT_MAX_PAYLOAD, HEADER_SIZE};
pub use error::{Result, WireError};
pub use image::{decode_image, encode_image, ImagePayload, IMAGE_MARKER};
pub use message::Message;
pub use reader::MessageReader;
pub use writer::MessageWriter;
