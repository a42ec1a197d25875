use bytes::{Buf, BufMut, BytesMut};

use crate::error::{Result, WireError};
use crate::message::Message;

/// Frame header: magic (2) + length (4) = 6 bytes.
pub const HEADER_SIZE: usize = 6;

/// Magic bytes: "BL" (0x42 0x4C).
pub const MAGIC: [u8; 2] = [0x42, 0x4C];

/// Default maximum payload size: 64 MiB.
///
/// Frames carry serialized map terrain and optional raw image payloads, so
/// the budget is generous compared to a plain control channel.
pub const DEFAULT_MAX_PAYLOAD: usize = 64 * 1024 * 1024;

/// Configuration for the wire codec.
#[derive(Debug, Clone)]
pub struct WireConfig {
    /// Maximum payload size in bytes. Default: 64 MiB.
    pub max_payload_size: usize,
    /// Read timeout for blocking operations.
    pub read_timeout: Option<std::time::Duration>,
    /// Write timeout for blocking operations.
    pub write_timeout: Option<std::time::Duration>,
}

impl Default for WireConfig {
    fn default() -> Self {
        Self {
            max_payload_size: DEFAULT_MAX_PAYLOAD,
            read_timeout: None,
            write_timeout: None,
        }
    }
}

/// Encode a message into the wire format.
///
/// Wire format:
/// ```text
/// ┌──────────────┬───────────┬──────────────────────────┐
/// │ Magic (2B)   │ Length    │ Payload                  │
/// │ 0x42 0x4C    │ (4B LE)   │ (Length bytes, JSON)     │
/// └──────────────┴───────────┴──────────────────────────┘
/// ```
pub fn encode_message(message: &Message, max_payload: usize, dst: &mut BytesMut) -> Result<()> {
    let payload = serde_json::to_vec(message)?;
    if payload.len() > max_payload {
        return Err(WireError::PayloadTooLarge {
            size: payload.len(),
            max: max_payload,
        });
    }
    dst.reserve(HEADER_SIZE + payload.len());
    dst.put_slice(&MAGIC);
    dst.put_u32_le(payload.len() as u32);
    dst.put_slice(&payload);
    Ok(())
}

/// Decode a message from a buffer.
///
/// Returns `Ok(None)` if the buffer doesn't contain a complete frame yet.
/// On success, consumes the frame bytes from the buffer.
pub fn decode_message(src: &mut BytesMut, max_payload: usize) -> Result<Option<Message>> {
    if src.len() < HEADER_SIZE {
        return Ok(None); // Need more data
    }

    if src[0..2] != MAGIC {
        return Err(WireError::InvalidMagic);
    }

    let payload_len = u32::from_le_bytes(src[2..6].try_into().expect("4 bytes")) as usize;
    if payload_len > max_payload {
        return Err(WireError::PayloadTooLarge {
            size: payload_len,
            max: max_payload,
        });
    }

    let total = HEADER_SIZE + payload_len;
    if src.len() < total {
        return Ok(None); // Need more data
    }

    src.advance(HEADER_SIZE);
    let payload = src.split_to(payload_len);
    let message = serde_json::from_slice(&payload)?;

    Ok(Some(message))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn encode_decode_roundtrip() {
        let mut buf = BytesMut::new();
        let message = Message::Commands {
            text: "5,3:7,1,2".to_string(),
        };

        encode_message(&message, DEFAULT_MAX_PAYLOAD, &mut buf).unwrap();
        let decoded = decode_message(&mut buf, DEFAULT_MAX_PAYLOAD)
            .unwrap()
            .unwrap();

        assert_eq!(decoded, message);
        assert!(buf.is_empty());
    }

    #[test]
    fn decode_incomplete_header() {
        let mut buf = BytesMut::from(&MAGIC[..]);
        let result = decode_message(&mut buf, DEFAULT_MAX_PAYLOAD).unwrap();
        assert!(result.is_none());
    }

    #[test]
    fn decode_incomplete_payload() {
        let mut buf = BytesMut::new();
        let message = Message::Error {
            message: "boom".to_string(),
        };
        encode_message(&message, DEFAULT_MAX_PAYLOAD, &mut buf).unwrap();
        buf.truncate(HEADER_SIZE + 2);

        let result = decode_message(&mut buf, DEFAULT_MAX_PAYLOAD).unwrap();
        assert!(result.is_none());
    }

    #[test]
    fn decode_invalid_magic() {
        let mut buf = BytesMut::from(&[0xFF, 0xFF, 0x00, 0x00, 0x00, 0x00][..]);
        let result = decode_message(&mut buf, DEFAULT_MAX_PAYLOAD);
        assert!(matches!(result, Err(WireError::InvalidMagic)));
    }

    #[test]
    fn decode_oversized_payload() {
        let mut buf = BytesMut::new();
        buf.put_slice(&MAGIC);
        buf.put_u32_le(1024);

        let result = decode_message(&mut buf, 16);
        assert!(matches!(result, Err(WireError::PayloadTooLarge { .. })));
    }

    #[test]
    fn decode_garbage_payload() {
        let mut buf = BytesMut::new();
        buf.put_slice(&MAGIC);
        buf.put_u32_le(4);
        buf.put_slice(b"{not");

        let result = decode_message(&mut buf, DEFAULT_MAX_PAYLOAD);
        assert!(matches!(result, Err(WireError::Malformed(_))));
    }

    #[test]
    fn multiple_messages_in_one_buffer() {
        let mut buf = BytesMut::new();
        let first = Message::Commands {
            text: "first".to_string(),
        };
        let second = Message::PlayerLeft {
            player_left: "2".to_string(),
        };
        encode_message(&first, DEFAULT_MAX_PAYLOAD, &mut buf).unwrap();
        encode_message(&second, DEFAULT_MAX_PAYLOAD, &mut buf).unwrap();

        let d1 = decode_message(&mut buf, DEFAULT_MAX_PAYLOAD)
            .unwrap()
            .unwrap();
        let d2 = decode_message(&mut buf, DEFAULT_MAX_PAYLOAD)
            .unwrap()
            .unwrap();

        assert_eq!(d1, first);
        assert_eq!(d2, second);
        assert!(buf.is_empty());
    }
}
