//! Embedded screen-capture payloads.
//!
//! Frames can carry a raw image of the producer's window. The bytes follow a
//! fixed marker convention so consumers can detect and strip the header
//! without a second framing layer:
//!
//! ```text
//! "TCIMAGEDATA" <width> "," <height> "," <raw bytes>
//! ```
//!
//! Width and height are decimal ASCII; the raw data is `width * height * 3`
//! bytes of packed RGB.

use crate::error::{Result, WireError};

/// Marker prefix identifying an image payload.
pub const IMAGE_MARKER: &[u8] = b"TCIMAGEDATA";

/// Bytes per pixel in the raw data (packed RGB).
const BYTES_PER_PIXEL: usize = 3;

/// A decoded image payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImagePayload {
    pub width: u32,
    pub height: u32,
    /// Packed RGB, `width * height * 3` bytes, row-major.
    pub data: Vec<u8>,
}

/// Encode an image into the marker convention.
pub fn encode_image(width: u32, height: u32, data: &[u8]) -> Result<Vec<u8>> {
    let expected = raw_len(width, height)?;
    if data.len() != expected {
        return Err(WireError::MalformedImage(format!(
            "data length {} does not match {}x{} ({} bytes expected)",
            data.len(),
            width,
            height,
            expected
        )));
    }

    let header = format!("{},{},", width, height);
    let mut out = Vec::with_capacity(IMAGE_MARKER.len() + header.len() + data.len());
    out.extend_from_slice(IMAGE_MARKER);
    out.extend_from_slice(header.as_bytes());
    out.extend_from_slice(data);
    Ok(out)
}

/// Decode bytes in the marker convention back into an [`ImagePayload`].
pub fn decode_image(bytes: &[u8]) -> Result<ImagePayload> {
    let rest = bytes
        .strip_prefix(IMAGE_MARKER)
        .ok_or_else(|| WireError::MalformedImage("missing TCIMAGEDATA marker".to_string()))?;

    let (width, rest) = parse_dimension(rest, "width")?;
    let (height, rest) = parse_dimension(rest, "height")?;

    let expected = raw_len(width, height)?;
    if rest.len() != expected {
        return Err(WireError::MalformedImage(format!(
            "data length {} does not match {}x{} ({} bytes expected)",
            rest.len(),
            width,
            height,
            expected
        )));
    }

    Ok(ImagePayload {
        width,
        height,
        data: rest.to_vec(),
    })
}

/// Raw data length for the given dimensions, checked against overflow —
/// the dimensions come off the wire and are not trusted.
fn raw_len(width: u32, height: u32) -> Result<usize> {
    (width as usize)
        .checked_mul(height as usize)
        .and_then(|pixels| pixels.checked_mul(BYTES_PER_PIXEL))
        .ok_or_else(|| {
            WireError::MalformedImage(format!("image size {}x{} overflows", width, height))
        })
}

/// Parse one decimal dimension up to its trailing comma.
fn parse_dimension<'a>(bytes: &'a [u8], what: &str) -> Result<(u32, &'a [u8])> {
    let comma = bytes
        .iter()
        .position(|&b| b == b',')
        .ok_or_else(|| WireError::MalformedImage(format!("missing {} terminator", what)))?;
    let text = std::str::from_utf8(&bytes[..comma])
        .map_err(|_| WireError::MalformedImage(format!("non-ASCII {}", what)))?;
    let value = text
        .parse::<u32>()
        .map_err(|_| WireError::MalformedImage(format!("invalid {}: {:?}", what, text)))?;
    Ok((value, &bytes[comma + 1..]))
}
