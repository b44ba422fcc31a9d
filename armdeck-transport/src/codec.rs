//! Frame codec
//!
//! ```text
//! request:  [0xAD][0xDC][cmd][len][payload: len][xor]
//! response: [0xAD][0xDC][cmd][len][error][payload: len-1][xor]
//! ```
//!
//! The checksum is the XOR of every byte from the first magic byte through
//! the last body byte.

use crate::error::{DecodeError, EncodeError};
use crate::protocol::{checksum, FRAME_OVERHEAD, MAGIC, MAX_PAYLOAD};
use crate::types::ErrorCode;

/// A decoded frame
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    pub command: u8,
    /// Raw body; for responses the first byte is the error code
    pub body: Vec<u8>,
}

impl Frame {
    /// Error code of a response frame. Empty bodies read as `None`.
    pub fn error_code(&self) -> ErrorCode {
        self.body
            .first()
            .map(|&b| ErrorCode::from(b))
            .unwrap_or(ErrorCode::None)
    }

    /// Response payload (body after the error code)
    pub fn payload(&self) -> &[u8] {
        if self.body.len() > 1 {
            &self.body[1..]
        } else {
            &[]
        }
    }
}

/// Build an outbound frame
pub fn encode(command: u8, payload: &[u8]) -> Result<Vec<u8>, EncodeError> {
    if payload.len() > MAX_PAYLOAD {
        return Err(EncodeError::PayloadTooLong { len: payload.len() });
    }
    let mut buf = Vec::with_capacity(FRAME_OVERHEAD + payload.len());
    buf.extend_from_slice(&MAGIC);
    buf.push(command);
    buf.push(payload.len() as u8);
    buf.extend_from_slice(payload);
    buf.push(checksum(&buf));
    Ok(buf)
}

/// Build a response frame (error code prefixed body)
pub fn encode_response(command: u8, code: ErrorCode, payload: &[u8]) -> Result<Vec<u8>, EncodeError> {
    let mut body = Vec::with_capacity(payload.len() + 1);
    body.push(code.code());
    body.extend_from_slice(payload);
    encode(command, &body)
}

/// Offset of the first magic marker
pub fn find_magic(data: &[u8]) -> Option<usize> {
    data.windows(MAGIC.len()).position(|w| w == MAGIC)
}

/// Parse a frame, skipping any junk before the marker. Trailing bytes after
/// the checksum are ignored.
pub fn decode(data: &[u8]) -> Result<Frame, DecodeError> {
    let start = find_magic(data).ok_or(DecodeError::NoMagic { len: data.len() })?;
    let frame = &data[start..];
    if frame.len() < FRAME_OVERHEAD {
        return Err(DecodeError::TooShort { len: frame.len() });
    }

    let len = frame[3] as usize;
    let total = FRAME_OVERHEAD + len;
    if frame.len() < total {
        return Err(DecodeError::TruncatedBody {
            declared: len,
            available: frame.len() - FRAME_OVERHEAD,
        });
    }

    let expected = checksum(&frame[..total - 1]);
    let actual = frame[total - 1];
    if expected != actual {
        return Err(DecodeError::ChecksumMismatch { expected, actual });
    }

    Ok(Frame {
        command: frame[2],
        body: frame[4..total - 1].to_vec(),
    })
}
