//! Record frame codec.
//!
//! Every record on disk is a 6-byte header followed by an opaque payload:
//!
//! ```text
//! ┌────────────────┬─────────────────┬──────────────────────┐
//! │ version: u16 LE│ body_len: u32 LE│ body: [u8; body_len] │
//! └────────────────┴─────────────────┴──────────────────────┘
//! ```

use crate::error::{CoreError, CoreResult};

/// Format version written in every frame header.
pub const FORMAT_VERSION: u16 = 0xADDE;

/// Size of a frame header in bytes.
pub const HEADER_SIZE: usize = 6;

/// Encodes a frame header for a body of `body_len` bytes.
#[must_use]
pub fn encode_header(body_len: u32) -> [u8; HEADER_SIZE] {
    let mut header = [0u8; HEADER_SIZE];
    header[0..2].copy_from_slice(&FORMAT_VERSION.to_le_bytes());
    header[2..6].copy_from_slice(&body_len.to_le_bytes());
    header
}

/// Decodes a frame header and returns the body length.
///
/// # Errors
///
/// Returns [`CoreError::Format`] if fewer than [`HEADER_SIZE`] bytes are
/// given or the version does not match [`FORMAT_VERSION`].
pub fn decode_header(bytes: &[u8]) -> CoreResult<u32> {
    if bytes.len() < HEADER_SIZE {
        return Err(CoreError::format(format!(
            "frame header needs {HEADER_SIZE} bytes, got {}",
            bytes.len()
        )));
    }

    let version = u16::from_le_bytes([bytes[0], bytes[1]]);
    if version != FORMAT_VERSION {
        return Err(CoreError::format(format!(
            "unexpected format version {version:#06x}, expected {FORMAT_VERSION:#06x}"
        )));
    }

    Ok(u32::from_le_bytes([bytes[2], bytes[3], bytes[4], bytes[5]]))
}

/// Returns the body length as a header field.
///
/// # Errors
///
/// Returns [`CoreError::Format`] if the body does not fit in a `u32`.
pub fn body_len(body: &[u8]) -> CoreResult<u32> {
    u32::try_from(body.len()).map_err(|_| {
        CoreError::format(format!("record body of {} bytes is too large", body.len()))
    })
}

/// Encodes a complete frame (header followed by body).
///
/// # Errors
///
/// Returns [`CoreError::Format`] if the body does not fit in a `u32`.
pub fn encode_frame(body: &[u8]) -> CoreResult<Vec<u8>> {
    let header = encode_header(body_len(body)?);
    let mut frame = Vec::with_capacity(HEADER_SIZE + body.len());
    frame.extend_from_slice(&header);
    frame.extend_from_slice(body);
    Ok(frame)
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn header_layout_is_little_endian() {
        let header = encode_header(0x0102_0304);
        assert_eq!(header, [0xDE, 0xAD, 0x04, 0x03, 0x02, 0x01]);
    }

    #[test]
    fn decode_valid_header() {
        assert_eq!(decode_header(&encode_header(1024)).unwrap(), 1024);
        assert_eq!(decode_header(&encode_header(0)).unwrap(), 0);
    }

    #[test]
    fn foreign_version_is_format_error() {
        let mut header = encode_header(10);
        header[0..2].copy_from_slice(&0x1234u16.to_le_bytes());
        let err = decode_header(&header).unwrap_err();
        assert!(err.is_format());
        assert!(err.to_string().contains("0x1234"));
    }

    #[test]
    fn short_header_is_format_error() {
        assert!(decode_header(&[0xDE, 0xAD, 0x01]).unwrap_err().is_format());
        assert!(decode_header(&[]).unwrap_err().is_format());
    }

    #[test]
    fn frame_is_header_then_body() {
        let frame = encode_frame(b"payload").unwrap();
        assert_eq!(frame.len(), HEADER_SIZE + 7);
        assert_eq!(decode_header(&frame).unwrap(), 7);
        assert_eq!(&frame[HEADER_SIZE..], b"payload");
    }

    proptest! {
        #[test]
        fn header_round_trip(len in any::<u32>()) {
            prop_assert_eq!(decode_header(&encode_header(len)).unwrap(), len);
        }

        #[test]
        fn frame_preserves_body(body in prop::collection::vec(any::<u8>(), 0..512)) {
            let frame = encode_frame(&body).unwrap();
            let len = decode_header(&frame).unwrap() as usize;
            prop_assert_eq!(&frame[HEADER_SIZE..HEADER_SIZE + len], body.as_slice());
        }
    }
}
