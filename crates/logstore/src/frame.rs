//! On-disk frame encoding: `[offset u64 LE][len u32 LE][crc32c u32 LE][data]` (§4.4).

use crate::error::LogError;

pub const FRAME_HEADER_LEN: usize = 8 + 4 + 4;

/// Encodes a single frame for `offset`/`data`.
pub fn encode_frame(offset: u64, data: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(FRAME_HEADER_LEN + data.len());
    out.extend_from_slice(&offset.to_le_bytes());
    out.extend_from_slice(&(data.len() as u32).to_le_bytes());
    out.extend_from_slice(&crc32c::crc32c(data).to_le_bytes());
    out.extend_from_slice(data);
    out
}

/// A frame parsed from a header + payload buffer.
pub struct ParsedFrame {
    pub offset: u64,
    pub data: Vec<u8>,
}

/// Parses a frame header. Returns `Ok(None)` if `buf` is shorter than the
/// header (a partial trailing header, treated as absent per §4.4). Returns
/// `Err` only if a header-sized slice fails to convert to its fixed-size
/// array, which cannot happen given the length check above but is surfaced
/// as a typed error rather than unwrapped.
pub fn parse_header(buf: &[u8]) -> Result<Option<(u64, u32, u32)>, LogError> {
    if buf.len() < FRAME_HEADER_LEN {
        return Ok(None);
    }
    let offset_bytes: [u8; 8] = buf[0..8]
        .try_into()
        .map_err(|_| LogError::Corrupt("offset field"))?;
    let len_bytes: [u8; 4] = buf[8..12]
        .try_into()
        .map_err(|_| LogError::Corrupt("length field"))?;
    let crc_bytes: [u8; 4] = buf[12..16]
        .try_into()
        .map_err(|_| LogError::Corrupt("crc field"))?;
    Ok(Some((
        u64::from_le_bytes(offset_bytes),
        u32::from_le_bytes(len_bytes),
        u32::from_le_bytes(crc_bytes),
    )))
}

/// Verifies `data` against `expected_crc`.
pub fn verify_crc(data: &[u8], expected_crc: u32) -> bool {
    crc32c::crc32c(data) == expected_crc
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn encode_then_parse_header_roundtrips() {
        let frame = encode_frame(42, b"hello");
        let (offset, len, crc) = parse_header(&frame).unwrap().unwrap();
        assert_eq!(offset, 42);
        assert_eq!(len, 5);
        assert!(verify_crc(&frame[FRAME_HEADER_LEN..], crc));
    }

    #[test]
    fn tampered_data_fails_crc_check() {
        let mut frame = encode_frame(1, b"hello");
        let last = frame.len() - 1;
        frame[last] ^= 0xFF;
        let (_, _, crc) = parse_header(&frame).unwrap().unwrap();
        assert!(!verify_crc(&frame[FRAME_HEADER_LEN..], crc));
    }

    #[test]
    fn short_buffer_has_no_header() {
        assert!(parse_header(&[0u8; 4]).unwrap().is_none());
    }
}
