//! Annex-B and length-prefixed (AVCC) NAL unit framing.
//!
//! Annex-B streams delimit NAL units with `00 00 01` or `00 00 00 01` start
//! codes; MP4 samples prefix each NAL unit with a 4-byte big-endian length.
//!
//! Two flavours of conversion are provided:
//!
//! - copying transforms ([`annexb_to_avcc`], [`avcc_to_annexb`]) that accept
//!   any start code length and return a new buffer;
//! - in-place transforms ([`annexb_to_avcc_in_place`],
//!   [`avcc_to_annexb_in_place`]) over a caller-owned buffer. These only work
//!   when every prefix is exactly 4 bytes, since the start code and the length
//!   field then occupy the same bytes. The buffer must hold exactly one access
//!   unit; nothing beyond its length is touched.

use crate::error::{BitstreamError, Result};

/// Size of the length prefix written into MP4 samples.
pub const NALU_LENGTH_SIZE: usize = 4;

const START_CODE: [u8; 4] = [0, 0, 0, 1];

/// Find the next 3-byte start code pattern at or after `from`.
fn find_start_code(data: &[u8], from: usize) -> Option<usize> {
    let mut i = from;
    while i + 3 <= data.len() {
        if data[i + 2] > 1 {
            // `00 00 01` cannot end at i + 2
            i += 3;
        } else if data[i] == 0 && data[i + 1] == 0 && data[i + 2] == 1 {
            return Some(i);
        } else {
            i += 1;
        }
    }
    None
}

/// Split an Annex-B buffer into NAL units, start codes removed.
///
/// Trailing zero bytes in front of a start code (the leading byte of a
/// 4-byte start code, or `trailing_zero_8bits`) are not part of the
/// preceding NAL unit. Input without any start code is returned as a single
/// NAL unit.
pub fn split_annexb(data: &[u8]) -> Vec<&[u8]> {
    let mut nalus = Vec::new();

    let Some(first) = find_start_code(data, 0) else {
        if !data.is_empty() {
            nalus.push(data);
        }
        return nalus;
    };

    let mut start = first + 3;
    while let Some(next) = find_start_code(data, start) {
        let mut end = next;
        while end > start && data[end - 1] == 0 {
            end -= 1;
        }
        if end > start {
            nalus.push(&data[start..end]);
        }
        start = next + 3;
    }

    if start < data.len() {
        nalus.push(&data[start..]);
    }

    nalus
}

/// Split a length-prefixed buffer into NAL units.
pub fn split_avcc(data: &[u8], length_size: usize) -> Result<Vec<&[u8]>> {
    if !(1..=4).contains(&length_size) {
        return Err(BitstreamError::invalid(format!(
            "unsupported NAL length size {}",
            length_size
        )));
    }

    let mut nalus = Vec::new();
    let mut pos = 0;

    while pos < data.len() {
        BitstreamError::ensure(pos + length_size, data.len())?;
        let len = data[pos..pos + length_size]
            .iter()
            .fold(0usize, |acc, b| (acc << 8) | *b as usize);
        pos += length_size;

        BitstreamError::ensure(pos + len, data.len())?;
        nalus.push(&data[pos..pos + len]);
        pos += len;
    }

    Ok(nalus)
}

/// Convert Annex-B to 4-byte length-prefixed framing into a new buffer.
pub fn annexb_to_avcc(data: &[u8]) -> Vec<u8> {
    let nalus = split_annexb(data);
    let total: usize = nalus.iter().map(|n| n.len() + NALU_LENGTH_SIZE).sum();

    let mut out = Vec::with_capacity(total);
    for nalu in nalus {
        out.extend_from_slice(&(nalu.len() as u32).to_be_bytes());
        out.extend_from_slice(nalu);
    }
    out
}

/// Convert 4-byte length-prefixed framing to Annex-B with 4-byte start codes.
pub fn avcc_to_annexb(data: &[u8]) -> Result<Vec<u8>> {
    let nalus = split_avcc(data, NALU_LENGTH_SIZE)?;

    let mut out = Vec::with_capacity(data.len());
    for nalu in nalus {
        out.extend_from_slice(&START_CODE);
        out.extend_from_slice(nalu);
    }
    Ok(out)
}

/// Rewrite 4-byte start codes into 4-byte length fields, in place.
///
/// Every start code in `buf` must be the 4-byte form and `buf` must begin
/// with one; a 3-byte start code has no room for a length field and is
/// rejected with [`BitstreamError::BufferTooSmall`] before anything is
/// modified.
pub fn annexb_to_avcc_in_place(buf: &mut [u8]) -> Result<()> {
    let mut positions = Vec::new();
    let mut from = 0;

    while let Some(pos) = find_start_code(buf, from) {
        if pos == 0 || buf[pos - 1] != 0 {
            return Err(BitstreamError::BufferTooSmall {
                need: NALU_LENGTH_SIZE,
                have: 3,
            });
        }
        positions.push(pos - 1);
        from = pos + 3;
    }

    match positions.first() {
        Some(0) => {}
        Some(_) => {
            return Err(BitstreamError::invalid(
                "data before the first start code",
            ))
        }
        None => return Err(BitstreamError::invalid("no start code found")),
    }

    for (i, &pos) in positions.iter().enumerate() {
        let end = positions.get(i + 1).copied().unwrap_or(buf.len());
        let len = (end - pos - NALU_LENGTH_SIZE) as u32;
        buf[pos..pos + NALU_LENGTH_SIZE].copy_from_slice(&len.to_be_bytes());
    }

    Ok(())
}

/// Rewrite 4-byte length fields into 4-byte start codes, in place.
///
/// All lengths are validated before the buffer is modified, so a truncated
/// sample leaves `buf` untouched.
pub fn avcc_to_annexb_in_place(buf: &mut [u8]) -> Result<()> {
    let mut positions = Vec::new();
    let mut pos = 0;

    while pos < buf.len() {
        BitstreamError::ensure(pos + NALU_LENGTH_SIZE, buf.len())?;
        let len = u32::from_be_bytes([buf[pos], buf[pos + 1], buf[pos + 2], buf[pos + 3]]) as usize;
        BitstreamError::ensure(pos + NALU_LENGTH_SIZE + len, buf.len())?;
        positions.push(pos);
        pos += NALU_LENGTH_SIZE + len;
    }

    for pos in positions {
        buf[pos..pos + NALU_LENGTH_SIZE].copy_from_slice(&START_CODE);
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_split_mixed_start_codes() {
        let data = [0, 0, 0, 1, 0x67, 0xAA, 0, 0, 1, 0x68, 0xBB, 0, 0, 0, 1, 0x65, 0xCC];
        let nalus = split_annexb(&data);
        assert_eq!(nalus, vec![&[0x67, 0xAA][..], &[0x68, 0xBB][..], &[0x65, 0xCC][..]]);
    }

    #[test]
    fn test_split_without_start_code() {
        let data = [0x65, 0x88, 0x84];
        assert_eq!(split_annexb(&data), vec![&data[..]]);
        assert!(split_annexb(&[]).is_empty());
    }

    #[test]
    fn test_copying_roundtrip() {
        let annexb = [0, 0, 0, 1, 0x67, 1, 2, 3, 0, 0, 0, 1, 0x65, 4, 5];
        let avcc = annexb_to_avcc(&annexb);
        assert_eq!(avcc, vec![0, 0, 0, 4, 0x67, 1, 2, 3, 0, 0, 0, 3, 0x65, 4, 5]);
        assert_eq!(avcc_to_annexb(&avcc).unwrap(), annexb.to_vec());
    }

    #[test]
    fn test_three_byte_start_codes_are_widened() {
        let annexb = [0, 0, 1, 0x41, 9, 9];
        let avcc = annexb_to_avcc(&annexb);
        assert_eq!(avcc_to_annexb(&avcc).unwrap(), vec![0, 0, 0, 1, 0x41, 9, 9]);
    }

    #[test]
    fn test_in_place_roundtrip() {
        let original = vec![0, 0, 0, 1, 0x67, 1, 2, 0, 0, 0, 1, 0x65, 7];
        let mut buf = original.clone();
        annexb_to_avcc_in_place(&mut buf).unwrap();
        assert_eq!(buf, vec![0, 0, 0, 3, 0x67, 1, 2, 0, 0, 0, 2, 0x65, 7]);
        avcc_to_annexb_in_place(&mut buf).unwrap();
        assert_eq!(buf, original);
    }

    #[test]
    fn test_in_place_rejects_short_start_code() {
        let mut buf = vec![0, 0, 1, 0x65, 7];
        let before = buf.clone();
        assert!(matches!(
            annexb_to_avcc_in_place(&mut buf),
            Err(BitstreamError::BufferTooSmall { .. })
        ));
        assert_eq!(buf, before);
    }

    #[test]
    fn test_in_place_rejects_truncated_length() {
        let mut buf = vec![0, 0, 0, 9, 0x65, 7];
        let before = buf.clone();
        assert!(matches!(
            avcc_to_annexb_in_place(&mut buf),
            Err(BitstreamError::Truncated { .. })
        ));
        assert_eq!(buf, before);
    }

    #[test]
    fn test_split_avcc_two_byte_lengths() {
        let data = [0, 2, 0xAA, 0xBB, 0, 1, 0xCC];
        let nalus = split_avcc(&data, 2).unwrap();
        assert_eq!(nalus, vec![&[0xAA, 0xBB][..], &[0xCC][..]]);
        assert!(split_avcc(&data, 5).is_err());
    }
}
