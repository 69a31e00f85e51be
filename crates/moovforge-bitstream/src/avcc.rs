//! `AVCDecoderConfigurationRecord` (the payload of an `avcC` box).

use bytes::{Buf, BufMut};

use crate::error::{BitstreamError, Result};
use crate::h264;

/// Profiles whose record carries the chroma/bit-depth trailer.
const TRAILER_PROFILES: [u8; 4] = [100, 110, 122, 144];

/// Chroma format and bit depths appended for high profiles.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HighProfileExt {
    pub chroma_format_idc: u8,
    pub bit_depth_luma: u8,
    pub bit_depth_chroma: u8,
}

impl Default for HighProfileExt {
    fn default() -> Self {
        Self {
            chroma_format_idc: 1,
            bit_depth_luma: 8,
            bit_depth_chroma: 8,
        }
    }
}

/// Decoded `AVCDecoderConfigurationRecord`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AvcDecoderConfigurationRecord {
    pub profile_idc: u8,
    pub profile_compatibility: u8,
    pub level_idc: u8,
    pub length_size_minus_one: u8,
    pub sps: Vec<Vec<u8>>,
    pub pps: Vec<Vec<u8>>,
    pub high_profile_ext: Option<HighProfileExt>,
}

impl AvcDecoderConfigurationRecord {
    /// Build a record from raw SPS/PPS NAL units (no start codes).
    ///
    /// Profile, compatibility and level are copied from the first SPS.
    pub fn from_parameter_sets(sps: &[&[u8]], pps: &[&[u8]]) -> Result<Self> {
        let first = *sps.first().ok_or(BitstreamError::MissingParameterSet("SPS"))?;
        if pps.is_empty() {
            return Err(BitstreamError::MissingParameterSet("PPS"));
        }
        BitstreamError::ensure(4, first.len())?;

        let profile_idc = first[1];
        let high_profile_ext = TRAILER_PROFILES.contains(&profile_idc).then(|| {
            // A truncated SPS still gets a valid trailer
            h264::parse_sps(first)
                .map(|parsed| HighProfileExt {
                    chroma_format_idc: parsed.chroma_format_idc,
                    bit_depth_luma: parsed.bit_depth_luma,
                    bit_depth_chroma: parsed.bit_depth_chroma,
                })
                .unwrap_or_default()
        });

        Ok(Self {
            profile_idc,
            profile_compatibility: first[2],
            level_idc: first[3],
            length_size_minus_one: 3,
            sps: sps.iter().map(|s| s.to_vec()).collect(),
            pps: pps.iter().map(|p| p.to_vec()).collect(),
            high_profile_ext,
        })
    }

    /// Parse a record from `avcC` payload bytes.
    pub fn parse(data: &[u8]) -> Result<Self> {
        BitstreamError::ensure(6, data.len())?;
        let mut buf = data;

        let version = buf.get_u8();
        if version != 1 {
            return Err(BitstreamError::invalid(format!(
                "unsupported avcC version {}",
                version
            )));
        }
        let profile_idc = buf.get_u8();
        let profile_compatibility = buf.get_u8();
        let level_idc = buf.get_u8();
        let length_size_minus_one = buf.get_u8() & 0x03;

        let num_sps = (buf.get_u8() & 0x1F) as usize;
        let sps = read_parameter_sets(&mut buf, num_sps, data.len())?;

        BitstreamError::ensure(1, buf.remaining())?;
        let num_pps = buf.get_u8() as usize;
        let pps = read_parameter_sets(&mut buf, num_pps, data.len())?;

        // Some muxers omit the trailer even for high profiles
        let high_profile_ext = if TRAILER_PROFILES.contains(&profile_idc) && buf.remaining() >= 4 {
            let chroma_format_idc = buf.get_u8() & 0x03;
            let bit_depth_luma = (buf.get_u8() & 0x07) + 8;
            let bit_depth_chroma = (buf.get_u8() & 0x07) + 8;
            let num_sps_ext = buf.get_u8() as usize;
            read_parameter_sets(&mut buf, num_sps_ext, data.len())?;
            Some(HighProfileExt {
                chroma_format_idc,
                bit_depth_luma,
                bit_depth_chroma,
            })
        } else {
            None
        };

        Ok(Self {
            profile_idc,
            profile_compatibility,
            level_idc,
            length_size_minus_one,
            sps,
            pps,
            high_profile_ext,
        })
    }

    /// Size of the NAL unit length prefix in samples.
    pub fn nalu_length_size(&self) -> usize {
        self.length_size_minus_one as usize + 1
    }

    /// Serialize into `avcC` payload bytes.
    pub fn encode(&self) -> Vec<u8> {
        let mut out = Vec::new();
        out.put_u8(1);
        out.put_u8(self.profile_idc);
        out.put_u8(self.profile_compatibility);
        out.put_u8(self.level_idc);
        out.put_u8(0xFC | (self.length_size_minus_one & 0x03));

        out.put_u8(0xE0 | (self.sps.len() as u8 & 0x1F));
        for sps in &self.sps {
            out.put_u16(sps.len() as u16);
            out.put_slice(sps);
        }

        out.put_u8(self.pps.len() as u8);
        for pps in &self.pps {
            out.put_u16(pps.len() as u16);
            out.put_slice(pps);
        }

        if let Some(ext) = self.high_profile_ext {
            out.put_u8(0xFC | (ext.chroma_format_idc & 0x03));
            out.put_u8(0xF8 | (ext.bit_depth_luma.saturating_sub(8) & 0x07));
            out.put_u8(0xF8 | (ext.bit_depth_chroma.saturating_sub(8) & 0x07));
            out.put_u8(0);
        }

        out
    }
}

/// Read `count` u16-length-prefixed NAL units.
pub(crate) fn read_parameter_sets(
    buf: &mut &[u8],
    count: usize,
    total: usize,
) -> Result<Vec<Vec<u8>>> {
    let mut sets = Vec::with_capacity(count);
    for _ in 0..count {
        if buf.remaining() < 2 {
            return Err(truncated(buf, 2, total));
        }
        let len = buf.get_u16() as usize;
        if buf.remaining() < len {
            return Err(truncated(buf, len, total));
        }
        sets.push(buf[..len].to_vec());
        buf.advance(len);
    }
    Ok(sets)
}

fn truncated(buf: &[u8], need: usize, total: usize) -> BitstreamError {
    let pos = total - buf.len();
    BitstreamError::Truncated {
        need: pos + need,
        have: total,
    }
}

/// Build `avcC` payload bytes from SPS and PPS NAL units.
pub fn create_h264_avcc_extradata(sps: &[&[u8]], pps: &[&[u8]]) -> Result<Vec<u8>> {
    Ok(AvcDecoderConfigurationRecord::from_parameter_sets(sps, pps)?.encode())
}

/// Split `avcC` payload bytes back into its SPS and PPS NAL units.
pub fn convert_extradata(extradata: &[u8]) -> Result<(Vec<Vec<u8>>, Vec<Vec<u8>>)> {
    let record = AvcDecoderConfigurationRecord::parse(extradata)?;
    Ok((record.sps, record.pps))
}
