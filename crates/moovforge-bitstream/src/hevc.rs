//! H.265 NAL unit typing and the SPS fields an `hvcC` record carries.

use crate::error::{BitstreamError, Result};
use crate::rbsp::{remove_emulation_prevention, BitReader};

/// HEVC NAL unit types the container cares about.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NalUnitType {
    /// Coded slice of a trailing, TSA, STSA, RADL or RASL picture (0-9)
    Slice(u8),
    /// Coded slice of a BLA picture (16-18)
    Bla(u8),
    /// Coded slice of an IDR picture (19-20)
    Idr(u8),
    /// Coded slice of a CRA picture
    Cra,
    /// Video parameter set
    Vps,
    /// Sequence parameter set
    Sps,
    /// Picture parameter set
    Pps,
    /// Access unit delimiter
    Aud,
    /// Prefix or suffix SEI
    Sei(u8),
    /// Reserved, unspecified or anything else
    Other(u8),
}

impl From<u8> for NalUnitType {
    fn from(value: u8) -> Self {
        match value {
            v @ 0..=9 => Self::Slice(v),
            v @ 16..=18 => Self::Bla(v),
            v @ 19..=20 => Self::Idr(v),
            21 => Self::Cra,
            32 => Self::Vps,
            33 => Self::Sps,
            34 => Self::Pps,
            35 => Self::Aud,
            v @ 39..=40 => Self::Sei(v),
            v => Self::Other(v),
        }
    }
}

impl NalUnitType {
    /// Raw `nal_unit_type` value.
    pub fn value(self) -> u8 {
        match self {
            Self::Slice(v) | Self::Bla(v) | Self::Idr(v) | Self::Sei(v) | Self::Other(v) => v,
            Self::Cra => 21,
            Self::Vps => 32,
            Self::Sps => 33,
            Self::Pps => 34,
            Self::Aud => 35,
        }
    }

    /// Intra random access point (types 16-21).
    pub fn is_irap(self) -> bool {
        matches!(self, Self::Bla(_) | Self::Idr(_) | Self::Cra)
    }

    /// Whether this NAL unit carries slice data (types 0-31).
    pub fn is_vcl(self) -> bool {
        self.value() < 32
    }
}

/// Type of a NAL unit from its 2-byte header.
pub fn nal_type(nalu: &[u8]) -> Option<NalUnitType> {
    nalu.first().map(|b| NalUnitType::from((b >> 1) & 0x3F))
}

/// Whether the first VCL NAL unit of an access unit is an IRAP picture.
pub fn is_key_frame<'a>(nalus: impl IntoIterator<Item = &'a [u8]>) -> bool {
    nalus
        .into_iter()
        .filter_map(nal_type)
        .find(|t| t.is_vcl())
        .is_some_and(NalUnitType::is_irap)
}

/// Fields of an HEVC sequence parameter set.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Sps {
    pub general_profile_space: u8,
    pub general_tier_flag: bool,
    pub general_profile_idc: u8,
    pub general_profile_compatibility_flags: u32,
    /// The 48 constraint indicator bits, right-aligned.
    pub general_constraint_indicator_flags: u64,
    pub general_level_idc: u8,
    /// `sps_max_sub_layers_minus1 + 1`
    pub max_sub_layers: u8,
    pub temporal_id_nesting: bool,
    pub chroma_format_idc: u8,
    pub bit_depth_luma: u8,
    pub bit_depth_chroma: u8,
    /// Picture width after the conformance window.
    pub width: u32,
    /// Picture height after the conformance window.
    pub height: u32,
}

/// Parse an SPS NAL unit, 2-byte header included.
pub fn parse_sps(nalu: &[u8]) -> Result<Sps> {
    BitstreamError::ensure(3, nalu.len())?;
    if nal_type(nalu) != Some(NalUnitType::Sps) {
        return Err(BitstreamError::invalid("not an HEVC SPS"));
    }

    let rbsp = remove_emulation_prevention(&nalu[2..]);
    let mut reader = BitReader::new(&rbsp);

    reader.skip_bits(4)?; // sps_video_parameter_set_id
    let max_sub_layers_minus1 = reader.read_bits(3)? as u8;
    let temporal_id_nesting = reader.read_bit()?;

    let general_profile_space = reader.read_bits(2)? as u8;
    let general_tier_flag = reader.read_bit()?;
    let general_profile_idc = reader.read_bits(5)? as u8;
    let general_profile_compatibility_flags = reader.read_bits(32)? as u32;
    let general_constraint_indicator_flags = reader.read_bits(48)?;
    let general_level_idc = reader.read_bits(8)? as u8;
    skip_sub_layers(&mut reader, max_sub_layers_minus1)?;

    reader.read_ue()?; // sps_seq_parameter_set_id
    let chroma_format_idc = reader.read_ue()? as u8;
    if chroma_format_idc == 3 {
        reader.read_bit()?; // separate_colour_plane_flag
    }

    let mut width = reader.read_ue()?;
    let mut height = reader.read_ue()?;

    if reader.read_bit()? {
        let left = reader.read_ue()?;
        let right = reader.read_ue()?;
        let top = reader.read_ue()?;
        let bottom = reader.read_ue()?;
        let sub_width = if chroma_format_idc == 1 || chroma_format_idc == 2 { 2 } else { 1 };
        let sub_height = if chroma_format_idc == 1 { 2 } else { 1 };
        width = width.saturating_sub(sub_width * (left + right));
        height = height.saturating_sub(sub_height * (top + bottom));
    }

    let bit_depth_luma = reader.read_ue()? as u8 + 8;
    let bit_depth_chroma = reader.read_ue()? as u8 + 8;

    Ok(Sps {
        general_profile_space,
        general_tier_flag,
        general_profile_idc,
        general_profile_compatibility_flags,
        general_constraint_indicator_flags,
        general_level_idc,
        max_sub_layers: max_sub_layers_minus1 + 1,
        temporal_id_nesting,
        chroma_format_idc,
        bit_depth_luma,
        bit_depth_chroma,
        width,
        height,
    })
}

/// Skip the sub-layer part of `profile_tier_level`.
fn skip_sub_layers(reader: &mut BitReader, max_sub_layers_minus1: u8) -> Result<()> {
    let count = max_sub_layers_minus1 as usize;
    let mut present = Vec::with_capacity(count);
    for _ in 0..count {
        let profile = reader.read_bit()?;
        let level = reader.read_bit()?;
        present.push((profile, level));
    }

    if count > 0 {
        reader.skip_bits(2 * (8 - count))?; // reserved_zero_2bits
    }

    for (profile, level) in present {
        if profile {
            reader.skip_bits(88)?;
        }
        if level {
            reader.skip_bits(8)?;
        }
    }

    Ok(())
}
