//! H.264 NAL unit typing and the SPS fields the container needs.

use crate::error::{BitstreamError, Result};
use crate::rbsp::{remove_emulation_prevention, BitReader};

/// H.264 NAL unit types.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NalUnitType {
    /// Coded slice of a non-IDR picture
    NonIdrSlice,
    /// Coded slice data partition A, B or C
    Partition(u8),
    /// Coded slice of an IDR picture
    IdrSlice,
    /// Supplemental enhancement information
    Sei,
    /// Sequence parameter set
    Sps,
    /// Picture parameter set
    Pps,
    /// Access unit delimiter
    Aud,
    /// Anything else
    Other(u8),
}

impl From<u8> for NalUnitType {
    fn from(value: u8) -> Self {
        match value & 0x1F {
            1 => Self::NonIdrSlice,
            v @ 2..=4 => Self::Partition(v),
            5 => Self::IdrSlice,
            6 => Self::Sei,
            7 => Self::Sps,
            8 => Self::Pps,
            9 => Self::Aud,
            v => Self::Other(v),
        }
    }
}

impl NalUnitType {
    /// Whether this NAL unit carries slice data.
    pub fn is_vcl(self) -> bool {
        matches!(self, Self::NonIdrSlice | Self::Partition(_) | Self::IdrSlice)
    }
}

/// Type of a NAL unit (start code already removed).
pub fn nal_type(nalu: &[u8]) -> Option<NalUnitType> {
    nalu.first().map(|b| NalUnitType::from(*b))
}

/// Whether the first VCL NAL unit of an access unit is an IDR slice.
pub fn is_key_frame<'a>(nalus: impl IntoIterator<Item = &'a [u8]>) -> bool {
    nalus
        .into_iter()
        .filter_map(nal_type)
        .find(|t| t.is_vcl())
        .is_some_and(|t| t == NalUnitType::IdrSlice)
}

/// Profiles whose SPS carries chroma format and bit depth fields.
const HIGH_PROFILES: [u8; 12] = [100, 110, 122, 244, 44, 83, 86, 118, 128, 138, 139, 134];

/// Whether `profile_idc` signals the high-profile SPS extension.
pub fn has_chroma_info(profile_idc: u8) -> bool {
    HIGH_PROFILES.contains(&profile_idc) || profile_idc == 135
}

/// Fields of an H.264 sequence parameter set.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Sps {
    pub profile_idc: u8,
    pub constraint_flags: u8,
    pub level_idc: u8,
    pub chroma_format_idc: u8,
    pub bit_depth_luma: u8,
    pub bit_depth_chroma: u8,
    /// Cropped picture width in pixels.
    pub width: u32,
    /// Cropped picture height in pixels.
    pub height: u32,
}

/// Parse an SPS NAL unit, header byte included.
pub fn parse_sps(nalu: &[u8]) -> Result<Sps> {
    BitstreamError::ensure(4, nalu.len())?;
    if nal_type(nalu) != Some(NalUnitType::Sps) {
        return Err(BitstreamError::invalid("not an H.264 SPS"));
    }

    let rbsp = remove_emulation_prevention(&nalu[1..]);
    let mut reader = BitReader::new(&rbsp);

    let profile_idc = reader.read_bits(8)? as u8;
    let constraint_flags = reader.read_bits(8)? as u8;
    let level_idc = reader.read_bits(8)? as u8;
    reader.read_ue()?; // seq_parameter_set_id

    let mut chroma_format_idc = 1;
    let mut bit_depth_luma = 8;
    let mut bit_depth_chroma = 8;
    let mut separate_colour_plane = false;

    if has_chroma_info(profile_idc) {
        chroma_format_idc = reader.read_ue()? as u8;
        if chroma_format_idc == 3 {
            separate_colour_plane = reader.read_bit()?;
        }
        bit_depth_luma = reader.read_ue()? as u8 + 8;
        bit_depth_chroma = reader.read_ue()? as u8 + 8;
        reader.read_bit()?; // qpprime_y_zero_transform_bypass_flag

        if reader.read_bit()? {
            let lists = if chroma_format_idc == 3 { 12 } else { 8 };
            for i in 0..lists {
                if reader.read_bit()? {
                    skip_scaling_list(&mut reader, if i < 6 { 16 } else { 64 })?;
                }
            }
        }
    }

    reader.read_ue()?; // log2_max_frame_num_minus4
    match reader.read_ue()? {
        0 => {
            reader.read_ue()?; // log2_max_pic_order_cnt_lsb_minus4
        }
        1 => {
            reader.read_bit()?; // delta_pic_order_always_zero_flag
            reader.read_se()?; // offset_for_non_ref_pic
            reader.read_se()?; // offset_for_top_to_bottom_field
            let cycle = reader.read_ue()?;
            for _ in 0..cycle {
                reader.read_se()?;
            }
        }
        _ => {}
    }

    reader.read_ue()?; // max_num_ref_frames
    reader.read_bit()?; // gaps_in_frame_num_value_allowed_flag
    let width_mbs = reader.read_ue()? + 1;
    let height_map_units = reader.read_ue()? + 1;
    let frame_mbs_only = reader.read_bit()?;
    if !frame_mbs_only {
        reader.read_bit()?; // mb_adaptive_frame_field_flag
    }
    reader.read_bit()?; // direct_8x8_inference_flag

    let (mut crop_left, mut crop_right, mut crop_top, mut crop_bottom) = (0, 0, 0, 0);
    if reader.read_bit()? {
        crop_left = reader.read_ue()?;
        crop_right = reader.read_ue()?;
        crop_top = reader.read_ue()?;
        crop_bottom = reader.read_ue()?;
    }

    let frame_height_factor = if frame_mbs_only { 1 } else { 2 };
    let (crop_unit_x, crop_unit_y) = if chroma_format_idc == 0 || separate_colour_plane {
        (1, frame_height_factor)
    } else {
        let sub_width = if chroma_format_idc == 3 { 1 } else { 2 };
        let sub_height = if chroma_format_idc == 1 { 2 } else { 1 };
        (sub_width, sub_height * frame_height_factor)
    };

    let width = (width_mbs * 16).saturating_sub(crop_unit_x * (crop_left + crop_right));
    let height = (frame_height_factor * height_map_units * 16)
        .saturating_sub(crop_unit_y * (crop_top + crop_bottom));

    Ok(Sps {
        profile_idc,
        constraint_flags,
        level_idc,
        chroma_format_idc,
        bit_depth_luma,
        bit_depth_chroma,
        width,
        height,
    })
}

fn skip_scaling_list(reader: &mut BitReader, size: usize) -> Result<()> {
    let mut last_scale = 8i32;
    let mut next_scale = 8i32;
    for _ in 0..size {
        if next_scale != 0 {
            let delta = reader.read_se()?;
            next_scale = (last_scale + delta + 256) % 256;
        }
        if next_scale != 0 {
            last_scale = next_scale;
        }
    }
    Ok(())
}
