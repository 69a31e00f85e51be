//! `HEVCDecoderConfigurationRecord` (the payload of an `hvcC` box).

use bytes::{Buf, BufMut};

use crate::avcc::read_parameter_sets;
use crate::error::{BitstreamError, Result};
use crate::hevc::{self, NalUnitType};

/// Size of the fixed part of the record, before the NAL unit arrays.
const HEADER_SIZE: usize = 23;

/// One array of same-typed parameter set NAL units.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NalArray {
    pub array_completeness: bool,
    pub nal_unit_type: u8,
    pub nalus: Vec<Vec<u8>>,
}

/// Decoded `HEVCDecoderConfigurationRecord`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HevcDecoderConfigurationRecord {
    pub general_profile_space: u8,
    pub general_tier_flag: bool,
    pub general_profile_idc: u8,
    pub general_profile_compatibility_flags: u32,
    pub general_constraint_indicator_flags: u64,
    pub general_level_idc: u8,
    pub min_spatial_segmentation_idc: u16,
    pub parallelism_type: u8,
    pub chroma_format_idc: u8,
    pub bit_depth_luma: u8,
    pub bit_depth_chroma: u8,
    pub avg_frame_rate: u16,
    pub constant_frame_rate: u8,
    pub num_temporal_layers: u8,
    pub temporal_id_nested: bool,
    pub length_size_minus_one: u8,
    pub arrays: Vec<NalArray>,
}

impl HevcDecoderConfigurationRecord {
    /// Build a record from VPS/SPS/PPS NAL units (no start codes).
    ///
    /// Profile-tier-level, chroma format and bit depths come from the first
    /// SPS. An empty VPS list is tolerated; SPS and PPS are required.
    pub fn from_parameter_sets(vps: &[&[u8]], sps: &[&[u8]], pps: &[&[u8]]) -> Result<Self> {
        let first = *sps.first().ok_or(BitstreamError::MissingParameterSet("SPS"))?;
        if pps.is_empty() {
            return Err(BitstreamError::MissingParameterSet("PPS"));
        }
        let parsed = hevc::parse_sps(first)?;

        let arrays = [
            (NalUnitType::Vps, vps),
            (NalUnitType::Sps, sps),
            (NalUnitType::Pps, pps),
        ]
        .into_iter()
        .filter(|(_, sets)| !sets.is_empty())
        .map(|(nal_type, sets)| NalArray {
            array_completeness: true,
            nal_unit_type: nal_type.value(),
            nalus: sets.iter().map(|s| s.to_vec()).collect(),
        })
        .collect();

        Ok(Self {
            general_profile_space: parsed.general_profile_space,
            general_tier_flag: parsed.general_tier_flag,
            general_profile_idc: parsed.general_profile_idc,
            general_profile_compatibility_flags: parsed.general_profile_compatibility_flags,
            general_constraint_indicator_flags: parsed.general_constraint_indicator_flags,
            general_level_idc: parsed.general_level_idc,
            min_spatial_segmentation_idc: 0,
            parallelism_type: 0,
            chroma_format_idc: parsed.chroma_format_idc,
            bit_depth_luma: parsed.bit_depth_luma,
            bit_depth_chroma: parsed.bit_depth_chroma,
            avg_frame_rate: 0,
            constant_frame_rate: 0,
            num_temporal_layers: parsed.max_sub_layers,
            temporal_id_nested: parsed.temporal_id_nesting,
            length_size_minus_one: 3,
            arrays,
        })
    }

    /// Parse a record from `hvcC` payload bytes.
    pub fn parse(data: &[u8]) -> Result<Self> {
        BitstreamError::ensure(HEADER_SIZE, data.len())?;
        let mut buf = data;

        let version = buf.get_u8();
        if version != 1 {
            return Err(BitstreamError::invalid(format!(
                "unsupported hvcC version {}",
                version
            )));
        }

        let ptl = buf.get_u8();
        let general_profile_compatibility_flags = buf.get_u32();
        let general_constraint_indicator_flags = buf.get_uint(6);
        let general_level_idc = buf.get_u8();
        let min_spatial_segmentation_idc = buf.get_u16() & 0x0FFF;
        let parallelism_type = buf.get_u8() & 0x03;
        let chroma_format_idc = buf.get_u8() & 0x03;
        let bit_depth_luma = (buf.get_u8() & 0x07) + 8;
        let bit_depth_chroma = (buf.get_u8() & 0x07) + 8;
        let avg_frame_rate = buf.get_u16();
        let flags = buf.get_u8();
        let num_arrays = buf.get_u8() as usize;

        let mut arrays = Vec::with_capacity(num_arrays);
        for _ in 0..num_arrays {
            BitstreamError::ensure(3, buf.remaining())?;
            let kind = buf.get_u8();
            let count = buf.get_u16() as usize;
            arrays.push(NalArray {
                array_completeness: kind & 0x80 != 0,
                nal_unit_type: kind & 0x3F,
                nalus: read_parameter_sets(&mut buf, count, data.len())?,
            });
        }

        Ok(Self {
            general_profile_space: ptl >> 6,
            general_tier_flag: ptl & 0x20 != 0,
            general_profile_idc: ptl & 0x1F,
            general_profile_compatibility_flags,
            general_constraint_indicator_flags,
            general_level_idc,
            min_spatial_segmentation_idc,
            parallelism_type,
            chroma_format_idc,
            bit_depth_luma,
            bit_depth_chroma,
            avg_frame_rate,
            constant_frame_rate: flags >> 6,
            num_temporal_layers: (flags >> 3) & 0x07,
            temporal_id_nested: flags & 0x04 != 0,
            length_size_minus_one: flags & 0x03,
            arrays,
        })
    }

    /// Size of the NAL unit length prefix in samples.
    pub fn nalu_length_size(&self) -> usize {
        self.length_size_minus_one as usize + 1
    }

    /// All NAL units of one type, in record order.
    pub fn nalus_of_type(&self, nal_type: NalUnitType) -> Vec<Vec<u8>> {
        self.arrays
            .iter()
            .filter(|a| a.nal_unit_type == nal_type.value())
            .flat_map(|a| a.nalus.iter().cloned())
            .collect()
    }

    /// Serialize into `hvcC` payload bytes.
    pub fn encode(&self) -> Vec<u8> {
        let mut out = Vec::new();
        out.put_u8(1);
        out.put_u8(
            (self.general_profile_space << 6)
                | ((self.general_tier_flag as u8) << 5)
                | (self.general_profile_idc & 0x1F),
        );
        out.put_u32(self.general_profile_compatibility_flags);
        out.put_uint(self.general_constraint_indicator_flags, 6);
        out.put_u8(self.general_level_idc);
        out.put_u16(0xF000 | (self.min_spatial_segmentation_idc & 0x0FFF));
        out.put_u8(0xFC | (self.parallelism_type & 0x03));
        out.put_u8(0xFC | (self.chroma_format_idc & 0x03));
        out.put_u8(0xF8 | (self.bit_depth_luma.saturating_sub(8) & 0x07));
        out.put_u8(0xF8 | (self.bit_depth_chroma.saturating_sub(8) & 0x07));
        out.put_u16(self.avg_frame_rate);
        out.put_u8(
            (self.constant_frame_rate << 6)
                | ((self.num_temporal_layers & 0x07) << 3)
                | ((self.temporal_id_nested as u8) << 2)
                | (self.length_size_minus_one & 0x03),
        );

        out.put_u8(self.arrays.len() as u8);
        for array in &self.arrays {
            out.put_u8(((array.array_completeness as u8) << 7) | (array.nal_unit_type & 0x3F));
            out.put_u16(array.nalus.len() as u16);
            for nalu in &array.nalus {
                out.put_u16(nalu.len() as u16);
                out.put_slice(nalu);
            }
        }

        out
    }
}

/// Build `hvcC` payload bytes from VPS, SPS and PPS NAL units.
pub fn create_hevc_hvcc_extradata(
    vps: &[&[u8]],
    sps: &[&[u8]],
    pps: &[&[u8]],
) -> Result<Vec<u8>> {
    Ok(HevcDecoderConfigurationRecord::from_parameter_sets(vps, sps, pps)?.encode())
}

/// Parameter sets recovered from an `hvcC` record.
pub type HevcParameterSets = (Vec<Vec<u8>>, Vec<Vec<u8>>, Vec<Vec<u8>>);

/// Split `hvcC` payload bytes back into its VPS, SPS and PPS NAL units.
pub fn convert_hevc_extradata(extradata: &[u8]) -> Result<HevcParameterSets> {
    let record = HevcDecoderConfigurationRecord::parse(extradata)?;
    Ok((
        record.nalus_of_type(NalUnitType::Vps),
        record.nalus_of_type(NalUnitType::Sps),
        record.nalus_of_type(NalUnitType::Pps),
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hevc::tests::SPS_720P;

    const VPS: [u8; 6] = [0x40, 0x01, 0x0C, 0x01, 0xFF, 0xFF];
    const PPS: [u8; 5] = [0x44, 0x01, 0xC1, 0x72, 0xB4];

    #[test]
    fn test_header_fields_from_sps() {
        let data = create_hevc_hvcc_extradata(&[&VPS], &[&SPS_720P], &[&PPS]).unwrap();

        assert_eq!(data[0], 1);
        assert_eq!(data[1], 0x01); // space 0, tier 0, Main
        assert_eq!(&data[2..6], &[0x60, 0, 0, 0]);
        assert_eq!(&data[6..12], &[0x90, 0, 0, 0, 0, 0]);
        assert_eq!(data[12], 93);
        assert_eq!(&data[13..15], &[0xF0, 0x00]);
        assert_eq!(data[16], 0xFD); // 4:2:0
        assert_eq!(data[17], 0xF8);
        assert_eq!(data[18], 0xF8);
        // one temporal layer, nested, 4-byte lengths
        assert_eq!(data[21], 0x0F);
        assert_eq!(data[22], 3);
        assert_eq!(&data[23..26], &[0xA0, 0, 1]);
    }

    #[test]
    fn test_roundtrip() {
        let data = create_hevc_hvcc_extradata(&[&VPS], &[&SPS_720P], &[&PPS]).unwrap();
        let (vps, sps, pps) = convert_hevc_extradata(&data).unwrap();
        assert_eq!(vps, vec![VPS.to_vec()]);
        assert_eq!(sps, vec![SPS_720P.to_vec()]);
        assert_eq!(pps, vec![PPS.to_vec()]);

        let record = HevcDecoderConfigurationRecord::parse(&data).unwrap();
        assert_eq!(record.encode(), data);
        assert_eq!(record.nalu_length_size(), 4);
        assert_eq!(record.num_temporal_layers, 1);
    }

    #[test]
    fn test_missing_parameter_sets() {
        assert!(matches!(
            create_hevc_hvcc_extradata(&[&VPS], &[], &[&PPS]),
            Err(BitstreamError::MissingParameterSet("SPS"))
        ));
        assert!(matches!(
            create_hevc_hvcc_extradata(&[&VPS], &[&SPS_720P], &[]),
            Err(BitstreamError::MissingParameterSet("PPS"))
        ));
    }

    #[test]
    fn test_truncated_record() {
        let data = create_hevc_hvcc_extradata(&[], &[&SPS_720P], &[&PPS]).unwrap();
        assert!(convert_hevc_extradata(&data[..HEADER_SIZE - 1]).is_err());
        assert!(matches!(
            convert_hevc_extradata(&data[..data.len() - 1]),
            Err(BitstreamError::Truncated { .. })
        ));
    }
}
