//! Moovforge-Bitstream: the codec-level pieces an MP4 container needs.
//!
//! Nothing here decodes pictures or audio. The crate covers:
//!
//! - [`annexb`]: splitting NAL units and converting between Annex-B start
//!   codes and 4-byte length prefixes
//! - [`h264`] / [`hevc`]: NAL unit typing, key-frame detection and the SPS
//!   fields that end up in sample entries
//! - [`avcc`] / [`hvcc`]: building and parsing decoder configuration records
//! - [`aac`]: ADTS headers and `AudioSpecificConfig`
//!
//! # Examples
//!
//! ```
//! use moovforge_bitstream::{convert_extradata, create_h264_avcc_extradata};
//!
//! let sps: &[u8] = &[0x67, 0x42, 0xC0, 0x1F, 0xDA, 0x01, 0x40, 0x16, 0xE4];
//! let pps: &[u8] = &[0x68, 0xCE, 0x3C, 0x80];
//!
//! let avcc = create_h264_avcc_extradata(&[sps], &[pps]).unwrap();
//! let (spss, ppss) = convert_extradata(&avcc).unwrap();
//! assert_eq!(spss, vec![sps.to_vec()]);
//! assert_eq!(ppss, vec![pps.to_vec()]);
//! ```

pub mod aac;
pub mod annexb;
pub mod avcc;
pub mod error;
pub mod h264;
pub mod hevc;
pub mod hvcc;
pub mod rbsp;

pub use aac::{AdtsHeader, AudioSpecificConfig};
pub use annexb::{
    annexb_to_avcc, annexb_to_avcc_in_place, avcc_to_annexb, avcc_to_annexb_in_place,
    split_annexb, split_avcc, NALU_LENGTH_SIZE,
};
pub use avcc::{convert_extradata, create_h264_avcc_extradata, AvcDecoderConfigurationRecord};
pub use error::{BitstreamError, Result};
pub use hvcc::{convert_hevc_extradata, create_hevc_hvcc_extradata, HevcDecoderConfigurationRecord};
