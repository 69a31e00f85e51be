//! AAC framing: ADTS headers and `AudioSpecificConfig`.

use bytes::BufMut;

use crate::error::{BitstreamError, Result};
use crate::rbsp::BitReader;

/// Sampling frequencies indexed by `sampling_frequency_index`.
pub const SAMPLE_RATES: [u32; 13] = [
    96000, 88200, 64000, 48000, 44100, 32000, 24000, 22050, 16000, 12000, 11025, 8000, 7350,
];

/// Index escape meaning an explicit 24-bit frequency follows.
const EXPLICIT_FREQUENCY: u8 = 0x0F;

/// Samples per AAC-LC frame.
pub const SAMPLES_PER_FRAME: u32 = 1024;

/// Index of `rate` in [`SAMPLE_RATES`].
pub fn sample_rate_index(rate: u32) -> Option<u8> {
    SAMPLE_RATES.iter().position(|r| *r == rate).map(|i| i as u8)
}

/// Whether `data` starts with an ADTS sync word.
pub fn is_adts(data: &[u8]) -> bool {
    data.len() >= 7 && data[0] == 0xFF && data[1] & 0xF6 == 0xF0
}

/// Fixed and variable ADTS header fields.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AdtsHeader {
    /// MPEG-4 audio object type (`profile + 1`).
    pub object_type: u8,
    pub sampling_frequency_index: u8,
    pub channel_configuration: u8,
    /// Frame length including the header.
    pub frame_length: usize,
    /// 7 bytes, or 9 when a CRC is present.
    pub header_len: usize,
}

impl AdtsHeader {
    /// Parse the header at the start of `data`.
    pub fn parse(data: &[u8]) -> Result<Self> {
        BitstreamError::ensure(7, data.len())?;
        if !is_adts(data) {
            return Err(BitstreamError::invalid("missing ADTS sync word"));
        }

        let header_len = if data[1] & 0x01 == 1 { 7 } else { 9 };
        BitstreamError::ensure(header_len, data.len())?;

        let frame_length = (((data[3] & 0x03) as usize) << 11)
            | ((data[4] as usize) << 3)
            | ((data[5] as usize) >> 5);
        if frame_length < header_len {
            return Err(BitstreamError::invalid(format!(
                "ADTS frame length {} shorter than header",
                frame_length
            )));
        }

        Ok(Self {
            object_type: (data[2] >> 6) + 1,
            sampling_frequency_index: (data[2] >> 2) & 0x0F,
            channel_configuration: ((data[2] & 0x01) << 2) | (data[3] >> 6),
            frame_length,
            header_len,
        })
    }

    /// Header for a raw frame of `payload_len` bytes, without CRC.
    pub fn for_payload(config: &AudioSpecificConfig, payload_len: usize) -> Self {
        Self {
            object_type: config.object_type,
            sampling_frequency_index: config.sampling_frequency_index,
            channel_configuration: config.channel_configuration,
            frame_length: payload_len + 7,
            header_len: 7,
        }
    }

    /// Serialize as a 7-byte header (protection absent).
    pub fn encode(&self) -> [u8; 7] {
        let profile = self.object_type.saturating_sub(1) & 0x03;
        let len = self.frame_length;
        [
            0xFF,
            0xF1,
            (profile << 6)
                | ((self.sampling_frequency_index & 0x0F) << 2)
                | ((self.channel_configuration >> 2) & 0x01),
            ((self.channel_configuration & 0x03) << 6) | ((len >> 11) & 0x03) as u8,
            ((len >> 3) & 0xFF) as u8,
            (((len & 0x07) as u8) << 5) | 0x1F,
            0xFC,
        ]
    }

    /// Equivalent `AudioSpecificConfig`.
    pub fn audio_specific_config(&self) -> AudioSpecificConfig {
        AudioSpecificConfig {
            object_type: self.object_type,
            sampling_frequency_index: self.sampling_frequency_index,
            sample_rate: SAMPLE_RATES
                .get(self.sampling_frequency_index as usize)
                .copied()
                .unwrap_or(0),
            channel_configuration: self.channel_configuration,
        }
    }
}

/// Split one ADTS frame into its header and raw payload.
///
/// `data` must hold exactly one frame.
pub fn strip_adts(data: &[u8]) -> Result<(AdtsHeader, &[u8])> {
    let header = AdtsHeader::parse(data)?;
    BitstreamError::ensure(header.frame_length, data.len())?;
    if header.frame_length != data.len() {
        return Err(BitstreamError::invalid(format!(
            "ADTS frame length {} does not match packet length {}",
            header.frame_length,
            data.len()
        )));
    }
    Ok((header, &data[header.header_len..]))
}

/// The leading fields of an MPEG-4 `AudioSpecificConfig`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AudioSpecificConfig {
    pub object_type: u8,
    pub sampling_frequency_index: u8,
    /// Resolved sampling frequency in Hz.
    pub sample_rate: u32,
    pub channel_configuration: u8,
}

impl AudioSpecificConfig {
    /// AAC-LC config for `sample_rate` and `channels`.
    pub fn aac_lc(sample_rate: u32, channels: u8) -> Self {
        Self {
            object_type: 2,
            sampling_frequency_index: sample_rate_index(sample_rate).unwrap_or(EXPLICIT_FREQUENCY),
            sample_rate,
            channel_configuration: channels,
        }
    }

    /// Parse from decoder-specific info bytes.
    pub fn parse(data: &[u8]) -> Result<Self> {
        BitstreamError::ensure(2, data.len())?;
        let mut reader = BitReader::new(data);

        let mut object_type = reader.read_bits(5)? as u8;
        if object_type == 31 {
            object_type = 32 + reader.read_bits(6)? as u8;
        }

        let sampling_frequency_index = reader.read_bits(4)? as u8;
        let sample_rate = if sampling_frequency_index == EXPLICIT_FREQUENCY {
            reader.read_bits(24)? as u32
        } else {
            *SAMPLE_RATES
                .get(sampling_frequency_index as usize)
                .ok_or_else(|| {
                    BitstreamError::invalid(format!(
                        "reserved sampling frequency index {}",
                        sampling_frequency_index
                    ))
                })?
        };

        let channel_configuration = reader.read_bits(4)? as u8;

        Ok(Self {
            object_type,
            sampling_frequency_index,
            sample_rate,
            channel_configuration,
        })
    }

    /// Serialize (2 bytes, or 5 with an explicit frequency).
    pub fn encode(&self) -> Vec<u8> {
        let object_type = self.object_type.min(30) as u32;
        let channels = (self.channel_configuration & 0x0F) as u32;

        let (bits, len): (u64, usize) = if self.sampling_frequency_index == EXPLICIT_FREQUENCY {
            // 5 + 4 + 24 + 4 bits, padded to 40
            let bits = (object_type as u64) << 35
                | (EXPLICIT_FREQUENCY as u64) << 31
                | ((self.sample_rate & 0xFF_FFFF) as u64) << 7
                | (channels as u64) << 3;
            (bits, 5)
        } else {
            let bits = (object_type << 11)
                | ((self.sampling_frequency_index as u32 & 0x0F) << 7)
                | (channels << 3);
            (bits as u64, 2)
        };

        let mut out = Vec::with_capacity(len);
        for i in (0..len).rev() {
            out.put_u8((bits >> (i * 8)) as u8);
        }
        out
    }
}
