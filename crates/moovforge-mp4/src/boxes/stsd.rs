//! Sample description box and the sample entries the engine knows.

use bytes::{BufMut, BytesMut};

use super::{skip_unknown, BoxHeader, BoxReader, BoxType, FullBoxHeader, Mp4Box};
use crate::{Error, Result};

/// Fixed fields of a visual sample entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VisualSampleEntry {
    pub data_reference_index: u16,
    pub width: u16,
    pub height: u16,
}

impl VisualSampleEntry {
    const SIZE: u64 = 78;

    pub fn new(width: u16, height: u16) -> Self {
        Self {
            data_reference_index: 1,
            width,
            height,
        }
    }

    fn encode(&self, buf: &mut BytesMut) {
        buf.put_bytes(0, 6);
        buf.put_u16(self.data_reference_index);
        buf.put_bytes(0, 16); // pre_defined, reserved
        buf.put_u16(self.width);
        buf.put_u16(self.height);
        buf.put_u32(0x0048_0000); // 72 dpi
        buf.put_u32(0x0048_0000);
        buf.put_u32(0);
        buf.put_u16(1); // frame_count
        buf.put_bytes(0, 32); // compressorname
        buf.put_u16(0x0018);
        buf.put_i16(-1);
    }

    fn decode(reader: &mut BoxReader<'_>) -> Result<Self> {
        reader.skip(6)?;
        let data_reference_index = reader.u16()?;
        reader.skip(16)?;
        let width = reader.u16()?;
        let height = reader.u16()?;
        reader.skip(50)?;
        Ok(Self {
            data_reference_index,
            width,
            height,
        })
    }
}

/// Fixed fields of an audio sample entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AudioSampleEntry {
    pub data_reference_index: u16,
    pub channel_count: u16,
    pub sample_size: u16,
    /// Integer part of the 16.16 sample rate; saturates above 65535 Hz.
    pub sample_rate: u32,
}

impl AudioSampleEntry {
    const SIZE: u64 = 28;

    pub fn new(channel_count: u16, sample_size: u16, sample_rate: u32) -> Self {
        Self {
            data_reference_index: 1,
            channel_count,
            sample_size,
            sample_rate,
        }
    }

    fn encode(&self, buf: &mut BytesMut) {
        buf.put_bytes(0, 6);
        buf.put_u16(self.data_reference_index);
        buf.put_bytes(0, 8);
        buf.put_u16(self.channel_count);
        buf.put_u16(self.sample_size);
        buf.put_u32(0); // pre_defined, reserved
        buf.put_u32(self.sample_rate.min(0xFFFF) << 16);
    }

    fn decode(reader: &mut BoxReader<'_>) -> Result<Self> {
        reader.skip(6)?;
        let data_reference_index = reader.u16()?;
        reader.skip(8)?;
        let channel_count = reader.u16()?;
        let sample_size = reader.u16()?;
        reader.skip(4)?;
        let sample_rate = reader.u32()? >> 16;
        Ok(Self {
            data_reference_index,
            channel_count,
            sample_size,
            sample_rate,
        })
    }
}

/// MPEG-4 object type indication for AAC.
pub const OBJECT_TYPE_AAC: u8 = 0x40;
/// MPEG-1 audio (MP3).
pub const OBJECT_TYPE_MP3: u8 = 0x6B;
/// MPEG-2 audio part 3, also used for MP3.
pub const OBJECT_TYPE_MPEG2_AUDIO: u8 = 0x69;

const ES_DESCRIPTOR_TAG: u8 = 0x03;
const DECODER_CONFIG_TAG: u8 = 0x04;
const DECODER_SPECIFIC_INFO_TAG: u8 = 0x05;
const SL_CONFIG_TAG: u8 = 0x06;

/// Elementary stream descriptor box, reduced to what a decoder needs.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Esds {
    pub object_type_indication: u8,
    pub buffer_size: u32,
    pub max_bitrate: u32,
    pub avg_bitrate: u32,
    /// `DecoderSpecificInfo` bytes (the `AudioSpecificConfig` for AAC).
    pub decoder_specific_info: Vec<u8>,
}

impl Esds {
    pub fn new(object_type_indication: u8, decoder_specific_info: Vec<u8>) -> Self {
        Self {
            object_type_indication,
            decoder_specific_info,
            ..Self::default()
        }
    }

    fn decoder_config_len(&self) -> u64 {
        let dsi = if self.decoder_specific_info.is_empty() {
            0
        } else {
            descriptor_size(self.decoder_specific_info.len() as u64)
        };
        13 + dsi
    }

    fn es_descriptor_len(&self) -> u64 {
        3 + descriptor_size(self.decoder_config_len()) + descriptor_size(1)
    }
}

/// Encoded size of a descriptor with a `len`-byte body.
fn descriptor_size(len: u64) -> u64 {
    1 + length_field_size(len) + len
}

fn length_field_size(len: u64) -> u64 {
    let mut size = 1;
    let mut rest = len >> 7;
    while rest > 0 {
        size += 1;
        rest >>= 7;
    }
    size
}

fn put_descriptor_header(buf: &mut BytesMut, tag: u8, len: u64) {
    buf.put_u8(tag);
    let bytes = length_field_size(len);
    for i in (0..bytes).rev() {
        let more = if i > 0 { 0x80 } else { 0 };
        buf.put_u8(more | ((len >> (7 * i)) & 0x7F) as u8);
    }
}

fn read_descriptor_header(reader: &mut BoxReader<'_>) -> Result<(u8, usize)> {
    let tag = reader.u8()?;
    let mut len = 0usize;
    for _ in 0..4 {
        let byte = reader.u8()?;
        len = (len << 7) | (byte & 0x7F) as usize;
        if byte & 0x80 == 0 {
            break;
        }
    }
    Ok((tag, len))
}

impl Mp4Box for Esds {
    const BOX_TYPE: BoxType = BoxType::ESDS;

    fn payload_size(&self) -> u64 {
        FullBoxHeader::SIZE + descriptor_size(self.es_descriptor_len())
    }

    fn encode_payload(&self, buf: &mut BytesMut) {
        FullBoxHeader::default().encode(buf);

        put_descriptor_header(buf, ES_DESCRIPTOR_TAG, self.es_descriptor_len());
        buf.put_u16(0); // ES_ID
        buf.put_u8(0); // no dependency, URL or OCR

        put_descriptor_header(buf, DECODER_CONFIG_TAG, self.decoder_config_len());
        buf.put_u8(self.object_type_indication);
        buf.put_u8((0x05 << 2) | 0x01); // audio stream
        buf.put_uint(self.buffer_size as u64 & 0xFF_FFFF, 3);
        buf.put_u32(self.max_bitrate);
        buf.put_u32(self.avg_bitrate);
        if !self.decoder_specific_info.is_empty() {
            put_descriptor_header(
                buf,
                DECODER_SPECIFIC_INFO_TAG,
                self.decoder_specific_info.len() as u64,
            );
            buf.put_slice(&self.decoder_specific_info);
        }

        put_descriptor_header(buf, SL_CONFIG_TAG, 1);
        buf.put_u8(0x02);
    }

    fn decode_payload(reader: &mut BoxReader<'_>) -> Result<Self> {
        FullBoxHeader::decode(reader)?;
        let mut esds = Self::default();

        let (tag, len) = read_descriptor_header(reader)?;
        if tag != ES_DESCRIPTOR_TAG {
            return Err(Error::malformed(format!("esds starts with tag {:#x}", tag)));
        }
        let mut es = BoxReader::new(reader.bytes(len.min(reader.remaining()))?);
        es.skip(2)?;
        let flags = es.u8()?;
        if flags & 0x80 != 0 {
            es.skip(2)?;
        }
        if flags & 0x40 != 0 {
            let url_len = es.u8()? as usize;
            es.skip(url_len)?;
        }
        if flags & 0x20 != 0 {
            es.skip(2)?;
        }

        while !es.is_empty() {
            let (tag, len) = read_descriptor_header(&mut es)?;
            let body = es.bytes(len.min(es.remaining()))?;
            if tag != DECODER_CONFIG_TAG {
                continue;
            }

            let mut config = BoxReader::new(body);
            esds.object_type_indication = config.u8()?;
            config.u8()?; // stream type
            esds.buffer_size = config.u24()?;
            esds.max_bitrate = config.u32()?;
            esds.avg_bitrate = config.u32()?;
            while !config.is_empty() {
                let (tag, len) = read_descriptor_header(&mut config)?;
                let body = config.bytes(len.min(config.remaining()))?;
                if tag == DECODER_SPECIFIC_INFO_TAG {
                    esds.decoder_specific_info = body.to_vec();
                }
            }
        }

        Ok(esds)
    }
}

/// One entry of the sample description table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SampleEntry {
    /// H.264 with its `avcC` payload.
    Avc1 {
        visual: VisualSampleEntry,
        avcc: Vec<u8>,
    },
    /// H.265 (`hvc1` or `hev1`) with its `hvcC` payload.
    Hevc {
        box_type: BoxType,
        visual: VisualSampleEntry,
        hvcc: Vec<u8>,
    },
    /// MPEG-4 audio (AAC or MP3, told apart by the esds object type).
    Mp4a {
        audio: AudioSampleEntry,
        esds: Esds,
    },
    /// G.711 A-law.
    Alaw { audio: AudioSampleEntry },
    /// G.711 mu-law.
    Ulaw { audio: AudioSampleEntry },
    /// MP3 in a `.mp3` entry.
    Mp3 { audio: AudioSampleEntry },
    /// Anything else, kept as opaque payload.
    Unknown { box_type: BoxType, payload: Vec<u8> },
}

impl SampleEntry {
    pub fn box_type(&self) -> BoxType {
        match self {
            Self::Avc1 { .. } => BoxType::AVC1,
            Self::Hevc { box_type, .. } => *box_type,
            Self::Mp4a { .. } => BoxType::MP4A,
            Self::Alaw { .. } => BoxType::ALAW,
            Self::Ulaw { .. } => BoxType::ULAW,
            Self::Mp3 { .. } => BoxType::MP3,
            Self::Unknown { box_type, .. } => *box_type,
        }
    }

    fn payload_size(&self) -> u64 {
        match self {
            Self::Avc1 { avcc, .. } => VisualSampleEntry::SIZE + raw_box_size(BoxType::AVCC, avcc),
            Self::Hevc { hvcc, .. } => VisualSampleEntry::SIZE + raw_box_size(BoxType::HVCC, hvcc),
            Self::Mp4a { esds, .. } => AudioSampleEntry::SIZE + esds.box_size(),
            Self::Alaw { .. } | Self::Ulaw { .. } | Self::Mp3 { .. } => AudioSampleEntry::SIZE,
            Self::Unknown { payload, .. } => payload.len() as u64,
        }
    }

    pub fn box_size(&self) -> u64 {
        BoxHeader::for_payload(self.box_type(), self.payload_size())
            .size
            .unwrap_or(0)
    }

    pub fn encode(&self, buf: &mut BytesMut) {
        BoxHeader::for_payload(self.box_type(), self.payload_size()).encode(buf);
        match self {
            Self::Avc1 { visual, avcc } => {
                visual.encode(buf);
                put_raw_box(buf, BoxType::AVCC, avcc);
            }
            Self::Hevc { visual, hvcc, .. } => {
                visual.encode(buf);
                put_raw_box(buf, BoxType::HVCC, hvcc);
            }
            Self::Mp4a { audio, esds } => {
                audio.encode(buf);
                esds.encode(buf);
            }
            Self::Alaw { audio } | Self::Ulaw { audio } | Self::Mp3 { audio } => audio.encode(buf),
            Self::Unknown { payload, .. } => buf.put_slice(payload),
        }
    }

    /// Decode an entry from its header type and payload.
    pub fn decode(box_type: BoxType, payload: &[u8]) -> Result<Self> {
        let mut reader = BoxReader::new(payload);
        match box_type {
            BoxType::AVC1 => {
                let visual = VisualSampleEntry::decode(&mut reader)?;
                let avcc = find_child(&mut reader, box_type, BoxType::AVCC)?
                    .ok_or_else(|| Error::malformed("avc1 entry without avcC"))?;
                Ok(Self::Avc1 { visual, avcc })
            }
            BoxType::HVC1 | BoxType::HEV1 => {
                let visual = VisualSampleEntry::decode(&mut reader)?;
                let hvcc = find_child(&mut reader, box_type, BoxType::HVCC)?
                    .ok_or_else(|| Error::malformed("hvc1 entry without hvcC"))?;
                Ok(Self::Hevc {
                    box_type,
                    visual,
                    hvcc,
                })
            }
            BoxType::MP4A => {
                let audio = AudioSampleEntry::decode(&mut reader)?;
                let esds = match find_child(&mut reader, box_type, BoxType::ESDS)? {
                    Some(payload) => Esds::from_payload(&payload)?,
                    None => return Err(Error::malformed("mp4a entry without esds")),
                };
                Ok(Self::Mp4a { audio, esds })
            }
            BoxType::ALAW => Ok(Self::Alaw {
                audio: AudioSampleEntry::decode(&mut reader)?,
            }),
            BoxType::ULAW => Ok(Self::Ulaw {
                audio: AudioSampleEntry::decode(&mut reader)?,
            }),
            BoxType::MP3 => Ok(Self::Mp3 {
                audio: AudioSampleEntry::decode(&mut reader)?,
            }),
            _ => Ok(Self::Unknown {
                box_type,
                payload: payload.to_vec(),
            }),
        }
    }
}

fn raw_box_size(box_type: BoxType, payload: &[u8]) -> u64 {
    BoxHeader::for_payload(box_type, payload.len() as u64)
        .size
        .unwrap_or(0)
}

fn put_raw_box(buf: &mut BytesMut, box_type: BoxType, payload: &[u8]) {
    BoxHeader::for_payload(box_type, payload.len() as u64).encode(buf);
    buf.put_slice(payload);
}

/// Payload of the first `wanted` child in the rest of an entry.
fn find_child(
    reader: &mut BoxReader<'_>,
    parent: BoxType,
    wanted: BoxType,
) -> Result<Option<Vec<u8>>> {
    let mut found = None;
    for child in reader.children() {
        let (header, payload) = child?;
        if header.box_type == wanted && found.is_none() {
            found = Some(payload.to_vec());
        } else {
            skip_unknown(parent, &header);
        }
    }
    Ok(found)
}

/// Sample description box.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Stsd {
    pub entries: Vec<SampleEntry>,
}

impl Stsd {
    pub fn single(entry: SampleEntry) -> Self {
        Self {
            entries: vec![entry],
        }
    }
}

impl Mp4Box for Stsd {
    const BOX_TYPE: BoxType = BoxType::STSD;

    fn payload_size(&self) -> u64 {
        FullBoxHeader::SIZE + 4 + self.entries.iter().map(SampleEntry::box_size).sum::<u64>()
    }

    fn encode_payload(&self, buf: &mut BytesMut) {
        FullBoxHeader::default().encode(buf);
        buf.put_u32(self.entries.len() as u32);
        for entry in &self.entries {
            entry.encode(buf);
        }
    }

    fn decode_payload(reader: &mut BoxReader<'_>) -> Result<Self> {
        FullBoxHeader::decode(reader)?;
        let count = reader.u32()? as usize;
        let mut entries = Vec::with_capacity(count.min(16));
        for child in reader.children().take(count) {
            let (header, payload) = child?;
            entries.push(SampleEntry::decode(header.box_type, payload)?);
        }
        Ok(Self { entries })
    }
}
