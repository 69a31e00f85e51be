//! Sample table boxes and the `stbl` container.

use bytes::{BufMut, BytesMut};

use super::{skip_unknown, BoxReader, BoxType, FullBoxHeader, Mp4Box, Stsd};
use crate::{Error, Result};

/// One `stts` run: `sample_count` samples of `sample_delta` each.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SttsEntry {
    pub sample_count: u32,
    pub sample_delta: u32,
}

/// Decoding time-to-sample box.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Stts {
    pub entries: Vec<SttsEntry>,
}

impl Stts {
    /// Number of samples described.
    pub fn sample_count(&self) -> u64 {
        self.entries.iter().map(|e| e.sample_count as u64).sum()
    }

    /// Sum of all sample durations.
    pub fn total_duration(&self) -> u64 {
        self.entries
            .iter()
            .map(|e| e.sample_count as u64 * e.sample_delta as u64)
            .fold(0u64, u64::saturating_add)
    }
}

impl Mp4Box for Stts {
    const BOX_TYPE: BoxType = BoxType::STTS;

    fn payload_size(&self) -> u64 {
        FullBoxHeader::SIZE + 4 + 8 * self.entries.len() as u64
    }

    fn encode_payload(&self, buf: &mut BytesMut) {
        FullBoxHeader::default().encode(buf);
        buf.put_u32(self.entries.len() as u32);
        for entry in &self.entries {
            buf.put_u32(entry.sample_count);
            buf.put_u32(entry.sample_delta);
        }
    }

    fn decode_payload(reader: &mut BoxReader<'_>) -> Result<Self> {
        FullBoxHeader::decode(reader)?;
        let count = table_len(reader, 8)?;
        let mut entries = Vec::with_capacity(count);
        for _ in 0..count {
            entries.push(SttsEntry {
                sample_count: reader.u32()?,
                sample_delta: reader.u32()?,
            });
        }
        Ok(Self { entries })
    }
}

/// One `ctts` run of equal composition offsets.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CttsEntry {
    pub sample_count: u32,
    pub sample_offset: i64,
}

/// Composition time-to-sample box.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Ctts {
    pub entries: Vec<CttsEntry>,
}

impl Ctts {
    /// Version 1 (signed offsets) is needed when any offset is negative.
    pub fn version(&self) -> u8 {
        u8::from(self.entries.iter().any(|e| e.sample_offset < 0))
    }
}

impl Mp4Box for Ctts {
    const BOX_TYPE: BoxType = BoxType::CTTS;

    fn payload_size(&self) -> u64 {
        FullBoxHeader::SIZE + 4 + 8 * self.entries.len() as u64
    }

    fn encode_payload(&self, buf: &mut BytesMut) {
        let version = self.version();
        FullBoxHeader::new(version, 0).encode(buf);
        buf.put_u32(self.entries.len() as u32);
        for entry in &self.entries {
            buf.put_u32(entry.sample_count);
            if version == 1 {
                buf.put_i32(entry.sample_offset as i32);
            } else {
                buf.put_u32(entry.sample_offset as u32);
            }
        }
    }

    fn decode_payload(reader: &mut BoxReader<'_>) -> Result<Self> {
        let header = FullBoxHeader::decode(reader)?;
        let count = table_len(reader, 8)?;
        let mut entries = Vec::with_capacity(count);
        for _ in 0..count {
            let sample_count = reader.u32()?;
            let sample_offset = if header.version == 1 {
                reader.i32()? as i64
            } else {
                reader.u32()? as i64
            };
            entries.push(CttsEntry {
                sample_count,
                sample_offset,
            });
        }
        Ok(Self { entries })
    }
}

/// One `stsc` run: chunks from `first_chunk` on hold `samples_per_chunk`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StscEntry {
    /// 1-based.
    pub first_chunk: u32,
    pub samples_per_chunk: u32,
    pub sample_description_index: u32,
}

/// Sample-to-chunk box.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Stsc {
    pub entries: Vec<StscEntry>,
}

impl Mp4Box for Stsc {
    const BOX_TYPE: BoxType = BoxType::STSC;

    fn payload_size(&self) -> u64 {
        FullBoxHeader::SIZE + 4 + 12 * self.entries.len() as u64
    }

    fn encode_payload(&self, buf: &mut BytesMut) {
        FullBoxHeader::default().encode(buf);
        buf.put_u32(self.entries.len() as u32);
        for entry in &self.entries {
            buf.put_u32(entry.first_chunk);
            buf.put_u32(entry.samples_per_chunk);
            buf.put_u32(entry.sample_description_index);
        }
    }

    fn decode_payload(reader: &mut BoxReader<'_>) -> Result<Self> {
        FullBoxHeader::decode(reader)?;
        let count = table_len(reader, 12)?;
        let mut entries = Vec::with_capacity(count);
        for _ in 0..count {
            entries.push(StscEntry {
                first_chunk: reader.u32()?,
                samples_per_chunk: reader.u32()?,
                sample_description_index: reader.u32()?,
            });
        }
        Ok(Self { entries })
    }
}

/// Sample size box.
///
/// With `sample_size != 0` every sample has that size and `entry_sizes` is
/// empty.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Stsz {
    pub sample_size: u32,
    pub sample_count: u32,
    pub entry_sizes: Vec<u32>,
}

impl Stsz {
    /// Size of sample `index` (0-based).
    pub fn size_of(&self, index: usize) -> Option<u32> {
        if self.sample_size != 0 {
            (index < self.sample_count as usize).then_some(self.sample_size)
        } else {
            self.entry_sizes.get(index).copied()
        }
    }
}

impl Mp4Box for Stsz {
    const BOX_TYPE: BoxType = BoxType::STSZ;

    fn payload_size(&self) -> u64 {
        FullBoxHeader::SIZE + 8 + 4 * self.entry_sizes.len() as u64
    }

    fn encode_payload(&self, buf: &mut BytesMut) {
        FullBoxHeader::default().encode(buf);
        buf.put_u32(self.sample_size);
        buf.put_u32(self.sample_count);
        for size in &self.entry_sizes {
            buf.put_u32(*size);
        }
    }

    fn decode_payload(reader: &mut BoxReader<'_>) -> Result<Self> {
        FullBoxHeader::decode(reader)?;
        let sample_size = reader.u32()?;
        let sample_count = reader.u32()?;
        let entry_sizes = if sample_size == 0 {
            Error::ensure(sample_count as u64 * 4, reader.remaining() as u64)?;
            (0..sample_count)
                .map(|_| reader.u32())
                .collect::<Result<Vec<_>>>()?
        } else {
            Vec::new()
        };
        Ok(Self {
            sample_size,
            sample_count,
            entry_sizes,
        })
    }
}

/// 32-bit chunk offset box.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Stco {
    pub offsets: Vec<u32>,
}

impl Mp4Box for Stco {
    const BOX_TYPE: BoxType = BoxType::STCO;

    fn payload_size(&self) -> u64 {
        FullBoxHeader::SIZE + 4 + 4 * self.offsets.len() as u64
    }

    fn encode_payload(&self, buf: &mut BytesMut) {
        FullBoxHeader::default().encode(buf);
        buf.put_u32(self.offsets.len() as u32);
        for offset in &self.offsets {
            buf.put_u32(*offset);
        }
    }

    fn decode_payload(reader: &mut BoxReader<'_>) -> Result<Self> {
        FullBoxHeader::decode(reader)?;
        let count = table_len(reader, 4)?;
        let offsets = (0..count).map(|_| reader.u32()).collect::<Result<_>>()?;
        Ok(Self { offsets })
    }
}

/// 64-bit chunk offset box.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Co64 {
    pub offsets: Vec<u64>,
}

impl Mp4Box for Co64 {
    const BOX_TYPE: BoxType = BoxType::CO64;

    fn payload_size(&self) -> u64 {
        FullBoxHeader::SIZE + 4 + 8 * self.offsets.len() as u64
    }

    fn encode_payload(&self, buf: &mut BytesMut) {
        FullBoxHeader::default().encode(buf);
        buf.put_u32(self.offsets.len() as u32);
        for offset in &self.offsets {
            buf.put_u64(*offset);
        }
    }

    fn decode_payload(reader: &mut BoxReader<'_>) -> Result<Self> {
        FullBoxHeader::decode(reader)?;
        let count = table_len(reader, 8)?;
        let offsets = (0..count).map(|_| reader.u64()).collect::<Result<_>>()?;
        Ok(Self { offsets })
    }
}

/// Chunk offsets in whichever width the table needs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChunkOffsets {
    Stco(Stco),
    Co64(Co64),
}

impl Default for ChunkOffsets {
    fn default() -> Self {
        Self::Stco(Stco::default())
    }
}

impl ChunkOffsets {
    /// Pick `stco`, or `co64` for the whole table once any offset needs
    /// more than 32 bits.
    pub fn from_offsets(offsets: Vec<u64>) -> Self {
        if offsets.iter().any(|o| *o > u32::MAX as u64) {
            Self::Co64(Co64 { offsets })
        } else {
            Self::Stco(Stco {
                offsets: offsets.into_iter().map(|o| o as u32).collect(),
            })
        }
    }

    /// Offsets widened to 64 bits.
    pub fn offsets(&self) -> Vec<u64> {
        match self {
            Self::Stco(stco) => stco.offsets.iter().map(|o| *o as u64).collect(),
            Self::Co64(co64) => co64.offsets.clone(),
        }
    }

    pub fn len(&self) -> usize {
        match self {
            Self::Stco(stco) => stco.offsets.len(),
            Self::Co64(co64) => co64.offsets.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn is_co64(&self) -> bool {
        matches!(self, Self::Co64(_))
    }

    pub fn box_size(&self) -> u64 {
        match self {
            Self::Stco(stco) => stco.box_size(),
            Self::Co64(co64) => co64.box_size(),
        }
    }

    pub fn encode(&self, buf: &mut BytesMut) {
        match self {
            Self::Stco(stco) => stco.encode(buf),
            Self::Co64(co64) => co64.encode(buf),
        }
    }
}

/// Sync sample box (1-based sample numbers).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Stss {
    pub sample_numbers: Vec<u32>,
}

impl Mp4Box for Stss {
    const BOX_TYPE: BoxType = BoxType::STSS;

    fn payload_size(&self) -> u64 {
        FullBoxHeader::SIZE + 4 + 4 * self.sample_numbers.len() as u64
    }

    fn encode_payload(&self, buf: &mut BytesMut) {
        FullBoxHeader::default().encode(buf);
        buf.put_u32(self.sample_numbers.len() as u32);
        for number in &self.sample_numbers {
            buf.put_u32(*number);
        }
    }

    fn decode_payload(reader: &mut BoxReader<'_>) -> Result<Self> {
        FullBoxHeader::decode(reader)?;
        let count = table_len(reader, 4)?;
        let sample_numbers = (0..count).map(|_| reader.u32()).collect::<Result<_>>()?;
        Ok(Self { sample_numbers })
    }
}

/// Read an entry count and check the table fits in the payload.
fn table_len(reader: &mut BoxReader<'_>, entry_size: u64) -> Result<usize> {
    let count = reader.u32()? as u64;
    Error::ensure(count * entry_size, reader.remaining() as u64)?;
    Ok(count as usize)
}

/// Sample table container.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Stbl {
    pub stsd: Stsd,
    pub stts: Stts,
    pub ctts: Option<Ctts>,
    pub stss: Option<Stss>,
    pub stsc: Stsc,
    pub stsz: Stsz,
    pub chunk_offsets: ChunkOffsets,
}

impl Stbl {
    /// Table with a sample description and no samples, as used in init
    /// segments.
    pub fn empty(stsd: Stsd) -> Self {
        Self {
            stsd,
            stts: Stts::default(),
            ctts: None,
            stss: None,
            stsc: Stsc::default(),
            stsz: Stsz::default(),
            chunk_offsets: ChunkOffsets::default(),
        }
    }
}

impl Mp4Box for Stbl {
    const BOX_TYPE: BoxType = BoxType::STBL;

    fn payload_size(&self) -> u64 {
        self.stsd.box_size()
            + self.stts.box_size()
            + self.ctts.as_ref().map_or(0, Mp4Box::box_size)
            + self.stss.as_ref().map_or(0, Mp4Box::box_size)
            + self.stsc.box_size()
            + self.stsz.box_size()
            + self.chunk_offsets.box_size()
    }

    fn encode_payload(&self, buf: &mut BytesMut) {
        self.stsd.encode(buf);
        self.stts.encode(buf);
        if let Some(ctts) = &self.ctts {
            ctts.encode(buf);
        }
        if let Some(stss) = &self.stss {
            stss.encode(buf);
        }
        self.stsc.encode(buf);
        self.stsz.encode(buf);
        self.chunk_offsets.encode(buf);
    }

    fn decode_payload(reader: &mut BoxReader<'_>) -> Result<Self> {
        let mut stsd = None;
        let mut stts = None;
        let mut ctts = None;
        let mut stss = None;
        let mut stsc = None;
        let mut stsz = None;
        let mut chunk_offsets = None;

        for child in reader.children() {
            let (header, payload) = child?;
            match header.box_type {
                BoxType::STSD => stsd = Some(Stsd::from_payload(payload)?),
                BoxType::STTS => stts = Some(Stts::from_payload(payload)?),
                BoxType::CTTS => ctts = Some(Ctts::from_payload(payload)?),
                BoxType::STSS => stss = Some(Stss::from_payload(payload)?),
                BoxType::STSC => stsc = Some(Stsc::from_payload(payload)?),
                BoxType::STSZ => stsz = Some(Stsz::from_payload(payload)?),
                BoxType::STCO => {
                    chunk_offsets = Some(ChunkOffsets::Stco(Stco::from_payload(payload)?))
                }
                BoxType::CO64 => {
                    chunk_offsets = Some(ChunkOffsets::Co64(Co64::from_payload(payload)?))
                }
                _ => skip_unknown(BoxType::STBL, &header),
            }
        }

        Ok(Self {
            stsd: stsd.ok_or_else(|| Error::malformed("stbl without stsd"))?,
            stts: stts.ok_or_else(|| Error::malformed("stbl without stts"))?,
            ctts,
            stss,
            stsc: stsc.ok_or_else(|| Error::malformed("stbl without stsc"))?,
            stsz: stsz.ok_or_else(|| Error::malformed("stbl without stsz"))?,
            chunk_offsets: chunk_offsets
                .ok_or_else(|| Error::malformed("stbl without stco or co64"))?,
        })
    }
}
