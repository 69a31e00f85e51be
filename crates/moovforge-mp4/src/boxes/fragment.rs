//! Movie extends and movie fragment boxes.

use bytes::{BufMut, BytesMut};

use super::{skip_unknown, BoxReader, BoxType, FullBoxHeader, Mp4Box};
use crate::{Error, Result};

/// Sample flags for a sync sample (depends on no other sample).
pub const SAMPLE_FLAGS_SYNC: u32 = 0x0200_0000;

/// Sample flags for a non-sync sample (depends on others, is difference).
pub const SAMPLE_FLAGS_NON_SYNC: u32 = 0x0101_0000;

/// `sample_is_non_sync_sample` bit of the sample flags.
pub const SAMPLE_IS_NON_SYNC: u32 = 0x0001_0000;

/// Movie extends header box.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Mehd {
    pub fragment_duration: u64,
}

impl Mp4Box for Mehd {
    const BOX_TYPE: BoxType = BoxType::MEHD;

    fn payload_size(&self) -> u64 {
        if self.fragment_duration > u32::MAX as u64 {
            12
        } else {
            8
        }
    }

    fn encode_payload(&self, buf: &mut BytesMut) {
        if self.fragment_duration > u32::MAX as u64 {
            FullBoxHeader::new(1, 0).encode(buf);
            buf.put_u64(self.fragment_duration);
        } else {
            FullBoxHeader::default().encode(buf);
            buf.put_u32(self.fragment_duration as u32);
        }
    }

    fn decode_payload(reader: &mut BoxReader<'_>) -> Result<Self> {
        let header = FullBoxHeader::decode(reader)?;
        Ok(Self {
            fragment_duration: reader.versioned_u64(header.version)?,
        })
    }
}

/// Track extends box: per-track defaults for fragments.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Trex {
    pub track_id: u32,
    pub default_sample_description_index: u32,
    pub default_sample_duration: u32,
    pub default_sample_size: u32,
    pub default_sample_flags: u32,
}

impl Trex {
    pub fn new(track_id: u32) -> Self {
        Self {
            track_id,
            default_sample_description_index: 1,
            default_sample_duration: 0,
            default_sample_size: 0,
            default_sample_flags: 0,
        }
    }
}

impl Mp4Box for Trex {
    const BOX_TYPE: BoxType = BoxType::TREX;

    fn payload_size(&self) -> u64 {
        FullBoxHeader::SIZE + 20
    }

    fn encode_payload(&self, buf: &mut BytesMut) {
        FullBoxHeader::default().encode(buf);
        buf.put_u32(self.track_id);
        buf.put_u32(self.default_sample_description_index);
        buf.put_u32(self.default_sample_duration);
        buf.put_u32(self.default_sample_size);
        buf.put_u32(self.default_sample_flags);
    }

    fn decode_payload(reader: &mut BoxReader<'_>) -> Result<Self> {
        FullBoxHeader::decode(reader)?;
        Ok(Self {
            track_id: reader.u32()?,
            default_sample_description_index: reader.u32()?,
            default_sample_duration: reader.u32()?,
            default_sample_size: reader.u32()?,
            default_sample_flags: reader.u32()?,
        })
    }
}

/// Movie extends box; its presence marks a fragmented file.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Mvex {
    pub mehd: Option<Mehd>,
    pub trexs: Vec<Trex>,
}

impl Mvex {
    pub fn trex(&self, track_id: u32) -> Option<&Trex> {
        self.trexs.iter().find(|t| t.track_id == track_id)
    }
}

impl Mp4Box for Mvex {
    const BOX_TYPE: BoxType = BoxType::MVEX;

    fn payload_size(&self) -> u64 {
        self.mehd.as_ref().map_or(0, Mp4Box::box_size)
            + self.trexs.iter().map(Mp4Box::box_size).sum::<u64>()
    }

    fn encode_payload(&self, buf: &mut BytesMut) {
        if let Some(mehd) = &self.mehd {
            mehd.encode(buf);
        }
        for trex in &self.trexs {
            trex.encode(buf);
        }
    }

    fn decode_payload(reader: &mut BoxReader<'_>) -> Result<Self> {
        let mut mvex = Self::default();
        for child in reader.children() {
            let (header, payload) = child?;
            match header.box_type {
                BoxType::MEHD => mvex.mehd = Some(Mehd::from_payload(payload)?),
                BoxType::TREX => mvex.trexs.push(Trex::from_payload(payload)?),
                _ => skip_unknown(BoxType::MVEX, &header),
            }
        }
        Ok(mvex)
    }
}

/// Movie fragment header box.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Mfhd {
    pub sequence_number: u32,
}

impl Mp4Box for Mfhd {
    const BOX_TYPE: BoxType = BoxType::MFHD;

    fn payload_size(&self) -> u64 {
        FullBoxHeader::SIZE + 4
    }

    fn encode_payload(&self, buf: &mut BytesMut) {
        FullBoxHeader::default().encode(buf);
        buf.put_u32(self.sequence_number);
    }

    fn decode_payload(reader: &mut BoxReader<'_>) -> Result<Self> {
        FullBoxHeader::decode(reader)?;
        Ok(Self {
            sequence_number: reader.u32()?,
        })
    }
}

pub const TFHD_BASE_DATA_OFFSET: u32 = 0x000001;
pub const TFHD_SAMPLE_DESCRIPTION_INDEX: u32 = 0x000002;
pub const TFHD_DEFAULT_SAMPLE_DURATION: u32 = 0x000008;
pub const TFHD_DEFAULT_SAMPLE_SIZE: u32 = 0x000010;
pub const TFHD_DEFAULT_SAMPLE_FLAGS: u32 = 0x000020;
pub const TFHD_DURATION_IS_EMPTY: u32 = 0x010000;
pub const TFHD_DEFAULT_BASE_IS_MOOF: u32 = 0x020000;

/// Track fragment header box. Optional fields are present iff `Some`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Tfhd {
    pub track_id: u32,
    pub base_data_offset: Option<u64>,
    pub sample_description_index: Option<u32>,
    pub default_sample_duration: Option<u32>,
    pub default_sample_size: Option<u32>,
    pub default_sample_flags: Option<u32>,
    pub duration_is_empty: bool,
    pub default_base_is_moof: bool,
}

impl Tfhd {
    /// Header as written by the muxer: data offsets relative to the moof.
    pub fn relative_to_moof(track_id: u32) -> Self {
        Self {
            track_id,
            default_base_is_moof: true,
            ..Self::default()
        }
    }

    pub fn flags(&self) -> u32 {
        let mut flags = 0;
        if self.base_data_offset.is_some() {
            flags |= TFHD_BASE_DATA_OFFSET;
        }
        if self.sample_description_index.is_some() {
            flags |= TFHD_SAMPLE_DESCRIPTION_INDEX;
        }
        if self.default_sample_duration.is_some() {
            flags |= TFHD_DEFAULT_SAMPLE_DURATION;
        }
        if self.default_sample_size.is_some() {
            flags |= TFHD_DEFAULT_SAMPLE_SIZE;
        }
        if self.default_sample_flags.is_some() {
            flags |= TFHD_DEFAULT_SAMPLE_FLAGS;
        }
        if self.duration_is_empty {
            flags |= TFHD_DURATION_IS_EMPTY;
        }
        if self.default_base_is_moof {
            flags |= TFHD_DEFAULT_BASE_IS_MOOF;
        }
        flags
    }
}

impl Mp4Box for Tfhd {
    const BOX_TYPE: BoxType = BoxType::TFHD;

    fn payload_size(&self) -> u64 {
        FullBoxHeader::SIZE
            + 4
            + self.base_data_offset.map_or(0, |_| 8)
            + [
                self.sample_description_index,
                self.default_sample_duration,
                self.default_sample_size,
                self.default_sample_flags,
            ]
            .iter()
            .filter(|v| v.is_some())
            .count() as u64
                * 4
    }

    fn encode_payload(&self, buf: &mut BytesMut) {
        FullBoxHeader::new(0, self.flags()).encode(buf);
        buf.put_u32(self.track_id);
        if let Some(offset) = self.base_data_offset {
            buf.put_u64(offset);
        }
        for value in [
            self.sample_description_index,
            self.default_sample_duration,
            self.default_sample_size,
            self.default_sample_flags,
        ]
        .into_iter()
        .flatten()
        {
            buf.put_u32(value);
        }
    }

    fn decode_payload(reader: &mut BoxReader<'_>) -> Result<Self> {
        let header = FullBoxHeader::decode(reader)?;
        let track_id = reader.u32()?;
        let base_data_offset = if header.has_flag(TFHD_BASE_DATA_OFFSET) {
            Some(reader.u64()?)
        } else {
            None
        };
        let mut optional = |flag: u32| -> Result<Option<u32>> {
            if header.has_flag(flag) {
                reader.u32().map(Some)
            } else {
                Ok(None)
            }
        };

        Ok(Self {
            track_id,
            base_data_offset,
            sample_description_index: optional(TFHD_SAMPLE_DESCRIPTION_INDEX)?,
            default_sample_duration: optional(TFHD_DEFAULT_SAMPLE_DURATION)?,
            default_sample_size: optional(TFHD_DEFAULT_SAMPLE_SIZE)?,
            default_sample_flags: optional(TFHD_DEFAULT_SAMPLE_FLAGS)?,
            duration_is_empty: header.has_flag(TFHD_DURATION_IS_EMPTY),
            default_base_is_moof: header.has_flag(TFHD_DEFAULT_BASE_IS_MOOF),
        })
    }
}

/// Track fragment decode time box.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Tfdt {
    pub base_media_decode_time: u64,
}

impl Mp4Box for Tfdt {
    const BOX_TYPE: BoxType = BoxType::TFDT;

    fn payload_size(&self) -> u64 {
        FullBoxHeader::SIZE + 8
    }

    fn encode_payload(&self, buf: &mut BytesMut) {
        FullBoxHeader::new(1, 0).encode(buf);
        buf.put_u64(self.base_media_decode_time);
    }

    fn decode_payload(reader: &mut BoxReader<'_>) -> Result<Self> {
        let header = FullBoxHeader::decode(reader)?;
        Ok(Self {
            base_media_decode_time: reader.versioned_u64(header.version)?,
        })
    }
}

/// Most samples a single `moof` may describe.
pub const MAX_FRAGMENT_SAMPLES: u64 = 1 << 20;

pub const TRUN_DATA_OFFSET: u32 = 0x000001;
pub const TRUN_FIRST_SAMPLE_FLAGS: u32 = 0x000004;
pub const TRUN_SAMPLE_DURATION: u32 = 0x000100;
pub const TRUN_SAMPLE_SIZE: u32 = 0x000200;
pub const TRUN_SAMPLE_FLAGS: u32 = 0x000400;
pub const TRUN_SAMPLE_COMPOSITION_TIME_OFFSET: u32 = 0x000800;

/// Per-sample fields of a track run. Absent fields fall back to the
/// `tfhd` and `trex` defaults.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TrunEntry {
    pub duration: Option<u32>,
    pub size: Option<u32>,
    pub flags: Option<u32>,
    pub composition_offset: Option<i64>,
}

/// Track run box.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Trun {
    /// Offset of the first sample from the base data offset.
    pub data_offset: Option<i32>,
    pub first_sample_flags: Option<u32>,
    pub entries: Vec<TrunEntry>,
}

impl Trun {
    pub fn flags(&self) -> u32 {
        let mut flags = 0;
        if self.data_offset.is_some() {
            flags |= TRUN_DATA_OFFSET;
        }
        if self.first_sample_flags.is_some() {
            flags |= TRUN_FIRST_SAMPLE_FLAGS;
        }
        if self.entries.iter().any(|e| e.duration.is_some()) {
            flags |= TRUN_SAMPLE_DURATION;
        }
        if self.entries.iter().any(|e| e.size.is_some()) {
            flags |= TRUN_SAMPLE_SIZE;
        }
        if self.entries.iter().any(|e| e.flags.is_some()) {
            flags |= TRUN_SAMPLE_FLAGS;
        }
        if self.entries.iter().any(|e| e.composition_offset.is_some()) {
            flags |= TRUN_SAMPLE_COMPOSITION_TIME_OFFSET;
        }
        flags
    }

    /// Version 1 stores signed composition offsets.
    pub fn version(&self) -> u8 {
        u8::from(
            self.entries
                .iter()
                .any(|e| e.composition_offset.is_some_and(|o| o < 0)),
        )
    }

    fn entry_size(flags: u32) -> u64 {
        [
            TRUN_SAMPLE_DURATION,
            TRUN_SAMPLE_SIZE,
            TRUN_SAMPLE_FLAGS,
            TRUN_SAMPLE_COMPOSITION_TIME_OFFSET,
        ]
        .iter()
        .filter(|f| flags & **f != 0)
        .count() as u64
            * 4
    }

    /// Total bytes of sample data the run references, using `default_size`
    /// for samples without an explicit size.
    pub fn data_size(&self, default_size: u32) -> u64 {
        self.entries
            .iter()
            .map(|e| e.size.unwrap_or(default_size) as u64)
            .sum()
    }
}

impl Mp4Box for Trun {
    const BOX_TYPE: BoxType = BoxType::TRUN;

    fn payload_size(&self) -> u64 {
        let flags = self.flags();
        FullBoxHeader::SIZE
            + 4
            + self.data_offset.map_or(0, |_| 4)
            + self.first_sample_flags.map_or(0, |_| 4)
            + Self::entry_size(flags) * self.entries.len() as u64
    }

    fn encode_payload(&self, buf: &mut BytesMut) {
        let flags = self.flags();
        let version = self.version();
        FullBoxHeader::new(version, flags).encode(buf);
        buf.put_u32(self.entries.len() as u32);
        if let Some(offset) = self.data_offset {
            buf.put_i32(offset);
        }
        if let Some(first) = self.first_sample_flags {
            buf.put_u32(first);
        }
        for entry in &self.entries {
            if flags & TRUN_SAMPLE_DURATION != 0 {
                buf.put_u32(entry.duration.unwrap_or(0));
            }
            if flags & TRUN_SAMPLE_SIZE != 0 {
                buf.put_u32(entry.size.unwrap_or(0));
            }
            if flags & TRUN_SAMPLE_FLAGS != 0 {
                buf.put_u32(entry.flags.unwrap_or(0));
            }
            if flags & TRUN_SAMPLE_COMPOSITION_TIME_OFFSET != 0 {
                let offset = entry.composition_offset.unwrap_or(0);
                if version == 1 {
                    buf.put_i32(offset as i32);
                } else {
                    buf.put_u32(offset as u32);
                }
            }
        }
    }

    fn decode_payload(reader: &mut BoxReader<'_>) -> Result<Self> {
        let header = FullBoxHeader::decode(reader)?;
        let flags = header.flags;
        let count = reader.u32()? as u64;

        let data_offset = if flags & TRUN_DATA_OFFSET != 0 {
            Some(reader.i32()?)
        } else {
            None
        };
        let first_sample_flags = if flags & TRUN_FIRST_SAMPLE_FLAGS != 0 {
            Some(reader.u32()?)
        } else {
            None
        };

        // Samples without per-sample fields take no bytes to declare
        if count > MAX_FRAGMENT_SAMPLES {
            return Err(Error::malformed(format!(
                "trun declares {} samples, limit is {}",
                count, MAX_FRAGMENT_SAMPLES
            )));
        }
        Error::ensure(count * Self::entry_size(flags), reader.remaining() as u64)?;
        let mut entries = Vec::new();
        for _ in 0..count {
            let mut entry = TrunEntry::default();
            if flags & TRUN_SAMPLE_DURATION != 0 {
                entry.duration = Some(reader.u32()?);
            }
            if flags & TRUN_SAMPLE_SIZE != 0 {
                entry.size = Some(reader.u32()?);
            }
            if flags & TRUN_SAMPLE_FLAGS != 0 {
                entry.flags = Some(reader.u32()?);
            }
            if flags & TRUN_SAMPLE_COMPOSITION_TIME_OFFSET != 0 {
                entry.composition_offset = Some(if header.version == 0 {
                    reader.u32()? as i64
                } else {
                    reader.i32()? as i64
                });
            }
            entries.push(entry);
        }

        Ok(Self {
            data_offset,
            first_sample_flags,
            entries,
        })
    }
}

/// Track fragment box.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Traf {
    pub tfhd: Tfhd,
    pub tfdt: Option<Tfdt>,
    pub truns: Vec<Trun>,
}

impl Mp4Box for Traf {
    const BOX_TYPE: BoxType = BoxType::TRAF;

    fn payload_size(&self) -> u64 {
        self.tfhd.box_size()
            + self.tfdt.as_ref().map_or(0, Mp4Box::box_size)
            + self.truns.iter().map(Mp4Box::box_size).sum::<u64>()
    }

    fn encode_payload(&self, buf: &mut BytesMut) {
        self.tfhd.encode(buf);
        if let Some(tfdt) = &self.tfdt {
            tfdt.encode(buf);
        }
        for trun in &self.truns {
            trun.encode(buf);
        }
    }

    fn decode_payload(reader: &mut BoxReader<'_>) -> Result<Self> {
        let mut tfhd = None;
        let mut tfdt = None;
        let mut truns = Vec::new();
        let mut sample_count = 0;
        for child in reader.children() {
            let (header, payload) = child?;
            match header.box_type {
                BoxType::TFHD => tfhd = Some(Tfhd::from_payload(payload)?),
                BoxType::TFDT => tfdt = Some(Tfdt::from_payload(payload)?),
                BoxType::TRUN => {
                    let trun = Trun::from_payload(payload)?;
                    sample_count = check_sample_limit(sample_count, &trun)?;
                    truns.push(trun);
                }
                _ => skip_unknown(BoxType::TRAF, &header),
            }
        }
        Ok(Self {
            tfhd: tfhd.ok_or_else(|| Error::malformed("traf without tfhd"))?,
            tfdt,
            truns,
        })
    }
}

/// Add a run to the running sample count of a fragment.
fn check_sample_limit(count: u64, trun: &Trun) -> Result<u64> {
    let total = count + trun.entries.len() as u64;
    if total > MAX_FRAGMENT_SAMPLES {
        return Err(Error::malformed(format!(
            "fragment declares {} samples, limit is {}",
            total, MAX_FRAGMENT_SAMPLES
        )));
    }
    Ok(total)
}

/// Movie fragment box.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Moof {
    pub mfhd: Mfhd,
    pub trafs: Vec<Traf>,
}

impl Mp4Box for Moof {
    const BOX_TYPE: BoxType = BoxType::MOOF;

    fn payload_size(&self) -> u64 {
        self.mfhd.box_size() + self.trafs.iter().map(Mp4Box::box_size).sum::<u64>()
    }

    fn encode_payload(&self, buf: &mut BytesMut) {
        self.mfhd.encode(buf);
        for traf in &self.trafs {
            traf.encode(buf);
        }
    }

    fn decode_payload(reader: &mut BoxReader<'_>) -> Result<Self> {
        let mut mfhd = None;
        let mut trafs = Vec::new();
        let mut sample_count = 0;
        for child in reader.children() {
            let (header, payload) = child?;
            match header.box_type {
                BoxType::MFHD => mfhd = Some(Mfhd::from_payload(payload)?),
                BoxType::TRAF => {
                    let traf = Traf::from_payload(payload)?;
                    for trun in &traf.truns {
                        sample_count = check_sample_limit(sample_count, trun)?;
                    }
                    trafs.push(traf);
                }
                _ => skip_unknown(BoxType::MOOF, &header),
            }
        }
        Ok(Self {
            mfhd: mfhd.ok_or_else(|| Error::malformed("moof without mfhd"))?,
            trafs,
        })
    }
}
