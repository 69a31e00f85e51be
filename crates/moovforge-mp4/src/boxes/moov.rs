//! Movie header, track and media boxes.

use bytes::{BufMut, BytesMut};

use super::{skip_unknown, BoxReader, BoxType, FullBoxHeader, Mp4Box, Mvex, Stbl};
use crate::{Error, Result};

/// Unity transformation matrix shared by `mvhd` and `tkhd`.
const IDENTITY_MATRIX: [u32; 9] = [0x0001_0000, 0, 0, 0, 0x0001_0000, 0, 0, 0, 0x4000_0000];

fn put_matrix(buf: &mut BytesMut) {
    for value in IDENTITY_MATRIX {
        buf.put_u32(value);
    }
}

fn needs_v1(values: &[u64]) -> bool {
    values.iter().any(|v| *v > u32::MAX as u64)
}

fn put_versioned(buf: &mut BytesMut, version: u8, value: u64) {
    if version == 1 {
        buf.put_u64(value);
    } else {
        buf.put_u32(value as u32);
    }
}

/// Movie header box.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Mvhd {
    pub creation_time: u64,
    pub modification_time: u64,
    pub timescale: u32,
    pub duration: u64,
    pub next_track_id: u32,
}

impl Mvhd {
    pub fn new(timescale: u32, duration: u64, next_track_id: u32) -> Self {
        Self {
            creation_time: 0,
            modification_time: 0,
            timescale,
            duration,
            next_track_id,
        }
    }

    fn version(&self) -> u8 {
        u8::from(needs_v1(&[
            self.creation_time,
            self.modification_time,
            self.duration,
        ]))
    }
}

impl Mp4Box for Mvhd {
    const BOX_TYPE: BoxType = BoxType::MVHD;

    fn payload_size(&self) -> u64 {
        if self.version() == 1 {
            112
        } else {
            100
        }
    }

    fn encode_payload(&self, buf: &mut BytesMut) {
        let version = self.version();
        FullBoxHeader::new(version, 0).encode(buf);
        put_versioned(buf, version, self.creation_time);
        put_versioned(buf, version, self.modification_time);
        buf.put_u32(self.timescale);
        put_versioned(buf, version, self.duration);
        buf.put_u32(0x0001_0000); // rate 1.0
        buf.put_u16(0x0100); // volume 1.0
        buf.put_bytes(0, 10);
        put_matrix(buf);
        buf.put_bytes(0, 24);
        buf.put_u32(self.next_track_id);
    }

    fn decode_payload(reader: &mut BoxReader<'_>) -> Result<Self> {
        let header = FullBoxHeader::decode(reader)?;
        let creation_time = reader.versioned_u64(header.version)?;
        let modification_time = reader.versioned_u64(header.version)?;
        let timescale = reader.u32()?;
        let duration = reader.versioned_u64(header.version)?;
        reader.skip(4 + 2 + 10 + 36 + 24)?;
        let next_track_id = reader.u32()?;
        Ok(Self {
            creation_time,
            modification_time,
            timescale,
            duration,
            next_track_id,
        })
    }
}

/// Track enabled, in movie.
pub const TKHD_DEFAULT_FLAGS: u32 = 0x000003;

/// Track header box.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Tkhd {
    pub flags: u32,
    pub creation_time: u64,
    pub modification_time: u64,
    pub track_id: u32,
    /// In movie timescale units.
    pub duration: u64,
    pub alternate_group: u16,
    /// 8.8 fixed point; 0x0100 for audio, 0 for video.
    pub volume: u16,
    /// Integer part of the 16.16 presentation width.
    pub width: u32,
    pub height: u32,
}

impl Tkhd {
    pub fn new(track_id: u32, duration: u64) -> Self {
        Self {
            flags: TKHD_DEFAULT_FLAGS,
            creation_time: 0,
            modification_time: 0,
            track_id,
            duration,
            alternate_group: 0,
            volume: 0,
            width: 0,
            height: 0,
        }
    }

    fn version(&self) -> u8 {
        u8::from(needs_v1(&[
            self.creation_time,
            self.modification_time,
            self.duration,
        ]))
    }
}

impl Mp4Box for Tkhd {
    const BOX_TYPE: BoxType = BoxType::TKHD;

    fn payload_size(&self) -> u64 {
        if self.version() == 1 {
            96
        } else {
            84
        }
    }

    fn encode_payload(&self, buf: &mut BytesMut) {
        let version = self.version();
        FullBoxHeader::new(version, self.flags).encode(buf);
        put_versioned(buf, version, self.creation_time);
        put_versioned(buf, version, self.modification_time);
        buf.put_u32(self.track_id);
        buf.put_u32(0);
        put_versioned(buf, version, self.duration);
        buf.put_bytes(0, 8);
        buf.put_u16(0); // layer
        buf.put_u16(self.alternate_group);
        buf.put_u16(self.volume);
        buf.put_u16(0);
        put_matrix(buf);
        buf.put_u32(self.width << 16);
        buf.put_u32(self.height << 16);
    }

    fn decode_payload(reader: &mut BoxReader<'_>) -> Result<Self> {
        let header = FullBoxHeader::decode(reader)?;
        let creation_time = reader.versioned_u64(header.version)?;
        let modification_time = reader.versioned_u64(header.version)?;
        let track_id = reader.u32()?;
        reader.skip(4)?;
        let duration = reader.versioned_u64(header.version)?;
        reader.skip(8 + 2)?;
        let alternate_group = reader.u16()?;
        let volume = reader.u16()?;
        reader.skip(2 + 36)?;
        let width = reader.u32()? >> 16;
        let height = reader.u32()? >> 16;
        Ok(Self {
            flags: header.flags,
            creation_time,
            modification_time,
            track_id,
            duration,
            alternate_group,
            volume,
            width,
            height,
        })
    }
}

/// One edit list entry. `media_time == -1` marks an empty edit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ElstEntry {
    /// In movie timescale units.
    pub segment_duration: u64,
    /// In media timescale units.
    pub media_time: i64,
    pub media_rate: u16,
}

impl ElstEntry {
    /// An empty edit delaying presentation by `duration`.
    pub fn empty(duration: u64) -> Self {
        Self {
            segment_duration: duration,
            media_time: -1,
            media_rate: 1,
        }
    }

    pub fn is_empty_edit(&self) -> bool {
        self.media_time == -1
    }
}

/// Edit box, carrying its single `elst`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Edts {
    pub entries: Vec<ElstEntry>,
}

impl Edts {
    fn version(&self) -> u8 {
        u8::from(self.entries.iter().any(|e| {
            e.segment_duration > u32::MAX as u64
                || e.media_time > i32::MAX as i64
                || e.media_time < i32::MIN as i64
        }))
    }

    fn elst_payload_size(&self) -> u64 {
        let entry = if self.version() == 1 { 20 } else { 12 };
        FullBoxHeader::SIZE + 4 + entry * self.entries.len() as u64
    }

    /// Total duration of the leading empty edits, in movie timescale units.
    pub fn initial_delay(&self) -> u64 {
        self.entries
            .iter()
            .take_while(|e| e.is_empty_edit())
            .map(|e| e.segment_duration)
            .sum()
    }
}

impl Mp4Box for Edts {
    const BOX_TYPE: BoxType = BoxType::EDTS;

    fn payload_size(&self) -> u64 {
        super::HEADER_SIZE + self.elst_payload_size()
    }

    fn encode_payload(&self, buf: &mut BytesMut) {
        let version = self.version();
        buf.put_u32((super::HEADER_SIZE + self.elst_payload_size()) as u32);
        buf.put_slice(&BoxType::ELST.0);
        FullBoxHeader::new(version, 0).encode(buf);
        buf.put_u32(self.entries.len() as u32);
        for entry in &self.entries {
            if version == 1 {
                buf.put_u64(entry.segment_duration);
                buf.put_i64(entry.media_time);
            } else {
                buf.put_u32(entry.segment_duration as u32);
                buf.put_i32(entry.media_time as i32);
            }
            buf.put_u16(entry.media_rate);
            buf.put_u16(0);
        }
    }

    fn decode_payload(reader: &mut BoxReader<'_>) -> Result<Self> {
        let mut entries = Vec::new();
        for child in reader.children() {
            let (header, payload) = child?;
            if header.box_type != BoxType::ELST {
                skip_unknown(BoxType::EDTS, &header);
                continue;
            }

            let mut elst = BoxReader::new(payload);
            let full = FullBoxHeader::decode(&mut elst)?;
            let count = elst.u32()?;
            for _ in 0..count {
                let (segment_duration, media_time) = if full.version == 1 {
                    (elst.u64()?, elst.i64()?)
                } else {
                    (elst.u32()? as u64, elst.i32()? as i64)
                };
                let media_rate = elst.u16()?;
                elst.skip(2)?;
                entries.push(ElstEntry {
                    segment_duration,
                    media_time,
                    media_rate,
                });
            }
        }
        Ok(Self { entries })
    }
}

/// Packed ISO-639-2 code for "und".
pub const LANGUAGE_UNDETERMINED: u16 = 0x55C4;

/// Media header box.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Mdhd {
    pub creation_time: u64,
    pub modification_time: u64,
    pub timescale: u32,
    pub duration: u64,
    /// Packed 3x5-bit ISO-639-2 code.
    pub language: u16,
}

impl Mdhd {
    pub fn new(timescale: u32, duration: u64) -> Self {
        Self {
            creation_time: 0,
            modification_time: 0,
            timescale,
            duration,
            language: LANGUAGE_UNDETERMINED,
        }
    }

    fn version(&self) -> u8 {
        u8::from(needs_v1(&[
            self.creation_time,
            self.modification_time,
            self.duration,
        ]))
    }

    /// Language as a 3-letter code.
    pub fn language_code(&self) -> String {
        (0..3)
            .rev()
            .map(|i| (((self.language >> (i * 5)) & 0x1F) as u8 + 0x60) as char)
            .collect()
    }
}

impl Mp4Box for Mdhd {
    const BOX_TYPE: BoxType = BoxType::MDHD;

    fn payload_size(&self) -> u64 {
        if self.version() == 1 {
            36
        } else {
            24
        }
    }

    fn encode_payload(&self, buf: &mut BytesMut) {
        let version = self.version();
        FullBoxHeader::new(version, 0).encode(buf);
        put_versioned(buf, version, self.creation_time);
        put_versioned(buf, version, self.modification_time);
        buf.put_u32(self.timescale);
        put_versioned(buf, version, self.duration);
        buf.put_u16(self.language & 0x7FFF);
        buf.put_u16(0);
    }

    fn decode_payload(reader: &mut BoxReader<'_>) -> Result<Self> {
        let header = FullBoxHeader::decode(reader)?;
        let creation_time = reader.versioned_u64(header.version)?;
        let modification_time = reader.versioned_u64(header.version)?;
        let timescale = reader.u32()?;
        let duration = reader.versioned_u64(header.version)?;
        let language = reader.u16()? & 0x7FFF;
        Ok(Self {
            creation_time,
            modification_time,
            timescale,
            duration,
            language,
        })
    }
}

/// Handler type of a track's media.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HandlerType {
    Video,
    Audio,
    Other([u8; 4]),
}

impl HandlerType {
    fn fourcc(&self) -> [u8; 4] {
        match self {
            Self::Video => *b"vide",
            Self::Audio => *b"soun",
            Self::Other(code) => *code,
        }
    }

    fn from_fourcc(code: [u8; 4]) -> Self {
        match &code {
            b"vide" => Self::Video,
            b"soun" => Self::Audio,
            _ => Self::Other(code),
        }
    }

    /// Default handler name written by the muxer.
    pub fn default_name(&self) -> &'static str {
        match self {
            Self::Video => "VideoHandler",
            Self::Audio => "SoundHandler",
            Self::Other(_) => "",
        }
    }
}

/// Handler reference box.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Hdlr {
    pub handler_type: HandlerType,
    pub name: String,
}

impl Hdlr {
    pub fn new(handler_type: HandlerType) -> Self {
        Self {
            handler_type,
            name: handler_type.default_name().to_string(),
        }
    }
}

impl Mp4Box for Hdlr {
    const BOX_TYPE: BoxType = BoxType::HDLR;

    fn payload_size(&self) -> u64 {
        FullBoxHeader::SIZE + 20 + self.name.len() as u64 + 1
    }

    fn encode_payload(&self, buf: &mut BytesMut) {
        FullBoxHeader::default().encode(buf);
        buf.put_u32(0);
        buf.put_slice(&self.handler_type.fourcc());
        buf.put_bytes(0, 12);
        buf.put_slice(self.name.as_bytes());
        buf.put_u8(0);
    }

    fn decode_payload(reader: &mut BoxReader<'_>) -> Result<Self> {
        FullBoxHeader::decode(reader)?;
        reader.skip(4)?;
        let handler_type = HandlerType::from_fourcc(reader.fourcc()?.0);
        reader.skip(12)?;
        let raw = reader.rest();
        let end = raw.iter().position(|b| *b == 0).unwrap_or(raw.len());
        Ok(Self {
            handler_type,
            name: String::from_utf8_lossy(&raw[..end]).into_owned(),
        })
    }
}

/// Media-specific header inside `minf`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MediaHeader {
    /// `vmhd`
    Video,
    /// `smhd`
    Sound,
}

impl MediaHeader {
    fn box_size(&self) -> u64 {
        match self {
            Self::Video => 20,
            Self::Sound => 16,
        }
    }

    fn encode(&self, buf: &mut BytesMut) {
        buf.put_u32(self.box_size() as u32);
        match self {
            Self::Video => {
                buf.put_slice(&BoxType::VMHD.0);
                FullBoxHeader::new(0, 1).encode(buf);
                buf.put_bytes(0, 8); // graphicsmode, opcolor
            }
            Self::Sound => {
                buf.put_slice(&BoxType::SMHD.0);
                FullBoxHeader::default().encode(buf);
                buf.put_u32(0); // balance, reserved
            }
        }
    }
}

/// Data information box with a single self-contained `url ` entry.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Dinf;

impl Mp4Box for Dinf {
    const BOX_TYPE: BoxType = BoxType::DINF;

    fn payload_size(&self) -> u64 {
        28
    }

    fn encode_payload(&self, buf: &mut BytesMut) {
        buf.put_u32(28);
        buf.put_slice(&BoxType::DREF.0);
        FullBoxHeader::default().encode(buf);
        buf.put_u32(1);
        buf.put_u32(12);
        buf.put_slice(&BoxType::URL.0);
        FullBoxHeader::new(0, 1).encode(buf); // media is in this file
    }

    fn decode_payload(reader: &mut BoxReader<'_>) -> Result<Self> {
        reader.rest();
        Ok(Self)
    }
}

/// Media information box.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Minf {
    pub media_header: Option<MediaHeader>,
    pub dinf: Dinf,
    pub stbl: Stbl,
}

impl Mp4Box for Minf {
    const BOX_TYPE: BoxType = BoxType::MINF;

    fn payload_size(&self) -> u64 {
        self.media_header.map_or(0, |h| h.box_size()) + self.dinf.box_size() + self.stbl.box_size()
    }

    fn encode_payload(&self, buf: &mut BytesMut) {
        if let Some(header) = &self.media_header {
            header.encode(buf);
        }
        self.dinf.encode(buf);
        self.stbl.encode(buf);
    }

    fn decode_payload(reader: &mut BoxReader<'_>) -> Result<Self> {
        let mut media_header = None;
        let mut stbl = None;
        for child in reader.children() {
            let (header, payload) = child?;
            match header.box_type {
                BoxType::VMHD => media_header = Some(MediaHeader::Video),
                BoxType::SMHD => media_header = Some(MediaHeader::Sound),
                BoxType::DINF => {}
                BoxType::STBL => stbl = Some(Stbl::from_payload(payload)?),
                _ => skip_unknown(BoxType::MINF, &header),
            }
        }
        Ok(Self {
            media_header,
            dinf: Dinf,
            stbl: stbl.ok_or_else(|| Error::malformed("minf without stbl"))?,
        })
    }
}

/// Media box.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Mdia {
    pub mdhd: Mdhd,
    pub hdlr: Hdlr,
    pub minf: Minf,
}

impl Mp4Box for Mdia {
    const BOX_TYPE: BoxType = BoxType::MDIA;

    fn payload_size(&self) -> u64 {
        self.mdhd.box_size() + self.hdlr.box_size() + self.minf.box_size()
    }

    fn encode_payload(&self, buf: &mut BytesMut) {
        self.mdhd.encode(buf);
        self.hdlr.encode(buf);
        self.minf.encode(buf);
    }

    fn decode_payload(reader: &mut BoxReader<'_>) -> Result<Self> {
        let mut mdhd = None;
        let mut hdlr = None;
        let mut minf = None;
        for child in reader.children() {
            let (header, payload) = child?;
            match header.box_type {
                BoxType::MDHD => mdhd = Some(Mdhd::from_payload(payload)?),
                BoxType::HDLR => hdlr = Some(Hdlr::from_payload(payload)?),
                BoxType::MINF => minf = Some(Minf::from_payload(payload)?),
                _ => skip_unknown(BoxType::MDIA, &header),
            }
        }
        Ok(Self {
            mdhd: mdhd.ok_or_else(|| Error::malformed("mdia without mdhd"))?,
            hdlr: hdlr.ok_or_else(|| Error::malformed("mdia without hdlr"))?,
            minf: minf.ok_or_else(|| Error::malformed("mdia without minf"))?,
        })
    }
}

/// Track box.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Trak {
    pub tkhd: Tkhd,
    pub edts: Option<Edts>,
    pub mdia: Mdia,
}

impl Mp4Box for Trak {
    const BOX_TYPE: BoxType = BoxType::TRAK;

    fn payload_size(&self) -> u64 {
        self.tkhd.box_size() + self.edts.as_ref().map_or(0, Mp4Box::box_size) + self.mdia.box_size()
    }

    fn encode_payload(&self, buf: &mut BytesMut) {
        self.tkhd.encode(buf);
        if let Some(edts) = &self.edts {
            edts.encode(buf);
        }
        self.mdia.encode(buf);
    }

    fn decode_payload(reader: &mut BoxReader<'_>) -> Result<Self> {
        let mut tkhd = None;
        let mut edts = None;
        let mut mdia = None;
        for child in reader.children() {
            let (header, payload) = child?;
            match header.box_type {
                BoxType::TKHD => tkhd = Some(Tkhd::from_payload(payload)?),
                BoxType::EDTS => edts = Some(Edts::from_payload(payload)?),
                BoxType::MDIA => mdia = Some(Mdia::from_payload(payload)?),
                _ => skip_unknown(BoxType::TRAK, &header),
            }
        }
        Ok(Self {
            tkhd: tkhd.ok_or_else(|| Error::malformed("trak without tkhd"))?,
            edts,
            mdia: mdia.ok_or_else(|| Error::malformed("trak without mdia"))?,
        })
    }
}

/// Movie box.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Moov {
    pub mvhd: Mvhd,
    pub traks: Vec<Trak>,
    /// Present in fragmented files.
    pub mvex: Option<Mvex>,
}

impl Moov {
    pub fn is_fragmented(&self) -> bool {
        self.mvex.is_some()
    }
}

impl Mp4Box for Moov {
    const BOX_TYPE: BoxType = BoxType::MOOV;

    fn payload_size(&self) -> u64 {
        self.mvhd.box_size()
            + self.traks.iter().map(Mp4Box::box_size).sum::<u64>()
            + self.mvex.as_ref().map_or(0, Mp4Box::box_size)
    }

    fn encode_payload(&self, buf: &mut BytesMut) {
        self.mvhd.encode(buf);
        for trak in &self.traks {
            trak.encode(buf);
        }
        if let Some(mvex) = &self.mvex {
            mvex.encode(buf);
        }
    }

    fn decode_payload(reader: &mut BoxReader<'_>) -> Result<Self> {
        let mut mvhd = None;
        let mut traks = Vec::new();
        let mut mvex = None;
        for child in reader.children() {
            let (header, payload) = child?;
            match header.box_type {
                BoxType::MVHD => mvhd = Some(Mvhd::from_payload(payload)?),
                BoxType::TRAK => traks.push(Trak::from_payload(payload)?),
                BoxType::MVEX => mvex = Some(Mvex::from_payload(payload)?),
                _ => skip_unknown(BoxType::MOOV, &header),
            }
        }
        Ok(Self {
            mvhd: mvhd.ok_or_else(|| Error::malformed("moov without mvhd"))?,
            traks,
            mvex,
        })
    }
}
