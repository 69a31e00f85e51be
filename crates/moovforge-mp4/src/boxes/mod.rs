//! ISO-BMFF box codec.
//!
//! Every box is a header followed by a payload. [`Mp4Box`] implementations
//! report their payload size bottom-up, so a container's header can be
//! written before its children without back-patching.

mod file;
mod fragment;
mod moov;
mod stbl;
mod stsd;

pub use file::{Free, Ftyp};
pub use fragment::{
    Mehd, Mfhd, Moof, Mvex, Tfdt, Tfhd, Traf, Trex, Trun, TrunEntry, MAX_FRAGMENT_SAMPLES,
    SAMPLE_FLAGS_NON_SYNC, SAMPLE_FLAGS_SYNC, SAMPLE_IS_NON_SYNC,
};
pub use moov::{
    Dinf, Edts, ElstEntry, HandlerType, Hdlr, Mdhd, Mdia, MediaHeader, Minf, Moov, Mvhd, Tkhd,
    Trak,
};
pub use stbl::{
    ChunkOffsets, Co64, Ctts, CttsEntry, Stbl, Stco, Stsc, StscEntry, Stss, Stsz, Stts, SttsEntry,
};
pub use stsd::{
    AudioSampleEntry, Esds, SampleEntry, Stsd, VisualSampleEntry, OBJECT_TYPE_AAC,
    OBJECT_TYPE_MP3, OBJECT_TYPE_MPEG2_AUDIO,
};

use bytes::{BufMut, BytesMut};
use tracing::trace;

use crate::{Error, Result};

/// Four-character box type code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct BoxType(pub [u8; 4]);

impl BoxType {
    pub const FTYP: Self = Self(*b"ftyp");
    pub const FREE: Self = Self(*b"free");
    pub const SKIP: Self = Self(*b"skip");
    pub const MDAT: Self = Self(*b"mdat");
    pub const MOOV: Self = Self(*b"moov");
    pub const MVHD: Self = Self(*b"mvhd");
    pub const TRAK: Self = Self(*b"trak");
    pub const TKHD: Self = Self(*b"tkhd");
    pub const EDTS: Self = Self(*b"edts");
    pub const ELST: Self = Self(*b"elst");
    pub const MDIA: Self = Self(*b"mdia");
    pub const MDHD: Self = Self(*b"mdhd");
    pub const HDLR: Self = Self(*b"hdlr");
    pub const MINF: Self = Self(*b"minf");
    pub const VMHD: Self = Self(*b"vmhd");
    pub const SMHD: Self = Self(*b"smhd");
    pub const DINF: Self = Self(*b"dinf");
    pub const DREF: Self = Self(*b"dref");
    pub const URL: Self = Self(*b"url ");
    pub const STBL: Self = Self(*b"stbl");
    pub const STSD: Self = Self(*b"stsd");
    pub const STTS: Self = Self(*b"stts");
    pub const CTTS: Self = Self(*b"ctts");
    pub const STSC: Self = Self(*b"stsc");
    pub const STSZ: Self = Self(*b"stsz");
    pub const STCO: Self = Self(*b"stco");
    pub const CO64: Self = Self(*b"co64");
    pub const STSS: Self = Self(*b"stss");
    pub const AVC1: Self = Self(*b"avc1");
    pub const AVCC: Self = Self(*b"avcC");
    pub const HVC1: Self = Self(*b"hvc1");
    pub const HEV1: Self = Self(*b"hev1");
    pub const HVCC: Self = Self(*b"hvcC");
    pub const MP4A: Self = Self(*b"mp4a");
    pub const ESDS: Self = Self(*b"esds");
    pub const ALAW: Self = Self(*b"alaw");
    pub const ULAW: Self = Self(*b"ulaw");
    pub const MP3: Self = Self(*b".mp3");
    pub const MVEX: Self = Self(*b"mvex");
    pub const MEHD: Self = Self(*b"mehd");
    pub const TREX: Self = Self(*b"trex");
    pub const MOOF: Self = Self(*b"moof");
    pub const MFHD: Self = Self(*b"mfhd");
    pub const TRAF: Self = Self(*b"traf");
    pub const TFHD: Self = Self(*b"tfhd");
    pub const TFDT: Self = Self(*b"tfdt");
    pub const TRUN: Self = Self(*b"trun");
    pub const UUID: Self = Self(*b"uuid");

    /// The 4-char code as a string.
    pub fn as_str(&self) -> &str {
        std::str::from_utf8(&self.0).unwrap_or("????")
    }
}

impl std::fmt::Display for BoxType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Size of a plain box header.
pub const HEADER_SIZE: u64 = 8;

/// Size of a box header with a 64-bit `largesize`.
pub const LARGE_HEADER_SIZE: u64 = 16;

/// Decoded box header.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BoxHeader {
    pub box_type: BoxType,
    /// Total box size including the header. `None` when the box extends to
    /// the end of its container (`size == 0`).
    pub size: Option<u64>,
    /// Header length: 8, 16 with `largesize`, plus 16 for a `uuid` usertype.
    pub header_size: u64,
    pub usertype: Option<[u8; 16]>,
}

impl BoxHeader {
    /// Header for a box with `payload_size` bytes of payload.
    ///
    /// The 64-bit form is chosen only when the 32-bit size field overflows.
    pub fn for_payload(box_type: BoxType, payload_size: u64) -> Self {
        let usertype_len = if box_type == BoxType::UUID { 16 } else { 0 };
        let small = HEADER_SIZE + usertype_len + payload_size;
        let header_size = if small > u32::MAX as u64 {
            LARGE_HEADER_SIZE + usertype_len
        } else {
            HEADER_SIZE + usertype_len
        };
        Self {
            box_type,
            size: Some(header_size + payload_size),
            header_size,
            usertype: (usertype_len > 0).then_some([0; 16]),
        }
    }

    /// Payload length, if the size is known.
    pub fn payload_size(&self) -> Option<u64> {
        self.size.map(|s| s - self.header_size)
    }

    /// Write the header.
    pub fn encode(&self, buf: &mut BytesMut) {
        let size = self.size.unwrap_or(0);
        let large = self.header_size - self.usertype.map_or(0, |_| 16) == LARGE_HEADER_SIZE;
        if large {
            buf.put_u32(1);
            buf.put_slice(&self.box_type.0);
            buf.put_u64(size);
        } else {
            buf.put_u32(size as u32);
            buf.put_slice(&self.box_type.0);
        }
        if let Some(usertype) = self.usertype {
            buf.put_slice(&usertype);
        }
    }

    /// Decode a header from the start of `data`.
    pub fn decode(data: &[u8]) -> Result<Self> {
        let mut reader = BoxReader::new(data);
        let size = reader.u32()? as u64;
        let box_type = reader.fourcc()?;

        let (size, mut header_size) = match size {
            1 => {
                let large = reader.u64()?;
                (Some(large), LARGE_HEADER_SIZE)
            }
            0 => (None, HEADER_SIZE),
            s => (Some(s), HEADER_SIZE),
        };

        let usertype = if box_type == BoxType::UUID {
            let mut usertype = [0u8; 16];
            usertype.copy_from_slice(reader.bytes(16)?);
            header_size += 16;
            Some(usertype)
        } else {
            None
        };

        if let Some(size) = size {
            if size < header_size {
                return Err(Error::malformed(format!(
                    "box {} size {} smaller than its header",
                    box_type, size
                )));
            }
        }

        Ok(Self {
            box_type,
            size,
            header_size,
            usertype,
        })
    }
}

/// `version` and `flags` of a full box.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct FullBoxHeader {
    pub version: u8,
    pub flags: u32,
}

impl FullBoxHeader {
    pub const SIZE: u64 = 4;

    pub fn new(version: u8, flags: u32) -> Self {
        Self { version, flags }
    }

    pub fn encode(&self, buf: &mut BytesMut) {
        buf.put_u32(((self.version as u32) << 24) | (self.flags & 0x00FF_FFFF));
    }

    pub fn decode(reader: &mut BoxReader<'_>) -> Result<Self> {
        let word = reader.u32()?;
        Ok(Self {
            version: (word >> 24) as u8,
            flags: word & 0x00FF_FFFF,
        })
    }

    pub fn has_flag(&self, flag: u32) -> bool {
        self.flags & flag != 0
    }
}

/// Bounds-checked big-endian reader over a box payload.
#[derive(Debug, Clone)]
pub struct BoxReader<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> BoxReader<'a> {
    pub fn new(data: &'a [u8]) -> Self {
        Self { data, pos: 0 }
    }

    pub fn remaining(&self) -> usize {
        self.data.len() - self.pos
    }

    pub fn is_empty(&self) -> bool {
        self.remaining() == 0
    }

    pub fn position(&self) -> usize {
        self.pos
    }

    /// Take the next `n` bytes.
    pub fn bytes(&mut self, n: usize) -> Result<&'a [u8]> {
        Error::ensure((self.pos + n) as u64, self.data.len() as u64)?;
        let out = &self.data[self.pos..self.pos + n];
        self.pos += n;
        Ok(out)
    }

    /// Everything not consumed yet.
    pub fn rest(&mut self) -> &'a [u8] {
        let out = &self.data[self.pos..];
        self.pos = self.data.len();
        out
    }

    pub fn skip(&mut self, n: usize) -> Result<()> {
        self.bytes(n).map(|_| ())
    }

    fn array<const N: usize>(&mut self) -> Result<[u8; N]> {
        let mut out = [0u8; N];
        out.copy_from_slice(self.bytes(N)?);
        Ok(out)
    }

    pub fn u8(&mut self) -> Result<u8> {
        Ok(self.array::<1>()?[0])
    }

    pub fn u16(&mut self) -> Result<u16> {
        Ok(u16::from_be_bytes(self.array()?))
    }

    pub fn u24(&mut self) -> Result<u32> {
        let [a, b, c] = self.array()?;
        Ok(u32::from_be_bytes([0, a, b, c]))
    }

    pub fn u32(&mut self) -> Result<u32> {
        Ok(u32::from_be_bytes(self.array()?))
    }

    pub fn i32(&mut self) -> Result<i32> {
        Ok(i32::from_be_bytes(self.array()?))
    }

    pub fn u64(&mut self) -> Result<u64> {
        Ok(u64::from_be_bytes(self.array()?))
    }

    pub fn i64(&mut self) -> Result<i64> {
        Ok(i64::from_be_bytes(self.array()?))
    }

    pub fn fourcc(&mut self) -> Result<BoxType> {
        Ok(BoxType(self.array()?))
    }

    /// A 32-bit field for version 0, 64-bit for version 1.
    pub fn versioned_u64(&mut self, version: u8) -> Result<u64> {
        if version == 1 {
            self.u64()
        } else {
            self.u32().map(u64::from)
        }
    }

    /// Iterate over child boxes in the unread remainder.
    pub fn children(&mut self) -> BoxIter<'a> {
        BoxIter::new(self.rest())
    }
}

/// Iterator over the boxes packed in a byte slice.
///
/// Yields each header with its payload. A `size == 0` box swallows the rest
/// of the slice.
pub struct BoxIter<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> BoxIter<'a> {
    pub fn new(data: &'a [u8]) -> Self {
        Self { data, pos: 0 }
    }
}

impl<'a> Iterator for BoxIter<'a> {
    type Item = Result<(BoxHeader, &'a [u8])>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.pos >= self.data.len() {
            return None;
        }

        let rest = &self.data[self.pos..];
        let header = match BoxHeader::decode(rest) {
            Ok(header) => header,
            Err(e) => {
                self.pos = self.data.len();
                return Some(Err(e));
            }
        };

        let size = header.size.unwrap_or(rest.len() as u64);
        if size > rest.len() as u64 {
            self.pos = self.data.len();
            return Some(Err(Error::UnexpectedEof {
                need: size,
                have: rest.len() as u64,
            }));
        }

        let payload = &rest[header.header_size as usize..size as usize];
        self.pos += size as usize;
        Some(Ok((header, payload)))
    }
}

/// Note an unknown child box while walking a container.
pub(crate) fn skip_unknown(parent: BoxType, header: &BoxHeader) {
    trace!(
        parent = %parent,
        box_type = %header.box_type,
        size = ?header.size,
        "skipping unknown box"
    );
}

/// A box that can be encoded and decoded on its own.
pub trait Mp4Box: Sized {
    /// Type code written in the header.
    const BOX_TYPE: BoxType;

    /// Payload length in bytes, header excluded.
    fn payload_size(&self) -> u64;

    /// Write the payload (everything after the box header).
    fn encode_payload(&self, buf: &mut BytesMut);

    /// Decode from a payload slice holding exactly this box's body.
    fn decode_payload(reader: &mut BoxReader<'_>) -> Result<Self>;

    /// Total encoded size including the header.
    fn box_size(&self) -> u64 {
        BoxHeader::for_payload(Self::BOX_TYPE, self.payload_size())
            .size
            .unwrap_or(0)
    }

    /// Write header and payload.
    fn encode(&self, buf: &mut BytesMut) {
        BoxHeader::for_payload(Self::BOX_TYPE, self.payload_size()).encode(buf);
        self.encode_payload(buf);
    }

    /// Encode into a fresh buffer.
    fn to_bytes(&self) -> BytesMut {
        let mut buf = BytesMut::with_capacity(self.box_size() as usize);
        self.encode(&mut buf);
        buf
    }

    /// Decode from a payload slice.
    fn from_payload(payload: &[u8]) -> Result<Self> {
        Self::decode_payload(&mut BoxReader::new(payload))
    }

    /// Decode a whole box from the start of `data`, returning it with the
    /// number of bytes consumed.
    fn decode(data: &[u8]) -> Result<(Self, usize)> {
        let mut boxes = BoxIter::new(data);
        let (header, payload) = boxes
            .next()
            .unwrap_or(Err(Error::UnexpectedEof { need: HEADER_SIZE, have: 0 }))?;
        if header.box_type != Self::BOX_TYPE {
            return Err(Error::malformed(format!(
                "expected {} box, found {}",
                Self::BOX_TYPE,
                header.box_type
            )));
        }
        let consumed = header.header_size as usize + payload.len();
        Ok((Self::from_payload(payload)?, consumed))
    }
}
