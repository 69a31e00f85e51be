//! File-level boxes: `ftyp` and `free`.

use bytes::{BufMut, BytesMut};

use super::{BoxReader, BoxType, Mp4Box};
use crate::Result;

/// File type box.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Ftyp {
    pub major_brand: [u8; 4],
    pub minor_version: u32,
    pub compatible_brands: Vec<[u8; 4]>,
}

impl Ftyp {
    /// Brands for a progressive file.
    pub fn progressive() -> Self {
        Self {
            major_brand: *b"isom",
            minor_version: 0x200,
            compatible_brands: vec![*b"isom", *b"iso2", *b"avc1", *b"mp41"],
        }
    }

    /// Brands for a fragmented init segment.
    pub fn fragmented() -> Self {
        Self {
            major_brand: *b"iso5",
            minor_version: 0x200,
            compatible_brands: vec![*b"iso5", *b"iso6", *b"mp41"],
        }
    }

    pub fn major_brand_str(&self) -> String {
        String::from_utf8_lossy(&self.major_brand).into_owned()
    }
}

impl Mp4Box for Ftyp {
    const BOX_TYPE: BoxType = BoxType::FTYP;

    fn payload_size(&self) -> u64 {
        8 + 4 * self.compatible_brands.len() as u64
    }

    fn encode_payload(&self, buf: &mut BytesMut) {
        buf.put_slice(&self.major_brand);
        buf.put_u32(self.minor_version);
        for brand in &self.compatible_brands {
            buf.put_slice(brand);
        }
    }

    fn decode_payload(reader: &mut BoxReader<'_>) -> Result<Self> {
        let major_brand = reader.fourcc()?.0;
        let minor_version = reader.u32()?;
        let mut compatible_brands = Vec::with_capacity(reader.remaining() / 4);
        while reader.remaining() >= 4 {
            compatible_brands.push(reader.fourcc()?.0);
        }
        Ok(Self {
            major_brand,
            minor_version,
            compatible_brands,
        })
    }
}

/// Free space box with a zero-filled payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Free {
    pub payload_len: u64,
}

impl Mp4Box for Free {
    const BOX_TYPE: BoxType = BoxType::FREE;

    fn payload_size(&self) -> u64 {
        self.payload_len
    }

    fn encode_payload(&self, buf: &mut BytesMut) {
        buf.put_bytes(0, self.payload_len as usize);
    }

    fn decode_payload(reader: &mut BoxReader<'_>) -> Result<Self> {
        Ok(Self {
            payload_len: reader.rest().len() as u64,
        })
    }
}
