//! Track and sample model on the mux side.

use bytes::BytesMut;
use moovforge_common::{MediaKind, TrackId};

use crate::boxes::{
    Dinf, Edts, ElstEntry, Hdlr, Mdhd, Mdia, Minf, SampleEntry, Stbl, Stsd, Tkhd, Trak,
};
use crate::codec::{MediaParams, SampleEntryCodec};
use crate::{Error, Result};

/// One stored sample.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Sample {
    pub pts: u64,
    pub dts: u64,
    /// Byte offset of the sample in the file (mux side: in the output).
    pub offset: u64,
    pub size: u32,
    pub is_key_frame: bool,
}

/// Sample waiting for its successor to fix its duration.
#[derive(Debug, Clone)]
pub(crate) struct PendingSample {
    pub pts: u64,
    pub dts: u64,
    pub data: Vec<u8>,
    pub is_key_frame: bool,
}

/// Sample committed to the open fragment.
#[derive(Debug, Clone, Copy)]
pub(crate) struct FragmentSample {
    pub pts: u64,
    pub dts: u64,
    pub duration: u32,
    pub size: u32,
    pub is_key_frame: bool,
}

/// A track being muxed.
#[derive(Debug)]
pub(crate) struct Track {
    pub id: TrackId,
    pub codec: Box<dyn SampleEntryCodec>,
    pub timescale: u32,
    /// Progressive mode: every sample written so far.
    pub samples: Vec<Sample>,
    /// Fragmented mode: the most recent sample, duration still unknown.
    pub pending: Option<PendingSample>,
    /// Fragmented mode: samples of the open fragment and their bytes.
    pub fragment: Vec<FragmentSample>,
    pub fragment_data: BytesMut,
    last_dts: Option<u64>,
    last_delta: Option<u32>,
}

impl Track {
    pub fn new(id: TrackId, codec: Box<dyn SampleEntryCodec>, timescale: u32) -> Self {
        Self {
            id,
            codec,
            timescale,
            samples: Vec::new(),
            pending: None,
            fragment: Vec::new(),
            fragment_data: BytesMut::new(),
            last_dts: None,
            last_delta: None,
        }
    }

    pub fn kind(&self) -> MediaKind {
        self.codec.media_kind()
    }

    /// Reject a dts earlier than the previous one.
    pub fn check_dts(&self, dts: u64) -> Result<()> {
        match self.last_dts {
            Some(prev) if dts < prev => Err(Error::NonMonotonicDts {
                track: self.id,
                prev,
                dts,
            }),
            _ => Ok(()),
        }
    }

    /// Record `dts` as the newest decode time.
    pub fn advance(&mut self, dts: u64) {
        if let Some(prev) = self.last_dts {
            self.last_delta = Some(u32::try_from(dts - prev).unwrap_or(u32::MAX));
        }
        self.last_dts = Some(dts);
    }

    /// Duration of a sample with no known successor: the previous delta,
    /// or the codec default for a lone sample.
    pub fn final_duration(&self, payload_len: usize) -> u32 {
        self.last_delta.unwrap_or_else(|| {
            self.codec
                .default_sample_duration(self.timescale, payload_len)
        })
    }

    pub fn sample_entry(&self) -> Result<SampleEntry> {
        self.codec.sample_entry()
    }

    /// Assemble the `trak` box around a finished sample table.
    ///
    /// `delay` is the dts of the first sample; a non-zero delay becomes an
    /// empty edit so presentation starts where it did on input.
    pub fn trak(&self, stbl: Stbl, media_duration: u64, delay: u64) -> Trak {
        let mut tkhd = Tkhd::new(self.id.get(), delay + media_duration);
        match self.codec.params() {
            MediaParams::Video { width, height } => {
                tkhd.width = width;
                tkhd.height = height;
            }
            MediaParams::Audio { .. } => tkhd.volume = 0x0100,
        }

        let edts = (delay > 0).then(|| Edts {
            entries: vec![
                ElstEntry::empty(delay),
                ElstEntry {
                    segment_duration: media_duration,
                    media_time: 0,
                    media_rate: 1,
                },
            ],
        });

        Trak {
            tkhd,
            edts,
            mdia: Mdia {
                mdhd: Mdhd::new(self.timescale, media_duration),
                hdlr: Hdlr::new(self.codec.handler_type()),
                minf: Minf {
                    media_header: Some(self.codec.media_header()),
                    dinf: Dinf,
                    stbl,
                },
            },
        }
    }

    /// `trak` with empty sample tables, for init segments.
    pub fn init_trak(&self) -> Result<Trak> {
        let stbl = Stbl::empty(Stsd::single(self.sample_entry()?));
        Ok(self.trak(stbl, 0, 0))
    }
}
