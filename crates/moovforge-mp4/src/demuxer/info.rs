//! File and track descriptions reported by the demuxer.

use moovforge_common::{CodecId, MediaKind, TrackId};

#[cfg(feature = "serialize")]
use serde::Serialize;

use crate::codec::MediaParams;

/// Container-level metadata.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serialize", derive(Serialize))]
pub struct Mp4Info {
    pub major_brand: String,
    pub minor_version: u32,
    pub compatible_brands: Vec<String>,
    /// The `moov` carries an `mvex`: samples live in movie fragments.
    pub fragmented: bool,
    /// Movie header timescale.
    pub timescale: u32,
    /// Movie header duration, in `timescale` units.
    pub duration: u64,
    pub tracks: Vec<TrackInfo>,
}

impl Mp4Info {
    pub fn track(&self, track_id: TrackId) -> Option<&TrackInfo> {
        self.tracks.iter().find(|t| t.track_id == track_id)
    }
}

/// One demuxable track.
///
/// Sample counts and end times cover every fragment indexed so far.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serialize", derive(Serialize))]
pub struct TrackInfo {
    pub track_id: TrackId,
    pub codec_id: CodecId,
    pub kind: MediaKind,
    /// Media timescale; every timestamp of the track is in these units.
    pub timescale: u32,
    /// Span from the first sample's dts to `end_dts`.
    pub duration: u64,
    /// Decode time just past the last sample.
    pub end_dts: u64,
    pub sample_count: u64,
    pub params: MediaParams,
    /// Decoder configuration record, empty when the codec has none.
    #[cfg_attr(feature = "serialize", serde(skip))]
    pub extradata: Vec<u8>,
}

/// A sync sample's timestamps.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serialize", derive(Serialize))]
pub struct SyncSample {
    pub dts: u64,
    pub pts: u64,
}
