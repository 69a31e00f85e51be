//! The frame tuple exchanged with protocol front-ends.

use crate::{CodecId, TrackId};
use bytes::Bytes;

/// One access unit as produced by a demuxer or fed to a muxer.
///
/// Timestamps are in the owning track's timescale (milliseconds unless the
/// session was configured otherwise).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Packet {
    /// Track the packet belongs to.
    pub track_id: TrackId,
    /// Codec of the track.
    pub codec_id: CodecId,
    /// Payload: Annex-B for H.264/H.265, raw frame for audio.
    pub data: Bytes,
    /// Presentation timestamp.
    pub pts: u64,
    /// Decode timestamp.
    pub dts: u64,
    /// Whether the sample is a sync sample.
    pub is_key_frame: bool,
}

impl Packet {
    /// Payload length in bytes.
    pub fn len(&self) -> usize {
        self.data.len()
    }

    /// Whether the payload is empty.
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}
