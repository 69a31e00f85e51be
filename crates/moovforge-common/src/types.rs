//! Codec and media kind enums.
//!
//! All enums serialize in lowercase so they read naturally in configuration
//! files and JSON output.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Kind of elementary stream carried by a track.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MediaKind {
    /// Video track (`vide` handler).
    Video,
    /// Audio track (`soun` handler).
    Audio,
}

impl fmt::Display for MediaKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Video => write!(f, "video"),
            Self::Audio => write!(f, "audio"),
        }
    }
}

/// Codecs a protocol front-end can hand over.
///
/// Not every codec here can be stored in MP4; the muxer rejects the ones it
/// has no sample entry for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CodecId {
    /// H.264 / AVC, Annex-B on ingest.
    H264,
    /// H.265 / HEVC, Annex-B on ingest.
    H265,
    /// AAC, raw or ADTS framed.
    Aac,
    /// G.711 A-law.
    G711A,
    /// G.711 mu-law.
    G711U,
    /// MPEG-1/2 Layer III.
    Mp3,
    /// Opus, as carried over RTP.
    Opus,
    /// VP8, as carried over RTP.
    Vp8,
}

impl CodecId {
    /// Media kind of this codec.
    pub fn media_kind(self) -> MediaKind {
        match self {
            Self::H264 | Self::H265 | Self::Vp8 => MediaKind::Video,
            Self::Aac | Self::G711A | Self::G711U | Self::Mp3 | Self::Opus => MediaKind::Audio,
        }
    }

    /// Whether this is a video codec.
    pub fn is_video(self) -> bool {
        self.media_kind() == MediaKind::Video
    }

    /// Whether this is an audio codec.
    pub fn is_audio(self) -> bool {
        self.media_kind() == MediaKind::Audio
    }

    /// Whether payloads are NAL unit streams (Annex-B on the wire, AVCC in MP4).
    pub fn is_nalu_codec(self) -> bool {
        matches!(self, Self::H264 | Self::H265)
    }
}

impl fmt::Display for CodecId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::H264 => "h264",
            Self::H265 => "h265",
            Self::Aac => "aac",
            Self::G711A => "g711a",
            Self::G711U => "g711u",
            Self::Mp3 => "mp3",
            Self::Opus => "opus",
            Self::Vp8 => "vp8",
        };
        f.write_str(name)
    }
}
