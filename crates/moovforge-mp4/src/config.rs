//! Engine configuration.
//!
//! All durations are in track timescale units.

#[cfg(feature = "serialize")]
use serde::{Deserialize, Serialize};

/// Default track timescale (milliseconds).
pub const DEFAULT_TIMESCALE: u32 = 1000;

/// Default fragment duration: 2 seconds at the default timescale.
pub const DEFAULT_FRAGMENT_DURATION: u64 = 2000;

/// Output layout.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serialize", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serialize", serde(rename_all = "lowercase"))]
pub enum MuxMode {
    /// `ftyp` + `mdat` + `moov`, finalized by `write_trailer`.
    #[default]
    Progressive,
    /// `moof` + `mdat` pairs with an `ftyp` + `moov` init segment.
    Fragmented,
}

/// Fragmenting options.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serialize", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serialize", serde(default))]
pub struct FragmentConfig {
    /// A fragment is closed once a sample's dts is this far past the
    /// fragment's first dts.
    pub duration: u64,
    /// Only close fragments in front of a video key frame.
    pub align_to_keyframe: bool,
    /// Write the init segment at the head of every sink.
    pub embed_init_segment: bool,
}

impl Default for FragmentConfig {
    fn default() -> Self {
        Self {
            duration: DEFAULT_FRAGMENT_DURATION,
            align_to_keyframe: false,
            embed_init_segment: true,
        }
    }
}

/// Muxer configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serialize", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serialize", serde(default))]
pub struct MuxerConfig {
    pub mode: MuxMode,
    /// Timescale of every track and of the movie header.
    pub timescale: u32,
    pub fragment: FragmentConfig,
    /// Duration of a lone video sample; `timescale / 25` when unset.
    pub video_default_sample_duration: Option<u32>,
}

impl Default for MuxerConfig {
    fn default() -> Self {
        Self {
            mode: MuxMode::Progressive,
            timescale: DEFAULT_TIMESCALE,
            fragment: FragmentConfig::default(),
            video_default_sample_duration: None,
        }
    }
}

impl MuxerConfig {
    /// Progressive output with defaults.
    pub fn progressive() -> Self {
        Self::default()
    }

    /// Fragmented output closing fragments every `duration` units.
    pub fn fragmented(duration: u64) -> Self {
        Self {
            mode: MuxMode::Fragmented,
            fragment: FragmentConfig {
                duration,
                ..FragmentConfig::default()
            },
            ..Self::default()
        }
    }

    /// Duration given to a lone video sample.
    pub fn video_sample_duration(&self) -> u32 {
        self.video_default_sample_duration
            .unwrap_or(self.timescale / 25)
            .max(1)
    }
}

/// Demuxer configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serialize", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serialize", serde(default))]
pub struct DemuxerConfig {
    /// Re-wrap AAC frames in ADTS headers.
    pub emit_adts: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = MuxerConfig::default();
        assert_eq!(config.mode, MuxMode::Progressive);
        assert_eq!(config.timescale, 1000);
        assert_eq!(config.video_sample_duration(), 40);
        assert!(config.fragment.embed_init_segment);
        assert!(!DemuxerConfig::default().emit_adts);
    }

    #[test]
    fn test_fragmented_constructor() {
        let config = MuxerConfig::fragmented(500);
        assert_eq!(config.mode, MuxMode::Fragmented);
        assert_eq!(config.fragment.duration, 500);
        assert!(!config.fragment.align_to_keyframe);
    }

    #[test]
    fn test_video_sample_duration_override() {
        let config = MuxerConfig {
            timescale: 90000,
            video_default_sample_duration: Some(3003),
            ..MuxerConfig::default()
        };
        assert_eq!(config.video_sample_duration(), 3003);
    }
}
