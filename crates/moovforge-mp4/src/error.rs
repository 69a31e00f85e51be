//! Error types for moovforge-mp4.

use std::io;

use moovforge_bitstream::BitstreamError;
use moovforge_common::{CodecId, MediaKind, TrackId};
use thiserror::Error;

use crate::config::MuxMode;

/// Result type for moovforge-mp4 operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Error type for muxing and demuxing.
#[derive(Debug, Error)]
pub enum Error {
    /// I/O error on the underlying reader or writer.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// Framing or decoder configuration error from the bitstream layer.
    #[error("Bitstream error: {0}")]
    Bitstream(BitstreamError),

    /// Box tree violates the container structure.
    #[error("Malformed container: {0}")]
    MalformedContainer(String),

    /// Input ended inside a box.
    #[error("Unexpected end of data: need {need} bytes, have {have}")]
    UnexpectedEof { need: u64, have: u64 },

    /// Track id not registered with this muxer or demuxer.
    #[error("Unknown track: {0}")]
    UnknownTrack(TrackId),

    /// A second track of the same media kind was added.
    #[error("Duplicate {0} track")]
    DuplicateTrack(MediaKind),

    /// Operation not available in the muxer's output mode.
    #[error("{operation} is not available in {mode:?} mode")]
    InvalidMode {
        operation: &'static str,
        mode: MuxMode,
    },

    /// The muxer was already finalized.
    #[error("Muxer is closed")]
    MuxerClosed,

    /// A decoder configuration record needs parameter sets that never arrived.
    #[error("Missing parameter set: {0}")]
    MissingParameterSet(&'static str),

    /// Codec or sample entry the engine cannot carry.
    #[error("Unsupported codec: {0}")]
    UnsupportedCodec(String),

    /// Codec added as the wrong media kind.
    #[error("Codec {codec} is not a {expected} codec")]
    CodecMismatch { codec: CodecId, expected: MediaKind },

    /// Decode timestamps went backwards within a track.
    #[error("Non-monotonic dts on track {track}: {dts} after {prev}")]
    NonMonotonicDts { track: TrackId, prev: u64, dts: u64 },

    /// `read_head` has not been called yet.
    #[error("Container head not read")]
    HeadNotRead,

    /// Fragmented file without any fragment to seek in.
    #[error("Stream is not seekable")]
    NotSeekable,

    /// No more samples.
    #[error("End of stream")]
    Eof,
}

impl Error {
    /// Create a malformed container error.
    pub fn malformed(msg: impl Into<String>) -> Self {
        Self::MalformedContainer(msg.into())
    }

    /// Create an unsupported codec error.
    pub fn unsupported(msg: impl Into<String>) -> Self {
        Self::UnsupportedCodec(msg.into())
    }

    /// Check that `have` bytes satisfy a read of `need` bytes.
    pub(crate) fn ensure(need: u64, have: u64) -> Result<()> {
        if have < need {
            Err(Self::UnexpectedEof { need, have })
        } else {
            Ok(())
        }
    }
}

impl From<BitstreamError> for Error {
    fn from(err: BitstreamError) -> Self {
        match err {
            BitstreamError::MissingParameterSet(name) => Self::MissingParameterSet(name),
            other => Self::Bitstream(other),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_parameter_set_is_lifted() {
        let err: Error = BitstreamError::MissingParameterSet("PPS").into();
        assert!(matches!(err, Error::MissingParameterSet("PPS")));

        let err: Error = BitstreamError::invalid("bad").into();
        assert!(matches!(err, Error::Bitstream(_)));
    }

    #[test]
    fn test_display() {
        let err = Error::CodecMismatch {
            codec: CodecId::Aac,
            expected: MediaKind::Video,
        };
        assert_eq!(err.to_string(), "Codec aac is not a video codec");
        assert_eq!(
            Error::UnknownTrack(TrackId::new(3)).to_string(),
            "Unknown track: 3"
        );
        let err = Error::InvalidMode {
            operation: "close",
            mode: MuxMode::Progressive,
        };
        assert_eq!(err.to_string(), "close is not available in Progressive mode");
    }
}
