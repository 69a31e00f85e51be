//! Error types for moovforge-bitstream.

/// Result type for bitstream operations.
pub type Result<T> = std::result::Result<T, BitstreamError>;

/// Errors raised while framing NAL units or building codec records.
#[derive(Debug, thiserror::Error)]
pub enum BitstreamError {
    /// A decoder configuration record needs at least one SPS and one PPS.
    #[error("Missing parameter set: {0}")]
    MissingParameterSet(&'static str),

    /// Input ended before a declared length was satisfied.
    #[error("Truncated input: need {need} bytes, have {have}")]
    Truncated { need: usize, have: usize },

    /// A caller-owned buffer cannot hold the transformed data in place.
    #[error("Buffer too small: need {need} bytes, have {have}")]
    BufferTooSmall { need: usize, have: usize },

    /// Structurally invalid data.
    #[error("Invalid data: {0}")]
    InvalidData(String),
}

impl BitstreamError {
    /// Create an invalid data error.
    pub fn invalid(msg: impl Into<String>) -> Self {
        Self::InvalidData(msg.into())
    }

    /// Check that `have` bytes satisfy a read of `need` bytes.
    pub(crate) fn ensure(need: usize, have: usize) -> Result<()> {
        if have < need {
            Err(Self::Truncated { need, have })
        } else {
            Ok(())
        }
    }
}
