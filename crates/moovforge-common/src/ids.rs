//! Typed track identifier.
//!
//! Track ids are the 1-based `track_ID` values written into `tkhd`/`tfhd`.
//! The newtype keeps them from being confused with sample indices or
//! sequence numbers.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Identifier of one track inside a muxer or demuxer session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TrackId(u32);

impl TrackId {
    /// Wrap a raw `track_ID` value.
    #[must_use]
    pub const fn new(id: u32) -> Self {
        Self(id)
    }

    /// The raw `track_ID` value.
    #[must_use]
    pub const fn get(self) -> u32 {
        self.0
    }
}

impl From<u32> for TrackId {
    fn from(id: u32) -> Self {
        Self(id)
    }
}

impl From<TrackId> for u32 {
    fn from(id: TrackId) -> Self {
        id.0
    }
}

impl fmt::Display for TrackId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}
