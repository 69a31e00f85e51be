//! Moovforge-Common: shared types for the container engine.
//!
//! This crate provides the vocabulary both sides of the engine speak:
//!
//! - **Codec identifiers**: [`CodecId`] and its [`MediaKind`]
//! - **Track identity**: [`TrackId`], the small integer handed out by a muxer
//!   or demuxer
//! - **Packets**: [`Packet`], the `(codec, payload, pts, dts)` tuple exchanged
//!   with protocol front-ends
//!
//! # Examples
//!
//! ```
//! use moovforge_common::{CodecId, MediaKind};
//!
//! assert_eq!(CodecId::H264.media_kind(), MediaKind::Video);
//! assert!(CodecId::Aac.is_audio());
//! ```

pub mod ids;
pub mod packet;
pub mod types;

pub use ids::TrackId;
pub use packet::Packet;
pub use types::{CodecId, MediaKind};
