//! Moovforge-MP4: ISO-BMFF muxing and demuxing
//!
//! This crate writes and reads MP4 files, both progressive (`ftyp` + `mdat` +
//! `moov`) and fragmented (`moof` + `mdat` pairs behind an init segment).
//!
//! # Modules
//!
//! - `boxes` - Box codec: headers, full boxes, every box the engine writes
//! - `codec` - Per-codec ingest, sample entries and demux-side restoration
//! - `sample_table` - Pure build/resolve of `stts`/`ctts`/`stsc`/`stsz`/`stco`
//! - `track` - Track and sample model on the mux side
//! - `muxer` - Progressive and fragmented writer
//! - `demuxer` - Head parsing, packet reading, sync tables and seeking
//! - `config` - Muxer and demuxer options
//!
//! # Data flow
//!
//! On the write side a payload goes through the track's [`SampleEntryCodec`]
//! (Annex-B to length-prefixed NAL units, ADTS stripping, key-frame
//! detection) and is appended to the output. At finalize the collected
//! samples become a [`SampleTable`] inside the `moov`; in fragmented mode
//! each fragment carries its own `trun` instead.
//!
//! The read side runs the same path backwards: the `moov` sample tables (and
//! any `moof` runs) resolve into an explicit per-sample index, and each
//! sample read is restored to collaborator form before it is handed out as a
//! [`Packet`].
//!
//! # Example
//!
//! ```
//! use std::io::Cursor;
//! use moovforge_mp4::{CodecId, Demuxer, DemuxerConfig, Muxer, MuxerConfig};
//!
//! let mut muxer = Muxer::new(Cursor::new(Vec::new()), MuxerConfig::progressive());
//! let track = muxer.add_audio_track(CodecId::G711A, 1, 16, 8000).unwrap();
//! muxer.write(track, &[0xD5; 160], 0, 0).unwrap();
//! muxer.write(track, &[0xD5; 160], 20, 20).unwrap();
//! muxer.write_trailer().unwrap();
//!
//! let file = muxer.into_inner();
//! let mut demuxer = Demuxer::new(file, DemuxerConfig::default()).unwrap();
//! let tracks = demuxer.read_head().unwrap();
//! assert_eq!(tracks[0].sample_count, 2);
//! assert_eq!(demuxer.read_packet().unwrap().dts, 0);
//! ```

pub mod boxes;
pub mod codec;
pub mod config;
pub mod demuxer;
pub mod error;
pub mod muxer;
pub mod sample_table;
pub mod track;

pub use codec::{
    AudioSampleEntryCodec, IngestedSample, MediaParams, SampleEntryCodec, VideoSampleEntryCodec,
};
pub use config::{DemuxerConfig, FragmentConfig, MuxMode, MuxerConfig};
pub use demuxer::{Demuxer, Mp4Info, SyncSample, TrackInfo};
pub use error::{Error, Result};
pub use muxer::{FragmentCallback, FragmentInfo, Muxer, VideoTrackOptions};
pub use sample_table::SampleTable;
pub use track::Sample;

pub use moovforge_common::{CodecId, MediaKind, Packet, TrackId};
