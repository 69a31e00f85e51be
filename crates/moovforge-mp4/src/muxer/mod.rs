//! MP4 muxer.
//!
//! Samples are fed one at a time through [`Muxer::write`]. In progressive
//! mode their bytes go straight into a single `mdat` and the `moov` is
//! appended by [`Muxer::write_trailer`], which patches the `mdat` size in
//! place. In fragmented mode samples are grouped into `moof` + `mdat`
//! pairs, emitted as soon as a fragment is complete.

mod checkpoint;
mod fragment;

pub use fragment::FragmentInfo;

use std::fmt;
use std::io::{Seek, Write};

use bytes::BytesMut;
use moovforge_common::{CodecId, MediaKind, TrackId};
use tracing::{debug, warn};

use crate::boxes::{BoxHeader, BoxType, Free, Ftyp, Moov, Mp4Box, Mvhd, Stsd, HEADER_SIZE};
use crate::codec::{AudioSampleEntryCodec, IngestedSample, SampleEntryCodec, VideoSampleEntryCodec};
use crate::config::{MuxMode, MuxerConfig};
use crate::sample_table::SampleTable;
use crate::track::{Sample, Track};
use crate::{Error, Result};

use checkpoint::SeekCheckpoint;
use fragment::FragmentState;

/// Called after every fragment is written. Returning a writer redirects all
/// following output to it.
pub type FragmentCallback<W> = Box<dyn FnMut(&FragmentInfo) -> Option<W>>;

/// Optional presentation hints for a video track.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct VideoTrackOptions {
    /// Used until an SPS provides the real value.
    pub width: Option<u32>,
    pub height: Option<u32>,
    /// Out-of-band parameter sets: an `avcC`/`hvcC` record or Annex B NAL
    /// units.
    pub extradata: Option<Vec<u8>>,
}

/// Where the progressive `mdat` lives in the output.
#[derive(Debug, Clone, Copy)]
struct ProgressiveLayout {
    /// Offset of the 8-byte `free` box reserved for a 64-bit `mdat` header.
    free_pos: u64,
    /// Offset of the first sample byte.
    data_start: u64,
}

/// Writes tracks of samples into an MP4 file or a sequence of fMP4
/// fragments.
pub struct Muxer<W: Write> {
    writer: W,
    config: MuxerConfig,
    tracks: Vec<Track>,
    /// Bytes written to the current writer.
    position: u64,
    closed: bool,
    layout: Option<ProgressiveLayout>,
    fragments: FragmentState,
    on_new_fragment: Option<FragmentCallback<W>>,
    released: Vec<W>,
}

impl<W: Write> fmt::Debug for Muxer<W> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Muxer")
            .field("config", &self.config)
            .field("tracks", &self.tracks.len())
            .field("position", &self.position)
            .field("closed", &self.closed)
            .finish()
    }
}

impl<W: Write> Muxer<W> {
    /// Create a muxer writing to `writer`. Nothing is written until the
    /// first sample arrives.
    pub fn new(writer: W, config: MuxerConfig) -> Self {
        Self {
            writer,
            config,
            tracks: Vec::new(),
            position: 0,
            closed: false,
            layout: None,
            fragments: FragmentState::default(),
            on_new_fragment: None,
            released: Vec::new(),
        }
    }

    pub fn config(&self) -> &MuxerConfig {
        &self.config
    }

    /// Bytes written to the current writer so far.
    pub fn position(&self) -> u64 {
        self.position
    }

    pub fn is_closed(&self) -> bool {
        self.closed
    }

    /// Track ids in the order they were added.
    pub fn track_ids(&self) -> Vec<TrackId> {
        self.tracks.iter().map(|t| t.id).collect()
    }

    /// Register the fragment callback.
    pub fn on_new_fragment<F>(&mut self, callback: F)
    where
        F: FnMut(&FragmentInfo) -> Option<W> + 'static,
    {
        self.on_new_fragment = Some(Box::new(callback));
    }

    /// Add the video track. Dimensions come from the first SPS.
    pub fn add_video_track(&mut self, codec_id: CodecId) -> Result<TrackId> {
        self.add_video_track_with(codec_id, VideoTrackOptions::default())
    }

    pub fn add_video_track_with(
        &mut self,
        codec_id: CodecId,
        options: VideoTrackOptions,
    ) -> Result<TrackId> {
        self.ensure_open()?;
        let mut codec = VideoSampleEntryCodec::new(codec_id, self.config.video_sample_duration())?
            .with_dimensions(options.width.unwrap_or(0), options.height.unwrap_or(0));
        if let Some(extradata) = &options.extradata {
            codec = codec.with_extradata(extradata)?;
        }
        self.push_track(Box::new(codec))
    }

    /// Add the audio track.
    pub fn add_audio_track(
        &mut self,
        codec_id: CodecId,
        channel_count: u16,
        sample_bits: u16,
        sample_rate: u32,
    ) -> Result<TrackId> {
        self.ensure_open()?;
        let codec = AudioSampleEntryCodec::new(codec_id, channel_count, sample_bits, sample_rate)?;
        self.push_track(Box::new(codec))
    }

    /// Add the audio track with out-of-band codec configuration (an AAC
    /// AudioSpecificConfig).
    pub fn add_audio_track_with_extradata(
        &mut self,
        codec_id: CodecId,
        channel_count: u16,
        sample_bits: u16,
        sample_rate: u32,
        extradata: &[u8],
    ) -> Result<TrackId> {
        self.ensure_open()?;
        let codec = AudioSampleEntryCodec::new(codec_id, channel_count, sample_bits, sample_rate)?
            .with_extradata(extradata)?;
        self.push_track(Box::new(codec))
    }

    fn push_track(&mut self, codec: Box<dyn SampleEntryCodec>) -> Result<TrackId> {
        let kind = codec.media_kind();
        if self.tracks.iter().any(|t| t.kind() == kind) {
            return Err(Error::DuplicateTrack(kind));
        }

        let id = TrackId::new(self.tracks.len() as u32 + 1);
        debug!(track = %id, codec = ?codec.codec_id(), "added track");
        self.tracks
            .push(Track::new(id, codec, self.config.timescale));
        Ok(id)
    }

    /// Write one sample. Timestamps are in the configured timescale.
    ///
    /// Nothing is stored when an error is returned.
    pub fn write(&mut self, track_id: TrackId, payload: &[u8], pts: u64, dts: u64) -> Result<()> {
        self.ensure_open()?;
        let index = self.track_index(track_id)?;
        self.tracks[index].check_dts(dts)?;
        let sample = self.tracks[index].codec.ingest(payload)?;

        match self.config.mode {
            MuxMode::Progressive => self.write_progressive(index, sample, pts, dts),
            MuxMode::Fragmented => self.write_fragmented(index, sample, pts, dts),
        }
    }

    /// Write a fragmented output's init segment (`ftyp` + `moov` with
    /// `mvex`) to a separate sink.
    pub fn write_init_segment<S: Write>(&self, sink: &mut S) -> Result<()> {
        self.require_mode(MuxMode::Fragmented, "write_init_segment")?;
        let init = self.init_segment()?;
        sink.write_all(&init)?;
        sink.flush()?;
        Ok(())
    }

    /// Close the open fragment now, whatever its duration.
    pub fn flush_fragment(&mut self) -> Result<()> {
        self.ensure_open()?;
        self.require_mode(MuxMode::Fragmented, "flush_fragment")?;
        self.commit_pending();
        self.close_fragment()
    }

    /// Swap the output writer, returning the previous one after flushing it.
    /// Offsets restart at zero on the new writer.
    pub fn rebind_writer(&mut self, writer: W) -> Result<W> {
        self.require_mode(MuxMode::Fragmented, "rebind_writer")?;
        self.writer.flush()?;
        let previous = std::mem::replace(&mut self.writer, writer);
        self.position = 0;
        self.fragments.init_written = false;
        debug!("writer rebound");
        Ok(previous)
    }

    /// Finish a fragmented output on a writer that cannot seek.
    pub fn close(&mut self) -> Result<()> {
        self.ensure_open()?;
        self.require_mode(MuxMode::Fragmented, "close")?;
        self.finish_fragmented()
    }

    /// Writers replaced through the fragment callback, oldest first.
    pub fn take_released_writers(&mut self) -> Vec<W> {
        std::mem::take(&mut self.released)
    }

    pub fn get_ref(&self) -> &W {
        &self.writer
    }

    pub fn into_inner(self) -> W {
        self.writer
    }

    fn ensure_open(&self) -> Result<()> {
        if self.closed {
            return Err(Error::MuxerClosed);
        }
        Ok(())
    }

    fn require_mode(&self, mode: MuxMode, operation: &'static str) -> Result<()> {
        if self.config.mode != mode {
            return Err(Error::InvalidMode {
                operation,
                mode: self.config.mode,
            });
        }
        Ok(())
    }

    fn track_index(&self, track_id: TrackId) -> Result<usize> {
        self.tracks
            .iter()
            .position(|t| t.id == track_id)
            .ok_or(Error::UnknownTrack(track_id))
    }

    fn has_video(&self) -> bool {
        self.tracks.iter().any(|t| t.kind() == MediaKind::Video)
    }

    fn next_track_id(&self) -> u32 {
        self.tracks.len() as u32 + 1
    }

    fn emit(&mut self, bytes: &[u8]) -> Result<()> {
        self.writer.write_all(bytes)?;
        self.position += bytes.len() as u64;
        Ok(())
    }

    /// Write `ftyp`, the reserved `free` box and an open `mdat` header.
    fn begin_progressive(&mut self) -> Result<()> {
        if self.layout.is_some() {
            return Ok(());
        }

        let mut head = BytesMut::new();
        Ftyp::progressive().encode(&mut head);
        let free_pos = self.position + head.len() as u64;
        Free::default().encode(&mut head);
        // Size 0 until the trailer patches it
        BoxHeader {
            box_type: BoxType::MDAT,
            size: None,
            header_size: HEADER_SIZE,
            usertype: None,
        }
        .encode(&mut head);

        self.emit(&head)?;
        self.layout = Some(ProgressiveLayout {
            free_pos,
            data_start: self.position,
        });
        Ok(())
    }

    fn write_progressive(
        &mut self,
        index: usize,
        sample: IngestedSample,
        pts: u64,
        dts: u64,
    ) -> Result<()> {
        let size = u32::try_from(sample.data.len())
            .map_err(|_| Error::malformed("sample larger than 4 GiB"))?;
        self.begin_progressive()?;

        let offset = self.position;
        self.emit(&sample.data)?;

        let track = &mut self.tracks[index];
        track.advance(dts);
        track.samples.push(Sample {
            pts,
            dts,
            offset,
            size,
            is_key_frame: sample.is_key_frame,
        });
        Ok(())
    }

    /// Movie box over everything written in progressive mode.
    fn progressive_moov(&self) -> Result<Moov> {
        let mut traks = Vec::with_capacity(self.tracks.len());
        let mut movie_duration = 0u64;

        for track in &self.tracks {
            let Some(first) = track.samples.first() else {
                warn!(track = %track.id, "track has no samples, leaving it out");
                continue;
            };
            let delay = first.dts;
            let last_duration = track
                .samples
                .last()
                .map_or(0, |s| track.final_duration(s.size as usize));

            let table = SampleTable::build(&track.samples, track.kind(), last_duration);
            let media_duration = table.duration();
            let stbl = table.into_stbl(Stsd::single(track.sample_entry()?));

            movie_duration = movie_duration.max(delay + media_duration);
            traks.push(track.trak(stbl, media_duration, delay));
        }

        Ok(Moov {
            mvhd: Mvhd::new(self.config.timescale, movie_duration, self.next_track_id()),
            traks,
            mvex: None,
        })
    }
}

impl<W: Write + Seek> Muxer<W> {
    /// Finalize the output.
    ///
    /// Progressive mode patches the `mdat` size and appends the `moov`;
    /// fragmented mode flushes the last fragment.
    pub fn write_trailer(&mut self) -> Result<()> {
        self.ensure_open()?;
        match self.config.mode {
            MuxMode::Progressive => self.finish_progressive(),
            MuxMode::Fragmented => self.finish_fragmented(),
        }
    }

    fn finish_progressive(&mut self) -> Result<()> {
        self.begin_progressive()?;
        let moov = self.progressive_moov()?;
        let Some(layout) = self.layout else {
            return Err(Error::malformed("mdat was never opened"));
        };

        let payload = self.position - layout.data_start;
        {
            let mut checkpoint = SeekCheckpoint::new(&mut self.writer, self.position);
            if payload + HEADER_SIZE <= u32::MAX as u64 {
                let size = (payload + HEADER_SIZE) as u32;
                checkpoint.patch(layout.free_pos + HEADER_SIZE, &size.to_be_bytes())?;
            } else {
                // The free box and the mdat header become one 16-byte header
                let mut header = BytesMut::new();
                BoxHeader::for_payload(BoxType::MDAT, payload).encode(&mut header);
                checkpoint.patch(layout.free_pos, &header)?;
            }
            checkpoint.restore()?;
        }

        self.emit(&moov.to_bytes())?;
        self.writer.flush()?;
        self.closed = true;
        debug!(
            mdat_size = payload,
            tracks = moov.traks.len(),
            "progressive output finalized"
        );
        Ok(())
    }
}
