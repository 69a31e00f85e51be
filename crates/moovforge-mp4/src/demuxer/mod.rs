//! MP4 demuxer.
//!
//! [`Demuxer::read_head`] walks the top-level boxes up to the `moov` (and the
//! first `moof` of a fragmented file) and resolves every track into an
//! explicit per-sample index. Packets are then read in file order. Later
//! fragments are indexed as reading or seeking reaches them.

mod fragment;
mod info;

pub use info::{Mp4Info, SyncSample, TrackInfo};

use std::io::{Read, Seek, SeekFrom};

use bytes::Bytes;
use moovforge_common::{MediaKind, Packet, TrackId};
use tracing::{debug, warn};

use crate::boxes::{BoxHeader, BoxType, Ftyp, HandlerType, Moov, Mp4Box, Trak, Trex, HEADER_SIZE};
use crate::codec::{codec_for_sample_entry, SampleEntryCodec};
use crate::config::DemuxerConfig;
use crate::sample_table::SampleTable;
use crate::track::Sample;
use crate::{Error, Result};

/// Largest `moov`/`moof` payload read into memory (64 MiB).
const MAX_BOX_PAYLOAD: u64 = 64 * 1024 * 1024;

/// Header bytes read per box: enough for a `largesize` and a `uuid`.
const MAX_HEADER_LEN: u64 = 32;

/// A track being read.
#[derive(Debug)]
struct DemuxTrack {
    id: TrackId,
    codec: Box<dyn SampleEntryCodec>,
    timescale: u32,
    samples: Vec<Sample>,
    /// Index of the next sample to read.
    cursor: usize,
    /// Decode time just past the last indexed sample.
    end_dts: u64,
}

impl DemuxTrack {
    fn kind(&self) -> MediaKind {
        self.codec.media_kind()
    }

    fn info(&self) -> TrackInfo {
        let start = self.samples.first().map_or(self.end_dts, |s| s.dts);
        TrackInfo {
            track_id: self.id,
            codec_id: self.codec.codec_id(),
            kind: self.kind(),
            timescale: self.timescale,
            duration: self.end_dts.saturating_sub(start),
            end_dts: self.end_dts,
            sample_count: self.samples.len() as u64,
            params: self.codec.params(),
            extradata: self.codec.extradata(),
        }
    }
}

/// Reads samples out of an MP4 or fMP4 file.
#[derive(Debug)]
pub struct Demuxer<R: Read + Seek> {
    reader: R,
    config: DemuxerConfig,
    file_len: u64,
    info: Option<Mp4Info>,
    tracks: Vec<DemuxTrack>,
    trexs: Vec<Trex>,
    /// Where the scan for the next `moof` resumes.
    next_box: Option<u64>,
}

impl<R: Read + Seek> Demuxer<R> {
    pub fn new(mut reader: R, config: DemuxerConfig) -> Result<Self> {
        let file_len = reader.seek(SeekFrom::End(0))?;
        reader.seek(SeekFrom::Start(0))?;
        Ok(Self {
            reader,
            config,
            file_len,
            info: None,
            tracks: Vec::new(),
            trexs: Vec::new(),
            next_box: None,
        })
    }

    /// Parse the container head and index every track.
    pub fn read_head(&mut self) -> Result<Vec<TrackInfo>> {
        if let Some(info) = &self.info {
            return Ok(info.tracks.clone());
        }

        let mut ftyp = None;
        let mut moov = None;
        let mut pos = 0u64;
        self.next_box = None;

        while pos < self.file_len {
            if self.file_len - pos < HEADER_SIZE {
                warn!(pos, trailing = self.file_len - pos, "ignoring trailing bytes");
                break;
            }
            let header = self.read_box_header(pos)?;
            let size = match header.size {
                Some(size) => size,
                None => {
                    warn!(box_type = %header.box_type, pos, "box extends to end of file");
                    self.file_len - pos
                }
            };
            // A declared size can overflow the offset
            let end = pos.checked_add(size).filter(|&end| end <= self.file_len);
            if end.is_none() {
                warn!(box_type = %header.box_type, pos, size, "box runs past end of file");
            }

            match header.box_type {
                BoxType::FTYP => {
                    ftyp = Some(Ftyp::from_payload(&self.read_payload(pos, &header, size)?)?);
                }
                BoxType::MOOV => {
                    moov = Some(Moov::from_payload(&self.read_payload(pos, &header, size)?)?);
                }
                BoxType::MOOF => {
                    self.next_box = Some(pos);
                    break;
                }
                other => debug!(box_type = %other, pos, size, "skipping top-level box"),
            }

            let Some(end) = end else {
                break;
            };
            pos = end;
        }

        let moov = moov.ok_or_else(|| Error::malformed("no moov box"))?;
        let ftyp = ftyp.unwrap_or_else(Ftyp::progressive);
        self.trexs = moov
            .mvex
            .as_ref()
            .map(|mvex| mvex.trexs.clone())
            .unwrap_or_default();
        self.tracks = self.load_tracks(&moov)?;

        self.info = Some(Mp4Info {
            major_brand: ftyp.major_brand_str(),
            minor_version: ftyp.minor_version,
            compatible_brands: ftyp
                .compatible_brands
                .iter()
                .map(|b| String::from_utf8_lossy(b).into_owned())
                .collect(),
            fragmented: moov.is_fragmented(),
            timescale: moov.mvhd.timescale,
            duration: moov.mvhd.duration,
            tracks: Vec::new(),
        });

        if self.next_box.is_some() {
            if let Err(e) = self.index_next_fragment() {
                // Leave nothing behind for a retried read_head
                self.info = None;
                self.tracks.clear();
                self.next_box = None;
                return Err(e);
            }
        } else {
            self.refresh_info();
        }

        let tracks = self.mp4_info()?.tracks.clone();
        debug!(tracks = tracks.len(), fragmented = moov.is_fragmented(), "head read");
        Ok(tracks)
    }

    fn load_tracks(&self, moov: &Moov) -> Result<Vec<DemuxTrack>> {
        let mut tracks = Vec::with_capacity(moov.traks.len());
        for trak in &moov.traks {
            if let Some(track) = self.load_track(trak, moov.mvhd.timescale)? {
                tracks.push(track);
            }
        }
        Ok(tracks)
    }

    fn load_track(&self, trak: &Trak, movie_timescale: u32) -> Result<Option<DemuxTrack>> {
        let id = TrackId::new(trak.tkhd.track_id);
        if let HandlerType::Other(code) = trak.mdia.hdlr.handler_type {
            debug!(
                track = %id,
                handler = %String::from_utf8_lossy(&code),
                "skipping non-media track"
            );
            return Ok(None);
        }

        let stbl = &trak.mdia.minf.stbl;
        let Some(entry) = stbl.stsd.entries.first() else {
            warn!(track = %id, "track has no sample description, skipping");
            return Ok(None);
        };
        let codec = match codec_for_sample_entry(entry, &self.config) {
            Ok(codec) => codec,
            Err(Error::UnsupportedCodec(reason)) => {
                warn!(track = %id, %reason, "skipping track");
                return Ok(None);
            }
            Err(e) => return Err(e),
        };

        let timescale = trak.mdia.mdhd.timescale;
        let delay = trak
            .edts
            .as_ref()
            .map_or(0, |edts| rescale(edts.initial_delay(), movie_timescale, timescale));

        let table = SampleTable::from_stbl(stbl);
        table.ensure_fits(self.file_len)?;
        let samples = table.resolve_from(delay)?;
        debug!(track = %id, samples = samples.len(), delay, "indexed track");

        Ok(Some(DemuxTrack {
            id,
            codec,
            timescale,
            samples,
            cursor: 0,
            end_dts: delay.saturating_add(table.duration()),
        }))
    }

    /// Container metadata. Available once the head is read.
    pub fn mp4_info(&self) -> Result<&Mp4Info> {
        self.info.as_ref().ok_or(Error::HeadNotRead)
    }

    /// Index every remaining movie fragment so the reported sample counts
    /// and durations cover the whole file.
    pub fn index_all(&mut self) -> Result<&Mp4Info> {
        self.mp4_info()?;
        while self.index_next_fragment()? {}
        self.mp4_info()
    }

    /// Read the next sample in file order.
    pub fn read_packet(&mut self) -> Result<Packet> {
        self.mp4_info()?;

        let index = loop {
            let next = self
                .tracks
                .iter()
                .enumerate()
                .filter_map(|(i, t)| t.samples.get(t.cursor).map(|s| (i, s.offset)))
                .min_by_key(|&(_, offset)| offset);
            match next {
                Some((i, _)) => break i,
                None if self.index_next_fragment()? => continue,
                None => return Err(Error::Eof),
            }
        };

        let track = &self.tracks[index];
        let sample = track.samples[track.cursor];
        let data = self.read_at(sample.offset, u64::from(sample.size))?;

        let track = &mut self.tracks[index];
        let data = track.codec.restore(data)?;
        track.cursor += 1;

        Ok(Packet {
            track_id: track.id,
            codec_id: track.codec.codec_id(),
            data: Bytes::from(data),
            pts: sample.pts,
            dts: sample.dts,
            is_key_frame: sample.is_key_frame,
        })
    }

    /// Sync samples of a track, among the samples indexed so far.
    pub fn sync_table(&self, track_id: TrackId) -> Result<Vec<SyncSample>> {
        self.mp4_info()?;
        let track = self
            .tracks
            .iter()
            .find(|t| t.id == track_id)
            .ok_or(Error::UnknownTrack(track_id))?;
        Ok(track
            .samples
            .iter()
            .filter(|s| s.is_key_frame)
            .map(|s| SyncSample {
                dts: s.dts,
                pts: s.pts,
            })
            .collect())
    }

    /// Position every track at the last video sync sample at or before
    /// `target`. Returns the dts reading resumes from.
    pub fn seek_time(&mut self, target: u64) -> Result<u64> {
        self.mp4_info()?;
        if self.tracks.iter().all(|t| t.samples.is_empty()) && self.next_box.is_none() {
            return Err(Error::NotSeekable);
        }

        let has_video = self.tracks.iter().any(|t| t.kind() == MediaKind::Video);
        let anchors = |t: &&DemuxTrack| !has_video || t.kind() == MediaKind::Video;

        // Make sure every sample up to the target is indexed
        loop {
            let covered = self
                .tracks
                .iter()
                .filter(anchors)
                .filter_map(|t| t.samples.last())
                .map(|s| s.dts)
                .max();
            if covered.is_some_and(|dts| dts > target) || !self.index_next_fragment()? {
                break;
            }
        }

        let sync_dts = if has_video {
            self.tracks
                .iter()
                .filter(anchors)
                .flat_map(|t| t.samples.iter())
                .filter(|s| s.is_key_frame && s.dts <= target)
                .map(|s| s.dts)
                .max()
                .unwrap_or(0)
        } else {
            target
        };

        for track in &mut self.tracks {
            track.cursor = track.samples.partition_point(|s| s.dts < sync_dts);
        }
        debug!(target, sync_dts, "seeked");
        Ok(sync_dts)
    }

    pub fn into_inner(self) -> R {
        self.reader
    }

    fn read_box_header(&mut self, pos: u64) -> Result<BoxHeader> {
        let len = (self.file_len - pos).min(MAX_HEADER_LEN);
        let bytes = self.read_at(pos, len)?;
        BoxHeader::decode(&bytes)
    }

    fn read_payload(&mut self, pos: u64, header: &BoxHeader, size: u64) -> Result<Vec<u8>> {
        Error::ensure(size, self.file_len - pos)?;
        let len = size - header.header_size;
        if len > MAX_BOX_PAYLOAD {
            return Err(Error::malformed(format!(
                "{} box payload of {} bytes exceeds {}",
                header.box_type, len, MAX_BOX_PAYLOAD
            )));
        }
        self.read_at(pos + header.header_size, len)
    }

    fn read_at(&mut self, pos: u64, len: u64) -> Result<Vec<u8>> {
        Error::ensure(pos.saturating_add(len), self.file_len)?;
        self.reader.seek(SeekFrom::Start(pos))?;
        let mut buf = vec![0u8; len as usize];
        self.reader.read_exact(&mut buf)?;
        Ok(buf)
    }

    /// Copy the per-track counters into the reported info.
    fn refresh_info(&mut self) {
        if let Some(info) = self.info.as_mut() {
            info.tracks = self.tracks.iter().map(DemuxTrack::info).collect();
        }
    }
}

/// Convert `value` from one timescale to another.
fn rescale(value: u64, from: u32, to: u32) -> u64 {
    if from == to || from == 0 {
        return value;
    }
    (u128::from(value) * u128::from(to) / u128::from(from)) as u64
}
