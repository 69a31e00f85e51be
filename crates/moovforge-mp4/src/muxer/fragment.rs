//! Fragmented output: `moof` + `mdat` pairs and init segments.

use std::io::Write;

use bytes::BytesMut;
use moovforge_common::MediaKind;
use tracing::debug;

#[cfg(feature = "serialize")]
use serde::Serialize;

use super::Muxer;
use crate::boxes::{
    BoxHeader, BoxType, Ftyp, Mfhd, Moof, Moov, Mp4Box, Mvex, Mvhd, Tfdt, Tfhd, Traf, Trex, Trun,
    TrunEntry, SAMPLE_FLAGS_NON_SYNC, SAMPLE_FLAGS_SYNC,
};
use crate::codec::IngestedSample;
use crate::track::{FragmentSample, PendingSample, Track};
use crate::{Error, Result};

/// Description of a fragment that has just been written.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serialize", derive(Serialize))]
pub struct FragmentInfo {
    /// `mfhd` sequence number, starting at 1.
    pub sequence_number: u32,
    /// Offset of the `moof` in the writer it was written to.
    pub moof_offset: u64,
    pub first_pts: u64,
    pub first_dts: u64,
    /// Last sample dts minus first sample dts.
    pub duration: u64,
    /// Bytes of `moof` + `mdat`.
    pub size: u64,
    pub sample_count: u32,
}

#[derive(Debug, Clone, Copy)]
pub(super) struct FragmentOpen {
    first_pts: u64,
    first_dts: u64,
}

#[derive(Debug)]
pub(super) struct FragmentState {
    pub open: Option<FragmentOpen>,
    pub sequence_number: u32,
    /// The init segment is already at the head of the current writer.
    pub init_written: bool,
}

impl Default for FragmentState {
    fn default() -> Self {
        Self {
            open: None,
            sequence_number: 1,
            init_written: false,
        }
    }
}

fn sample_flags(is_key_frame: bool) -> u32 {
    if is_key_frame {
        SAMPLE_FLAGS_SYNC
    } else {
        SAMPLE_FLAGS_NON_SYNC
    }
}

/// Track fragment for one track's samples. The data offset is filled in
/// once the `moof` size is known.
fn traf_for(track: &Track) -> Traf {
    let has_cto = track.fragment.iter().any(|s| s.pts != s.dts);
    let entries = track
        .fragment
        .iter()
        .map(|s| TrunEntry {
            duration: Some(s.duration),
            size: Some(s.size),
            flags: Some(sample_flags(s.is_key_frame)),
            composition_offset: has_cto.then(|| s.pts as i64 - s.dts as i64),
        })
        .collect();

    Traf {
        tfhd: Tfhd::relative_to_moof(track.id.get()),
        tfdt: track.fragment.first().map(|s| Tfdt {
            base_media_decode_time: s.dts,
        }),
        truns: vec![Trun {
            data_offset: Some(0),
            first_sample_flags: None,
            entries,
        }],
    }
}

impl<W: Write> Muxer<W> {
    pub(super) fn write_fragmented(
        &mut self,
        index: usize,
        sample: IngestedSample,
        pts: u64,
        dts: u64,
    ) -> Result<()> {
        // The new dts fixes the duration of the track's previous sample
        if let Some(previous) = self.tracks[index].pending.take() {
            let duration = u32::try_from(dts - previous.dts).unwrap_or(u32::MAX);
            self.commit(index, previous, duration);
        }
        self.tracks[index].advance(dts);

        if let Some(open) = self.fragments.open {
            let elapsed = dts.saturating_sub(open.first_dts);
            if elapsed >= self.config.fragment.duration && self.may_cut(index, sample.is_key_frame)
            {
                self.close_fragment()?;
            }
        }

        self.tracks[index].pending = Some(PendingSample {
            pts,
            dts,
            data: sample.data,
            is_key_frame: sample.is_key_frame,
        });
        Ok(())
    }

    /// Whether a fragment may end in front of this sample.
    fn may_cut(&self, index: usize, is_key_frame: bool) -> bool {
        if !self.config.fragment.align_to_keyframe {
            return true;
        }
        is_key_frame && (self.tracks[index].kind() == MediaKind::Video || !self.has_video())
    }

    /// Move a sample with a known duration into the open fragment.
    fn commit(&mut self, index: usize, sample: PendingSample, duration: u32) {
        if self.fragments.open.is_none() {
            self.fragments.open = Some(FragmentOpen {
                first_pts: sample.pts,
                first_dts: sample.dts,
            });
        }

        let track = &mut self.tracks[index];
        track.fragment.push(FragmentSample {
            pts: sample.pts,
            dts: sample.dts,
            duration,
            size: sample.data.len() as u32,
            is_key_frame: sample.is_key_frame,
        });
        track.fragment_data.extend_from_slice(&sample.data);
    }

    /// Commit every track's pending sample using the final-duration policy.
    pub(super) fn commit_pending(&mut self) {
        for index in 0..self.tracks.len() {
            if let Some(sample) = self.tracks[index].pending.take() {
                let duration = self.tracks[index].final_duration(sample.data.len());
                self.commit(index, sample, duration);
            }
        }
    }

    /// Write the open fragment, if it holds any samples.
    ///
    /// Samples stay queued until the whole fragment has been written, so a
    /// failed write can be retried by the next cut.
    pub(super) fn close_fragment(&mut self) -> Result<()> {
        let Some(open) = self.fragments.open else {
            return Ok(());
        };
        if self.tracks.iter().all(|t| t.fragment.is_empty()) {
            self.fragments.open = None;
            return Ok(());
        }

        self.ensure_init_segment()?;

        let filled: Vec<usize> = (0..self.tracks.len())
            .filter(|&i| !self.tracks[i].fragment.is_empty())
            .collect();
        let mut moof = Moof {
            mfhd: Mfhd {
                sequence_number: self.fragments.sequence_number,
            },
            trafs: filled.iter().map(|&i| traf_for(&self.tracks[i])).collect(),
        };

        let data_len: u64 = filled
            .iter()
            .map(|&i| self.tracks[i].fragment_data.len() as u64)
            .sum();
        let mdat_header = BoxHeader::for_payload(BoxType::MDAT, data_len);

        // Data offsets count from the first byte of the moof
        let mut offset = moof.box_size() + mdat_header.header_size;
        for (traf, &i) in moof.trafs.iter_mut().zip(&filled) {
            let data_offset = i32::try_from(offset)
                .map_err(|_| Error::malformed("fragment too large for a trun data offset"))?;
            for trun in &mut traf.truns {
                trun.data_offset = Some(data_offset);
            }
            offset += self.tracks[i].fragment_data.len() as u64;
        }

        let moof_offset = self.position;
        let mut out = BytesMut::with_capacity((offset + 16) as usize);
        moof.encode(&mut out);
        mdat_header.encode(&mut out);
        for &i in &filled {
            out.extend_from_slice(&self.tracks[i].fragment_data);
        }
        self.emit(&out)?;

        let mut sample_count = 0u32;
        let mut last_dts = open.first_dts;
        for &i in &filled {
            let track = &mut self.tracks[i];
            sample_count += track.fragment.len() as u32;
            if let Some(last) = track.fragment.last() {
                last_dts = last_dts.max(last.dts);
            }
            track.fragment.clear();
            track.fragment_data.clear();
        }
        self.fragments.open = None;

        let info = FragmentInfo {
            sequence_number: self.fragments.sequence_number,
            moof_offset,
            first_pts: open.first_pts,
            first_dts: open.first_dts,
            duration: last_dts - open.first_dts,
            size: out.len() as u64,
            sample_count,
        };
        self.fragments.sequence_number += 1;
        debug!(
            sequence = info.sequence_number,
            size = info.size,
            samples = info.sample_count,
            "fragment written"
        );

        let next = self.on_new_fragment.as_mut().and_then(|cb| cb(&info));
        if let Some(writer) = next {
            let previous = self.rebind_writer(writer)?;
            self.released.push(previous);
        }
        Ok(())
    }

    fn ensure_init_segment(&mut self) -> Result<()> {
        if !self.config.fragment.embed_init_segment || self.fragments.init_written {
            return Ok(());
        }
        let init = self.init_segment()?;
        self.emit(&init)?;
        self.fragments.init_written = true;
        Ok(())
    }

    /// `ftyp` + `moov` with empty sample tables and one `trex` per track.
    pub(super) fn init_segment(&self) -> Result<BytesMut> {
        let traks = self
            .tracks
            .iter()
            .map(Track::init_trak)
            .collect::<Result<Vec<_>>>()?;
        let moov = Moov {
            mvhd: Mvhd::new(self.config.timescale, 0, self.next_track_id()),
            traks,
            mvex: Some(Mvex {
                mehd: None,
                trexs: self.tracks.iter().map(|t| Trex::new(t.id.get())).collect(),
            }),
        };

        let mut buf = BytesMut::new();
        Ftyp::fragmented().encode(&mut buf);
        moov.encode(&mut buf);
        Ok(buf)
    }

    pub(super) fn finish_fragmented(&mut self) -> Result<()> {
        self.commit_pending();
        self.close_fragment()?;
        self.writer.flush()?;
        self.closed = true;
        debug!(
            fragments = self.fragments.sequence_number - 1,
            "fragmented output finalized"
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::boxes::SAMPLE_IS_NON_SYNC;
    use crate::codec::AudioSampleEntryCodec;
    use moovforge_common::{CodecId, TrackId};

    fn track_with(samples: &[(u64, u64, u32, bool)]) -> Track {
        let codec = AudioSampleEntryCodec::new(CodecId::G711U, 1, 16, 8000).unwrap();
        let mut track = Track::new(TrackId::new(1), Box::new(codec), 1000);
        for &(pts, dts, size, key) in samples {
            track.fragment.push(FragmentSample {
                pts,
                dts,
                duration: 20,
                size,
                is_key_frame: key,
            });
        }
        track
    }

    #[test]
    fn test_traf_omits_cto_when_pts_equals_dts() {
        let traf = traf_for(&track_with(&[(0, 0, 10, true), (20, 20, 12, true)]));
        assert!(traf.tfhd.default_base_is_moof);
        assert_eq!(traf.tfdt.unwrap().base_media_decode_time, 0);
        let entries = &traf.truns[0].entries;
        assert_eq!(entries.len(), 2);
        assert!(entries.iter().all(|e| e.composition_offset.is_none()));
        assert_eq!(entries[1].size, Some(12));
    }

    #[test]
    fn test_traf_carries_cto_and_flags() {
        let traf = traf_for(&track_with(&[(40, 0, 10, true), (20, 20, 12, false)]));
        let entries = &traf.truns[0].entries;
        assert_eq!(entries[0].composition_offset, Some(40));
        assert_eq!(entries[1].composition_offset, Some(0));
        assert_eq!(entries[0].flags, Some(SAMPLE_FLAGS_SYNC));
        assert_ne!(entries[1].flags.unwrap() & SAMPLE_IS_NON_SYNC, 0);
    }

    #[test]
    fn test_default_state() {
        let state = FragmentState::default();
        assert_eq!(state.sequence_number, 1);
        assert!(state.open.is_none());
        assert!(!state.init_written);
    }
}
