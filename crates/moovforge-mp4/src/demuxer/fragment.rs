//! Indexing of movie fragments.

use std::io::{Read, Seek};

use tracing::{debug, warn};

use super::Demuxer;
use crate::boxes::{BoxType, Moof, Mp4Box, Traf, Trex, HEADER_SIZE, SAMPLE_IS_NON_SYNC};
use crate::track::Sample;
use crate::{Error, Result};

/// Samples described by one `traf`, and where its data ends.
struct TrafSamples {
    samples: Vec<Sample>,
    data_end: u64,
    end_dts: u64,
}

/// Resolve a track fragment against its defaults.
///
/// `base` is the base data offset, `start_dts` the decode time used when the
/// fragment has no `tfdt`.
fn resolve_traf(traf: &Traf, trex: &Trex, base: u64, start_dts: u64) -> Result<TrafSamples> {
    let tfhd = &traf.tfhd;
    let mut dts = traf
        .tfdt
        .map_or(start_dts, |tfdt| tfdt.base_media_decode_time);
    let mut data_pos = base;
    let mut samples = Vec::new();

    for trun in &traf.truns {
        let mut offset = match trun.data_offset {
            Some(delta) => base
                .checked_add_signed(i64::from(delta))
                .ok_or_else(|| Error::malformed("trun data offset before start of file"))?,
            None => data_pos,
        };

        for (j, entry) in trun.entries.iter().enumerate() {
            let duration = entry
                .duration
                .or(tfhd.default_sample_duration)
                .unwrap_or(trex.default_sample_duration);
            let size = entry
                .size
                .or(tfhd.default_sample_size)
                .unwrap_or(trex.default_sample_size);
            let flags = match (j, trun.first_sample_flags) {
                (0, Some(first)) => first,
                _ => entry
                    .flags
                    .or(tfhd.default_sample_flags)
                    .unwrap_or(trex.default_sample_flags),
            };

            samples.push(Sample {
                pts: dts.saturating_add_signed(entry.composition_offset.unwrap_or(0)),
                dts,
                offset,
                size,
                is_key_frame: flags & SAMPLE_IS_NON_SYNC == 0,
            });
            offset = offset
                .checked_add(u64::from(size))
                .ok_or_else(|| Error::malformed("trun sample offsets overflow"))?;
            dts = dts
                .checked_add(u64::from(duration))
                .ok_or_else(|| Error::malformed("trun decode times overflow"))?;
        }
        data_pos = offset;
    }

    Ok(TrafSamples {
        samples,
        data_end: data_pos,
        end_dts: dts,
    })
}

impl<R: Read + Seek> Demuxer<R> {
    /// Find and index the next `moof`. Returns false once no fragment is
    /// left.
    pub(super) fn index_next_fragment(&mut self) -> Result<bool> {
        let Some(mut pos) = self.next_box else {
            return Ok(false);
        };

        while self.file_len.saturating_sub(pos) >= HEADER_SIZE {
            let header = self.read_box_header(pos)?;
            let size = header.size.unwrap_or(self.file_len - pos);

            let end = pos.checked_add(size).filter(|&end| end <= self.file_len);
            if header.box_type == BoxType::MOOF {
                let Some(end) = end else {
                    warn!(pos, size, "truncated moof, stopping");
                    break;
                };
                let moof = Moof::from_payload(&self.read_payload(pos, &header, size)?)?;
                self.apply_moof(pos, &moof)?;
                self.next_box = Some(end);
                self.refresh_info();
                return Ok(true);
            }
            match end {
                Some(end) => pos = end,
                None => break,
            }
        }

        self.next_box = None;
        Ok(false)
    }

    /// Index the samples of a `moof`. Tracks are only touched once every
    /// `traf` has resolved.
    fn apply_moof(&mut self, moof_pos: u64, moof: &Moof) -> Result<()> {
        let mut previous_end: Option<u64> = None;
        let mut resolved_trafs: Vec<(usize, TrafSamples)> = Vec::new();

        for traf in &moof.trafs {
            let tfhd = &traf.tfhd;
            let base = match (tfhd.base_data_offset, previous_end) {
                (Some(offset), _) => offset,
                (None, Some(end)) if !tfhd.default_base_is_moof => end,
                _ => moof_pos,
            };

            let trex = self
                .trexs
                .iter()
                .find(|t| t.track_id == tfhd.track_id)
                .copied()
                .unwrap_or_else(|| Trex::new(tfhd.track_id));
            let index = self.tracks.iter().position(|t| t.id.get() == tfhd.track_id);
            let start_dts = index.map_or(0, |i| {
                resolved_trafs
                    .iter()
                    .rev()
                    .find(|(j, _)| *j == i)
                    .map_or(self.tracks[i].end_dts, |(_, r)| r.end_dts)
            });

            let resolved = resolve_traf(traf, &trex, base, start_dts)?;
            previous_end = Some(resolved.data_end);

            match index {
                Some(index) => resolved_trafs.push((index, resolved)),
                None => debug!(track = tfhd.track_id, "skipping traf of unknown track"),
            }
        }

        let mut added = 0usize;
        for (index, resolved) in resolved_trafs {
            let track = &mut self.tracks[index];
            added += resolved.samples.len();
            track.samples.extend(resolved.samples);
            track.end_dts = resolved.end_dts;
        }

        debug!(
            sequence = moof.mfhd.sequence_number,
            pos = moof_pos,
            samples = added,
            "indexed fragment"
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::boxes::{Tfdt, Tfhd, Trun, TrunEntry, SAMPLE_FLAGS_NON_SYNC, SAMPLE_FLAGS_SYNC};

    fn traf(tfhd: Tfhd, tfdt: Option<u64>, truns: Vec<Trun>) -> Traf {
        Traf {
            tfhd,
            tfdt: tfdt.map(|t| Tfdt {
                base_media_decode_time: t,
            }),
            truns,
        }
    }

    #[test]
    fn test_explicit_entries() {
        let trun = Trun {
            data_offset: Some(100),
            first_sample_flags: None,
            entries: vec![
                TrunEntry {
                    duration: Some(40),
                    size: Some(10),
                    flags: Some(SAMPLE_FLAGS_SYNC),
                    composition_offset: Some(80),
                },
                TrunEntry {
                    duration: Some(40),
                    size: Some(20),
                    flags: Some(SAMPLE_FLAGS_NON_SYNC),
                    composition_offset: Some(-40),
                },
            ],
        };
        let traf = traf(Tfhd::relative_to_moof(1), Some(1000), vec![trun]);
        let resolved = resolve_traf(&traf, &Trex::new(1), 5000, 0).unwrap();

        assert_eq!(resolved.samples.len(), 2);
        assert_eq!(resolved.samples[0].offset, 5100);
        assert_eq!(resolved.samples[0].pts, 1080);
        assert!(resolved.samples[0].is_key_frame);
        assert_eq!(resolved.samples[1].offset, 5110);
        assert_eq!(resolved.samples[1].dts, 1040);
        assert_eq!(resolved.samples[1].pts, 1000);
        assert!(!resolved.samples[1].is_key_frame);
        assert_eq!(resolved.data_end, 5130);
        assert_eq!(resolved.end_dts, 1080);
    }

    #[test]
    fn test_defaults_cascade() {
        let tfhd = Tfhd {
            default_sample_size: Some(8),
            default_sample_flags: Some(SAMPLE_FLAGS_NON_SYNC),
            ..Tfhd::relative_to_moof(2)
        };
        let trex = Trex {
            default_sample_duration: 1024,
            ..Trex::new(2)
        };
        let trun = Trun {
            data_offset: None,
            first_sample_flags: Some(SAMPLE_FLAGS_SYNC),
            entries: vec![TrunEntry::default(); 3],
        };
        let traf = traf(tfhd, None, vec![trun]);
        let resolved = resolve_traf(&traf, &trex, 200, 4096).unwrap();

        let dts: Vec<u64> = resolved.samples.iter().map(|s| s.dts).collect();
        assert_eq!(dts, vec![4096, 5120, 6144]);
        let offsets: Vec<u64> = resolved.samples.iter().map(|s| s.offset).collect();
        assert_eq!(offsets, vec![200, 208, 216]);
        assert!(resolved.samples[0].is_key_frame);
        assert!(!resolved.samples[1].is_key_frame);
        assert_eq!(resolved.samples[2].pts, 6144);
    }

    #[test]
    fn test_negative_offset_before_file_start() {
        let trun = Trun {
            data_offset: Some(-10),
            first_sample_flags: None,
            entries: vec![TrunEntry::default()],
        };
        let traf = traf(Tfhd::relative_to_moof(1), None, vec![trun]);
        assert!(matches!(
            resolve_traf(&traf, &Trex::new(1), 4, 0),
            Err(Error::MalformedContainer(_))
        ));
    }
}
