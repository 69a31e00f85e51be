//! Sample table construction and resolution.
//!
//! [`SampleTable::build`] folds a flat, decode-ordered sample list into the
//! run-length coded `stbl` tables; [`SampleTable::resolve`] walks the tables
//! back into per-sample records.

use moovforge_common::MediaKind;

use crate::boxes::{
    ChunkOffsets, Ctts, CttsEntry, Stbl, Stsc, StscEntry, Stsd, Stss, Stsz, Stts, SttsEntry,
};
use crate::track::Sample;
use crate::{Error, Result};

/// The sample tables of one track.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SampleTable {
    pub stts: Stts,
    pub ctts: Option<Ctts>,
    pub stss: Option<Stss>,
    pub stsc: Stsc,
    pub stsz: Stsz,
    pub chunk_offsets: ChunkOffsets,
}

impl SampleTable {
    /// Build the tables for `samples`, which must be in decode order.
    ///
    /// `last_duration` is the duration of the final sample, whose successor
    /// is unknown.
    pub fn build(samples: &[Sample], kind: MediaKind, last_duration: u32) -> Self {
        Self {
            stts: build_stts(samples, last_duration),
            ctts: build_ctts(samples),
            stss: build_stss(samples, kind),
            stsz: build_stsz(samples),
            ..build_chunks(samples)
        }
    }

    /// Copy the tables out of a decoded `stbl`.
    pub fn from_stbl(stbl: &Stbl) -> Self {
        Self {
            stts: stbl.stts.clone(),
            ctts: stbl.ctts.clone(),
            stss: stbl.stss.clone(),
            stsc: stbl.stsc.clone(),
            stsz: stbl.stsz.clone(),
            chunk_offsets: stbl.chunk_offsets.clone(),
        }
    }

    /// Wrap the tables into an `stbl` with the given description.
    pub fn into_stbl(self, stsd: Stsd) -> Stbl {
        Stbl {
            stsd,
            stts: self.stts,
            ctts: self.ctts,
            stss: self.stss,
            stsc: self.stsc,
            stsz: self.stsz,
            chunk_offsets: self.chunk_offsets,
        }
    }

    pub fn sample_count(&self) -> usize {
        self.stsz.sample_count as usize
    }

    /// Reject tables whose samples cannot fit in `available` bytes of
    /// file. Every sample is counted as at least one byte.
    pub fn ensure_fits(&self, available: u64) -> Result<()> {
        let stsz = &self.stsz;
        let claimed = if stsz.sample_size != 0 {
            u64::from(stsz.sample_count).saturating_mul(u64::from(stsz.sample_size))
        } else {
            stsz.entry_sizes.iter().map(|&s| u64::from(s.max(1))).sum()
        };
        if claimed > available {
            return Err(Error::malformed(format!(
                "{} samples claim {} bytes, file has {}",
                stsz.sample_count, claimed, available
            )));
        }
        Ok(())
    }

    /// Media duration covered by the tables.
    pub fn duration(&self) -> u64 {
        self.stts.total_duration()
    }

    /// Re-derive every sample, with the first dts at 0.
    pub fn resolve(&self) -> Result<Vec<Sample>> {
        self.resolve_from(0)
    }

    /// Re-derive every sample, with the first dts at `base_dts`.
    pub fn resolve_from(&self, base_dts: u64) -> Result<Vec<Sample>> {
        let count = self.sample_count();
        if self.stts.sample_count() != count as u64 {
            return Err(Error::malformed(format!(
                "stts describes {} samples, stsz {}",
                self.stts.sample_count(),
                count
            )));
        }

        let offsets = self.sample_offsets(count)?;
        let mut deltas = self
            .stts
            .entries
            .iter()
            .flat_map(|e| std::iter::repeat(e.sample_delta).take(e.sample_count as usize));
        let mut composition = self.ctts.iter().flat_map(|ctts| {
            ctts.entries
                .iter()
                .flat_map(|e| std::iter::repeat(e.sample_offset).take(e.sample_count as usize))
        });
        let mut sync = self.stss.as_ref().map(|stss| stss.sample_numbers.iter().peekable());

        let mut samples = Vec::with_capacity(offsets.len());
        let mut dts = base_dts;
        for (index, offset) in offsets.into_iter().enumerate() {
            let size = self
                .stsz
                .size_of(index)
                .ok_or_else(|| Error::malformed("stsz shorter than its sample count"))?;
            let cto = composition.next().unwrap_or(0);
            let number = index as u32 + 1;
            let is_key_frame = match sync.as_mut() {
                None => true,
                Some(numbers) => {
                    while numbers.next_if(|n| **n < number).is_some() {}
                    numbers.next_if(|n| **n == number).is_some()
                }
            };

            samples.push(Sample {
                pts: dts.saturating_add_signed(cto),
                dts,
                offset,
                size,
                is_key_frame,
            });
            dts = dts
                .checked_add(u64::from(deltas.next().unwrap_or(0)))
                .ok_or_else(|| Error::malformed("stts decode times overflow"))?;
        }

        Ok(samples)
    }

    /// File offset of every sample, from the chunk tables.
    fn sample_offsets(&self, count: usize) -> Result<Vec<u64>> {
        let chunk_offsets = self.chunk_offsets.offsets();
        let chunk_count = chunk_offsets.len() as u32;
        let mut offsets = Vec::new();

        for (i, entry) in self.stsc.entries.iter().enumerate() {
            let last_chunk = match self.stsc.entries.get(i + 1) {
                Some(next) => next.first_chunk,
                None => chunk_count + 1,
            };
            if entry.first_chunk == 0 || last_chunk < entry.first_chunk {
                return Err(Error::malformed("stsc chunk runs out of order"));
            }

            for chunk in entry.first_chunk..last_chunk {
                let mut offset = *chunk_offsets
                    .get(chunk as usize - 1)
                    .ok_or_else(|| Error::malformed("stsc refers past the chunk offsets"))?;
                for _ in 0..entry.samples_per_chunk {
                    if offsets.len() == count {
                        break;
                    }
                    let size = self
                        .stsz
                        .size_of(offsets.len())
                        .ok_or_else(|| Error::malformed("stsz shorter than its sample count"))?;
                    offsets.push(offset);
                    offset = offset
                        .checked_add(u64::from(size))
                        .ok_or_else(|| Error::malformed("chunk sample offsets overflow"))?;
                }
            }
        }

        if offsets.len() != count {
            return Err(Error::malformed(format!(
                "chunks hold {} samples, stsz {}",
                offsets.len(),
                count
            )));
        }
        Ok(offsets)
    }
}

fn build_stts(samples: &[Sample], last_duration: u32) -> Stts {
    let mut entries: Vec<SttsEntry> = Vec::new();
    let deltas = samples
        .windows(2)
        .map(|w| u32::try_from(w[1].dts - w[0].dts).unwrap_or(u32::MAX))
        .chain((!samples.is_empty()).then_some(last_duration));

    for delta in deltas {
        match entries.last_mut() {
            Some(last) if last.sample_delta == delta => last.sample_count += 1,
            _ => entries.push(SttsEntry {
                sample_count: 1,
                sample_delta: delta,
            }),
        }
    }
    Stts { entries }
}

fn build_ctts(samples: &[Sample]) -> Option<Ctts> {
    if samples.iter().all(|s| s.pts == s.dts) {
        return None;
    }

    let mut entries: Vec<CttsEntry> = Vec::new();
    for sample in samples {
        let offset = sample.pts as i64 - sample.dts as i64;
        match entries.last_mut() {
            Some(last) if last.sample_offset == offset => last.sample_count += 1,
            _ => entries.push(CttsEntry {
                sample_count: 1,
                sample_offset: offset,
            }),
        }
    }
    Some(Ctts { entries })
}

fn build_stss(samples: &[Sample], kind: MediaKind) -> Option<Stss> {
    if kind != MediaKind::Video || samples.iter().all(|s| s.is_key_frame) {
        return None;
    }
    Some(Stss {
        sample_numbers: samples
            .iter()
            .enumerate()
            .filter(|(_, s)| s.is_key_frame)
            .map(|(i, _)| i as u32 + 1)
            .collect(),
    })
}

fn build_stsz(samples: &[Sample]) -> Stsz {
    let sample_count = samples.len() as u32;
    match samples.first() {
        Some(first) if samples.iter().all(|s| s.size == first.size) => Stsz {
            sample_size: first.size,
            sample_count,
            entry_sizes: Vec::new(),
        },
        _ => Stsz {
            sample_size: 0,
            sample_count,
            entry_sizes: samples.iter().map(|s| s.size).collect(),
        },
    }
}

/// Group contiguous samples into chunks, producing `stsc` and the offsets.
fn build_chunks(samples: &[Sample]) -> SampleTable {
    let mut chunk_offsets = Vec::new();
    let mut chunk_sizes: Vec<u32> = Vec::new();
    let mut end = None;

    for sample in samples {
        if end == Some(sample.offset) {
            if let Some(count) = chunk_sizes.last_mut() {
                *count += 1;
            }
        } else {
            chunk_offsets.push(sample.offset);
            chunk_sizes.push(1);
        }
        end = Some(sample.offset + sample.size as u64);
    }

    let mut entries: Vec<StscEntry> = Vec::new();
    for (i, count) in chunk_sizes.into_iter().enumerate() {
        if entries.last().map(|e| e.samples_per_chunk) != Some(count) {
            entries.push(StscEntry {
                first_chunk: i as u32 + 1,
                samples_per_chunk: count,
                sample_description_index: 1,
            });
        }
    }

    SampleTable {
        stsc: Stsc { entries },
        chunk_offsets: ChunkOffsets::from_offsets(chunk_offsets),
        ..SampleTable::default()
    }
}
