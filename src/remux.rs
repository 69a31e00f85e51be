//! File-level operations built on the muxer and demuxer.
//!
//! Every operation reads its input with [`Demuxer`] and feeds the packets
//! back into a [`Muxer`], rescaling timestamps from each input track's
//! timescale to the output timescale.

use anyhow::{Context, Result};
use moovforge_mp4::{
    Demuxer, Error as Mp4Error, MediaKind, MediaParams, Mp4Info, MuxMode, Muxer, TrackId,
    TrackInfo, VideoTrackOptions,
};
use std::cell::RefCell;
use std::collections::HashMap;
use std::fs::File;
use std::io::{BufReader, Read, Seek, Write};
use std::path::{Path, PathBuf};
use std::rc::Rc;

use crate::config::Config;

/// Name of the init segment written by [`segment`].
pub const INIT_SEGMENT_NAME: &str = "init.mp4";

/// Counters reported after a remux.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RemuxStats {
    pub tracks: usize,
    pub packets: u64,
    pub bytes: u64,
}

/// Files written by [`segment`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SegmentOutput {
    pub init: PathBuf,
    /// Media segments in sequence order.
    pub segments: Vec<PathBuf>,
}

/// Describe an MP4 file, indexing every fragment of a fragmented one.
pub fn info(path: &Path, config: &Config) -> Result<Mp4Info> {
    let mut demuxer = open_input(path, config)?;
    let info = demuxer
        .index_all()
        .with_context(|| format!("Failed to index fragments of {:?}", path))?;
    Ok(info.clone())
}

/// Rewrite `input` into `output` using the configured muxer mode.
pub fn remux(input: &Path, output: &Path, config: &Config) -> Result<RemuxStats> {
    let mut demuxer = open_input(input, config)?;

    let file = File::create(output)
        .with_context(|| format!("Failed to create output file: {:?}", output))?;
    let mut muxer = Muxer::new(std::io::BufWriter::new(file), config.muxer.clone());

    let stats = copy_packets(&mut demuxer, &mut muxer)?;
    muxer
        .write_trailer()
        .with_context(|| format!("Failed to finalize {:?}", output))?;

    tracing::info!(
        input = %input.display(),
        output = %output.display(),
        packets = stats.packets,
        "remux complete"
    );
    Ok(stats)
}

/// Split `input` into `init.mp4` plus one `segment-N.m4s` file per
/// fragment inside `out_dir`.
pub fn segment(input: &Path, out_dir: &Path, config: &Config) -> Result<SegmentOutput> {
    let mut demuxer = open_input(input, config)?;

    std::fs::create_dir_all(out_dir)
        .with_context(|| format!("Failed to create output directory: {:?}", out_dir))?;

    let mut muxer_config = config.muxer.clone();
    muxer_config.mode = MuxMode::Fragmented;
    muxer_config.fragment.embed_init_segment = false;

    let first = segment_path(out_dir, 1);
    let writer =
        File::create(&first).with_context(|| format!("Failed to create {:?}", first))?;
    let mut muxer = Muxer::new(writer, muxer_config);

    // First segment file the callback could not create
    let failed: Rc<RefCell<Option<(PathBuf, std::io::Error)>>> = Rc::new(RefCell::new(None));
    let failure = Rc::clone(&failed);
    let dir = out_dir.to_path_buf();
    muxer.on_new_fragment(move |fragment| {
        let next = segment_path(&dir, fragment.sequence_number + 1);
        tracing::debug!(
            sequence = fragment.sequence_number,
            first_dts = fragment.first_dts,
            size = fragment.size,
            "fragment written"
        );
        match File::create(&next) {
            Ok(file) => Some(file),
            Err(e) => {
                tracing::warn!("Failed to create {:?}: {}", next, e);
                failure.borrow_mut().get_or_insert((next, e));
                None
            }
        }
    });

    let stats = copy_packets(&mut demuxer, &mut muxer)?;

    let init = out_dir.join(INIT_SEGMENT_NAME);
    let mut init_file =
        File::create(&init).with_context(|| format!("Failed to create {:?}", init))?;
    muxer
        .write_init_segment(&mut init_file)
        .context("Failed to write init segment")?;
    muxer.close().context("Failed to close the last fragment")?;
    if let Some((path, e)) = failed.borrow_mut().take() {
        return Err(anyhow::Error::new(e).context(format!("Failed to create {:?}", path)));
    }

    // Files opened by the callback after the last fragment stay empty
    let released = muxer.take_released_writers().len() as u32;
    drop(muxer);
    let mut segments = Vec::new();
    for n in 1..=released + 1 {
        let path = segment_path(out_dir, n);
        match std::fs::metadata(&path) {
            Ok(meta) if meta.len() == 0 => std::fs::remove_file(&path)
                .with_context(|| format!("Failed to remove empty segment {:?}", path))?,
            Ok(_) => segments.push(path),
            Err(_) => {}
        }
    }

    tracing::info!(
        input = %input.display(),
        segments = segments.len(),
        packets = stats.packets,
        "segmenting complete"
    );
    Ok(SegmentOutput { init, segments })
}

fn segment_path(dir: &Path, sequence_number: u32) -> PathBuf {
    dir.join(format!("segment-{sequence_number}.m4s"))
}

fn open_input(path: &Path, config: &Config) -> Result<Demuxer<BufReader<File>>> {
    if !path.exists() {
        anyhow::bail!("Input file does not exist: {:?}", path);
    }
    let file = File::open(path).with_context(|| format!("Failed to open {:?}", path))?;
    let mut demuxer = Demuxer::new(BufReader::new(file), config.demuxer.clone())?;
    demuxer
        .read_head()
        .with_context(|| format!("Failed to read MP4 head of {:?}", path))?;
    Ok(demuxer)
}

/// Where the packets of an input track go.
struct TrackMapping {
    kind: MediaKind,
    output: TrackId,
    timescale: u32,
}

fn copy_packets<R, W>(demuxer: &mut Demuxer<R>, muxer: &mut Muxer<W>) -> Result<RemuxStats>
where
    R: Read + Seek,
    W: Write,
{
    let out_timescale = muxer.config().timescale;
    let mut mapping: HashMap<TrackId, TrackMapping> = HashMap::new();
    for track in &demuxer.mp4_info()?.tracks {
        if mapping.values().any(|m| m.kind == track.kind) {
            tracing::warn!(
                track = %track.track_id,
                kind = %track.kind,
                "Skipping additional track of the same kind"
            );
            continue;
        }
        let output = add_track(muxer, track)?;
        mapping.insert(
            track.track_id,
            TrackMapping {
                kind: track.kind,
                output,
                timescale: track.timescale,
            },
        );
    }

    let mut stats = RemuxStats {
        tracks: mapping.len(),
        ..RemuxStats::default()
    };

    loop {
        let packet = match demuxer.read_packet() {
            Ok(packet) => packet,
            Err(Mp4Error::Eof) => break,
            Err(e) => return Err(e.into()),
        };
        let Some(target) = mapping.get(&packet.track_id) else {
            continue;
        };
        let pts = rescale(packet.pts, target.timescale, out_timescale);
        let dts = rescale(packet.dts, target.timescale, out_timescale);
        muxer
            .write(target.output, &packet.data, pts, dts)
            .with_context(|| {
                format!(
                    "Failed to write sample of track {} at dts {}",
                    packet.track_id, packet.dts
                )
            })?;
        stats.packets += 1;
        stats.bytes += packet.data.len() as u64;
    }

    Ok(stats)
}

fn add_track<W: Write>(muxer: &mut Muxer<W>, track: &TrackInfo) -> Result<TrackId> {
    let id = match track.params {
        MediaParams::Video { width, height } => muxer.add_video_track_with(
            track.codec_id,
            VideoTrackOptions {
                width: Some(width),
                height: Some(height),
                extradata: (!track.extradata.is_empty()).then(|| track.extradata.clone()),
            },
        )?,
        MediaParams::Audio {
            channel_count,
            sample_bits,
            sample_rate,
        } => muxer.add_audio_track_with_extradata(
            track.codec_id,
            channel_count,
            sample_bits,
            sample_rate,
            &track.extradata,
        )?,
    };
    Ok(id)
}

fn rescale(value: u64, from: u32, to: u32) -> u64 {
    if from == to || from == 0 {
        return value;
    }
    (u128::from(value) * u128::from(to) / u128::from(from)) as u64
}
