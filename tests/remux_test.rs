//! Integration tests for the remux, segment and info operations.

mod common;

use common::*;
use moovforge::config::Config;
use moovforge::remux;
use moovforge_mp4::{MuxMode, MuxerConfig};
use tempfile::tempdir;

fn fragmented_config(duration: u64) -> Config {
    let mut config = Config::default();
    config.muxer.mode = MuxMode::Fragmented;
    config.muxer.fragment.duration = duration;
    config
}

// ---------------------------------------------------------------------------
// Info
// ---------------------------------------------------------------------------

#[test]
fn info_of_progressive_file() {
    let dir = tempdir().unwrap();
    let input = dir.path().join("input.mp4");
    write_av_file(&input, MuxerConfig::progressive(), 2000);

    let info = remux::info(&input, &Config::default()).unwrap();
    assert!(!info.fragmented);
    assert_eq!(info.tracks.len(), 2);
    assert_eq!(info.tracks[0].sample_count, 50);
    assert_eq!(info.tracks[1].sample_count, 100);
    assert!(!info.tracks[0].extradata.is_empty());
}

#[test]
fn info_counts_every_fragment() {
    let dir = tempdir().unwrap();
    let input = dir.path().join("input.mp4");
    write_av_file(&input, MuxerConfig::fragmented(1000), 4000);

    let info = remux::info(&input, &Config::default()).unwrap();
    assert!(info.fragmented);
    assert_eq!(info.tracks[0].sample_count, 100);
    assert_eq!(info.tracks[1].sample_count, 200);
}

#[test]
fn info_of_missing_file() {
    let err = remux::info(std::path::Path::new("/nonexistent.mp4"), &Config::default())
        .unwrap_err();
    assert!(err.to_string().contains("does not exist"));
}

#[test]
fn info_of_non_mp4_file() {
    let dir = tempdir().unwrap();
    let input = dir.path().join("notes.txt");
    std::fs::write(&input, b"not an mp4 file at all").unwrap();
    assert!(remux::info(&input, &Config::default()).is_err());
}

// ---------------------------------------------------------------------------
// Remux
// ---------------------------------------------------------------------------

#[test]
fn progressive_to_fragmented_and_back() {
    let dir = tempdir().unwrap();
    let input = dir.path().join("input.mp4");
    let fragmented = dir.path().join("fragmented.mp4");
    let progressive = dir.path().join("progressive.mp4");
    write_av_file(&input, MuxerConfig::progressive(), 3000);

    let stats = remux::remux(&input, &fragmented, &fragmented_config(1000)).unwrap();
    assert_eq!(stats.tracks, 2);
    assert_eq!(stats.packets, 75 + 150);

    let stats = remux::remux(&fragmented, &progressive, &Config::default()).unwrap();
    assert_eq!(stats.packets, 75 + 150);

    let original = read_file_packets(&input);
    let round_trip = read_file_packets(&progressive);
    assert_eq!(
        track_samples(&round_trip, VIDEO),
        track_samples(&original, VIDEO)
    );
    assert_eq!(
        track_samples(&round_trip, AUDIO),
        track_samples(&original, AUDIO)
    );

    assert!(remux::info(&fragmented, &Config::default()).unwrap().fragmented);
    assert!(!remux::info(&progressive, &Config::default()).unwrap().fragmented);
}

#[test]
fn remux_rescales_to_output_timescale() {
    let dir = tempdir().unwrap();
    let input = dir.path().join("input.mp4");
    let output = dir.path().join("output.mp4");
    write_av_file(&input, MuxerConfig::progressive(), 1000);

    let mut config = Config::default();
    config.muxer.timescale = 90_000;
    remux::remux(&input, &output, &config).unwrap();

    let info = remux::info(&output, &Config::default()).unwrap();
    assert_eq!(info.tracks[0].timescale, 90_000);
    assert_eq!(info.tracks[0].end_dts, 90_000);

    let original = track_samples(&read_file_packets(&input), VIDEO);
    let rescaled = track_samples(&read_file_packets(&output), VIDEO);
    assert_eq!(original.len(), rescaled.len());
    for (a, b) in original.iter().zip(&rescaled) {
        assert_eq!(b.0, a.0 * 90);
        assert_eq!(b.1, a.1 * 90);
        assert_eq!(b.3, a.3);
    }
}

// ---------------------------------------------------------------------------
// Segment
// ---------------------------------------------------------------------------

#[test]
fn segment_writes_init_and_media_segments() {
    let dir = tempdir().unwrap();
    let input = dir.path().join("input.mp4");
    let out_dir = dir.path().join("segments");
    write_av_file(&input, MuxerConfig::progressive(), 4000);

    let output = remux::segment(&input, &out_dir, &fragmented_config(1000)).unwrap();
    assert_eq!(output.init, out_dir.join(remux::INIT_SEGMENT_NAME));
    assert!(output.segments.len() >= 4);
    assert!(output.segments.iter().all(|s| s.exists()));

    // The trailing empty segment is removed
    let next = out_dir.join(format!("segment-{}.m4s", output.segments.len() + 1));
    assert!(!next.exists());

    // init + every segment is a complete fragmented file
    let mut joined = std::fs::read(&output.init).unwrap();
    for segment in &output.segments {
        joined.extend_from_slice(&std::fs::read(segment).unwrap());
    }
    let original = read_file_packets(&input);
    let packets = read_packets(joined);
    assert_eq!(packets.len(), original.len());
    assert_eq!(track_samples(&packets, VIDEO), track_samples(&original, VIDEO));
}

#[test]
fn segment_forces_fragmented_mode() {
    let dir = tempdir().unwrap();
    let input = dir.path().join("input.mp4");
    let out_dir = dir.path().join("segments");
    write_av_file(&input, MuxerConfig::progressive(), 2000);

    // Progressive mode in the config is overridden
    let output = remux::segment(&input, &out_dir, &Config::default()).unwrap();
    assert!(!output.segments.is_empty());

    let init = std::fs::read(&output.init).unwrap();
    assert_eq!(&init[4..8], b"ftyp");
    let first = std::fs::read(&output.segments[0]).unwrap();
    assert_eq!(&first[4..8], b"moof");
}

#[test]
fn segment_fails_when_a_segment_file_cannot_be_created() {
    let dir = tempdir().unwrap();
    let input = dir.path().join("input.mp4");
    let out_dir = dir.path().join("segments");
    write_av_file(&input, MuxerConfig::progressive(), 4000);

    // A directory in the way of the second segment
    let blocked = out_dir.join("segment-2.m4s");
    std::fs::create_dir_all(&blocked).unwrap();

    let err = remux::segment(&input, &out_dir, &fragmented_config(1000)).unwrap_err();
    assert!(format!("{err:#}").contains("segment-2.m4s"));
}
