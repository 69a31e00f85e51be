//! Progressive MP4 output read back through the demuxer.

mod common;

use std::io::Cursor;

use common::*;
use moovforge_mp4::boxes::{BoxIter, BoxType, Moov, Mp4Box, HEADER_SIZE};
use moovforge_mp4::{
    CodecId, Demuxer, DemuxerConfig, MediaKind, MediaParams, Muxer, MuxerConfig, SyncSample,
    TrackId,
};

fn top_level_boxes(data: &[u8]) -> Vec<(BoxType, u64)> {
    BoxIter::new(data)
        .map(|child| {
            let (header, _) = child.unwrap();
            (header.box_type, header.size.unwrap())
        })
        .collect()
}

fn parse_moov(data: &[u8]) -> Moov {
    BoxIter::new(data)
        .map(Result::unwrap)
        .find(|(header, _)| header.box_type == BoxType::MOOV)
        .map(|(_, payload)| Moov::from_payload(payload).unwrap())
        .unwrap()
}

// ---------------------------------------------------------------------------
// Round trip
// ---------------------------------------------------------------------------

#[test]
fn av_roundtrip_preserves_every_sample() {
    let frames = av_session(4000, 25);
    let packets = demux(mux(MuxerConfig::progressive(), &frames));

    assert_eq!(packets.len(), frames.len());
    assert_eq!(as_frames(&packets, VIDEO), track_frames(&frames, VIDEO));
    assert_eq!(as_frames(&packets, AUDIO), track_frames(&frames, AUDIO));
    assert!(packets
        .iter()
        .filter(|p| p.track_id == VIDEO)
        .all(|p| p.codec_id == CodecId::H264));
}

#[test]
fn packets_come_back_in_file_order() {
    let frames = av_session(1000, 25);
    let packets = demux(mux(MuxerConfig::progressive(), &frames));

    let written: Vec<_> = frames.iter().map(|f| (f.track, f.dts)).collect();
    let read: Vec<_> = packets.iter().map(|p| (p.track_id, p.dts)).collect();
    assert_eq!(read, written);
}

#[test]
fn head_reports_tracks_and_brands() {
    let frames = av_session(2000, 25);
    let data = mux(MuxerConfig::progressive(), &frames);

    let mut demuxer = Demuxer::new(Cursor::new(data), DemuxerConfig::default()).unwrap();
    let tracks = demuxer.read_head().unwrap();
    assert_eq!(tracks.len(), 2);

    let video = &tracks[0];
    assert_eq!(video.track_id, VIDEO);
    assert_eq!(video.kind, MediaKind::Video);
    assert_eq!(video.sample_count, 50);
    assert_eq!(video.timescale, 1000);
    assert_eq!(video.end_dts, 2000);
    assert_eq!(
        video.params,
        MediaParams::Video {
            width: 1280,
            height: 720
        }
    );

    let audio = &tracks[1];
    assert_eq!(audio.codec_id, CodecId::G711A);
    assert_eq!(audio.sample_count, 100);
    assert_eq!(audio.duration, 2000);

    let info = demuxer.mp4_info().unwrap();
    assert_eq!(info.major_brand, "isom");
    assert!(info.compatible_brands.iter().any(|b| b == "mp41"));
    assert!(!info.fragmented);
    assert_eq!(info.duration, 2000);
}

// ---------------------------------------------------------------------------
// Layout
// ---------------------------------------------------------------------------

#[test]
fn mdat_size_is_patched_and_moov_appended() {
    let frames = av_session(1000, 25);
    let payload: u64 = frames.iter().map(|f| f.data.len() as u64).sum();
    let data = mux(MuxerConfig::progressive(), &frames);

    let boxes = top_level_boxes(&data);
    let types: Vec<_> = boxes.iter().map(|(t, _)| *t).collect();
    assert_eq!(
        types,
        vec![BoxType::FTYP, BoxType::FREE, BoxType::MDAT, BoxType::MOOV]
    );
    assert_eq!(boxes[1].1, HEADER_SIZE);
    // Annex-B start codes and length prefixes are both 4 bytes
    assert_eq!(boxes[2].1, HEADER_SIZE + payload);
}

#[test]
fn equal_sample_sizes_use_single_size_stsz() {
    let frames = track_frames(&av_session(1000, 25), AUDIO);
    let mut muxer = Muxer::new(Cursor::new(Vec::new()), MuxerConfig::progressive());
    muxer.add_audio_track(CodecId::G711A, 1, 16, 8000).unwrap();
    for frame in &frames {
        muxer
            .write(TrackId::new(1), &frame.data, frame.pts, frame.dts)
            .unwrap();
    }
    muxer.write_trailer().unwrap();

    let moov = parse_moov(muxer.get_ref().get_ref());
    let stbl = &moov.traks[0].mdia.minf.stbl;
    assert_eq!(stbl.stsz.sample_size, 160);
    assert!(stbl.stsz.entry_sizes.is_empty());
    assert!(stbl.stss.is_none());
    assert!(!stbl.chunk_offsets.is_co64());
}

#[test]
fn composition_offsets_only_when_needed() {
    let mut muxer = Muxer::new(Cursor::new(Vec::new()), MuxerConfig::progressive());
    let video = muxer.add_video_track(CodecId::H264).unwrap();
    muxer.write(video, &idr_frame(0), 0, 0).unwrap();
    muxer.write(video, &delta_frame(1), 40, 40).unwrap();
    muxer.write_trailer().unwrap();

    let moov = parse_moov(muxer.get_ref().get_ref());
    assert!(moov.traks[0].mdia.minf.stbl.ctts.is_none());

    let frames = av_session(1000, 25);
    let moov = parse_moov(&mux(MuxerConfig::progressive(), &frames));
    assert!(moov.traks[0].mdia.minf.stbl.ctts.is_some());
    assert!(moov.traks[1].mdia.minf.stbl.ctts.is_none());
}

// ---------------------------------------------------------------------------
// Timestamps
// ---------------------------------------------------------------------------

#[test]
fn nonzero_first_dts_is_preserved() {
    let mut muxer = Muxer::new(Cursor::new(Vec::new()), MuxerConfig::progressive());
    let audio = muxer.add_audio_track(CodecId::G711U, 1, 16, 8000).unwrap();
    for i in 0..5u64 {
        let dts = 1000 + i * 20;
        muxer.write(audio, &alaw_frame(i as u8), dts, dts).unwrap();
    }
    muxer.write_trailer().unwrap();

    let moov = parse_moov(muxer.get_ref().get_ref());
    let edts = moov.traks[0].edts.as_ref().unwrap();
    assert_eq!(edts.initial_delay(), 1000);

    let packets = demux(muxer.into_inner().into_inner());
    let dts: Vec<u64> = packets.iter().map(|p| p.dts).collect();
    assert_eq!(dts, vec![1000, 1020, 1040, 1060, 1080]);
}

#[test]
fn last_sample_repeats_previous_delta() {
    let mut muxer = Muxer::new(Cursor::new(Vec::new()), MuxerConfig::progressive());
    let audio = muxer.add_audio_track(CodecId::G711A, 1, 16, 8000).unwrap();
    muxer.write(audio, &alaw_frame(0), 0, 0).unwrap();
    muxer.write(audio, &alaw_frame(1), 30, 30).unwrap();
    muxer.write_trailer().unwrap();

    let mut demuxer = Demuxer::new(
        Cursor::new(muxer.into_inner().into_inner()),
        DemuxerConfig::default(),
    )
    .unwrap();
    let tracks = demuxer.read_head().unwrap();
    assert_eq!(tracks[0].end_dts, 60);
}

// ---------------------------------------------------------------------------
// Seeking
// ---------------------------------------------------------------------------

#[test]
fn sync_table_lists_key_frames() {
    let frames = av_session(6000, 50);
    let data = mux(MuxerConfig::progressive(), &frames);

    let mut demuxer = Demuxer::new(Cursor::new(data), DemuxerConfig::default()).unwrap();
    demuxer.read_head().unwrap();
    let syncs = demuxer.sync_table(VIDEO).unwrap();
    let dts: Vec<u64> = syncs.iter().map(|s: &SyncSample| s.dts).collect();
    assert_eq!(dts, vec![0, 2000, 4000]);
}

#[test]
fn seek_lands_on_preceding_key_frame() {
    let frames = av_session(6000, 50);
    let data = mux(MuxerConfig::progressive(), &frames);

    let mut demuxer = Demuxer::new(Cursor::new(data), DemuxerConfig::default()).unwrap();
    demuxer.read_head().unwrap();
    assert_eq!(demuxer.seek_time(3500).unwrap(), 2000);

    let packets = read_all(&mut demuxer);
    assert!(packets.iter().all(|p| p.dts >= 2000));
    let first_video = packets.iter().find(|p| p.track_id == VIDEO).unwrap();
    assert_eq!(first_video.dts, 2000);
    assert!(first_video.is_key_frame);
    let first_audio = packets.iter().find(|p| p.track_id == AUDIO).unwrap();
    assert_eq!(first_audio.dts, 2000);
}

#[test]
fn seek_without_video_uses_target() {
    let frames = track_frames(&av_session(2000, 25), AUDIO);
    let mut muxer = Muxer::new(Cursor::new(Vec::new()), MuxerConfig::progressive());
    let audio = muxer.add_audio_track(CodecId::G711A, 1, 16, 8000).unwrap();
    for frame in &frames {
        muxer.write(audio, &frame.data, frame.pts, frame.dts).unwrap();
    }
    muxer.write_trailer().unwrap();

    let mut demuxer = Demuxer::new(
        Cursor::new(muxer.into_inner().into_inner()),
        DemuxerConfig::default(),
    )
    .unwrap();
    demuxer.read_head().unwrap();
    assert_eq!(demuxer.seek_time(1010).unwrap(), 1010);
    assert_eq!(demuxer.read_packet().unwrap().dts, 1020);
}
