//! Fragmented output: fragment boundaries, init segments and writer rebinding.

mod common;

use std::cell::{Cell, RefCell};
use std::fs::File;
use std::io::{self, Cursor, Write};
use std::rc::Rc;

use common::*;
use moovforge_mp4::boxes::{BoxIter, BoxType};
use moovforge_mp4::{
    CodecId, Demuxer, DemuxerConfig, Error, FragmentInfo, Muxer, MuxerConfig,
};

/// Muxer whose fragment callback records every `FragmentInfo`.
fn recording_muxer(
    config: MuxerConfig,
) -> (Muxer<Cursor<Vec<u8>>>, Rc<RefCell<Vec<FragmentInfo>>>) {
    let infos = Rc::new(RefCell::new(Vec::new()));
    let mut muxer = Muxer::new(Cursor::new(Vec::new()), config);
    let sink = Rc::clone(&infos);
    muxer.on_new_fragment(move |info| {
        sink.borrow_mut().push(*info);
        None
    });
    (muxer, infos)
}

fn box_types(data: &[u8]) -> Vec<BoxType> {
    BoxIter::new(data)
        .map(|child| child.unwrap().0.box_type)
        .collect()
}

// ---------------------------------------------------------------------------
// Fragment boundaries
// ---------------------------------------------------------------------------

#[test]
fn fragment_closes_when_threshold_is_reached() {
    let (mut muxer, infos) = recording_muxer(MuxerConfig::fragmented(2000));
    let video = muxer.add_video_track(CodecId::H264).unwrap();

    for i in 0..50u64 {
        let frame = if i == 0 { idr_frame(0) } else { delta_frame(i as u8) };
        muxer.write(video, &frame, i * 40, i * 40).unwrap();
    }
    assert!(infos.borrow().is_empty());

    muxer.write(video, &idr_frame(50), 2000, 2000).unwrap();
    let infos = infos.borrow();
    assert_eq!(infos.len(), 1);

    let info = infos[0];
    assert_eq!(info.sequence_number, 1);
    assert_eq!(info.first_dts, 0);
    assert_eq!(info.first_pts, 0);
    assert_eq!(info.duration, 1960);
    assert_eq!(info.sample_count, 50);
    // The init segment precedes the first moof
    assert!(info.moof_offset > 0);
    assert_eq!(muxer.position(), info.moof_offset + info.size);
}

#[test]
fn keyframe_alignment_delays_the_cut() {
    let mut config = MuxerConfig::fragmented(1000);
    config.fragment.align_to_keyframe = true;
    let (mut muxer, infos) = recording_muxer(config);
    let video = muxer.add_video_track(CodecId::H264).unwrap();

    for frame in track_frames(&av_session(6000, 50), VIDEO) {
        muxer.write(video, &frame.data, frame.pts, frame.dts).unwrap();
    }
    muxer.write_trailer().unwrap();

    let first_dts: Vec<u64> = infos.borrow().iter().map(|i| i.first_dts).collect();
    assert_eq!(first_dts, vec![0, 2000, 4000]);
}

#[test]
fn flush_fragment_forces_a_cut() {
    let (mut muxer, infos) = recording_muxer(MuxerConfig::fragmented(10_000));
    let audio = muxer.add_audio_track(CodecId::G711A, 1, 16, 8000).unwrap();

    for i in 0..3u64 {
        muxer.write(audio, &alaw_frame(i as u8), i * 20, i * 20).unwrap();
    }
    muxer.flush_fragment().unwrap();
    // Nothing left to flush
    muxer.flush_fragment().unwrap();

    let infos = infos.borrow();
    assert_eq!(infos.len(), 1);
    assert_eq!(infos[0].sample_count, 3);
    assert_eq!(infos[0].duration, 40);
}

#[test]
fn sequence_numbers_increase() {
    let (mut muxer, infos) = recording_muxer(MuxerConfig::fragmented(1000));
    add_av_tracks(&mut muxer);
    for frame in av_session(5000, 25) {
        muxer
            .write(frame.track, &frame.data, frame.pts, frame.dts)
            .unwrap();
    }
    muxer.close().unwrap();

    let sequence: Vec<u32> = infos.borrow().iter().map(|i| i.sequence_number).collect();
    let expected: Vec<u32> = (1..=sequence.len() as u32).collect();
    assert!(sequence.len() >= 5);
    assert_eq!(sequence, expected);
    assert!(muxer.is_closed());
}

/// In-memory sink whose writes fail while `failing` is set.
struct FailingWriter {
    data: Rc<RefCell<Vec<u8>>>,
    failing: Rc<Cell<bool>>,
}

impl Write for FailingWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        if self.failing.get() {
            return Err(io::Error::other("disk full"));
        }
        self.data.borrow_mut().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

#[test]
fn failed_fragment_write_keeps_samples_queued() {
    let mut config = MuxerConfig::fragmented(2000);
    config.fragment.embed_init_segment = false;
    let data = Rc::new(RefCell::new(Vec::new()));
    let failing = Rc::new(Cell::new(false));
    let writer = FailingWriter {
        data: Rc::clone(&data),
        failing: Rc::clone(&failing),
    };

    let infos = Rc::new(RefCell::new(Vec::new()));
    let mut muxer = Muxer::new(writer, config);
    let sink = Rc::clone(&infos);
    muxer.on_new_fragment(move |info| {
        sink.borrow_mut().push(*info);
        None
    });
    let video = muxer.add_video_track(CodecId::H264).unwrap();

    for i in 0..50u64 {
        let frame = if i == 0 { idr_frame(0) } else { delta_frame(i as u8) };
        muxer.write(video, &frame, i * 40, i * 40).unwrap();
    }

    failing.set(true);
    let err = muxer.write(video, &idr_frame(50), 2000, 2000).unwrap_err();
    assert!(matches!(err, Error::Io(_)));
    assert!(infos.borrow().is_empty());
    assert!(data.borrow().is_empty());

    // The next cut writes the queued fragment in full
    failing.set(false);
    for i in 51..61u64 {
        let frame = if i == 51 { idr_frame(51) } else { delta_frame(i as u8) };
        muxer.write(video, &frame, i * 40, i * 40).unwrap();
    }
    muxer.flush_fragment().unwrap();

    let recorded = infos.borrow().clone();
    assert_eq!(recorded.len(), 2);
    assert_eq!(recorded[0].sequence_number, 1);
    assert_eq!(recorded[0].first_dts, 0);
    assert_eq!(recorded[0].sample_count, 50);
    assert_eq!(recorded[1].sequence_number, 2);
    assert_eq!(recorded[1].first_dts, 2040);
    assert_eq!(recorded[1].sample_count, 10);

    let mut file = Vec::new();
    muxer.write_init_segment(&mut file).unwrap();
    file.extend_from_slice(&data.borrow());
    let dts: Vec<u64> = demux(file).iter().map(|p| p.dts).collect();
    let expected: Vec<u64> = (0..50u64).chain(51..61).map(|i| i * 40).collect();
    assert_eq!(dts, expected);
}

// ---------------------------------------------------------------------------
// Round trip
// ---------------------------------------------------------------------------

#[test]
fn fragmented_roundtrip_preserves_every_sample() {
    let frames = av_session(5000, 25);
    let data = mux(MuxerConfig::fragmented(1000), &frames);

    let types = box_types(&data);
    assert_eq!(&types[..3], &[BoxType::FTYP, BoxType::MOOV, BoxType::MOOF]);

    let mut demuxer = Demuxer::new(Cursor::new(data), DemuxerConfig::default()).unwrap();
    demuxer.read_head().unwrap();
    assert!(demuxer.mp4_info().unwrap().fragmented);
    assert_eq!(demuxer.mp4_info().unwrap().major_brand, "iso5");

    let packets = read_all(&mut demuxer);
    assert_eq!(packets.len(), frames.len());
    assert_eq!(as_frames(&packets, VIDEO), track_frames(&frames, VIDEO));
    assert_eq!(as_frames(&packets, AUDIO), track_frames(&frames, AUDIO));

    let info = demuxer.mp4_info().unwrap();
    assert_eq!(info.tracks[0].sample_count, 125);
    assert_eq!(info.tracks[1].sample_count, 250);
}

#[test]
fn index_all_counts_every_fragment() {
    let data = mux(MuxerConfig::fragmented(1000), &av_session(4000, 25));
    let mut demuxer = Demuxer::new(Cursor::new(data), DemuxerConfig::default()).unwrap();
    demuxer.read_head().unwrap();

    let info = demuxer.index_all().unwrap();
    assert_eq!(info.tracks[0].sample_count, 100);
    assert_eq!(info.tracks[0].end_dts, 4000);
    assert_eq!(info.tracks[1].sample_count, 200);

    // Indexing does not move the read position
    assert_eq!(demuxer.read_packet().unwrap().dts, 0);
}

#[test]
fn seek_indexes_fragments_forward() {
    let frames = av_session(6000, 50);
    let data = mux(MuxerConfig::fragmented(2000), &frames);

    let mut demuxer = Demuxer::new(Cursor::new(data), DemuxerConfig::default()).unwrap();
    let tracks = demuxer.read_head().unwrap();
    // Only the first fragment is indexed up front
    assert_eq!(tracks[0].sample_count, 50);
    assert!(demuxer.sync_table(VIDEO).unwrap().len() < 3);

    assert_eq!(demuxer.seek_time(3500).unwrap(), 2000);
    let packet = demuxer.read_packet().unwrap();
    assert_eq!(packet.track_id, VIDEO);
    assert_eq!(packet.dts, 2000);
    assert!(packet.is_key_frame);
}

// ---------------------------------------------------------------------------
// Init segments and sinks
// ---------------------------------------------------------------------------

#[test]
fn standalone_init_segment() {
    let mut config = MuxerConfig::fragmented(1000);
    config.fragment.embed_init_segment = false;
    let frames = av_session(3000, 25);

    let mut muxer = Muxer::new(Cursor::new(Vec::new()), config);
    add_av_tracks(&mut muxer);
    for frame in &frames {
        muxer
            .write(frame.track, &frame.data, frame.pts, frame.dts)
            .unwrap();
    }
    let mut init = Vec::new();
    muxer.write_init_segment(&mut init).unwrap();
    muxer.write_trailer().unwrap();

    let media = muxer.into_inner().into_inner();
    assert_eq!(box_types(&init), vec![BoxType::FTYP, BoxType::MOOV]);
    assert_eq!(box_types(&media)[0], BoxType::MOOF);

    let mut file = init;
    file.extend_from_slice(&media);
    let packets = demux(file);
    assert_eq!(as_frames(&packets, VIDEO), track_frames(&frames, VIDEO));
    assert_eq!(as_frames(&packets, AUDIO), track_frames(&frames, AUDIO));
}

#[test]
fn callback_rebinds_writer_per_fragment() {
    let dir = tempfile::tempdir().unwrap();
    let path = |n: u32| dir.path().join(format!("segment-{n}.mp4"));

    let first = File::create(path(1)).unwrap();
    let mut muxer = Muxer::new(first, MuxerConfig::fragmented(1000));
    let video = muxer.add_video_track(CodecId::H264).unwrap();

    let root = dir.path().to_path_buf();
    muxer.on_new_fragment(move |info| {
        File::create(root.join(format!("segment-{}.mp4", info.sequence_number + 1))).ok()
    });

    let frames = track_frames(&av_session(3000, 25), VIDEO);
    for frame in &frames {
        muxer.write(video, &frame.data, frame.pts, frame.dts).unwrap();
    }
    muxer.close().unwrap();

    let released = muxer.take_released_writers();
    assert_eq!(released.len(), 3);
    drop(released);
    drop(muxer);

    // Every segment carries its own init segment and starts at its own dts
    let mut total = 0;
    for n in 1..=3 {
        let file = File::open(path(n)).unwrap();
        let mut demuxer = Demuxer::new(file, DemuxerConfig::default()).unwrap();
        demuxer.read_head().unwrap();
        let packets = read_all(&mut demuxer);
        assert_eq!(packets[0].dts, (u64::from(n) - 1) * 1000);
        assert!(packets[0].is_key_frame);
        total += packets.len();
    }
    assert_eq!(total, frames.len());

    // The writer bound after the last fragment never received data
    assert_eq!(std::fs::metadata(path(4)).unwrap().len(), 0);
}

#[test]
fn rebind_writer_returns_previous_sink() {
    let mut muxer = Muxer::new(Cursor::new(Vec::new()), MuxerConfig::fragmented(1000));
    let audio = muxer.add_audio_track(CodecId::G711A, 1, 16, 8000).unwrap();
    muxer.write(audio, &alaw_frame(0), 0, 0).unwrap();
    muxer.write(audio, &alaw_frame(1), 20, 20).unwrap();
    muxer.flush_fragment().unwrap();

    let previous = muxer.rebind_writer(Cursor::new(Vec::new())).unwrap();
    assert!(!previous.get_ref().is_empty());
    assert_eq!(muxer.position(), 0);

    muxer.write(audio, &alaw_frame(2), 40, 40).unwrap();
    muxer.close().unwrap();
    let types = box_types(muxer.get_ref().get_ref());
    assert_eq!(types, vec![BoxType::FTYP, BoxType::MOOV, BoxType::MOOF, BoxType::MDAT]);
}
