//! Shared fixtures for the muxer/demuxer integration tests.

#![allow(dead_code)]

use std::io::Cursor;

use moovforge_mp4::{
    CodecId, Demuxer, DemuxerConfig, Error, Muxer, MuxerConfig, Packet, TrackId,
};

/// Baseline 1280x720 SPS.
pub const SPS: [u8; 9] = [0x67, 0x42, 0xC0, 0x1F, 0xDA, 0x01, 0x40, 0x16, 0xE4];
pub const PPS: [u8; 4] = [0x68, 0xCE, 0x3C, 0x80];

pub const VIDEO: TrackId = TrackId::new(1);
pub const AUDIO: TrackId = TrackId::new(2);

/// IDR access unit with in-band SPS/PPS. `tag` makes the slice unique.
pub fn idr_frame(tag: u8) -> Vec<u8> {
    let mut au = Vec::new();
    for nalu in [&SPS[..], &PPS[..], &[0x65, 0x88, 0x84, 0x80 | tag][..]] {
        au.extend_from_slice(&[0, 0, 0, 1]);
        au.extend_from_slice(nalu);
    }
    au
}

/// Non-IDR access unit.
pub fn delta_frame(tag: u8) -> Vec<u8> {
    vec![0, 0, 0, 1, 0x41, 0x9A, 0x02, 0x80 | tag]
}

/// 20 ms of 8 kHz A-law.
pub fn alaw_frame(tag: u8) -> Vec<u8> {
    vec![0xD5 ^ tag; 160]
}

/// One sample as fed to the muxer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    pub track: TrackId,
    pub data: Vec<u8>,
    pub pts: u64,
    pub dts: u64,
    pub key: bool,
}

/// 25 fps H.264 with a key frame every `gop` frames, plus 20 ms A-law
/// frames, interleaved by dts.
pub fn av_session(duration_ms: u64, gop: u64) -> Vec<Frame> {
    let mut frames = Vec::new();
    for i in 0..duration_ms / 40 {
        let key = i % gop == 0;
        let tag = (i % 128) as u8;
        let dts = i * 40;
        frames.push(Frame {
            track: VIDEO,
            data: if key { idr_frame(tag) } else { delta_frame(tag) },
            pts: dts + 40 * (i % 3),
            dts,
            key,
        });
    }
    for j in 0..duration_ms / 20 {
        let dts = j * 20;
        frames.push(Frame {
            track: AUDIO,
            data: alaw_frame((j % 64) as u8),
            pts: dts,
            dts,
            key: true,
        });
    }
    frames.sort_by_key(|f| (f.dts, f.track));
    frames
}

/// Frames of one track, in decode order.
pub fn track_frames(frames: &[Frame], track: TrackId) -> Vec<Frame> {
    frames.iter().filter(|f| f.track == track).cloned().collect()
}

/// Add the standard video and audio tracks.
pub fn add_av_tracks<W: std::io::Write>(muxer: &mut Muxer<W>) {
    assert_eq!(muxer.add_video_track(CodecId::H264).unwrap(), VIDEO);
    assert_eq!(
        muxer.add_audio_track(CodecId::G711A, 1, 16, 8000).unwrap(),
        AUDIO
    );
}

/// Mux `frames` into memory and finalize.
pub fn mux(config: MuxerConfig, frames: &[Frame]) -> Vec<u8> {
    let mut muxer = Muxer::new(Cursor::new(Vec::new()), config);
    add_av_tracks(&mut muxer);
    for frame in frames {
        muxer
            .write(frame.track, &frame.data, frame.pts, frame.dts)
            .unwrap();
    }
    muxer.write_trailer().unwrap();
    muxer.into_inner().into_inner()
}

/// Read every packet until end of stream.
pub fn read_all<R: std::io::Read + std::io::Seek>(demuxer: &mut Demuxer<R>) -> Vec<Packet> {
    let mut packets = Vec::new();
    loop {
        match demuxer.read_packet() {
            Ok(packet) => packets.push(packet),
            Err(Error::Eof) => break,
            Err(e) => panic!("read_packet failed: {e}"),
        }
    }
    packets
}

pub fn demux(data: Vec<u8>) -> Vec<Packet> {
    let mut demuxer = Demuxer::new(Cursor::new(data), DemuxerConfig::default()).unwrap();
    demuxer.read_head().unwrap();
    read_all(&mut demuxer)
}

/// Packets converted back to frames for comparison.
pub fn as_frames(packets: &[Packet], track: TrackId) -> Vec<Frame> {
    packets
        .iter()
        .filter(|p| p.track_id == track)
        .map(|p| Frame {
            track: p.track_id,
            data: p.data.to_vec(),
            pts: p.pts,
            dts: p.dts,
            key: p.is_key_frame,
        })
        .collect()
}
