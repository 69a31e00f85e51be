//! Fixture files for the command tests, written with the library muxer.

#![allow(dead_code)]

use std::fs::File;
use std::io::BufWriter;
use std::path::Path;

use moovforge_common::{CodecId, Packet, TrackId};
use moovforge_mp4::{Demuxer, DemuxerConfig, Error, Muxer, MuxerConfig};

/// Baseline 1280x720 SPS.
const SPS: [u8; 9] = [0x67, 0x42, 0xC0, 0x1F, 0xDA, 0x01, 0x40, 0x16, 0xE4];
const PPS: [u8; 4] = [0x68, 0xCE, 0x3C, 0x80];

pub const VIDEO: TrackId = TrackId::new(1);
pub const AUDIO: TrackId = TrackId::new(2);

fn idr_frame(tag: u8) -> Vec<u8> {
    let mut au = Vec::new();
    for nalu in [&SPS[..], &PPS[..], &[0x65, 0x88, 0x84, 0x80 | tag][..]] {
        au.extend_from_slice(&[0, 0, 0, 1]);
        au.extend_from_slice(nalu);
    }
    au
}

fn delta_frame(tag: u8) -> Vec<u8> {
    vec![0, 0, 0, 1, 0x41, 0x9A, 0x02, 0x80 | tag]
}

/// Write `duration_ms` of 25 fps H.264 (key frame every second) and 20 ms
/// A-law frames to `path`.
pub fn write_av_file(path: &Path, config: MuxerConfig, duration_ms: u64) {
    let file = BufWriter::new(File::create(path).unwrap());
    let mut muxer = Muxer::new(file, config);
    let video = muxer.add_video_track(CodecId::H264).unwrap();
    let audio = muxer.add_audio_track(CodecId::G711A, 1, 16, 8000).unwrap();

    let mut frames = Vec::new();
    for i in 0..duration_ms / 40 {
        let tag = (i % 128) as u8;
        let data = if i % 25 == 0 {
            idr_frame(tag)
        } else {
            delta_frame(tag)
        };
        frames.push((i * 40, video, data, i * 40 + 40 * (i % 3)));
    }
    for j in 0..duration_ms / 20 {
        frames.push((j * 20, audio, vec![0xD5 ^ (j % 64) as u8; 160], j * 20));
    }
    frames.sort_by_key(|(dts, track, _, _)| (*dts, *track));

    for (dts, track, data, pts) in frames {
        muxer.write(track, &data, pts, dts).unwrap();
    }
    muxer.write_trailer().unwrap();
}

/// Every packet of an MP4 file held in memory.
pub fn read_packets(data: Vec<u8>) -> Vec<Packet> {
    let mut demuxer = Demuxer::new(std::io::Cursor::new(data), DemuxerConfig::default()).unwrap();
    demuxer.read_head().unwrap();
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

pub fn read_file_packets(path: &Path) -> Vec<Packet> {
    read_packets(std::fs::read(path).unwrap())
}

/// `(dts, pts, key, payload)` of one track's packets.
pub fn track_samples(packets: &[Packet], track: TrackId) -> Vec<(u64, u64, bool, Vec<u8>)> {
    packets
        .iter()
        .filter(|p| p.track_id == track)
        .map(|p| (p.dts, p.pts, p.is_key_frame, p.data.to_vec()))
        .collect()
}
