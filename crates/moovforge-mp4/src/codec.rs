//! Per-codec behaviour behind a single trait.
//!
//! A track picks its [`SampleEntryCodec`] once, when it is created. The codec
//! turns collaborator payloads into stored samples, decides key frames,
//! builds the `stsd` entry and, on the read side, turns stored samples back
//! into collaborator payloads.

use std::fmt;

use moovforge_bitstream::aac::{self, AdtsHeader, AudioSpecificConfig};
use moovforge_bitstream::hevc::NalUnitType as HevcNalType;
use moovforge_bitstream::h264::NalUnitType as H264NalType;
use moovforge_bitstream::{
    annexb_to_avcc, avcc_to_annexb_in_place, h264, hevc, split_annexb, split_avcc,
    AvcDecoderConfigurationRecord, BitstreamError, HevcDecoderConfigurationRecord,
    NALU_LENGTH_SIZE,
};
use moovforge_common::{CodecId, MediaKind};
#[cfg(feature = "serialize")]
use serde::Serialize;

use crate::boxes::{
    AudioSampleEntry, BoxType, Esds, HandlerType, MediaHeader, SampleEntry, VisualSampleEntry,
    OBJECT_TYPE_AAC, OBJECT_TYPE_MP3, OBJECT_TYPE_MPEG2_AUDIO,
};
use crate::config::DemuxerConfig;
use crate::{Error, Result};

/// Samples per MPEG-1 Layer III frame.
const MP3_SAMPLES_PER_FRAME: u64 = 1152;

/// A payload after ingest, ready to be stored.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IngestedSample {
    pub data: Vec<u8>,
    pub is_key_frame: bool,
}

/// Presentation parameters of a track.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serialize", derive(Serialize))]
#[cfg_attr(feature = "serialize", serde(tag = "kind", rename_all = "lowercase"))]
pub enum MediaParams {
    Video {
        width: u32,
        height: u32,
    },
    Audio {
        channel_count: u16,
        sample_bits: u16,
        sample_rate: u32,
    },
}

/// Codec-specific behaviour of a track.
pub trait SampleEntryCodec: fmt::Debug + Send {
    fn codec_id(&self) -> CodecId;

    fn media_kind(&self) -> MediaKind {
        self.codec_id().media_kind()
    }

    /// Convert a collaborator payload into stored sample bytes.
    fn ingest(&mut self, payload: &[u8]) -> Result<IngestedSample>;

    /// The `stsd` entry describing this track.
    fn sample_entry(&self) -> Result<SampleEntry>;

    fn media_header(&self) -> MediaHeader;

    fn handler_type(&self) -> HandlerType;

    fn params(&self) -> MediaParams;

    /// Decoder configuration record (`avcC`, `hvcC` or AAC
    /// `AudioSpecificConfig`), empty when the codec has none.
    fn extradata(&self) -> Vec<u8> {
        Vec::new()
    }

    /// Duration of a sample whose successor is unknown and which has no
    /// predecessor to copy the delta from.
    fn default_sample_duration(&self, timescale: u32, payload_len: usize) -> u32;

    /// Convert stored sample bytes back into collaborator form.
    fn restore(&self, sample: Vec<u8>) -> Result<Vec<u8>>;
}

/// H.264 and H.265 tracks.
#[derive(Debug, Clone)]
pub struct VideoSampleEntryCodec {
    codec_id: CodecId,
    width: u32,
    height: u32,
    vps: Vec<Vec<u8>>,
    sps: Vec<Vec<u8>>,
    pps: Vec<Vec<u8>>,
    /// Read side: NAL length prefix size from the decoder configuration.
    nalu_length_size: usize,
    /// Duration of a lone sample.
    frame_duration: u32,
    /// Sample entry type for H.265 (`hvc1` or `hev1`).
    hevc_box_type: BoxType,
}

impl VideoSampleEntryCodec {
    /// Codec for a new video track.
    pub fn new(codec_id: CodecId, frame_duration: u32) -> Result<Self> {
        match codec_id {
            CodecId::H264 | CodecId::H265 => Ok(Self {
                codec_id,
                width: 0,
                height: 0,
                vps: Vec::new(),
                sps: Vec::new(),
                pps: Vec::new(),
                nalu_length_size: NALU_LENGTH_SIZE,
                frame_duration: frame_duration.max(1),
                hevc_box_type: BoxType::HVC1,
            }),
            codec if codec.is_audio() => Err(Error::CodecMismatch {
                codec,
                expected: MediaKind::Video,
            }),
            codec => Err(Error::unsupported(format!("{} cannot be stored in MP4", codec))),
        }
    }

    /// Set the presentation size instead of taking it from the SPS.
    pub fn with_dimensions(mut self, width: u32, height: u32) -> Self {
        self.width = width;
        self.height = height;
        self
    }

    /// Seed parameter sets from an `avcC` or `hvcC` record.
    pub fn with_extradata(mut self, extradata: &[u8]) -> Result<Self> {
        match self.codec_id {
            CodecId::H265 => {
                let record = HevcDecoderConfigurationRecord::parse(extradata)?;
                self.nalu_length_size = record.nalu_length_size();
                self.vps = record.nalus_of_type(HevcNalType::Vps);
                self.sps = record.nalus_of_type(HevcNalType::Sps);
                self.pps = record.nalus_of_type(HevcNalType::Pps);
            }
            _ => {
                let record = AvcDecoderConfigurationRecord::parse(extradata)?;
                self.nalu_length_size = record.nalu_length_size();
                self.sps = record.sps;
                self.pps = record.pps;
            }
        }
        self.update_dimensions();
        Ok(self)
    }

    /// Read-side codec for an `avc1`, `hvc1` or `hev1` entry.
    pub fn from_sample_entry(entry: &SampleEntry) -> Result<Self> {
        let (codec, visual, record, box_type) = match entry {
            SampleEntry::Avc1 { visual, avcc } => (CodecId::H264, visual, avcc, BoxType::AVC1),
            SampleEntry::Hevc {
                box_type,
                visual,
                hvcc,
            } => (CodecId::H265, visual, hvcc, *box_type),
            other => {
                return Err(Error::unsupported(format!(
                    "{} is not a video sample entry",
                    other.box_type()
                )))
            }
        };

        let mut codec = Self::new(codec, 1)?
            .with_dimensions(visual.width as u32, visual.height as u32)
            .with_extradata(record)?;
        if codec.codec_id == CodecId::H265 {
            codec.hevc_box_type = box_type;
        }
        Ok(codec)
    }

    pub fn dimensions(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    /// Parameter sets captured so far as `(vps, sps, pps)`.
    pub fn parameter_sets(&self) -> (&[Vec<u8>], &[Vec<u8>], &[Vec<u8>]) {
        (&self.vps, &self.sps, &self.pps)
    }

    fn update_dimensions(&mut self) {
        if self.width != 0 && self.height != 0 {
            return;
        }
        let Some(sps) = self.sps.first() else {
            return;
        };
        let parsed = match self.codec_id {
            CodecId::H265 => hevc::parse_sps(sps).map(|s| (s.width, s.height)),
            _ => h264::parse_sps(sps).map(|s| (s.width, s.height)),
        };
        if let Ok((width, height)) = parsed {
            self.width = width;
            self.height = height;
        }
    }

    fn capture_parameter_sets(&mut self, nalus: &[&[u8]]) {
        let (want_vps, want_sps, want_pps) =
            (self.vps.is_empty(), self.sps.is_empty(), self.pps.is_empty());

        for nalu in nalus {
            match self.codec_id {
                CodecId::H265 => match hevc::nal_type(nalu) {
                    Some(HevcNalType::Vps) if want_vps => self.vps.push(nalu.to_vec()),
                    Some(HevcNalType::Sps) if want_sps => self.sps.push(nalu.to_vec()),
                    Some(HevcNalType::Pps) if want_pps => self.pps.push(nalu.to_vec()),
                    _ => {}
                },
                _ => match h264::nal_type(nalu) {
                    Some(H264NalType::Sps) if want_sps => self.sps.push(nalu.to_vec()),
                    Some(H264NalType::Pps) if want_pps => self.pps.push(nalu.to_vec()),
                    _ => {}
                },
            }
        }

        if want_sps && !self.sps.is_empty() {
            self.update_dimensions();
        }
    }

    fn visual_entry(&self) -> VisualSampleEntry {
        VisualSampleEntry::new(
            self.width.min(u16::MAX as u32) as u16,
            self.height.min(u16::MAX as u32) as u16,
        )
    }
}

fn as_slices(sets: &[Vec<u8>]) -> Vec<&[u8]> {
    sets.iter().map(Vec::as_slice).collect()
}

impl SampleEntryCodec for VideoSampleEntryCodec {
    fn codec_id(&self) -> CodecId {
        self.codec_id
    }

    fn ingest(&mut self, payload: &[u8]) -> Result<IngestedSample> {
        let nalus = split_annexb(payload);
        if nalus.is_empty() {
            return Err(BitstreamError::invalid("access unit without NAL units").into());
        }
        self.capture_parameter_sets(&nalus);

        let is_key_frame = match self.codec_id {
            CodecId::H265 => hevc::is_key_frame(nalus.iter().copied()),
            _ => h264::is_key_frame(nalus.iter().copied()),
        };

        Ok(IngestedSample {
            data: annexb_to_avcc(payload),
            is_key_frame,
        })
    }

    fn sample_entry(&self) -> Result<SampleEntry> {
        let visual = self.visual_entry();
        match self.codec_id {
            CodecId::H265 => {
                let record = HevcDecoderConfigurationRecord::from_parameter_sets(
                    &as_slices(&self.vps),
                    &as_slices(&self.sps),
                    &as_slices(&self.pps),
                )?;
                Ok(SampleEntry::Hevc {
                    box_type: self.hevc_box_type,
                    visual,
                    hvcc: record.encode(),
                })
            }
            _ => {
                let record = AvcDecoderConfigurationRecord::from_parameter_sets(
                    &as_slices(&self.sps),
                    &as_slices(&self.pps),
                )?;
                Ok(SampleEntry::Avc1 {
                    visual,
                    avcc: record.encode(),
                })
            }
        }
    }

    fn media_header(&self) -> MediaHeader {
        MediaHeader::Video
    }

    fn handler_type(&self) -> HandlerType {
        HandlerType::Video
    }

    fn params(&self) -> MediaParams {
        MediaParams::Video {
            width: self.width,
            height: self.height,
        }
    }

    fn extradata(&self) -> Vec<u8> {
        match self.sample_entry() {
            Ok(SampleEntry::Avc1 { avcc, .. }) => avcc,
            Ok(SampleEntry::Hevc { hvcc, .. }) => hvcc,
            _ => Vec::new(),
        }
    }

    fn default_sample_duration(&self, _timescale: u32, _payload_len: usize) -> u32 {
        self.frame_duration
    }

    fn restore(&self, mut sample: Vec<u8>) -> Result<Vec<u8>> {
        if self.nalu_length_size == NALU_LENGTH_SIZE {
            avcc_to_annexb_in_place(&mut sample)?;
            return Ok(sample);
        }

        let nalus = split_avcc(&sample, self.nalu_length_size)?;
        let mut out = Vec::with_capacity(sample.len() + 4 * nalus.len());
        for nalu in nalus {
            out.extend_from_slice(&[0, 0, 0, 1]);
            out.extend_from_slice(nalu);
        }
        Ok(out)
    }
}

/// AAC, MP3 and G.711 tracks.
#[derive(Debug, Clone)]
pub struct AudioSampleEntryCodec {
    codec_id: CodecId,
    channel_count: u16,
    sample_bits: u16,
    sample_rate: u32,
    /// AAC decoder configuration, from extradata or the first ADTS header.
    config: Option<AudioSpecificConfig>,
    /// Read side: re-wrap AAC frames in ADTS.
    emit_adts: bool,
}

impl AudioSampleEntryCodec {
    /// Codec for a new audio track.
    pub fn new(codec_id: CodecId, channel_count: u16, sample_bits: u16, sample_rate: u32) -> Result<Self> {
        match codec_id {
            CodecId::Aac | CodecId::Mp3 | CodecId::G711A | CodecId::G711U => Ok(Self {
                codec_id,
                channel_count,
                sample_bits,
                sample_rate,
                config: None,
                emit_adts: false,
            }),
            codec if codec.is_video() => Err(Error::CodecMismatch {
                codec,
                expected: MediaKind::Audio,
            }),
            codec => Err(Error::unsupported(format!("{} cannot be stored in MP4", codec))),
        }
    }

    /// Use an explicit `AudioSpecificConfig` (AAC only).
    pub fn with_extradata(mut self, extradata: &[u8]) -> Result<Self> {
        if self.codec_id == CodecId::Aac && !extradata.is_empty() {
            self.config = Some(AudioSpecificConfig::parse(extradata)?);
        }
        Ok(self)
    }

    /// Read-side codec for an `mp4a`, `.mp3`, `alaw` or `ulaw` entry.
    pub fn from_sample_entry(entry: &SampleEntry, config: &DemuxerConfig) -> Result<Self> {
        let (codec_id, audio, dsi) = match entry {
            SampleEntry::Mp4a { audio, esds } => match esds.object_type_indication {
                OBJECT_TYPE_AAC => (CodecId::Aac, audio, esds.decoder_specific_info.as_slice()),
                OBJECT_TYPE_MP3 | OBJECT_TYPE_MPEG2_AUDIO => (CodecId::Mp3, audio, &[][..]),
                other => {
                    return Err(Error::unsupported(format!(
                        "mp4a object type {:#04x}",
                        other
                    )))
                }
            },
            SampleEntry::Mp3 { audio } => (CodecId::Mp3, audio, &[][..]),
            SampleEntry::Alaw { audio } => (CodecId::G711A, audio, &[][..]),
            SampleEntry::Ulaw { audio } => (CodecId::G711U, audio, &[][..]),
            other => {
                return Err(Error::unsupported(format!(
                    "{} is not an audio sample entry",
                    other.box_type()
                )))
            }
        };

        let mut codec = Self::new(
            codec_id,
            audio.channel_count,
            audio.sample_size,
            audio.sample_rate,
        )?
        .with_extradata(dsi)?;
        if let Some(asc) = codec.config {
            codec.sample_rate = asc.sample_rate;
        }
        codec.emit_adts = config.emit_adts;
        Ok(codec)
    }

    pub fn audio_specific_config(&self) -> Option<&AudioSpecificConfig> {
        self.config.as_ref()
    }

    fn effective_config(&self) -> AudioSpecificConfig {
        self.config.unwrap_or_else(|| {
            AudioSpecificConfig::aac_lc(self.sample_rate, self.channel_count.min(15) as u8)
        })
    }

    fn audio_entry(&self) -> AudioSampleEntry {
        AudioSampleEntry::new(self.channel_count, self.sample_bits, self.sample_rate)
    }
}

impl SampleEntryCodec for AudioSampleEntryCodec {
    fn codec_id(&self) -> CodecId {
        self.codec_id
    }

    fn ingest(&mut self, payload: &[u8]) -> Result<IngestedSample> {
        let data = if self.codec_id == CodecId::Aac && aac::is_adts(payload) {
            let (header, raw) = aac::strip_adts(payload)?;
            if self.config.is_none() {
                self.config = Some(header.audio_specific_config());
            }
            raw.to_vec()
        } else {
            payload.to_vec()
        };

        Ok(IngestedSample {
            data,
            is_key_frame: true,
        })
    }

    fn sample_entry(&self) -> Result<SampleEntry> {
        let audio = self.audio_entry();
        Ok(match self.codec_id {
            CodecId::Aac => SampleEntry::Mp4a {
                audio,
                esds: Esds::new(OBJECT_TYPE_AAC, self.effective_config().encode()),
            },
            CodecId::Mp3 => SampleEntry::Mp4a {
                audio,
                esds: Esds::new(OBJECT_TYPE_MP3, Vec::new()),
            },
            CodecId::G711A => SampleEntry::Alaw { audio },
            CodecId::G711U => SampleEntry::Ulaw { audio },
            other => return Err(Error::unsupported(other.to_string())),
        })
    }

    fn media_header(&self) -> MediaHeader {
        MediaHeader::Sound
    }

    fn handler_type(&self) -> HandlerType {
        HandlerType::Audio
    }

    fn params(&self) -> MediaParams {
        MediaParams::Audio {
            channel_count: self.channel_count,
            sample_bits: self.sample_bits,
            sample_rate: self.sample_rate,
        }
    }

    fn extradata(&self) -> Vec<u8> {
        match (self.codec_id, self.config) {
            (CodecId::Aac, Some(config)) => config.encode(),
            _ => Vec::new(),
        }
    }

    fn default_sample_duration(&self, timescale: u32, payload_len: usize) -> u32 {
        if self.sample_rate == 0 {
            return 1;
        }
        let samples = match self.codec_id {
            CodecId::Aac => aac::SAMPLES_PER_FRAME as u64,
            CodecId::Mp3 => MP3_SAMPLES_PER_FRAME,
            _ => payload_len as u64,
        };
        let duration = samples * timescale as u64 / self.sample_rate as u64;
        duration.clamp(1, u32::MAX as u64) as u32
    }

    fn restore(&self, sample: Vec<u8>) -> Result<Vec<u8>> {
        if self.codec_id != CodecId::Aac || !self.emit_adts {
            return Ok(sample);
        }
        let header = AdtsHeader::for_payload(&self.effective_config(), sample.len());
        let mut out = Vec::with_capacity(sample.len() + 7);
        out.extend_from_slice(&header.encode());
        out.extend_from_slice(&sample);
        Ok(out)
    }
}

/// Pick the read-side codec for a sample entry.
pub fn codec_for_sample_entry(
    entry: &SampleEntry,
    config: &DemuxerConfig,
) -> Result<Box<dyn SampleEntryCodec>> {
    match entry {
        SampleEntry::Avc1 { .. } | SampleEntry::Hevc { .. } => {
            Ok(Box::new(VideoSampleEntryCodec::from_sample_entry(entry)?))
        }
        SampleEntry::Unknown { box_type, .. } => {
            Err(Error::unsupported(format!("sample entry {}", box_type)))
        }
        _ => Ok(Box::new(AudioSampleEntryCodec::from_sample_entry(
            entry, config,
        )?)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SPS: [u8; 9] = [0x67, 0x42, 0xC0, 0x1F, 0xDA, 0x01, 0x40, 0x16, 0xE4];
    const PPS: [u8; 4] = [0x68, 0xCE, 0x3C, 0x80];

    fn idr_access_unit() -> Vec<u8> {
        let mut au = vec![0, 0, 0, 1];
        au.extend_from_slice(&SPS);
        au.extend_from_slice(&[0, 0, 0, 1]);
        au.extend_from_slice(&PPS);
        au.extend_from_slice(&[0, 0, 0, 1, 0x65, 0x88, 0x84, 0x00]);
        au
    }

    #[test]
    fn test_video_ingest_captures_parameter_sets() {
        let mut codec = VideoSampleEntryCodec::new(CodecId::H264, 40).unwrap();
        let sample = codec.ingest(&idr_access_unit()).unwrap();
        assert!(sample.is_key_frame);
        assert_eq!(&sample.data[..4], &[0, 0, 0, 9]);
        assert_eq!(codec.dimensions(), (1280, 720));

        let (_, sps, pps) = codec.parameter_sets();
        assert_eq!(sps, &[SPS.to_vec()]);
        assert_eq!(pps, &[PPS.to_vec()]);

        let delta = codec.ingest(&[0, 0, 0, 1, 0x41, 0x9A, 0x02]).unwrap();
        assert!(!delta.is_key_frame);
        assert_eq!(codec.restore(delta.data).unwrap(), vec![0, 0, 0, 1, 0x41, 0x9A, 0x02]);
    }

    #[test]
    fn test_video_entry_needs_parameter_sets() {
        let codec = VideoSampleEntryCodec::new(CodecId::H264, 40).unwrap();
        assert!(matches!(
            codec.sample_entry(),
            Err(Error::MissingParameterSet("SPS"))
        ));
        assert!(codec.extradata().is_empty());
    }

    #[test]
    fn test_extradata_seeds_a_new_codec() {
        let mut codec = VideoSampleEntryCodec::new(CodecId::H264, 40).unwrap();
        codec.ingest(&idr_access_unit()).unwrap();

        let seeded = VideoSampleEntryCodec::new(CodecId::H264, 40)
            .unwrap()
            .with_extradata(&codec.extradata())
            .unwrap();
        assert_eq!(seeded.parameter_sets(), codec.parameter_sets());
        assert_eq!(seeded.dimensions(), (1280, 720));
    }

    #[test]
    fn test_video_entry_roundtrip() {
        let mut codec = VideoSampleEntryCodec::new(CodecId::H264, 40).unwrap();
        codec.ingest(&idr_access_unit()).unwrap();
        let entry = codec.sample_entry().unwrap();

        let read = VideoSampleEntryCodec::from_sample_entry(&entry).unwrap();
        assert_eq!(read.codec_id(), CodecId::H264);
        assert_eq!(read.dimensions(), (1280, 720));
        assert_eq!(read.parameter_sets().1, &[SPS.to_vec()]);
    }

    #[test]
    fn test_codec_kind_checks() {
        assert!(matches!(
            VideoSampleEntryCodec::new(CodecId::Aac, 40),
            Err(Error::CodecMismatch {
                codec: CodecId::Aac,
                expected: MediaKind::Video
            })
        ));
        assert!(matches!(
            AudioSampleEntryCodec::new(CodecId::H265, 2, 16, 48000),
            Err(Error::CodecMismatch { .. })
        ));
        assert!(matches!(
            VideoSampleEntryCodec::new(CodecId::Vp8, 40),
            Err(Error::UnsupportedCodec(_))
        ));
        assert!(matches!(
            AudioSampleEntryCodec::new(CodecId::Opus, 2, 16, 48000),
            Err(Error::UnsupportedCodec(_))
        ));
    }

    #[test]
    fn test_aac_adts_is_stripped() {
        let asc = AudioSpecificConfig::aac_lc(44100, 2);
        let mut frame = AdtsHeader::for_payload(&asc, 4).encode().to_vec();
        frame.extend_from_slice(&[1, 2, 3, 4]);

        let mut codec = AudioSampleEntryCodec::new(CodecId::Aac, 2, 16, 44100).unwrap();
        let sample = codec.ingest(&frame).unwrap();
        assert_eq!(sample.data, vec![1, 2, 3, 4]);
        assert!(sample.is_key_frame);
        assert_eq!(codec.audio_specific_config(), Some(&asc));

        match codec.sample_entry().unwrap() {
            SampleEntry::Mp4a { esds, .. } => {
                assert_eq!(esds.object_type_indication, OBJECT_TYPE_AAC);
                assert_eq!(esds.decoder_specific_info, vec![0x12, 0x10]);
            }
            other => panic!("unexpected entry {:?}", other),
        }
    }

    #[test]
    fn test_aac_restore_with_adts() {
        let entry = SampleEntry::Mp4a {
            audio: AudioSampleEntry::new(2, 16, 44100),
            esds: Esds::new(OBJECT_TYPE_AAC, vec![0x12, 0x10]),
        };
        let config = DemuxerConfig { emit_adts: true };
        let codec = AudioSampleEntryCodec::from_sample_entry(&entry, &config).unwrap();
        let out = codec.restore(vec![1, 2, 3, 4]).unwrap();
        assert!(aac::is_adts(&out));
        assert_eq!(aac::strip_adts(&out).unwrap().1, &[1, 2, 3, 4]);
    }

    #[test]
    fn test_default_durations() {
        let aac = AudioSampleEntryCodec::new(CodecId::Aac, 2, 16, 48000).unwrap();
        assert_eq!(aac.default_sample_duration(48000, 0), 1024);
        assert_eq!(aac.default_sample_duration(1000, 0), 21);

        let alaw = AudioSampleEntryCodec::new(CodecId::G711A, 1, 8, 8000).unwrap();
        assert_eq!(alaw.default_sample_duration(1000, 160), 20);

        let mp3 = AudioSampleEntryCodec::new(CodecId::Mp3, 2, 16, 44100).unwrap();
        assert_eq!(mp3.default_sample_duration(44100, 0), 1152);

        let video = VideoSampleEntryCodec::new(CodecId::H264, 3000).unwrap();
        assert_eq!(video.default_sample_duration(90000, 0), 3000);
    }

    #[test]
    fn test_entry_dispatch() {
        let config = DemuxerConfig::default();
        let mp3 = SampleEntry::Mp4a {
            audio: AudioSampleEntry::new(2, 16, 44100),
            esds: Esds::new(OBJECT_TYPE_MPEG2_AUDIO, Vec::new()),
        };
        assert_eq!(
            codec_for_sample_entry(&mp3, &config).unwrap().codec_id(),
            CodecId::Mp3
        );

        let ulaw = SampleEntry::Ulaw {
            audio: AudioSampleEntry::new(1, 16, 8000),
        };
        assert_eq!(
            codec_for_sample_entry(&ulaw, &config).unwrap().codec_id(),
            CodecId::G711U
        );

        let opaque = SampleEntry::Unknown {
            box_type: BoxType(*b"Opus"),
            payload: Vec::new(),
        };
        assert!(matches!(
            codec_for_sample_entry(&opaque, &config),
            Err(Error::UnsupportedCodec(_))
        ));
    }
}
