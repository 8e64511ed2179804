use std::io::Cursor;
use std::ops::Range;
use std::sync::Arc;

use scribe_pipeline::audio::{AudioSegment, DecodedAudio, Decoder, SampleBuffer, SegmentBuilder, SegmentSource, WavDecoder};
use scribe_pipeline::error::{DecodeError, SegmentError};

const MIB: usize = 1024 * 1024;

fn wav_bytes(sample_rate: u32, seconds: u32) -> Vec<u8> {
    let spec = hound::WavSpec {
        channels: 1,
        sample_rate,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    };
    let mut buf = Vec::new();
    let mut writer = hound::WavWriter::new(Cursor::new(&mut buf), spec).unwrap();
    for i in 0..(sample_rate * seconds) {
        writer.write_sample(((i % 200) as i16 - 100) * 50).unwrap();
    }
    writer.finalize().unwrap();
    buf
}

/// Reports a fixed duration without touching the payload; encodes slices as
/// zero-filled buffers sized proportionally to the source.
struct FakeDecoder {
    sample_rate: u32,
    frames: usize,
    bytes_per_frame: usize,
}

impl Decoder for FakeDecoder {
    fn decode(&self, _payload: &[u8]) -> Result<DecodedAudio, DecodeError> {
        Ok(DecodedAudio {
            sample_rate: self.sample_rate,
            channels: 1,
            bits_per_sample: 16,
            samples: SampleBuffer::Int(vec![0; self.frames]),
        })
    }

    fn encode(&self, _audio: &DecodedAudio, frames: Range<u64>) -> Result<Vec<u8>, DecodeError> {
        Ok(vec![0; (frames.end - frames.start) as usize * self.bytes_per_frame])
    }
}

struct BrokenEncoder;

impl Decoder for BrokenEncoder {
    fn decode(&self, _payload: &[u8]) -> Result<DecodedAudio, DecodeError> {
        Ok(DecodedAudio {
            sample_rate: 1000,
            channels: 1,
            bits_per_sample: 16,
            samples: SampleBuffer::Int(vec![0; 60_000]),
        })
    }

    fn encode(&self, _audio: &DecodedAudio, _frames: Range<u64>) -> Result<Vec<u8>, DecodeError> {
        Err(DecodeError::Unsupported("encoder offline".to_string()))
    }
}

fn assert_dense_and_contiguous(segments: &[AudioSegment], total_secs: f64) {
    assert!(!segments.is_empty());
    for (i, segment) in segments.iter().enumerate() {
        assert_eq!(segment.index, i, "indices must be dense");
        assert!(segment.end_time > segment.start_time, "segment {} has no duration", i);
        assert_eq!(segment.size, segment.payload.len());
    }
    assert_eq!(segments[0].start_time, 0.0);
    for pair in segments.windows(2) {
        assert_eq!(pair[0].end_time, pair[1].start_time, "gap or overlap between segments");
    }
    assert_eq!(segments.last().unwrap().end_time, total_secs);
}

#[test]
fn test_rejects_empty_payload() {
    let err = SegmentBuilder::new().split(&[], 1024).unwrap_err();
    assert!(matches!(err, SegmentError::EmptyPayload));
}

#[test]
fn test_rejects_zero_size_limit() {
    let err = SegmentBuilder::new().split(&[1, 2, 3], 0).unwrap_err();
    assert!(matches!(err, SegmentError::InvalidMaxSegmentSize));
}

#[test]
fn test_rejects_non_positive_durations() {
    let payload = vec![1u8; 100];
    for bad in [0.0, -5.0, f64::NAN] {
        let err = SegmentBuilder::new().fallback_duration_secs(bad).split(&payload, 10).unwrap_err();
        assert!(matches!(err, SegmentError::InvalidConfig(_)), "fallback {} accepted", bad);

        let err = SegmentBuilder::new().min_segment_secs(bad).split(&payload, 10).unwrap_err();
        assert!(matches!(err, SegmentError::InvalidConfig(_)), "min duration {} accepted", bad);
    }
}

#[test]
fn test_undecodable_payload_falls_back_to_byte_chunks() {
    let payload: Vec<u8> = (0..1000u32).map(|i| (i % 251) as u8).collect();
    let segments = SegmentBuilder::new().split(&payload, 300).unwrap();

    let sizes: Vec<usize> = segments.iter().map(|s| s.size).collect();
    assert_eq!(sizes, vec![300, 300, 300, 100]);
    assert!(segments.iter().all(|s| s.size <= 300));

    let offsets: Vec<SegmentSource> = segments.iter().map(|s| s.source).collect();
    assert_eq!(
        offsets,
        vec![
            SegmentSource::ByteRange { offset: 0 },
            SegmentSource::ByteRange { offset: 300 },
            SegmentSource::ByteRange { offset: 600 },
            SegmentSource::ByteRange { offset: 900 },
        ]
    );

    // Chunk durations are the byte share of the assumed 30s.
    assert!((segments[0].duration() - 9.0).abs() < 1e-9);
    assert!((segments[3].duration() - 3.0).abs() < 1e-9);
    assert_dense_and_contiguous(&segments, 30.0);

    let rebuilt: Vec<u8> = segments.iter().flat_map(|s| s.payload.iter().copied()).collect();
    assert_eq!(rebuilt, payload);
}

#[test]
fn test_fallback_duration_is_configurable() {
    let payload = vec![7u8; 500];
    let segments = SegmentBuilder::new()
        .fallback_duration_secs(120.0)
        .split(&payload, 250)
        .unwrap();
    assert_eq!(segments.len(), 2);
    assert_dense_and_contiguous(&segments, 120.0);
}

#[test]
fn test_wav_split_by_duration() {
    // 60s of 16-bit mono at 8kHz: 960_044 bytes.
    let payload = wav_bytes(8000, 60);
    let max = 300_000;
    let segments = SegmentBuilder::new().split(&payload, max).unwrap();

    assert_eq!(segments.len(), 4);
    assert_dense_and_contiguous(&segments, 60.0);

    // One minimum-segment-duration of slack: min(30s, 60s / 10) of 16-bit mono 8kHz.
    let slack = 6 * 8000 * 2;
    let mut frames = 0;
    for segment in &segments {
        assert!(segment.size <= max + slack, "segment {} is {} bytes", segment.index, segment.size);
        assert!(matches!(segment.source, SegmentSource::Decoded { .. }));

        // Every segment is a standalone WAV.
        let decoded = WavDecoder.decode(&segment.payload).unwrap();
        assert!((decoded.duration_secs() - segment.duration()).abs() < 1e-9);
        frames += decoded.frames();
    }
    assert_eq!(frames, 8000 * 60);
}

#[test]
fn test_wav_under_limit_is_passed_through() {
    let payload = wav_bytes(8000, 5);
    let segments = SegmentBuilder::new().split(&payload, payload.len()).unwrap();

    assert_eq!(segments.len(), 1);
    assert_eq!(segments[0].source, SegmentSource::Whole);
    assert_eq!(segments[0].payload, payload);
    assert_eq!(segments[0].end_time, 5.0);
}

#[test]
fn test_sixty_mib_recording_yields_three_segments() {
    let payload = vec![0u8; 60 * MIB];
    let decoder = FakeDecoder {
        sample_rate: 100,
        frames: 120 * 100,
        bytes_per_frame: 60 * MIB / (120 * 100),
    };
    let segments = SegmentBuilder::with_decoder(Arc::new(decoder))
        .split(&payload, 25 * MIB)
        .unwrap();

    assert_eq!(segments.len(), 3);
    assert_dense_and_contiguous(&segments, 120.0);
    assert!(segments[0].duration() > 49.0 && segments[0].duration() <= 50.0);
}

#[test]
fn test_minimum_segment_duration_prevents_micro_segments() {
    // Size ratio alone would ask for 0.1s slices; the floor is min(30s, 100s / 10) = 10s.
    let decoder = FakeDecoder {
        sample_rate: 10,
        frames: 1000,
        bytes_per_frame: 1,
    };
    let segments = SegmentBuilder::with_decoder(Arc::new(decoder))
        .split(&vec![0u8; 1000], 1)
        .unwrap();

    assert_eq!(segments.len(), 10);
    assert_dense_and_contiguous(&segments, 100.0);
}

#[test]
fn test_encode_failure_falls_back_to_byte_chunks() {
    let payload = vec![1u8; 1000];
    let segments = SegmentBuilder::with_decoder(Arc::new(BrokenEncoder))
        .split(&payload, 400)
        .unwrap();

    assert_eq!(segments.len(), 3);
    assert!(segments.iter().all(|s| matches!(s.source, SegmentSource::ByteRange { .. })));
    assert!(segments.iter().all(|s| s.size <= 400));
}
