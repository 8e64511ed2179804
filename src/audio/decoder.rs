use std::io::Cursor;
use std::ops::Range;

use hound::{SampleFormat, WavReader, WavSpec, WavWriter};

use crate::error::DecodeError;

#[derive(Debug, Clone, PartialEq)]
pub enum SampleBuffer {
    Int(Vec<i32>),
    Float(Vec<f32>),
}

impl SampleBuffer {
    pub fn len(&self) -> usize {
        match self {
            SampleBuffer::Int(s) => s.len(),
            SampleBuffer::Float(s) => s.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Interleaved PCM plus the format needed to re-encode any slice of it.
#[derive(Debug, Clone)]
pub struct DecodedAudio {
    pub sample_rate: u32,
    pub channels: u16,
    pub bits_per_sample: u16,
    pub samples: SampleBuffer,
}

impl DecodedAudio {
    pub fn frames(&self) -> u64 {
        if self.channels == 0 {
            return 0;
        }
        (self.samples.len() / self.channels as usize) as u64
    }

    pub fn duration_secs(&self) -> f64 {
        if self.sample_rate == 0 {
            return 0.0;
        }
        self.frames() as f64 / self.sample_rate as f64
    }
}

/// Pluggable audio codec used by the segment builder.
///
/// `encode` must turn a frame range into a self-contained, independently
/// decodable payload. Implementations are free to be lossy.
pub trait Decoder: Send + Sync {
    fn decode(&self, payload: &[u8]) -> Result<DecodedAudio, DecodeError>;

    fn encode(&self, audio: &DecodedAudio, frames: Range<u64>) -> Result<Vec<u8>, DecodeError>;
}

/// PCM WAV codec backed by `hound`. Anything hound can't parse is rejected,
/// which sends the builder down the byte-chunking path.
#[derive(Debug, Clone, Copy, Default)]
pub struct WavDecoder;

impl WavDecoder {
    pub fn new() -> Self {
        Self
    }
}

impl Decoder for WavDecoder {
    fn decode(&self, payload: &[u8]) -> Result<DecodedAudio, DecodeError> {
        let mut reader = WavReader::new(Cursor::new(payload))?;
        let spec = reader.spec();

        if spec.sample_rate == 0 {
            return Err(DecodeError::Unsupported("sample rate of 0".to_string()));
        }

        let samples = match spec.sample_format {
            SampleFormat::Int => SampleBuffer::Int(reader.samples::<i32>().collect::<Result<Vec<_>, _>>()?),
            SampleFormat::Float => SampleBuffer::Float(reader.samples::<f32>().collect::<Result<Vec<_>, _>>()?),
        };

        let audio = DecodedAudio {
            sample_rate: spec.sample_rate,
            channels: spec.channels,
            bits_per_sample: spec.bits_per_sample,
            samples,
        };

        if audio.frames() == 0 {
            return Err(DecodeError::Empty);
        }
        Ok(audio)
    }

    fn encode(&self, audio: &DecodedAudio, frames: Range<u64>) -> Result<Vec<u8>, DecodeError> {
        let spec = WavSpec {
            channels: audio.channels,
            sample_rate: audio.sample_rate,
            bits_per_sample: audio.bits_per_sample,
            sample_format: match audio.samples {
                SampleBuffer::Int(_) => SampleFormat::Int,
                SampleBuffer::Float(_) => SampleFormat::Float,
            },
        };

        let channels = audio.channels as usize;
        let end_frame = frames.end.min(audio.frames()) as usize;
        let start_frame = (frames.start as usize).min(end_frame);
        let samples = (start_frame * channels)..(end_frame * channels);

        let mut buf = Vec::new();
        {
            let mut writer = WavWriter::new(Cursor::new(&mut buf), spec)?;
            match &audio.samples {
                SampleBuffer::Int(s) => {
                    for &sample in &s[samples] {
                        writer.write_sample(sample)?;
                    }
                }
                SampleBuffer::Float(s) => {
                    for &sample in &s[samples] {
                        writer.write_sample(sample)?;
                    }
                }
            }
            writer.finalize()?;
        }
        Ok(buf)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn wav_bytes(sample_rate: u32, frames: usize) -> Vec<u8> {
        let spec = WavSpec {
            channels: 1,
            sample_rate,
            bits_per_sample: 16,
            sample_format: SampleFormat::Int,
        };
        let mut buf = Vec::new();
        let mut writer = WavWriter::new(Cursor::new(&mut buf), spec).unwrap();
        for i in 0..frames {
            writer.write_sample((i % 100) as i16).unwrap();
        }
        writer.finalize().unwrap();
        buf
    }

    #[test]
    fn decodes_pcm_wav() {
        let audio = WavDecoder.decode(&wav_bytes(8000, 16000)).unwrap();
        assert_eq!(audio.frames(), 16000);
        assert_eq!(audio.duration_secs(), 2.0);
    }

    #[test]
    fn rejects_non_wav_bytes() {
        assert!(WavDecoder.decode(b"definitely not a riff header").is_err());
    }

    #[test]
    fn encoded_slice_decodes_on_its_own() {
        let audio = WavDecoder.decode(&wav_bytes(8000, 8000)).unwrap();
        let slice = WavDecoder.encode(&audio, 2000..6000).unwrap();

        let back = WavDecoder.decode(&slice).unwrap();
        assert_eq!(back.frames(), 4000);
        assert_eq!(back.sample_rate, 8000);
        match back.samples {
            SampleBuffer::Int(s) => assert_eq!(s[0], 0), // 2000 % 100
            SampleBuffer::Float(_) => panic!("format changed"),
        }
    }
}
