use std::sync::Arc;

use tracing::{debug, info, warn};

use super::decoder::{DecodedAudio, Decoder, WavDecoder};
use super::segment::{AudioSegment, SegmentSource};
use crate::config::PipelineConfig;
use crate::error::{DecodeError, SegmentError};

pub const DEFAULT_MAX_SEGMENT_SIZE: usize = 25 * 1024 * 1024;
pub const DEFAULT_MIN_SEGMENT_SECS: f64 = 30.0;
/// Duration assumed for the whole payload when it can't be decoded.
pub const DEFAULT_FALLBACK_DURATION_SECS: f64 = 30.0;

/// Splits one recording into ordered segments no larger than a size limit.
///
/// Primary path decodes the audio and cuts it into equal time slices whose
/// length is estimated from the size ratio, re-encoding each slice. If
/// decoding fails for any reason the raw bytes are cut into fixed chunks
/// instead. Decode failures are never returned to the caller.
#[derive(Clone)]
pub struct SegmentBuilder {
    decoder: Arc<dyn Decoder>,
    min_segment_secs: f64,
    fallback_duration_secs: f64,
}

impl Default for SegmentBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl SegmentBuilder {
    pub fn new() -> Self {
        Self::with_decoder(Arc::new(WavDecoder::new()))
    }

    pub fn with_decoder(decoder: Arc<dyn Decoder>) -> Self {
        Self {
            decoder,
            min_segment_secs: DEFAULT_MIN_SEGMENT_SECS,
            fallback_duration_secs: DEFAULT_FALLBACK_DURATION_SECS,
        }
    }

    pub fn from_config(config: &PipelineConfig) -> Self {
        Self::new()
            .min_segment_secs(config.min_segment_secs)
            .fallback_duration_secs(config.fallback_duration_secs)
    }

    pub fn min_segment_secs(mut self, secs: f64) -> Self {
        self.min_segment_secs = secs;
        self
    }

    pub fn fallback_duration_secs(mut self, secs: f64) -> Self {
        self.fallback_duration_secs = secs;
        self
    }

    pub fn split(&self, payload: &[u8], max_segment_size: usize) -> Result<Vec<AudioSegment>, SegmentError> {
        if payload.is_empty() {
            return Err(SegmentError::EmptyPayload);
        }
        if max_segment_size == 0 {
            return Err(SegmentError::InvalidMaxSegmentSize);
        }
        // NaN fails these comparisons too.
        if !(self.min_segment_secs > 0.0) {
            return Err(SegmentError::InvalidConfig("min_segment_secs must be positive".to_string()));
        }
        if !(self.fallback_duration_secs > 0.0 && self.fallback_duration_secs.is_finite()) {
            return Err(SegmentError::InvalidConfig(
                "fallback_duration_secs must be positive and finite".to_string(),
            ));
        }

        let decoded = self
            .decoder
            .decode(payload)
            .and_then(|audio| self.split_decoded(payload, &audio, max_segment_size));

        let segments = match decoded {
            Ok(segments) => segments,
            Err(e) => {
                warn!("Decode failed ({}), falling back to byte chunking", e);
                self.split_bytes(payload, max_segment_size)
            }
        };

        info!(
            "Split {} bytes into {} segment(s) (limit {} bytes)",
            payload.len(),
            segments.len(),
            max_segment_size
        );
        Ok(segments)
    }

    fn split_decoded(
        &self,
        payload: &[u8],
        audio: &DecodedAudio,
        max_segment_size: usize,
    ) -> Result<Vec<AudioSegment>, DecodeError> {
        let total_frames = audio.frames();
        let total_secs = audio.duration_secs();
        if total_frames == 0 {
            return Err(DecodeError::Empty);
        }

        if payload.len() <= max_segment_size {
            return Ok(vec![AudioSegment::new(0, payload.to_vec(), 0.0, total_secs, SegmentSource::Whole)]);
        }

        let estimated_secs = max_segment_size as f64 / payload.len() as f64 * total_secs;
        let floor_secs = self.min_segment_secs.min(total_secs / 10.0);
        let segment_secs = estimated_secs.max(floor_secs);
        let rate = audio.sample_rate as f64;
        let frames_per_segment = ((segment_secs * rate).floor() as u64).max(1);

        debug!(
            "Decoded {:.2}s @ {}Hz x{}; {:.2}s per segment ({} frames)",
            total_secs, audio.sample_rate, audio.channels, segment_secs, frames_per_segment
        );

        let mut segments = Vec::new();
        let mut start = 0u64;
        while start < total_frames {
            let end = (start + frames_per_segment).min(total_frames);
            let bytes = self.decoder.encode(audio, start..end)?;
            let index = segments.len();

            if bytes.len() > max_segment_size {
                warn!(
                    "Segment {} re-encoded to {} bytes, above the {} byte limit",
                    index + 1,
                    bytes.len(),
                    max_segment_size
                );
            }

            // Times derive from frame positions, so the last end lands on total_secs exactly.
            segments.push(AudioSegment::new(
                index,
                bytes,
                start as f64 / rate,
                end as f64 / rate,
                SegmentSource::Decoded { start_frame: start, end_frame: end },
            ));
            start = end;
        }

        Ok(segments)
    }

    fn split_bytes(&self, payload: &[u8], max_segment_size: usize) -> Vec<AudioSegment> {
        let total = payload.len() as f64;
        let chunk_count = payload.len().div_ceil(max_segment_size);
        let mut segments = Vec::with_capacity(chunk_count);
        let mut start_time = 0.0;

        for (index, chunk) in payload.chunks(max_segment_size).enumerate() {
            let end_time = if index + 1 == chunk_count {
                self.fallback_duration_secs
            } else {
                start_time + chunk.len() as f64 / total * self.fallback_duration_secs
            };

            segments.push(AudioSegment::new(
                index,
                chunk.to_vec(),
                start_time,
                end_time,
                SegmentSource::ByteRange { offset: index * max_segment_size },
            ));
            start_time = end_time;
        }

        segments
    }
}
