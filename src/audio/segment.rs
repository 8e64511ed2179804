use serde::{Deserialize, Serialize};

/// Where a segment's bytes came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SegmentSource {
    /// Original payload passed through untouched (it already fit the limit).
    Whole,
    /// Time slice re-encoded from decoded audio. Frame range is half-open.
    Decoded { start_frame: u64, end_frame: u64 },
    /// Raw byte slice of the original container (decode fallback).
    ByteRange { offset: usize },
}

/// One contiguous slice of a recording.
///
/// Segments from one split are index-dense (`0..N`) and tile the recording
/// without gaps: in time for decoded splits, in byte offset for the fallback.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AudioSegment {
    pub index: usize,
    #[serde(skip)]
    pub payload: Vec<u8>,
    pub size: usize,
    /// Seconds from the start of the recording.
    pub start_time: f64,
    pub end_time: f64,
    pub source: SegmentSource,
}

impl AudioSegment {
    pub fn new(index: usize, payload: Vec<u8>, start_time: f64, end_time: f64, source: SegmentSource) -> Self {
        Self {
            index,
            size: payload.len(),
            payload,
            start_time,
            end_time,
            source,
        }
    }

    pub fn duration(&self) -> f64 {
        self.end_time - self.start_time
    }

    /// 1-based position, used in anything a person reads.
    pub fn ordinal(&self) -> usize {
        self.index + 1
    }
}
