use thiserror::Error;

/// Input errors. Raised before any segment is created.
#[derive(Error, Debug)]
pub enum SegmentError {
    #[error("audio payload is empty")]
    EmptyPayload,
    #[error("max segment size must be greater than zero")]
    InvalidMaxSegmentSize,
    #[error("invalid pipeline config: {0}")]
    InvalidConfig(String),
}

/// Decoder failures. The segment builder recovers from all of these by
/// falling back to byte chunking, so they never reach pipeline callers.
#[derive(Error, Debug)]
pub enum DecodeError {
    #[error("wav decode failed: {0}")]
    Wav(#[from] hound::Error),
    #[error("unsupported audio format: {0}")]
    Unsupported(String),
    #[error("decoded audio contains no frames")]
    Empty,
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum QueueError {
    #[error("job queue scheduler is no longer running")]
    Closed,
    #[error("job was dropped before reaching a terminal state")]
    Dropped,
}
