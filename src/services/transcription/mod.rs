pub mod client;
pub mod types;

pub use client::{HttpTranscriber, HttpTranscriberConfig};
pub use types::{Transcriber, TranscriptionOptions, TranscriptionProcessor, TranscriptionResponse};
