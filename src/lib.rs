pub mod audio;
pub mod config;
pub mod error;
pub mod kernel;
pub mod recording;
pub mod services;

// Re-export the entry points most callers need
pub use audio::{AudioSegment, SegmentBuilder};
pub use config::PipelineConfig;
pub use kernel::pipeline::{SegmentPipeline, SegmentProcessingResult};
pub use kernel::queue::{JobQueue, JobQueueConfig};
pub use recording::{process_large_recording, RecordingTranscriber};
