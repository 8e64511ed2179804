use std::sync::Arc;

use tracing::info;

use crate::audio::builder::SegmentBuilder;
use crate::config::PipelineConfig;
use crate::error::SegmentError;
use crate::kernel::pipeline::{SegmentPipeline, SegmentProcessingResult};
use crate::services::transcription::{Transcriber, TranscriptionOptions, TranscriptionProcessor};

/// Composition root: split a recording, transcribe every segment, reassemble.
///
/// Nothing here is global. Each instance owns its builder and pipeline, and
/// every run builds its own queue.
#[derive(Clone)]
pub struct RecordingTranscriber {
    builder: SegmentBuilder,
    pipeline: SegmentPipeline,
    transcriber: Arc<dyn Transcriber>,
    options: TranscriptionOptions,
    max_segment_size: usize,
}

impl RecordingTranscriber {
    pub fn new(config: &PipelineConfig, transcriber: Arc<dyn Transcriber>) -> Result<Self, SegmentError> {
        config.validate()?;
        Ok(Self {
            builder: SegmentBuilder::from_config(config),
            pipeline: SegmentPipeline::new(config.execution_mode()),
            transcriber,
            options: TranscriptionOptions::default(),
            max_segment_size: config.max_segment_size,
        })
    }

    pub fn with_builder(mut self, builder: SegmentBuilder) -> Self {
        self.builder = builder;
        self
    }

    pub fn with_pipeline(mut self, pipeline: SegmentPipeline) -> Self {
        self.pipeline = pipeline;
        self
    }

    pub fn with_options(mut self, options: TranscriptionOptions) -> Self {
        self.options = options;
        self
    }

    /// Only malformed input is an `Err`. Per-segment failures are reported
    /// inside the result.
    pub async fn process(&self, payload: &[u8]) -> Result<SegmentProcessingResult, SegmentError> {
        let segments = self.builder.split(payload, self.max_segment_size)?;
        info!("Recording of {} bytes split into {} segment(s)", payload.len(), segments.len());

        let processor = Arc::new(TranscriptionProcessor::new(Arc::clone(&self.transcriber), self.options.clone()));
        Ok(self.pipeline.run(segments, processor).await)
    }
}

/// Default-configured entry point: WAV-aware split, two concurrent jobs, three retries.
pub async fn process_large_recording(
    payload: &[u8],
    max_segment_size: usize,
    transcriber: Arc<dyn Transcriber>,
) -> Result<SegmentProcessingResult, SegmentError> {
    let config = PipelineConfig {
        max_segment_size,
        ..PipelineConfig::default()
    };
    RecordingTranscriber::new(&config, transcriber)?.process(payload).await
}
