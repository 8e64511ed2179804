use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use super::job::{JobError, JobOutcome, SubmitOptions};
use super::queue::{JobHandler, JobQueue, JobQueueConfig};
use crate::audio::segment::AudioSegment;

pub const SEGMENT_SEPARATOR: &str = "\n\n";

/// Turns one segment's audio into text.
#[async_trait]
pub trait SegmentProcessor: Send + Sync {
    async fn process(&self, payload: &[u8], index: usize) -> Result<String, JobError>;
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SegmentOutcome {
    pub index: usize,
    /// Transcript, or the inline error marker when the segment failed.
    pub transcript: String,
    pub duration: f64,
    pub error: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SegmentProcessingResult {
    pub combined_transcript: String,
    pub segments: Vec<SegmentOutcome>,
    pub total_duration: f64,
    pub errors: Vec<String>,
}

impl SegmentProcessingResult {
    pub fn is_complete(&self) -> bool {
        self.errors.is_empty()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SegmentProgress {
    pub index: usize,
    /// Segments resolved so far, this one included.
    pub completed: usize,
    pub total: usize,
    pub failed: bool,
}

#[derive(Debug, Clone)]
pub enum ExecutionMode {
    /// One segment at a time, one attempt each.
    Sequential,
    /// Segments run through a `JobQueue` built for the run.
    Concurrent(JobQueueConfig),
}

pub fn error_marker(ordinal: usize) -> String {
    format!("[Error processing segment {}]", ordinal)
}

/// Drives segments through a processor and stitches the results back together
/// in index order. A failing segment becomes an inline marker plus an entry in
/// `errors`; it never aborts the batch.
#[derive(Debug, Clone)]
pub struct SegmentPipeline {
    mode: ExecutionMode,
    progress: Option<mpsc::UnboundedSender<SegmentProgress>>,
}

impl SegmentPipeline {
    pub fn new(mode: ExecutionMode) -> Self {
        Self { mode, progress: None }
    }

    pub fn sequential() -> Self {
        Self::new(ExecutionMode::Sequential)
    }

    pub fn concurrent(config: JobQueueConfig) -> Self {
        Self::new(ExecutionMode::Concurrent(config))
    }

    pub fn with_progress(mut self, progress: mpsc::UnboundedSender<SegmentProgress>) -> Self {
        self.progress = Some(progress);
        self
    }

    pub fn mode(&self) -> &ExecutionMode {
        &self.mode
    }

    pub async fn run(&self, segments: Vec<AudioSegment>, processor: Arc<dyn SegmentProcessor>) -> SegmentProcessingResult {
        if segments.is_empty() {
            return SegmentProcessingResult::default();
        }

        // Summed over every input segment, failed ones included.
        let total_duration: f64 = segments.iter().map(AudioSegment::duration).sum();
        let total = segments.len();
        info!("Processing {} segment(s), {:.1}s of audio", total, total_duration);

        let mut outcomes = match &self.mode {
            ExecutionMode::Sequential => self.run_sequential(segments, processor).await,
            ExecutionMode::Concurrent(config) => self.run_queued(segments, processor, config.clone()).await,
        };

        // Completion order is not assembly order.
        outcomes.sort_by_key(|outcome| outcome.index);

        let errors: Vec<String> = outcomes
            .iter()
            .filter_map(|o| o.error.as_ref().map(|e| format!("Segment {}: {}", o.index + 1, e)))
            .collect();

        let combined_transcript = outcomes
            .iter()
            .map(|o| o.transcript.as_str())
            .collect::<Vec<_>>()
            .join(SEGMENT_SEPARATOR);

        if errors.is_empty() {
            info!("All {} segment(s) processed", total);
        } else {
            warn!("{} of {} segment(s) failed", errors.len(), total);
        }

        SegmentProcessingResult {
            combined_transcript,
            segments: outcomes,
            total_duration,
            errors,
        }
    }

    async fn run_sequential(
        &self,
        segments: Vec<AudioSegment>,
        processor: Arc<dyn SegmentProcessor>,
    ) -> Vec<SegmentOutcome> {
        let total = segments.len();
        let mut outcomes = Vec::with_capacity(total);

        for segment in segments {
            let duration = segment.duration();
            let result = processor.process(&segment.payload, segment.index).await;
            let outcome = into_outcome(segment.index, duration, result.map_err(|e| e.message));
            self.report(&outcome, outcomes.len() + 1, total);
            outcomes.push(outcome);
        }

        outcomes
    }

    async fn run_queued(
        &self,
        segments: Vec<AudioSegment>,
        processor: Arc<dyn SegmentProcessor>,
        config: JobQueueConfig,
    ) -> Vec<SegmentOutcome> {
        let total = segments.len();
        let queue: JobQueue<SegmentJob, String> = JobQueue::new(config, Arc::new(SegmentJobHandler { processor }));

        let mut submitted = Vec::with_capacity(total);
        let mut outcomes = Vec::with_capacity(total);
        for segment in segments {
            let index = segment.index;
            let duration = segment.duration();
            let job = SegmentJob {
                index,
                payload: segment.payload,
            };
            match queue.submit(job, SubmitOptions::default()) {
                Ok(handle) => submitted.push((index, duration, handle)),
                Err(e) => outcomes.push(into_outcome(index, duration, Err(e.to_string()))),
            }
        }
        debug!("Submitted {} segment job(s)", submitted.len());

        // Handles resolve in any order; awaiting them in turn only affects when we look.
        for (index, duration, handle) in submitted {
            let result = match handle.outcome().await {
                Ok(JobOutcome::Completed(transcript)) => Ok(transcript),
                Ok(JobOutcome::Failed(message)) => Err(message),
                Ok(JobOutcome::Cancelled) => Err("segment job was cancelled".to_string()),
                Err(e) => Err(e.to_string()),
            };
            let outcome = into_outcome(index, duration, result);
            self.report(&outcome, outcomes.len() + 1, total);
            outcomes.push(outcome);
        }

        queue.shutdown();
        outcomes
    }

    fn report(&self, outcome: &SegmentOutcome, completed: usize, total: usize) {
        if let Some(progress) = &self.progress {
            let _ = progress.send(SegmentProgress {
                index: outcome.index,
                completed,
                total,
                failed: outcome.error.is_some(),
            });
        }
    }
}

fn into_outcome(index: usize, duration: f64, result: Result<String, String>) -> SegmentOutcome {
    match result {
        Ok(transcript) => SegmentOutcome {
            index,
            transcript,
            duration,
            error: None,
        },
        Err(message) => {
            warn!("Segment {} failed: {}", index + 1, message);
            SegmentOutcome {
                index,
                transcript: error_marker(index + 1),
                duration,
                error: Some(message),
            }
        }
    }
}

struct SegmentJob {
    index: usize,
    payload: Vec<u8>,
}

struct SegmentJobHandler {
    processor: Arc<dyn SegmentProcessor>,
}

#[async_trait]
impl JobHandler<SegmentJob, String> for SegmentJobHandler {
    async fn process(&self, job: Arc<SegmentJob>) -> Result<String, JobError> {
        self.processor.process(&job.payload, job.index).await
    }
}
