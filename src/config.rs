use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::audio::builder::{DEFAULT_FALLBACK_DURATION_SECS, DEFAULT_MAX_SEGMENT_SIZE, DEFAULT_MIN_SEGMENT_SECS};
use crate::error::SegmentError;
use crate::kernel::backoff::BackoffPolicy;
use crate::kernel::job::DEFAULT_MAX_RETRIES;
use crate::kernel::pipeline::ExecutionMode;
use crate::kernel::queue::JobQueueConfig;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Execution {
    Sequential,
    Concurrent,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    pub max_segment_size: usize,
    pub min_segment_secs: f64,
    pub fallback_duration_secs: f64,
    pub execution: Execution,
    pub max_concurrent: usize,
    pub max_retries: u32,
    pub retry_base_delay_ms: u64,
    pub backoff: BackoffPolicy,
    /// Unset means remote calls may take as long as they like.
    pub job_timeout_secs: Option<u64>,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            max_segment_size: DEFAULT_MAX_SEGMENT_SIZE,
            min_segment_secs: DEFAULT_MIN_SEGMENT_SECS,
            fallback_duration_secs: DEFAULT_FALLBACK_DURATION_SECS,
            execution: Execution::Concurrent,
            max_concurrent: 2,
            max_retries: DEFAULT_MAX_RETRIES,
            retry_base_delay_ms: 1000,
            backoff: BackoffPolicy::Linear,
            job_timeout_secs: None,
        }
    }
}

impl PipelineConfig {
    pub fn validate(&self) -> Result<(), SegmentError> {
        if self.max_segment_size == 0 {
            return Err(SegmentError::InvalidMaxSegmentSize);
        }
        if !(self.min_segment_secs > 0.0) {
            return Err(SegmentError::InvalidConfig("min_segment_secs must be positive".to_string()));
        }
        if !(self.fallback_duration_secs > 0.0 && self.fallback_duration_secs.is_finite()) {
            return Err(SegmentError::InvalidConfig(
                "fallback_duration_secs must be positive and finite".to_string(),
            ));
        }
        if self.max_concurrent == 0 {
            return Err(SegmentError::InvalidConfig("max_concurrent must be at least 1".to_string()));
        }
        if self.job_timeout_secs == Some(0) {
            return Err(SegmentError::InvalidConfig("job_timeout_secs must be greater than 0".to_string()));
        }
        Ok(())
    }

    pub fn queue_config(&self) -> JobQueueConfig {
        JobQueueConfig {
            max_concurrent: self.max_concurrent,
            max_retries: self.max_retries,
            retry_base_delay: Duration::from_millis(self.retry_base_delay_ms),
            backoff: self.backoff,
            job_timeout: self.job_timeout_secs.map(Duration::from_secs),
            ..JobQueueConfig::default()
        }
    }

    pub fn execution_mode(&self) -> ExecutionMode {
        match self.execution {
            Execution::Sequential => ExecutionMode::Sequential,
            Execution::Concurrent => ExecutionMode::Concurrent(self.queue_config()),
        }
    }
}
