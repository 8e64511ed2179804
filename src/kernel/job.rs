use std::fmt;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

pub type JobId = Uuid;

pub const DEFAULT_MAX_RETRIES: u32 = 3;

/// Lifecycle of a job inside the queue.
///
/// `Pending -> Processing -> {Completed | Failed | Pending (retry) | Cancelled}`,
/// plus `Pending -> Cancelled` for jobs that never started.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Pending,
    Processing,
    Completed,
    Failed,
    Cancelled,
}

impl JobStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, JobStatus::Completed | JobStatus::Failed | JobStatus::Cancelled)
    }
}

/// A unit of work owned by the queue. Callers only ever see clones.
#[derive(Debug, Serialize)]
pub struct ProcessingJob<P, R> {
    pub id: JobId,
    #[serde(skip)]
    pub payload: Arc<P>,
    pub status: JobStatus,
    pub priority: i32,
    pub retry_count: u32,
    pub max_retries: u32,
    pub created_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    /// Present iff `status == Completed`.
    pub result: Option<R>,
    /// Present iff `status == Failed`. Verbatim message of the last attempt.
    pub error: Option<String>,
}

impl<P, R> ProcessingJob<P, R> {
    pub fn new(payload: P, options: SubmitOptions) -> Self {
        Self {
            id: Uuid::new_v4(),
            payload: Arc::new(payload),
            status: JobStatus::Pending,
            priority: options.priority,
            retry_count: 0,
            max_retries: options.max_retries.unwrap_or(DEFAULT_MAX_RETRIES),
            created_at: Utc::now(),
            started_at: None,
            completed_at: None,
            result: None,
            error: None,
        }
    }
}

// Manual impl: the payload sits behind an Arc, so `P` itself needn't be Clone.
impl<P, R: Clone> Clone for ProcessingJob<P, R> {
    fn clone(&self) -> Self {
        Self {
            id: self.id,
            payload: Arc::clone(&self.payload),
            status: self.status,
            priority: self.priority,
            retry_count: self.retry_count,
            max_retries: self.max_retries,
            created_at: self.created_at,
            started_at: self.started_at,
            completed_at: self.completed_at,
            result: self.result.clone(),
            error: self.error.clone(),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SubmitOptions {
    /// Higher runs first. Equal priorities run in submission order.
    pub priority: i32,
    /// Falls back to the queue's configured default when `None`.
    pub max_retries: Option<u32>,
}

impl SubmitOptions {
    pub fn with_priority(mut self, priority: i32) -> Self {
        self.priority = priority;
        self
    }

    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = Some(max_retries);
        self
    }
}

/// Failure reported by a job handler.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobError {
    pub message: String,
    pub retryable: bool,
}

impl JobError {
    /// Retryable failure. This is what every error is unless stated otherwise.
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            retryable: true,
        }
    }

    /// Failure that retrying cannot fix.
    pub fn permanent(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            retryable: false,
        }
    }
}

impl fmt::Display for JobError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.message)
    }
}

impl std::error::Error for JobError {}

impl From<String> for JobError {
    fn from(message: String) -> Self {
        JobError::new(message)
    }
}

impl From<&str> for JobError {
    fn from(message: &str) -> Self {
        JobError::new(message)
    }
}

/// The single terminal notification delivered for every job.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JobOutcome<R> {
    Completed(R),
    Failed(String),
    Cancelled,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueueStats {
    pub pending: usize,
    pub processing: usize,
    pub completed: usize,
    pub failed: usize,
    pub cancelled: usize,
    pub total: usize,
}

/// Progress notifications broadcast to `JobQueue::subscribe` receivers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum JobEvent {
    Queued { id: JobId, priority: i32 },
    Started { id: JobId, attempt: u32 },
    Retrying { id: JobId, retry_count: u32, delay_ms: u64 },
    Completed { id: JobId },
    Failed { id: JobId, error: String },
    Cancelled { id: JobId },
}

impl JobEvent {
    pub fn id(&self) -> JobId {
        match self {
            JobEvent::Queued { id, .. }
            | JobEvent::Started { id, .. }
            | JobEvent::Retrying { id, .. }
            | JobEvent::Completed { id }
            | JobEvent::Failed { id, .. }
            | JobEvent::Cancelled { id } => *id,
        }
    }
}
