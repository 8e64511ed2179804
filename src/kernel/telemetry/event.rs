use serde::{Deserialize, Serialize};

use crate::kernel::job::JobId;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum TelemetryEvent {
    JobSubmitted {
        job_id: JobId,
        priority: i32,
    },

    JobStarted {
        job_id: JobId,
        attempt: u32,
        queue_wait_ms: u64, // since submission, or since the retry was re-queued
    },

    JobRetried {
        job_id: JobId,
        retry_count: u32,
        delay_ms: u64,
    },

    JobTimedOut {
        job_id: JobId,
        limit_ms: u64,
    },

    JobCompleted {
        job_id: JobId,
        run_ms: u64,
    },

    JobFailed {
        job_id: JobId,
        run_ms: u64,
        retries: u32,
    },

    JobCancelled {
        job_id: JobId,
        was_running: bool,
    },
}
