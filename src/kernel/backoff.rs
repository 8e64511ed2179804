use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Delay before re-queueing a failed job, keyed by the retry number (1-based).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "kind")]
pub enum BackoffPolicy {
    /// `base * retry_count`
    Linear,
    /// `base * 2^(retry_count - 1)`, capped at `max_delay_ms`.
    Exponential { max_delay_ms: u64 },
}

impl Default for BackoffPolicy {
    fn default() -> Self {
        BackoffPolicy::Linear
    }
}

impl BackoffPolicy {
    pub fn delay(&self, base: Duration, retry_count: u32) -> Duration {
        match self {
            BackoffPolicy::Linear => base.saturating_mul(retry_count),
            BackoffPolicy::Exponential { max_delay_ms } => {
                let shift = retry_count.saturating_sub(1).min(31);
                base.saturating_mul(1u32 << shift).min(Duration::from_millis(*max_delay_ms))
            }
        }
    }
}
