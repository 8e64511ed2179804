use std::collections::VecDeque;

use serde::{Deserialize, Serialize};

use super::event::TelemetryEvent;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TelemetrySnapshot {
    pub submitted: u64,
    pub started: u64,
    pub completed: u64,
    pub failed: u64,
    pub cancelled: u64,
    pub cancelled_while_running: u64,
    pub retries: u64,
    pub timeouts: u64,
    pub avg_run_ms: f64,
    pub max_run_ms: u64,
    pub avg_queue_wait_ms: f64,
}

pub fn compute_snapshot(events: &VecDeque<TelemetryEvent>) -> TelemetrySnapshot {
    let mut snap = TelemetrySnapshot::default();

    let mut run_total = 0u64;
    let mut run_count = 0u64;
    let mut wait_total = 0u64;

    for event in events {
        match event {
            TelemetryEvent::JobSubmitted { .. } => snap.submitted += 1,
            TelemetryEvent::JobStarted { queue_wait_ms, .. } => {
                snap.started += 1;
                wait_total += queue_wait_ms;
            }
            TelemetryEvent::JobRetried { .. } => snap.retries += 1,
            TelemetryEvent::JobTimedOut { .. } => snap.timeouts += 1,
            TelemetryEvent::JobCompleted { run_ms, .. } => {
                snap.completed += 1;
                run_total += run_ms;
                run_count += 1;
                snap.max_run_ms = snap.max_run_ms.max(*run_ms);
            }
            TelemetryEvent::JobFailed { run_ms, .. } => {
                snap.failed += 1;
                run_total += run_ms;
                run_count += 1;
                snap.max_run_ms = snap.max_run_ms.max(*run_ms);
            }
            TelemetryEvent::JobCancelled { was_running, .. } => {
                snap.cancelled += 1;
                if *was_running {
                    snap.cancelled_while_running += 1;
                }
            }
        }
    }

    if run_count > 0 {
        snap.avg_run_ms = run_total as f64 / run_count as f64;
    }
    if snap.started > 0 {
        snap.avg_queue_wait_ms = wait_total as f64 / snap.started as f64;
    }

    snap
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    #[test]
    fn averages_cover_finished_attempts() {
        let id = Uuid::new_v4();
        let events: VecDeque<_> = vec![
            TelemetryEvent::JobSubmitted { job_id: id, priority: 0 },
            TelemetryEvent::JobStarted { job_id: id, attempt: 1, queue_wait_ms: 10 },
            TelemetryEvent::JobRetried { job_id: id, retry_count: 1, delay_ms: 5 },
            TelemetryEvent::JobStarted { job_id: id, attempt: 2, queue_wait_ms: 30 },
            TelemetryEvent::JobCompleted { job_id: id, run_ms: 40 },
            TelemetryEvent::JobCancelled { job_id: Uuid::new_v4(), was_running: true },
        ]
        .into();

        let snap = compute_snapshot(&events);
        assert_eq!(snap.started, 2);
        assert_eq!(snap.retries, 1);
        assert_eq!(snap.completed, 1);
        assert_eq!(snap.cancelled_while_running, 1);
        assert_eq!(snap.avg_queue_wait_ms, 20.0);
        assert_eq!(snap.max_run_ms, 40);
    }
}
