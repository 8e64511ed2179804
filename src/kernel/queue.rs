//! Bounded-concurrency priority job queue.
//!
//! All queue state lives inside one scheduler task. `JobQueue` handles talk to
//! it over channels, so submitters never lock anything and never block: the
//! scheduler is the single writer of job state.

use std::cmp::Ordering;
use std::collections::{BinaryHeap, HashMap, HashSet};
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::{broadcast, mpsc, oneshot};
use tokio::task::JoinError;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::backoff::BackoffPolicy;
use super::job::{
    JobError, JobEvent, JobId, JobOutcome, JobStatus, ProcessingJob, QueueStats, SubmitOptions, DEFAULT_MAX_RETRIES,
};
use super::telemetry::{TelemetryEvent, TelemetryRecorder, TelemetrySnapshot};
use crate::error::QueueError;

/// The work a queue performs for each job.
#[async_trait]
pub trait JobHandler<P, R>: Send + Sync {
    async fn process(&self, payload: Arc<P>) -> Result<R, JobError>;
}

#[derive(Debug, Clone)]
pub struct JobQueueConfig {
    /// Upper bound on jobs in `Processing` at once.
    pub max_concurrent: usize,
    /// Default for jobs submitted without an explicit limit.
    pub max_retries: u32,
    pub retry_base_delay: Duration,
    pub backoff: BackoffPolicy,
    /// `None` lets an attempt run for as long as the handler takes.
    pub job_timeout: Option<Duration>,
    /// Buffer of the progress broadcast channel. Slow subscribers lag, they never block the queue.
    pub event_capacity: usize,
}

impl Default for JobQueueConfig {
    fn default() -> Self {
        Self {
            max_concurrent: 2,
            max_retries: DEFAULT_MAX_RETRIES,
            retry_base_delay: Duration::from_millis(1000),
            backoff: BackoffPolicy::Linear,
            job_timeout: None,
            event_capacity: 256,
        }
    }
}

/// Caller's side of a submitted job: its id plus the one terminal outcome.
#[derive(Debug)]
pub struct JobHandle<R> {
    id: JobId,
    outcome: oneshot::Receiver<JobOutcome<R>>,
}

impl<R> JobHandle<R> {
    pub fn id(&self) -> JobId {
        self.id
    }

    /// Waits for the job to complete, fail or be cancelled.
    pub async fn outcome(self) -> Result<JobOutcome<R>, QueueError> {
        self.outcome.await.map_err(|_| QueueError::Dropped)
    }
}

enum Command<P, R> {
    Submit {
        job: ProcessingJob<P, R>,
        outcome: oneshot::Sender<JobOutcome<R>>,
    },
    Cancel {
        id: JobId,
        reply: oneshot::Sender<bool>,
    },
    Status {
        id: JobId,
        reply: oneshot::Sender<Option<ProcessingJob<P, R>>>,
    },
    Stats {
        reply: oneshot::Sender<QueueStats>,
    },
    Telemetry {
        reply: oneshot::Sender<TelemetrySnapshot>,
    },
    ClearFinished {
        reply: oneshot::Sender<usize>,
    },
}

enum Internal<R> {
    Finished {
        id: JobId,
        result: Result<R, JobError>,
        run: Duration,
        timed_out: Option<Duration>,
    },
    RetryDue {
        id: JobId,
    },
}

/// Cloneable handle to a running scheduler.
///
/// Dropping every handle lets the scheduler finish outstanding jobs and exit;
/// `shutdown` stops it immediately.
pub struct JobQueue<P, R> {
    commands: mpsc::UnboundedSender<Command<P, R>>,
    events: broadcast::Sender<JobEvent>,
    shutdown: CancellationToken,
    default_max_retries: u32,
}

impl<P, R> Clone for JobQueue<P, R> {
    fn clone(&self) -> Self {
        Self {
            commands: self.commands.clone(),
            events: self.events.clone(),
            shutdown: self.shutdown.clone(),
            default_max_retries: self.default_max_retries,
        }
    }
}

impl<P, R> JobQueue<P, R>
where
    P: Send + Sync + 'static,
    R: Clone + Send + 'static,
{
    /// Spawns the scheduler onto the current tokio runtime.
    ///
    /// A `max_concurrent` of 0 is raised to 1 so submitted jobs can always start.
    pub fn new(mut config: JobQueueConfig, handler: Arc<dyn JobHandler<P, R>>) -> Self {
        if config.max_concurrent == 0 {
            warn!("max_concurrent of 0 would never start a job, using 1");
            config.max_concurrent = 1;
        }
        let (commands, command_rx) = mpsc::unbounded_channel();
        let (internal_tx, internal_rx) = mpsc::unbounded_channel();
        let (events, _) = broadcast::channel(config.event_capacity.max(1));
        let shutdown = CancellationToken::new();
        let default_max_retries = config.max_retries;

        let scheduler = Scheduler {
            config,
            handler,
            jobs: HashMap::new(),
            pending: BinaryHeap::new(),
            in_flight: HashSet::new(),
            waiting_retry: HashSet::new(),
            next_seq: 0,
            internal_tx,
            events: events.clone(),
            telemetry: TelemetryRecorder::new(),
        };
        tokio::spawn(scheduler.run(command_rx, internal_rx, shutdown.clone()));

        Self {
            commands,
            events,
            shutdown,
            default_max_retries,
        }
    }

    /// Queues `payload` and returns at once. The job starts as soon as a slot is free.
    pub fn submit(&self, payload: P, options: SubmitOptions) -> Result<JobHandle<R>, QueueError> {
        let options = SubmitOptions {
            max_retries: Some(options.max_retries.unwrap_or(self.default_max_retries)),
            ..options
        };
        let job = ProcessingJob::new(payload, options);
        let id = job.id;
        let (outcome_tx, outcome_rx) = oneshot::channel();

        self.commands
            .send(Command::Submit { job, outcome: outcome_tx })
            .map_err(|_| QueueError::Closed)?;

        Ok(JobHandle { id, outcome: outcome_rx })
    }

    /// Returns false if the job is unknown or already terminal.
    ///
    /// Cancelling a running job frees its slot and discards its result. The
    /// attempt itself keeps running to completion in the background.
    pub async fn cancel(&self, id: JobId) -> Result<bool, QueueError> {
        self.request(|reply| Command::Cancel { id, reply }).await
    }

    pub async fn status(&self, id: JobId) -> Result<Option<ProcessingJob<P, R>>, QueueError> {
        self.request(|reply| Command::Status { id, reply }).await
    }

    pub async fn stats(&self) -> Result<QueueStats, QueueError> {
        self.request(|reply| Command::Stats { reply }).await
    }

    pub async fn telemetry(&self) -> Result<TelemetrySnapshot, QueueError> {
        self.request(|reply| Command::Telemetry { reply }).await
    }

    /// Forgets completed, failed and cancelled jobs. Returns how many were removed.
    pub async fn clear_finished(&self) -> Result<usize, QueueError> {
        self.request(|reply| Command::ClearFinished { reply }).await
    }

    pub fn subscribe(&self) -> broadcast::Receiver<JobEvent> {
        self.events.subscribe()
    }

    pub fn shutdown(&self) {
        self.shutdown.cancel();
    }

    async fn request<T>(&self, build: impl FnOnce(oneshot::Sender<T>) -> Command<P, R>) -> Result<T, QueueError> {
        let (reply, response) = oneshot::channel();
        self.commands.send(build(reply)).map_err(|_| QueueError::Closed)?;
        response.await.map_err(|_| QueueError::Closed)
    }
}

struct Entry<P, R> {
    job: ProcessingJob<P, R>,
    seq: u64,
    outcome: Option<oneshot::Sender<JobOutcome<R>>>,
    queued_at: Instant,
}

/// Heap key: priority descending, then submission order ascending.
#[derive(Debug, PartialEq, Eq)]
struct QueuedJob {
    priority: i32,
    seq: u64,
    id: JobId,
}

impl Ord for QueuedJob {
    fn cmp(&self, other: &Self) -> Ordering {
        self.priority.cmp(&other.priority).then_with(|| other.seq.cmp(&self.seq))
    }
}

impl PartialOrd for QueuedJob {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

struct Scheduler<P, R> {
    config: JobQueueConfig,
    handler: Arc<dyn JobHandler<P, R>>,
    jobs: HashMap<JobId, Entry<P, R>>,
    // Cancelled or cleared jobs are left in the heap and skipped when popped.
    pending: BinaryHeap<QueuedJob>,
    in_flight: HashSet<JobId>,
    // Pending jobs sleeping out their backoff; not in the heap yet.
    waiting_retry: HashSet<JobId>,
    next_seq: u64,
    internal_tx: mpsc::UnboundedSender<Internal<R>>,
    events: broadcast::Sender<JobEvent>,
    telemetry: TelemetryRecorder,
}

impl<P, R> Scheduler<P, R>
where
    P: Send + Sync + 'static,
    R: Clone + Send + 'static,
{
    async fn run(
        mut self,
        mut commands: mpsc::UnboundedReceiver<Command<P, R>>,
        mut internal: mpsc::UnboundedReceiver<Internal<R>>,
        shutdown: CancellationToken,
    ) {
        info!("Job queue started (max_concurrent={})", self.config.max_concurrent);
        let mut accepting = true;

        loop {
            tokio::select! {
                _ = shutdown.cancelled() => {
                    info!("Job queue shutdown requested");
                    break;
                }
                cmd = commands.recv(), if accepting => match cmd {
                    Some(cmd) => self.handle_command(cmd),
                    None => {
                        debug!("All queue handles dropped, draining outstanding jobs");
                        accepting = false;
                    }
                },
                Some(msg) = internal.recv() => self.handle_internal(msg),
            }

            if !accepting && self.is_idle() {
                break;
            }
        }

        info!("Job queue stopped ({} jobs tracked)", self.jobs.len());
    }

    fn handle_command(&mut self, cmd: Command<P, R>) {
        match cmd {
            Command::Submit { job, outcome } => self.enqueue(job, outcome),
            Command::Cancel { id, reply } => {
                let _ = reply.send(self.cancel(id));
            }
            Command::Status { id, reply } => {
                let _ = reply.send(self.jobs.get(&id).map(|entry| entry.job.clone()));
            }
            Command::Stats { reply } => {
                let _ = reply.send(self.stats());
            }
            Command::Telemetry { reply } => {
                let _ = reply.send(self.telemetry.snapshot());
            }
            Command::ClearFinished { reply } => {
                let before = self.jobs.len();
                self.jobs.retain(|_, entry| !entry.job.status.is_terminal());
                let _ = reply.send(before - self.jobs.len());
            }
        }
    }

    fn handle_internal(&mut self, msg: Internal<R>) {
        match msg {
            Internal::Finished {
                id,
                result,
                run,
                timed_out,
            } => self.finish(id, result, run, timed_out),
            Internal::RetryDue { id } => {
                if !self.waiting_retry.remove(&id) {
                    return; // cancelled or cleared while backing off
                }
                if let Some(entry) = self.jobs.get_mut(&id) {
                    entry.queued_at = Instant::now();
                    self.pending.push(QueuedJob {
                        priority: entry.job.priority,
                        seq: entry.seq,
                        id,
                    });
                }
                self.fill_slots();
            }
        }
    }

    fn enqueue(&mut self, job: ProcessingJob<P, R>, outcome: oneshot::Sender<JobOutcome<R>>) {
        let id = job.id;
        let priority = job.priority;
        let seq = self.next_seq;
        self.next_seq += 1;

        self.jobs.insert(
            id,
            Entry {
                job,
                seq,
                outcome: Some(outcome),
                queued_at: Instant::now(),
            },
        );
        self.pending.push(QueuedJob { priority, seq, id });

        debug!("Job {} queued (priority {})", id, priority);
        self.telemetry.record(TelemetryEvent::JobSubmitted { job_id: id, priority });
        self.emit(JobEvent::Queued { id, priority });
        self.fill_slots();
    }

    fn fill_slots(&mut self) {
        while self.in_flight.len() < self.config.max_concurrent {
            let Some(next) = self.pending.pop() else {
                break;
            };
            let runnable = self
                .jobs
                .get(&next.id)
                .map(|entry| entry.job.status == JobStatus::Pending)
                .unwrap_or(false);
            if runnable && !self.waiting_retry.contains(&next.id) {
                self.start(next.id);
            }
        }
    }

    fn start(&mut self, id: JobId) {
        let Some(entry) = self.jobs.get_mut(&id) else {
            return;
        };
        entry.job.status = JobStatus::Processing;
        entry.job.started_at = Some(Utc::now());
        let attempt = entry.job.retry_count + 1;
        let queue_wait = entry.queued_at.elapsed();
        let payload = Arc::clone(&entry.job.payload);

        self.in_flight.insert(id);
        debug!("Job {} started (attempt {}, {} in flight)", id, attempt, self.in_flight.len());
        self.telemetry.record(TelemetryEvent::JobStarted {
            job_id: id,
            attempt,
            queue_wait_ms: queue_wait.as_millis() as u64,
        });
        self.emit(JobEvent::Started { id, attempt });

        let handler = Arc::clone(&self.handler);
        let tx = self.internal_tx.clone();
        let timeout = self.config.job_timeout;

        tokio::spawn(async move {
            let started = Instant::now();
            let mut work = tokio::spawn(async move { handler.process(payload).await });

            let (result, timed_out) = match timeout {
                Some(limit) => match tokio::time::timeout(limit, &mut work).await {
                    Ok(joined) => (flatten(joined), None),
                    Err(_) => {
                        work.abort();
                        let err = JobError::new(format!("job timed out after {}ms", limit.as_millis()));
                        (Err(err), Some(limit))
                    }
                },
                None => (flatten(work.await), None),
            };

            let _ = tx.send(Internal::Finished {
                id,
                result,
                run: started.elapsed(),
                timed_out,
            });
        });
    }

    fn finish(&mut self, id: JobId, result: Result<R, JobError>, run: Duration, timed_out: Option<Duration>) {
        let Some(entry) = self.jobs.get_mut(&id) else {
            return;
        };
        if entry.job.status != JobStatus::Processing {
            debug!("Discarding result of job {} ({:?})", id, entry.job.status);
            return;
        }
        self.in_flight.remove(&id);
        let run_ms = run.as_millis() as u64;

        if let Some(limit) = timed_out {
            self.telemetry.record(TelemetryEvent::JobTimedOut {
                job_id: id,
                limit_ms: limit.as_millis() as u64,
            });
        }

        let event = match result {
            Ok(value) => {
                entry.job.status = JobStatus::Completed;
                entry.job.completed_at = Some(Utc::now());
                entry.job.result = Some(value.clone());
                if let Some(tx) = entry.outcome.take() {
                    let _ = tx.send(JobOutcome::Completed(value));
                }
                info!("Job {} completed in {}ms", id, run_ms);
                self.telemetry.record(TelemetryEvent::JobCompleted { job_id: id, run_ms });
                JobEvent::Completed { id }
            }
            Err(err) if err.retryable && entry.job.retry_count < entry.job.max_retries => {
                entry.job.retry_count += 1;
                entry.job.status = JobStatus::Pending;
                let retry_count = entry.job.retry_count;
                let delay = self.config.backoff.delay(self.config.retry_base_delay, retry_count);
                let delay_ms = delay.as_millis() as u64;

                warn!(
                    "Job {} failed (retry {}/{} in {}ms): {}",
                    id, retry_count, entry.job.max_retries, delay_ms, err
                );
                self.waiting_retry.insert(id);
                let tx = self.internal_tx.clone();
                tokio::spawn(async move {
                    tokio::time::sleep(delay).await;
                    let _ = tx.send(Internal::RetryDue { id });
                });

                self.telemetry.record(TelemetryEvent::JobRetried {
                    job_id: id,
                    retry_count,
                    delay_ms,
                });
                JobEvent::Retrying {
                    id,
                    retry_count,
                    delay_ms,
                }
            }
            Err(err) => {
                entry.job.status = JobStatus::Failed;
                entry.job.completed_at = Some(Utc::now());
                entry.job.error = Some(err.message.clone());
                if let Some(tx) = entry.outcome.take() {
                    let _ = tx.send(JobOutcome::Failed(err.message.clone()));
                }
                warn!("Job {} failed after {} retries: {}", id, entry.job.retry_count, err);
                self.telemetry.record(TelemetryEvent::JobFailed {
                    job_id: id,
                    run_ms,
                    retries: entry.job.retry_count,
                });
                JobEvent::Failed { id, error: err.message }
            }
        };

        self.emit(event);
        self.fill_slots();
    }

    fn cancel(&mut self, id: JobId) -> bool {
        let Some(entry) = self.jobs.get_mut(&id) else {
            return false;
        };
        let was_running = match entry.job.status {
            JobStatus::Pending => false,
            JobStatus::Processing => true,
            JobStatus::Completed | JobStatus::Failed | JobStatus::Cancelled => return false,
        };

        entry.job.status = JobStatus::Cancelled;
        entry.job.completed_at = Some(Utc::now());
        if let Some(tx) = entry.outcome.take() {
            let _ = tx.send(JobOutcome::Cancelled);
        }
        self.in_flight.remove(&id);
        self.waiting_retry.remove(&id);

        info!("Job {} cancelled (was running: {})", id, was_running);
        self.telemetry.record(TelemetryEvent::JobCancelled {
            job_id: id,
            was_running,
        });
        self.emit(JobEvent::Cancelled { id });

        if was_running {
            self.fill_slots();
        }
        true
    }

    fn stats(&self) -> QueueStats {
        let mut stats = QueueStats {
            total: self.jobs.len(),
            ..QueueStats::default()
        };
        for entry in self.jobs.values() {
            match entry.job.status {
                JobStatus::Pending => stats.pending += 1,
                JobStatus::Processing => stats.processing += 1,
                JobStatus::Completed => stats.completed += 1,
                JobStatus::Failed => stats.failed += 1,
                JobStatus::Cancelled => stats.cancelled += 1,
            }
        }
        stats
    }

    fn is_idle(&self) -> bool {
        self.in_flight.is_empty()
            && self.waiting_retry.is_empty()
            && !self.jobs.values().any(|entry| entry.job.status == JobStatus::Pending)
    }

    fn emit(&self, event: JobEvent) {
        // No subscribers is fine.
        let _ = self.events.send(event);
    }
}

fn flatten<R>(joined: Result<Result<R, JobError>, JoinError>) -> Result<R, JobError> {
    match joined {
        Ok(result) => result,
        Err(e) if e.is_panic() => Err(JobError::new("job handler panicked")),
        Err(e) => Err(JobError::new(format!("job task aborted: {}", e))),
    }
}
