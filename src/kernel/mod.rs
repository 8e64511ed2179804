pub mod backoff;
pub mod job;
pub mod pipeline;
pub mod queue;
pub mod telemetry;
