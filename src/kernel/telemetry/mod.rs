//! Queue telemetry.
//!
//! # PRIVACY INVARIANT
//! Events carry job ids, counters and timings only. Audio bytes, transcript
//! text and handler error messages never enter the recorder: recordings are
//! clinical conversations.
//!
//! Telemetry is a read-only side channel. Scheduling decisions never read it.

pub mod event;
pub mod metrics;
pub mod recorder;

pub use event::TelemetryEvent;
pub use metrics::TelemetrySnapshot;
pub use recorder::TelemetryRecorder;
