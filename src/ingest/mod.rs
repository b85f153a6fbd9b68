//! Ingestion pipeline
//!
//! An [`IngestionTask`] fetches one source's current conditions and persists
//! them. The [`TaskRunner`] executes tasks submitted by the [`Scheduler`] or
//! by on-demand callers through the [`Ingestor`]: fetches run concurrently on
//! a bounded worker pool, writes go through a single writer loop.

mod ingestor;
mod runner;
mod scheduler;
mod task;

pub use ingestor::{Acknowledgement, Ingestor};
pub use runner::{
    RunnerConfig, RunnerHandle, Submission, SubmissionRejected, TaskReport, TaskRunner, Trigger,
};
pub use scheduler::{Schedule, ScheduleError, ScheduledSource, Scheduler, SchedulerState};
pub use task::{IngestError, IngestionTask};
