//! Task runner
//!
//! Submissions land on a bounded queue. A dispatcher hands each job to a
//! fetch task once a worker permit is free, and every fetch result is funneled
//! into one writer loop, which is the only place the store is written from.

use super::{Acknowledgement, IngestError, IngestionTask};
use crate::provider::{Reading, WeatherProvider};
use crate::store::{Measurement, MeasurementStore, PutOutcome};
use chrono::{DateTime, Utc};
use log::{debug, info, warn};
use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use thiserror::Error;
use tokio::sync::mpsc::error::TrySendError;
use tokio::sync::{mpsc, oneshot, Semaphore};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

/// Runner sizing and deadlines
#[derive(Debug, Clone, PartialEq)]
pub struct RunnerConfig {
    /// Maximum number of fetches in flight
    pub workers: usize,
    /// Maximum number of accepted but not yet started tasks
    pub queue_capacity: usize,
    /// Deadline for each provider fetch
    pub fetch_timeout: Duration,
}

impl Default for RunnerConfig {
    fn default() -> Self {
        Self {
            workers: 4,
            queue_capacity: 64,
            fetch_timeout: Duration::from_secs(10),
        }
    }
}

/// Who asked for an ingestion
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Trigger {
    OnDemand,
    Scheduled,
}

impl fmt::Display for Trigger {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Trigger::OnDemand => f.write_str("on-demand"),
            Trigger::Scheduled => f.write_str("scheduled"),
        }
    }
}

/// The runner could not accept a task
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum SubmissionRejected {
    #[error("task queue is full ({capacity} tasks pending)")]
    QueueFull { capacity: usize },

    #[error("task runner is shut down")]
    Closed,
}

/// Final outcome of one submitted task
#[derive(Debug)]
pub struct TaskReport {
    pub source_key: String,
    pub trigger: Trigger,
    pub outcome: Result<PutOutcome, IngestError>,
    pub finished_at: DateTime<Utc>,
}

impl TaskReport {
    /// Whether the task reached the store without error
    pub fn is_success(&self) -> bool {
        self.outcome.is_ok()
    }

    /// The measurement written by this task, if any
    pub fn measurement(&self) -> Option<&Measurement> {
        self.outcome.as_ref().ok().and_then(PutOutcome::stored)
    }
}

struct Job {
    task: IngestionTask,
    trigger: Trigger,
    reply: oneshot::Sender<Arc<TaskReport>>,
}

struct Fetched {
    job: Job,
    result: Result<Reading, IngestError>,
}

type ReportLog = Mutex<HashMap<String, Arc<TaskReport>>>;

/// An accepted task
///
/// Dropping it is fine: the task still runs and its report is still recorded.
#[derive(Debug)]
pub struct Submission {
    task: IngestionTask,
    trigger: Trigger,
    completion: oneshot::Receiver<Arc<TaskReport>>,
}

impl Submission {
    /// The submitted task
    pub fn task(&self) -> &IngestionTask {
        &self.task
    }

    /// Who submitted the task
    pub fn trigger(&self) -> Trigger {
        self.trigger
    }

    /// Acknowledgement payload for the submitter
    pub fn acknowledgement(&self) -> Acknowledgement {
        Acknowledgement::from(&self.task)
    }

    /// Wait for the task to finish
    ///
    /// Returns `None` if the runner went away without reporting.
    pub async fn wait(self) -> Option<Arc<TaskReport>> {
        self.completion.await.ok()
    }
}

/// Cloneable submission side of a [`TaskRunner`]
#[derive(Clone)]
pub struct RunnerHandle {
    sender: mpsc::Sender<Job>,
    reports: Arc<ReportLog>,
    capacity: usize,
}

impl RunnerHandle {
    /// Submit a task without waiting for it to run
    pub fn submit(
        &self,
        task: IngestionTask,
        trigger: Trigger,
    ) -> Result<Submission, SubmissionRejected> {
        let (reply, completion) = oneshot::channel();
        let job = Job {
            task: task.clone(),
            trigger,
            reply,
        };

        match self.sender.try_send(job) {
            Ok(()) => {
                debug!("queued {} ingestion for {}", trigger, task.source_key);
                Ok(Submission {
                    task,
                    trigger,
                    completion,
                })
            }
            Err(TrySendError::Full(_)) => Err(SubmissionRejected::QueueFull {
                capacity: self.capacity,
            }),
            Err(TrySendError::Closed(_)) => Err(SubmissionRejected::Closed),
        }
    }

    /// The last finished task's report for a key
    pub fn last_report(&self, source_key: &str) -> Option<Arc<TaskReport>> {
        self.reports
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .get(source_key)
            .cloned()
    }
}

/// Worker pool plus single writer executing [`IngestionTask`]s
pub struct TaskRunner {
    handle: RunnerHandle,
    shutdown: CancellationToken,
    dispatcher: Option<JoinHandle<()>>,
    writer: Option<JoinHandle<()>>,
}

impl TaskRunner {
    /// Start the runner on the current Tokio runtime
    pub fn start(
        config: RunnerConfig,
        provider: Arc<dyn WeatherProvider>,
        store: Arc<dyn MeasurementStore>,
    ) -> Self {
        let workers = config.workers.max(1);
        let capacity = config.queue_capacity.max(1);
        let (sender, receiver) = mpsc::channel(capacity);
        let (fetched_tx, fetched_rx) = mpsc::unbounded_channel();
        let reports: Arc<ReportLog> = Arc::default();
        let shutdown = CancellationToken::new();

        info!(
            "starting task runner ({} workers, queue of {}, {:?} fetch timeout, provider {})",
            workers,
            capacity,
            config.fetch_timeout,
            provider.name()
        );

        let dispatcher = tokio::spawn(dispatch(
            receiver,
            provider,
            fetched_tx,
            Arc::new(Semaphore::new(workers)),
            config.fetch_timeout,
            shutdown.clone(),
        ));
        let writer = tokio::spawn(write_loop(fetched_rx, store, Arc::clone(&reports)));

        Self {
            handle: RunnerHandle {
                sender,
                reports,
                capacity,
            },
            shutdown,
            dispatcher: Some(dispatcher),
            writer: Some(writer),
        }
    }

    /// Get a submission handle
    pub fn handle(&self) -> RunnerHandle {
        self.handle.clone()
    }

    /// Check if the runner still accepts tasks
    pub fn is_running(&self) -> bool {
        !self.shutdown.is_cancelled()
    }

    /// Stop accepting tasks, cancel in-flight fetches and wait for the writer
    ///
    /// Queued and cancelled tasks are reported as [`IngestError::Cancelled`].
    pub async fn shutdown(&mut self) {
        self.shutdown.cancel();
        for task in [self.dispatcher.take(), self.writer.take()].into_iter().flatten() {
            if let Err(e) = task.await {
                warn!("task runner loop ended abnormally: {}", e);
            }
        }
        info!("task runner stopped");
    }
}

impl Drop for TaskRunner {
    fn drop(&mut self) {
        self.shutdown.cancel();
    }
}

async fn dispatch(
    mut receiver: mpsc::Receiver<Job>,
    provider: Arc<dyn WeatherProvider>,
    fetched_tx: mpsc::UnboundedSender<Fetched>,
    workers: Arc<Semaphore>,
    fetch_timeout: Duration,
    shutdown: CancellationToken,
) {
    loop {
        let job = tokio::select! {
            _ = shutdown.cancelled() => break,
            job = receiver.recv() => match job {
                Some(job) => job,
                None => break,
            },
        };

        let permit = tokio::select! {
            _ = shutdown.cancelled() => None,
            permit = Arc::clone(&workers).acquire_owned() => permit.ok(),
        };
        let Some(permit) = permit else {
            let _ = fetched_tx.send(Fetched {
                job,
                result: Err(IngestError::Cancelled),
            });
            break;
        };

        let provider = Arc::clone(&provider);
        let fetched_tx = fetched_tx.clone();
        let shutdown = shutdown.clone();
        tokio::spawn(async move {
            let result = tokio::select! {
                _ = shutdown.cancelled() => Err(IngestError::Cancelled),
                result = job.task.fetch(provider.as_ref(), fetch_timeout) => result,
            };
            drop(permit);
            let _ = fetched_tx.send(Fetched { job, result });
        });
    }

    receiver.close();
    while let Ok(job) = receiver.try_recv() {
        let _ = fetched_tx.send(Fetched {
            job,
            result: Err(IngestError::Cancelled),
        });
    }
}

async fn write_loop(
    mut fetched_rx: mpsc::UnboundedReceiver<Fetched>,
    store: Arc<dyn MeasurementStore>,
    reports: Arc<ReportLog>,
) {
    while let Some(Fetched { job, result }) = fetched_rx.recv().await {
        let Job {
            task,
            trigger,
            reply,
        } = job;

        let outcome = match result {
            Ok(reading) => persist_blocking(&task, reading, &store).await,
            Err(e) => Err(e),
        };
        log_outcome(&task, trigger, &outcome);

        let report = Arc::new(TaskReport {
            source_key: task.source_key.clone(),
            trigger,
            outcome,
            finished_at: Utc::now(),
        });
        reports
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .insert(task.source_key, Arc::clone(&report));
        let _ = reply.send(report);
    }
}

/// Run the store write off the async workers; awaiting it keeps writes sequential
async fn persist_blocking(
    task: &IngestionTask,
    reading: Reading,
    store: &Arc<dyn MeasurementStore>,
) -> Result<PutOutcome, IngestError> {
    let task = task.clone();
    let store = Arc::clone(store);
    tokio::task::spawn_blocking(move || task.persist(&reading, store.as_ref()))
        .await
        .unwrap_or_else(|e| Err(IngestError::WriteAborted(e.to_string())))
}

fn log_outcome(task: &IngestionTask, trigger: Trigger, outcome: &Result<PutOutcome, IngestError>) {
    match outcome {
        Ok(PutOutcome::Stored(m)) => info!("stored {} measurement: {}", trigger, m),
        Ok(PutOutcome::Superseded {
            existing_observed_at,
        }) => info!(
            "kept newer measurement for {} (observed {})",
            task.source_key, existing_observed_at
        ),
        Err(IngestError::Cancelled) => {
            debug!("{} ingestion for {} cancelled", trigger, task.source_key)
        }
        Err(e) => warn!("{} ingestion for {} failed: {}", trigger, task.source_key, e),
    }
}
