//! Periodic scheduler
//!
//! Fires one ingestion per configured source on every tick. Ticks only
//! submit work, so a slow or failing fetch never holds up another source or
//! the next tick. Missed ticks are skipped rather than backfilled.

use super::{IngestionTask, RunnerHandle, Trigger};
use log::{debug, info, warn};
use std::sync::atomic::{AtomicU64, AtomicU8, Ordering};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

/// A source fetched on every tick
#[derive(Debug, Clone, PartialEq)]
pub struct ScheduledSource {
    pub key: String,
    pub latitude: f64,
    pub longitude: f64,
}

impl ScheduledSource {
    pub fn new(key: impl Into<String>, latitude: f64, longitude: f64) -> Self {
        Self {
            key: key.into(),
            latitude,
            longitude,
        }
    }

    /// The ingestion task for this source
    pub fn task(&self) -> IngestionTask {
        IngestionTask::new(&self.key, self.latitude, self.longitude)
    }
}

/// What to fetch and how often
#[derive(Debug, Clone, PartialEq)]
pub struct Schedule {
    /// Time between ticks
    pub interval: Duration,
    /// Fire the first tick at start instead of after one interval
    pub fire_immediately: bool,
    /// Sources fetched on every tick
    pub sources: Vec<ScheduledSource>,
}

impl Schedule {
    /// Create an empty schedule
    pub fn new(interval: Duration) -> Self {
        Self {
            interval,
            fire_immediately: false,
            sources: Vec::new(),
        }
    }

    /// Add a source (builder pattern)
    pub fn with_source(mut self, key: impl Into<String>, latitude: f64, longitude: f64) -> Self {
        self.sources.push(ScheduledSource::new(key, latitude, longitude));
        self
    }

    /// Fire the first tick immediately (builder pattern)
    pub fn fire_immediately(mut self, fire: bool) -> Self {
        self.fire_immediately = fire;
        self
    }
}

/// A schedule that cannot be run
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ScheduleError {
    #[error("schedule interval must be greater than zero")]
    ZeroInterval,
}

/// Scheduler lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum SchedulerState {
    Idle = 0,
    Waiting = 1,
    Firing = 2,
    Stopped = 3,
}

impl SchedulerState {
    fn from_u8(value: u8) -> Self {
        match value {
            0 => SchedulerState::Idle,
            1 => SchedulerState::Waiting,
            2 => SchedulerState::Firing,
            _ => SchedulerState::Stopped,
        }
    }
}

/// Marks the scheduler stopped when the loop future is dropped, however it ends
struct StoppedOnExit(Arc<AtomicU8>);

impl Drop for StoppedOnExit {
    fn drop(&mut self) {
        self.0.store(SchedulerState::Stopped as u8, Ordering::SeqCst);
    }
}

/// Running schedule
pub struct Scheduler {
    state: Arc<AtomicU8>,
    ticks: Arc<AtomicU64>,
    shutdown: CancellationToken,
    task: Option<JoinHandle<()>>,
}

impl Scheduler {
    /// Start firing `schedule` into `runner` on the current Tokio runtime
    pub fn spawn(schedule: Schedule, runner: RunnerHandle) -> Result<Self, ScheduleError> {
        if schedule.interval.is_zero() {
            return Err(ScheduleError::ZeroInterval);
        }

        let state = Arc::new(AtomicU8::new(SchedulerState::Idle as u8));
        let ticks = Arc::new(AtomicU64::new(0));
        let shutdown = CancellationToken::new();

        let task = tokio::spawn(run(
            schedule,
            runner,
            StoppedOnExit(Arc::clone(&state)),
            Arc::clone(&ticks),
            shutdown.clone(),
        ));

        Ok(Self {
            state,
            ticks,
            shutdown,
            task: Some(task),
        })
    }

    /// Current lifecycle state
    pub fn state(&self) -> SchedulerState {
        SchedulerState::from_u8(self.state.load(Ordering::SeqCst))
    }

    /// Number of ticks fired so far
    pub fn ticks(&self) -> u64 {
        self.ticks.load(Ordering::SeqCst)
    }

    /// Stop the scheduler and wait for its loop to exit
    pub async fn shutdown(&mut self) {
        self.shutdown.cancel();
        if let Some(task) = self.task.take() {
            if let Err(e) = task.await {
                warn!("scheduler loop ended abnormally: {}", e);
            }
        }
    }
}

impl Drop for Scheduler {
    fn drop(&mut self) {
        self.shutdown.cancel();
    }
}

async fn run(
    schedule: Schedule,
    runner: RunnerHandle,
    stopped: StoppedOnExit,
    ticks: Arc<AtomicU64>,
    shutdown: CancellationToken,
) {
    let state = &stopped.0;
    let first = if schedule.fire_immediately {
        Instant::now()
    } else {
        Instant::now() + schedule.interval
    };
    let mut ticker = tokio::time::interval_at(first, schedule.interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

    info!(
        "scheduler started: {} sources every {:?}",
        schedule.sources.len(),
        schedule.interval
    );

    loop {
        state.store(SchedulerState::Waiting as u8, Ordering::SeqCst);
        tokio::select! {
            _ = shutdown.cancelled() => break,
            _ = ticker.tick() => {}
        }

        state.store(SchedulerState::Firing as u8, Ordering::SeqCst);
        let tick = ticks.fetch_add(1, Ordering::SeqCst) + 1;
        fire(&schedule, &runner, tick);
    }

    drop(stopped);
    info!("scheduler stopped after {} ticks", ticks.load(Ordering::SeqCst));
}

fn fire(schedule: &Schedule, runner: &RunnerHandle, tick: u64) {
    debug!("tick {}: submitting {} sources", tick, schedule.sources.len());
    for source in &schedule.sources {
        if let Err(e) = runner.submit(source.task(), Trigger::Scheduled) {
            warn!("tick {}: could not submit ingestion for {}: {}", tick, source.key, e);
        }
    }
}
