use std::panic::{self, AssertUnwindSafe};
use std::sync::{Arc, Condvar, Mutex, PoisonError};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use serde::Serialize;
use tracing::{error, info, warn};

use crate::pipeline::{CycleOutcome, Pipeline};
use crate::source::ImageSource;

pub const DEFAULT_INTERVAL: Duration = Duration::from_secs(60);

/// Cloneable stop flag. Waiting on it wakes as soon as it is triggered.
#[derive(Debug, Clone, Default)]
pub struct StopSignal {
    inner: Arc<StopState>,
}

#[derive(Debug, Default)]
struct StopState {
    stopped: Mutex<bool>,
    condvar: Condvar,
}

impl StopSignal {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn trigger(&self) {
        let mut stopped = self
            .inner
            .stopped
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        *stopped = true;
        self.inner.condvar.notify_all();
    }

    pub fn is_triggered(&self) -> bool {
        *self
            .inner
            .stopped
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    /// Sleeps for up to `timeout`. Returns true if the signal was triggered.
    pub fn wait(&self, timeout: Duration) -> bool {
        let guard = self
            .inner
            .stopped
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        let (guard, _) = self
            .inner
            .condvar
            .wait_timeout_while(guard, timeout, |stopped| !*stopped)
            .unwrap_or_else(PoisonError::into_inner);
        *guard
    }
}

#[derive(Debug, Clone)]
pub struct SchedulerOptions {
    /// Pause between the end of one cycle and the start of the next.
    pub interval: Duration,
    pub max_cycles: Option<u64>,
}

impl Default for SchedulerOptions {
    fn default() -> Self {
        Self {
            interval: DEFAULT_INTERVAL,
            max_cycles: None,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SchedulerSummary {
    pub cycles: u64,
    pub images_saved: u64,
    pub batches_created: u64,
    pub upstream_failures: u64,
    /// Cycles that returned an error or panicked.
    pub failed_cycles: u64,
}

impl SchedulerSummary {
    fn record(&mut self, outcome: Option<&CycleOutcome>) {
        self.cycles += 1;
        match outcome {
            None => self.failed_cycles += 1,
            Some(CycleOutcome::UpstreamFailed { .. }) => self.upstream_failures += 1,
            Some(CycleOutcome::NothingNew { .. } | CycleOutcome::NothingSaved { .. }) => {}
            Some(CycleOutcome::Ingested(report)) => {
                self.batches_created += 1;
                self.images_saved += report.saved.len() as u64;
            }
        }
    }
}

/// Runs ingestion cycles back to back with a fixed rest in between. Cycles
/// never overlap and a failing cycle never ends the loop.
pub struct Scheduler<S: ImageSource> {
    pipeline: Pipeline<S>,
    options: SchedulerOptions,
}

impl<S: ImageSource + 'static> Scheduler<S> {
    pub fn new(pipeline: Pipeline<S>, options: SchedulerOptions) -> Self {
        Self { pipeline, options }
    }

    pub fn pipeline(&self) -> &Pipeline<S> {
        &self.pipeline
    }

    pub fn into_pipeline(self) -> Pipeline<S> {
        self.pipeline
    }

    /// Loops until `stop` is triggered or `max_cycles` is reached.
    pub fn run(&mut self, stop: &StopSignal) -> SchedulerSummary {
        let mut summary = SchedulerSummary::default();
        info!(interval_secs = self.options.interval.as_secs(), "scheduler started");
        loop {
            if stop.is_triggered() {
                break;
            }
            let outcome = self.run_guarded();
            summary.record(outcome.as_ref());

            if let Some(max) = self.options.max_cycles {
                if summary.cycles >= max {
                    break;
                }
            }
            if stop.wait(self.options.interval) {
                break;
            }
        }
        info!(
            cycles = summary.cycles,
            images_saved = summary.images_saved,
            failed_cycles = summary.failed_cycles,
            "scheduler stopped"
        );
        summary
    }

    /// Moves the scheduler onto its own thread. The pipeline comes back with
    /// the summary once the loop ends.
    pub fn spawn(mut self, stop: StopSignal) -> JoinHandle<(SchedulerSummary, Pipeline<S>)> {
        thread::spawn(move || {
            let summary = self.run(&stop);
            (summary, self.pipeline)
        })
    }

    fn run_guarded(&mut self) -> Option<CycleOutcome> {
        let pipeline = &mut self.pipeline;
        match panic::catch_unwind(AssertUnwindSafe(|| pipeline.run_cycle())) {
            Ok(Ok(outcome)) => Some(outcome),
            Ok(Err(err)) => {
                warn!(error = %err, "cycle failed");
                None
            }
            Err(payload) => {
                let message = payload
                    .downcast_ref::<&str>()
                    .map(|msg| msg.to_string())
                    .or_else(|| payload.downcast_ref::<String>().cloned())
                    .unwrap_or_else(|| "unknown panic".to_string());
                error!(panic = %message, "cycle panicked");
                None
            }
        }
    }
}
