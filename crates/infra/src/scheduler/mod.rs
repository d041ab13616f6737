//! Scheduler: fires the queue processor periodically and on demand.
//!
//! Both entry points go through [`TrainingScheduler::fire`], which never
//! propagates an error or a panic. Overlapping firings are not coordinated
//! here; the task store's conditional claim keeps them safe.

pub mod stats;
pub mod ticker;
pub mod worker;

use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::{debug, error, info, warn};

use crate::maintenance::{Housekeeping, Phase};
use crate::processor::{RunOnce, RunOutcome, panic_message};

pub use stats::{SchedulerStats, SchedulerStatsSnapshot};
pub use ticker::{IntervalTicker, ManualTicker, TickSender, Ticker};
pub use worker::SchedulerHandle;

/// What caused a firing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FireReason {
    Tick,
    Trigger,
    Manual,
}

impl FireReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            FireReason::Tick => "tick",
            FireReason::Trigger => "trigger",
            FireReason::Manual => "manual",
        }
    }
}

/// Reply of the manual entry point: `{"success": true, "message": ...}` or
/// `{"success": false, "error": ...}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ManualTriggerResponse {
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl From<&RunOutcome> for ManualTriggerResponse {
    fn from(outcome: &RunOutcome) -> Self {
        if outcome.is_success() {
            Self {
                success: true,
                message: Some(outcome.message()),
                error: None,
            }
        } else {
            Self {
                success: false,
                message: None,
                error: Some(outcome.message()),
            }
        }
    }
}

/// Wraps a processor with housekeeping and run accounting.
pub struct TrainingScheduler<P> {
    processor: Arc<P>,
    housekeeping: Arc<Vec<Box<dyn Housekeeping>>>,
    stats: Arc<SchedulerStats>,
}

impl<P> Clone for TrainingScheduler<P> {
    fn clone(&self) -> Self {
        Self {
            processor: Arc::clone(&self.processor),
            housekeeping: Arc::clone(&self.housekeeping),
            stats: Arc::clone(&self.stats),
        }
    }
}

impl<P> core::fmt::Debug for TrainingScheduler<P> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("TrainingScheduler")
            .field(
                "housekeeping",
                &self.housekeeping.iter().map(|h| h.name()).collect::<Vec<_>>(),
            )
            .field("stats", &self.stats.snapshot())
            .finish_non_exhaustive()
    }
}

impl<P: RunOnce + 'static> TrainingScheduler<P> {
    pub fn new(processor: P) -> Self {
        Self {
            processor: Arc::new(processor),
            housekeeping: Arc::new(Vec::new()),
            stats: Arc::new(SchedulerStats::default()),
        }
    }

    /// Register a housekeeping step. Must be called before the scheduler is
    /// cloned or spawned.
    pub fn with_housekeeping<H>(mut self, step: H) -> Self
    where
        H: Housekeeping + 'static,
    {
        match Arc::get_mut(&mut self.housekeeping) {
            Some(steps) => steps.push(Box::new(step)),
            None => warn!(step = step.name(), "scheduler already shared; housekeeping step ignored"),
        }
        self
    }

    pub fn stats(&self) -> SchedulerStatsSnapshot {
        self.stats.snapshot()
    }

    /// One complete firing: pre-run housekeeping, one processor run,
    /// post-run housekeeping.
    pub fn fire(&self, reason: FireReason) -> RunOutcome {
        self.housekeep(Phase::BeforeRun);

        let outcome = match panic::catch_unwind(AssertUnwindSafe(|| self.processor.run_once())) {
            Ok(outcome) => outcome,
            Err(payload) => {
                let message = panic_message(payload.as_ref());
                error!(reason = reason.as_str(), panic = %message, "queue processor panicked");
                self.stats.record_panic();
                RunOutcome::Aborted {
                    task_id: None,
                    error: format!("queue processor panicked: {message}"),
                }
            }
        };
        self.stats.record(&outcome);
        log_outcome(reason, &outcome);

        self.housekeep(Phase::AfterRun);
        outcome
    }

    /// Manual, synchronous entry point.
    pub fn run_now(&self) -> ManualTriggerResponse {
        ManualTriggerResponse::from(&self.fire(FireReason::Manual))
    }

    fn housekeep(&self, phase: Phase) {
        let now = Utc::now();
        for step in self.housekeeping.iter().filter(|s| s.phase() == phase) {
            match panic::catch_unwind(AssertUnwindSafe(|| step.run(now))) {
                Ok(Ok(0)) => {}
                Ok(Ok(touched)) => debug!(step = step.name(), touched, "housekeeping step done"),
                Ok(Err(err)) => warn!(step = step.name(), error = %err, "housekeeping step failed"),
                Err(payload) => error!(
                    step = step.name(),
                    panic = %panic_message(payload.as_ref()),
                    "housekeeping step panicked"
                ),
            }
        }
    }
}

fn log_outcome(reason: FireReason, outcome: &RunOutcome) {
    let reason = reason.as_str();
    match outcome {
        RunOutcome::Idle => debug!(reason, "scheduler firing found no work"),
        RunOutcome::LostClaim { task_id } => {
            info!(reason, task_id = %task_id, "scheduler firing lost the claim race")
        }
        RunOutcome::Completed { task_id, .. } => {
            info!(reason, task_id = %task_id, "scheduler firing completed a task")
        }
        RunOutcome::Failed { task_id, error } => {
            warn!(reason, task_id = %task_id, error = %error, "scheduler firing failed a task")
        }
        RunOutcome::Aborted { task_id, error } => {
            error!(reason, task_id = ?task_id, error = %error, "scheduler firing aborted")
        }
    }
}
