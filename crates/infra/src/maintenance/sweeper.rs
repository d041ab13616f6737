use chrono::{DateTime, Duration, Utc};
use tracing::{debug, warn};

use super::{Housekeeping, Phase};
use crate::tasks::{TaskStatus, TaskStore, TaskStoreError, Transition};

/// Error recorded on tasks failed by the sweep.
pub const PROCESSING_TIMED_OUT: &str = "processing timed out";

/// Fails tasks that have been PROCESSING for longer than `stale_after`.
///
/// Uses the same conditional update as the processor, so a run that finishes
/// concurrently wins and the sweep skips that task.
#[derive(Debug, Clone)]
pub struct StaleTaskSweeper<S> {
    store: S,
    stale_after: Duration,
}

impl<S: TaskStore> StaleTaskSweeper<S> {
    pub fn new(store: S, stale_after: Duration) -> Self {
        Self { store, stale_after }
    }

    pub fn stale_after(&self) -> Duration {
        self.stale_after
    }

    pub fn sweep(&self, now: DateTime<Utc>) -> Result<usize, TaskStoreError> {
        let Some(cutoff) = now.checked_sub_signed(self.stale_after) else {
            return Ok(0);
        };

        let mut swept = 0;
        for task in self.store.processing_started_before(cutoff)? {
            match self.store.compare_and_transition(
                task.id,
                TaskStatus::Processing,
                Transition::fail(PROCESSING_TIMED_OUT),
            ) {
                Ok(_) => {
                    warn!(
                        task_id = %task.id,
                        started_at = ?task.started_at,
                        "stale training task failed"
                    );
                    swept += 1;
                }
                Err(err) if err.is_conflict() => {
                    debug!(task_id = %task.id, "stale task finished before the sweep reached it");
                }
                Err(err) => return Err(err),
            }
        }
        Ok(swept)
    }
}

impl<S: TaskStore> Housekeeping for StaleTaskSweeper<S> {
    fn name(&self) -> &'static str {
        "stale_task_sweep"
    }

    fn phase(&self) -> Phase {
        Phase::BeforeRun
    }

    fn run(&self, now: DateTime<Utc>) -> Result<usize, TaskStoreError> {
        self.sweep(now)
    }
}
