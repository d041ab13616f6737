use std::sync::atomic::{AtomicU64, Ordering};

use serde::Serialize;

use crate::processor::RunOutcome;

/// Firing counters, shared between the scheduler thread and its handle.
#[derive(Debug, Default)]
pub struct SchedulerStats {
    firings: AtomicU64,
    idle: AtomicU64,
    lost_claims: AtomicU64,
    completed: AtomicU64,
    failed: AtomicU64,
    aborted: AtomicU64,
    panics: AtomicU64,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct SchedulerStatsSnapshot {
    pub firings: u64,
    pub idle: u64,
    pub lost_claims: u64,
    pub completed: u64,
    pub failed: u64,
    pub aborted: u64,
    pub panics: u64,
}

impl SchedulerStats {
    pub fn record(&self, outcome: &RunOutcome) {
        self.firings.fetch_add(1, Ordering::Relaxed);
        let counter = match outcome {
            RunOutcome::Idle => &self.idle,
            RunOutcome::LostClaim { .. } => &self.lost_claims,
            RunOutcome::Completed { .. } => &self.completed,
            RunOutcome::Failed { .. } => &self.failed,
            RunOutcome::Aborted { .. } => &self.aborted,
        };
        counter.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_panic(&self) {
        self.panics.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> SchedulerStatsSnapshot {
        SchedulerStatsSnapshot {
            firings: self.firings.load(Ordering::Relaxed),
            idle: self.idle.load(Ordering::Relaxed),
            lost_claims: self.lost_claims.load(Ordering::Relaxed),
            completed: self.completed.load(Ordering::Relaxed),
            failed: self.failed.load(Ordering::Relaxed),
            aborted: self.aborted.load(Ordering::Relaxed),
            panics: self.panics.load(Ordering::Relaxed),
        }
    }
}
