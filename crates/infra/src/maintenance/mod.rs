//! Housekeeping the scheduler runs around each firing.
//!
//! - [`StaleTaskSweeper`]: fails tasks stuck in PROCESSING (crash recovery)
//! - [`RetentionEnforcer`]: deletes old terminal tasks per [`RetentionPolicy`]
//!
//! Both are opt-in; with default configuration neither changes anything.

pub mod retention;
pub mod sweeper;

use std::sync::Arc;

use chrono::{DateTime, Utc};

use crate::tasks::TaskStoreError;

pub use retention::{RetentionEnforcer, RetentionPolicy};
pub use sweeper::{PROCESSING_TIMED_OUT, StaleTaskSweeper};

/// When a housekeeping step runs relative to the processor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    BeforeRun,
    AfterRun,
}

pub trait Housekeeping: Send + Sync {
    fn name(&self) -> &'static str;

    fn phase(&self) -> Phase;

    /// Do one pass. Returns the number of tasks touched.
    fn run(&self, now: DateTime<Utc>) -> Result<usize, TaskStoreError>;
}

impl<H> Housekeeping for Arc<H>
where
    H: Housekeeping + ?Sized,
{
    fn name(&self) -> &'static str {
        (**self).name()
    }

    fn phase(&self) -> Phase {
        (**self).phase()
    }

    fn run(&self, now: DateTime<Utc>) -> Result<usize, TaskStoreError> {
        (**self).run(now)
    }
}
