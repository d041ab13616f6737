//! Queue processor: claims one PENDING task per run and drives it to a
//! terminal state.
//!
//! ```text
//! oldest_pending ──► claim (PENDING → PROCESSING, conditional)
//!                      │ lost race → LostClaim
//!                      ▼
//!                 load corpus ──► validate ──► train ──► COMPLETED ──► registry
//!                      │              │          │
//!                      └──────────────┴──────────┴────► FAILED (message kept)
//! ```
//!
//! Nothing raised inside a run escapes `run_once`; every path ends in a
//! [`RunOutcome`].

pub mod outcome;
pub mod queue;

use std::any::Any;
use std::sync::Arc;

pub use outcome::RunOutcome;
pub use queue::{INSUFFICIENT_TRAINING_DATA, ProcessError, ProcessorConfig, QueueProcessor};

/// One unit of queue work. The scheduler only depends on this.
pub trait RunOnce: Send + Sync {
    fn run_once(&self) -> RunOutcome;
}

impl<P> RunOnce for Arc<P>
where
    P: RunOnce + ?Sized,
{
    fn run_once(&self) -> RunOutcome {
        (**self).run_once()
    }
}

/// Best-effort text of a caught panic payload.
pub(crate) fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic payload".to_string()
    }
}
