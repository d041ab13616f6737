//! Scripted training job for tests/dev.

use std::collections::VecDeque;
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};

use crate::job::{TrainingJob, TrainingRequest};
use crate::result::{TrainingError, TrainingOutcome};

type Script = Result<TrainingOutcome, String>;

/// Replays queued outcomes in order; once the script is exhausted it
/// succeeds with `fallback`.
///
/// Scripted failures surface as `TrainingError::Compute`.
#[derive(Debug)]
pub struct ScriptedTrainingJob {
    script: Mutex<VecDeque<Script>>,
    fallback: TrainingOutcome,
    calls: AtomicUsize,
}

impl ScriptedTrainingJob {
    pub fn succeeding(outcome: TrainingOutcome) -> Self {
        Self {
            script: Mutex::new(VecDeque::new()),
            fallback: outcome,
            calls: AtomicUsize::new(0),
        }
    }

    /// Queue a failure for the next call.
    pub fn then_fail(self, message: impl Into<String>) -> Self {
        if let Ok(mut script) = self.script.lock() {
            script.push_back(Err(message.into()));
        }
        self
    }

    /// Queue a specific success for the next call.
    pub fn then_succeed(self, outcome: TrainingOutcome) -> Self {
        if let Ok(mut script) = self.script.lock() {
            script.push_back(Ok(outcome));
        }
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl TrainingJob for ScriptedTrainingJob {
    fn name(&self) -> &str {
        "scripted"
    }

    fn train(&self, _request: TrainingRequest<'_>) -> Result<TrainingOutcome, TrainingError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let next = self
            .script
            .lock()
            .map_err(|_| TrainingError::Compute("script lock poisoned".to_string()))?
            .pop_front();
        match next {
            Some(Ok(outcome)) => Ok(outcome),
            Some(Err(message)) => Err(TrainingError::Compute(message)),
            None => Ok(self.fallback.clone()),
        }
    }
}
