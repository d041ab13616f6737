use agritrain_core::TaskId;

use crate::corpus::Corpus;
use crate::result::{TrainingError, TrainingOutcome};

/// Input handed to a training job for one run.
///
/// Every run is a full retrain: `corpus` holds every knowledge entry, not
/// just the entry that triggered the task.
#[derive(Debug, Clone, Copy)]
pub struct TrainingRequest<'a> {
    pub task_id: TaskId,
    pub corpus: &'a Corpus,
    /// Usable images the job must resolve before fitting.
    pub min_images: usize,
}

/// A synchronous, black-box training routine.
///
/// Implementations resolve image references themselves (skipping misses),
/// fit a model, persist the artifact and report metrics. When fewer than
/// `min_images` references resolve they return
/// `TrainingError::InsufficientImages` without persisting anything. They must not mutate
/// task or registry state; the queue processor owns both.
pub trait TrainingJob: Send + Sync + 'static {
    /// Short name for logs (e.g. "centroid").
    fn name(&self) -> &str;

    fn train(&self, request: TrainingRequest<'_>) -> Result<TrainingOutcome, TrainingError>;
}

impl<J> TrainingJob for std::sync::Arc<J>
where
    J: TrainingJob + ?Sized,
{
    fn name(&self) -> &str {
        (**self).name()
    }

    fn train(&self, request: TrainingRequest<'_>) -> Result<TrainingOutcome, TrainingError> {
        (**self).train(request)
    }
}
