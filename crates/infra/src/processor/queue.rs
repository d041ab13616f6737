use std::panic::{self, AssertUnwindSafe};

use chrono::Utc;
use tracing::{debug, error, info, warn};

use agritrain_core::TaskId;
use agritrain_training::{Corpus, TrainingError, TrainingJob, TrainingOutcome, TrainingRequest};

use super::{RunOnce, RunOutcome, panic_message};
use crate::knowledge::{KnowledgeBase, KnowledgeBaseError};
use crate::registry::{ModelMetadata, ModelRegistry};
use crate::tasks::{TaskResult, TaskStatus, TaskStore, TaskStoreError, TrainingTask, Transition};

/// Error recorded on tasks that fail validation.
pub const INSUFFICIENT_TRAINING_DATA: &str = "insufficient training data";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProcessorConfig {
    /// Minimum resolvable images across the whole corpus.
    pub min_images: usize,
}

impl Default for ProcessorConfig {
    fn default() -> Self {
        Self { min_images: 10 }
    }
}

/// Why a claimed task failed. The display text is what lands in
/// `TrainingTask::error`.
#[derive(Debug, thiserror::Error)]
pub enum ProcessError {
    #[error("insufficient training data")]
    InsufficientData {
        entries: usize,
        images: usize,
        required: usize,
    },

    #[error("failed to load knowledge base: {0}")]
    Corpus(#[from] KnowledgeBaseError),

    #[error(transparent)]
    Compute(#[from] TrainingError),
}

impl ProcessError {
    /// Short class name for log fields.
    pub fn class(&self) -> &'static str {
        match self {
            ProcessError::InsufficientData { .. } => "validation",
            ProcessError::Corpus(_) => "corpus",
            ProcessError::Compute(_) => "compute",
        }
    }
}

/// Claims, validates, trains and finalizes one task per run.
#[derive(Debug)]
pub struct QueueProcessor<S, K, J, R> {
    store: S,
    knowledge: K,
    job: J,
    registry: R,
    config: ProcessorConfig,
}

impl<S, K, J, R> QueueProcessor<S, K, J, R>
where
    S: TaskStore,
    K: KnowledgeBase,
    J: TrainingJob,
    R: ModelRegistry,
{
    pub fn new(store: S, knowledge: K, job: J, registry: R) -> Self {
        Self {
            store,
            knowledge,
            job,
            registry,
            config: ProcessorConfig::default(),
        }
    }

    pub fn with_config(mut self, config: ProcessorConfig) -> Self {
        self.config = config;
        self
    }

    pub fn config(&self) -> ProcessorConfig {
        self.config
    }

    /// Check the corpus preconditions. Pure: the same corpus always yields
    /// the same verdict.
    pub fn validate(&self, corpus: &Corpus) -> Result<(), ProcessError> {
        let entries = corpus.entry_count();
        let images = corpus.image_count();
        if entries == 0 || images < self.config.min_images {
            return Err(ProcessError::InsufficientData {
                entries,
                images,
                required: self.config.min_images,
            });
        }
        Ok(())
    }

    /// Process the oldest PENDING task, if any.
    pub fn run_once(&self) -> RunOutcome {
        let candidate = match self.store.oldest_pending() {
            Ok(Some(task)) => task,
            Ok(None) => {
                debug!("no pending training task");
                return RunOutcome::Idle;
            }
            Err(err) => {
                error!(error = %err, "failed to query pending training tasks");
                return RunOutcome::Aborted {
                    task_id: None,
                    error: err.to_string(),
                };
            }
        };

        let task = match self.claim(candidate.id) {
            Ok(task) => task,
            Err(outcome) => return outcome,
        };

        match self.execute(&task) {
            Ok(result) => self.complete(task.id, result),
            Err(err) => self.fail(task.id, err),
        }
    }

    fn claim(&self, task_id: TaskId) -> Result<TrainingTask, RunOutcome> {
        match self
            .store
            .compare_and_transition(task_id, TaskStatus::Pending, Transition::claim())
        {
            Ok(task) => {
                info!(task_id = %task_id, subject_id = %task.subject_id, "training task claimed");
                Ok(task)
            }
            Err(err @ (TaskStoreError::StatusConflict { .. } | TaskStoreError::NotFound(_))) => {
                info!(task_id = %task_id, reason = %err, "training task claimed by another run");
                Err(RunOutcome::LostClaim { task_id })
            }
            Err(err) => {
                error!(task_id = %task_id, error = %err, "failed to claim training task");
                Err(RunOutcome::Aborted {
                    task_id: Some(task_id),
                    error: err.to_string(),
                })
            }
        }
    }

    fn execute(&self, task: &TrainingTask) -> Result<TaskResult, ProcessError> {
        let corpus = Corpus::new(self.knowledge.list_entries()?);
        self.validate(&corpus)?;

        info!(
            task_id = %task.id,
            job = self.job.name(),
            entries = corpus.entry_count(),
            images = corpus.image_count(),
            "starting training job"
        );
        let outcome = self.train(task.id, &corpus).map_err(|err| match err {
            TrainingError::InsufficientImages { usable, required } => {
                ProcessError::InsufficientData {
                    entries: corpus.entry_count(),
                    images: usable,
                    required,
                }
            }
            other => ProcessError::Compute(other),
        })?;

        if outcome.images_missing > 0 {
            warn!(
                task_id = %task.id,
                missing = outcome.images_missing,
                used = outcome.images_used,
                "training ran with unresolved images"
            );
        }

        Ok(TaskResult {
            total_images: corpus.image_count(),
            total_entries: corpus.entry_count(),
            final_loss: outcome.final_loss,
            final_accuracy: outcome.final_accuracy,
            artifact_locator: outcome.artifact_locator,
        })
    }

    /// Invoke the job, turning a panic into a compute failure.
    fn train(&self, task_id: TaskId, corpus: &Corpus) -> Result<TrainingOutcome, TrainingError> {
        let request = TrainingRequest {
            task_id,
            corpus,
            min_images: self.config.min_images,
        };
        panic::catch_unwind(AssertUnwindSafe(|| self.job.train(request))).unwrap_or_else(|payload| {
            Err(TrainingError::Compute(format!(
                "training job panicked: {}",
                panic_message(payload.as_ref())
            )))
        })
    }

    fn complete(&self, task_id: TaskId, result: TaskResult) -> RunOutcome {
        let done = match self.store.compare_and_transition(
            task_id,
            TaskStatus::Processing,
            Transition::complete(result.clone()),
        ) {
            Ok(done) => done,
            Err(err) => {
                error!(task_id = %task_id, error = %err, "failed to record training completion");
                return RunOutcome::Aborted {
                    task_id: Some(task_id),
                    error: err.to_string(),
                };
            }
        };

        let trained_at = done.completed_at.unwrap_or_else(Utc::now);
        let registry_version = match self
            .registry
            .set(ModelMetadata::from_result(task_id, &result, trained_at))
        {
            Ok(record) => Some(record.version),
            Err(err) => {
                error!(task_id = %task_id, error = %err, "failed to update model registry");
                None
            }
        };

        info!(
            task_id = %task_id,
            total_images = result.total_images,
            final_loss = result.final_loss,
            final_accuracy = result.final_accuracy,
            artifact = %result.artifact_locator,
            registry_version,
            "training task completed"
        );

        RunOutcome::Completed {
            task_id,
            result,
            registry_version,
        }
    }

    fn fail(&self, task_id: TaskId, err: ProcessError) -> RunOutcome {
        let message = err.to_string();
        match &err {
            ProcessError::InsufficientData {
                entries,
                images,
                required,
            } => warn!(
                task_id = %task_id,
                entries,
                images,
                required,
                "training task failed validation"
            ),
            other => warn!(
                task_id = %task_id,
                class = other.class(),
                error = %message,
                "training task failed"
            ),
        }

        match self.store.compare_and_transition(
            task_id,
            TaskStatus::Processing,
            Transition::fail(message.clone()),
        ) {
            Ok(_) => RunOutcome::Failed {
                task_id,
                error: message,
            },
            Err(store_err) => {
                error!(
                    task_id = %task_id,
                    error = %store_err,
                    cause = %message,
                    "failed to record training failure"
                );
                RunOutcome::Aborted {
                    task_id: Some(task_id),
                    error: store_err.to_string(),
                }
            }
        }
    }
}

impl<S, K, J, R> RunOnce for QueueProcessor<S, K, J, R>
where
    S: TaskStore,
    K: KnowledgeBase,
    J: TrainingJob,
    R: ModelRegistry,
{
    fn run_once(&self) -> RunOutcome {
        QueueProcessor::run_once(self)
    }
}
