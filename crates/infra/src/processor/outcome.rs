use serde::Serialize;

use agritrain_core::TaskId;

use crate::tasks::TaskResult;

/// What a single processor run did.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum RunOutcome {
    /// No PENDING task existed.
    Idle,
    /// Another run claimed the task first.
    LostClaim { task_id: TaskId },
    Completed {
        task_id: TaskId,
        result: TaskResult,
        /// Registry version written, `None` when the registry update failed.
        registry_version: Option<u64>,
    },
    Failed { task_id: TaskId, error: String },
    /// The task store could not be read or written; the task (if any) keeps
    /// whatever status it had.
    Aborted {
        task_id: Option<TaskId>,
        error: String,
    },
}

impl RunOutcome {
    /// `false` only for runs that ended in `Failed` or `Aborted`.
    pub fn is_success(&self) -> bool {
        !matches!(self, RunOutcome::Failed { .. } | RunOutcome::Aborted { .. })
    }

    pub fn task_id(&self) -> Option<TaskId> {
        match self {
            RunOutcome::Idle => None,
            RunOutcome::LostClaim { task_id }
            | RunOutcome::Completed { task_id, .. }
            | RunOutcome::Failed { task_id, .. } => Some(*task_id),
            RunOutcome::Aborted { task_id, .. } => *task_id,
        }
    }

    /// Operator-facing one-line summary.
    pub fn message(&self) -> String {
        match self {
            RunOutcome::Idle => "no pending training tasks".to_string(),
            RunOutcome::LostClaim { task_id } => {
                format!("task {task_id} was claimed by another run")
            }
            RunOutcome::Completed {
                task_id, result, ..
            } => format!(
                "task {task_id} completed: {} images, accuracy {:.4}",
                result.total_images, result.final_accuracy
            ),
            RunOutcome::Failed { error, .. } | RunOutcome::Aborted { error, .. } => error.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_failed_and_aborted_are_unsuccessful() {
        let id = TaskId::new();
        assert!(RunOutcome::Idle.is_success());
        assert!(RunOutcome::LostClaim { task_id: id }.is_success());
        assert!(
            !RunOutcome::Failed {
                task_id: id,
                error: "boom".into()
            }
            .is_success()
        );
        assert!(
            !RunOutcome::Aborted {
                task_id: None,
                error: "db down".into()
            }
            .is_success()
        );
    }

    #[test]
    fn failure_message_is_the_raw_error() {
        let outcome = RunOutcome::Failed {
            task_id: TaskId::new(),
            error: "CUDA out of memory".into(),
        };
        assert_eq!(outcome.message(), "CUDA out of memory");
    }
}
