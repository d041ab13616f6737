//! Core task types and transitions.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use agritrain_core::{DomainError, DomainResult, EntryId, TaskId};

/// Task execution status.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    /// Queued, waiting to be claimed
    Pending,
    /// Claimed by one runner; training in progress
    Processing,
    /// Training succeeded
    Completed,
    /// Validation or training failed
    Failed,
}

impl TaskStatus {
    pub const ALL: [TaskStatus; 4] = [
        TaskStatus::Pending,
        TaskStatus::Processing,
        TaskStatus::Completed,
        TaskStatus::Failed,
    ];

    pub fn is_terminal(&self) -> bool {
        matches!(self, TaskStatus::Completed | TaskStatus::Failed)
    }

    /// The only edges of the state machine.
    pub fn can_transition_to(self, next: TaskStatus) -> bool {
        matches!(
            (self, next),
            (TaskStatus::Pending, TaskStatus::Processing)
                | (TaskStatus::Processing, TaskStatus::Completed)
                | (TaskStatus::Processing, TaskStatus::Failed)
        )
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            TaskStatus::Pending => "pending",
            TaskStatus::Processing => "processing",
            TaskStatus::Completed => "completed",
            TaskStatus::Failed => "failed",
        }
    }
}

impl core::fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl core::str::FromStr for TaskStatus {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        TaskStatus::ALL
            .into_iter()
            .find(|st| st.as_str() == s)
            .ok_or_else(|| DomainError::validation(format!("unknown task status: {s}")))
    }
}

/// Metadata persisted on a COMPLETED task.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskResult {
    /// Resolvable images counted during the run's validation step.
    pub total_images: usize,
    pub total_entries: usize,
    pub final_loss: f64,
    pub final_accuracy: f64,
    pub artifact_locator: String,
}

/// A queued request to retrain the classifier.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrainingTask {
    pub id: TaskId,
    /// Knowledge entry whose mutation caused the enqueue.
    pub subject_id: EntryId,
    pub status: TaskStatus,
    pub enqueued_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub failed_at: Option<DateTime<Utc>>,
    pub error: Option<String>,
    pub result: Option<TaskResult>,
}

impl TrainingTask {
    /// Create a PENDING task enqueued now.
    pub fn new(subject_id: EntryId) -> Self {
        Self::enqueued_at(subject_id, Utc::now())
    }

    pub fn enqueued_at(subject_id: EntryId, at: DateTime<Utc>) -> Self {
        Self {
            id: TaskId::new(),
            subject_id,
            status: TaskStatus::Pending,
            enqueued_at: at,
            started_at: None,
            completed_at: None,
            failed_at: None,
            error: None,
            result: None,
        }
    }

    /// When the task reached its terminal state, if it has.
    pub fn finished_at(&self) -> Option<DateTime<Utc>> {
        self.completed_at.or(self.failed_at)
    }

    /// Check the field/status consistency rules of a task record.
    pub fn check_invariants(&self) -> DomainResult<()> {
        let started_ok = match self.status {
            TaskStatus::Pending => self.started_at.is_none(),
            _ => self.started_at.is_some(),
        };
        if !started_ok {
            return Err(DomainError::invariant(format!(
                "task {}: started_at must be set exactly from PROCESSING onwards",
                self.id
            )));
        }

        let completed = self.status == TaskStatus::Completed;
        let failed = self.status == TaskStatus::Failed;
        if self.completed_at.is_some() != completed || self.result.is_some() != completed {
            return Err(DomainError::invariant(format!(
                "task {}: completed_at/result present iff COMPLETED",
                self.id
            )));
        }
        if self.failed_at.is_some() != failed || self.error.is_some() != failed {
            return Err(DomainError::invariant(format!(
                "task {}: failed_at/error present iff FAILED",
                self.id
            )));
        }
        Ok(())
    }
}

/// A status change, applied through the store's conditional update.
#[derive(Debug, Clone, PartialEq)]
pub enum Transition {
    /// PENDING → PROCESSING
    Claim { started_at: DateTime<Utc> },
    /// PROCESSING → COMPLETED
    Complete {
        completed_at: DateTime<Utc>,
        result: TaskResult,
    },
    /// PROCESSING → FAILED
    Fail {
        failed_at: DateTime<Utc>,
        error: String,
    },
}

impl Transition {
    pub fn claim() -> Self {
        Self::Claim {
            started_at: Utc::now(),
        }
    }

    pub fn complete(result: TaskResult) -> Self {
        Self::Complete {
            completed_at: Utc::now(),
            result,
        }
    }

    pub fn fail(error: impl Into<String>) -> Self {
        Self::Fail {
            failed_at: Utc::now(),
            error: error.into(),
        }
    }

    /// Status the task ends up in.
    pub fn target(&self) -> TaskStatus {
        match self {
            Transition::Claim { .. } => TaskStatus::Processing,
            Transition::Complete { .. } => TaskStatus::Completed,
            Transition::Fail { .. } => TaskStatus::Failed,
        }
    }

    /// Apply to an in-memory record. The caller has already checked that the
    /// stored status matched its expectation.
    pub fn apply(self, task: &mut TrainingTask) -> DomainResult<()> {
        let target = self.target();
        if !task.status.can_transition_to(target) {
            return Err(DomainError::invariant(format!(
                "task {}: illegal transition {} -> {}",
                task.id, task.status, target
            )));
        }

        match self {
            Transition::Claim { started_at } => {
                task.started_at = Some(started_at);
            }
            Transition::Complete { completed_at, result } => {
                task.completed_at = Some(completed_at);
                task.result = Some(result);
            }
            Transition::Fail { failed_at, error } => {
                task.failed_at = Some(failed_at);
                task.error = Some(error);
            }
        }
        task.status = target;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn subject() -> EntryId {
        EntryId::new("rice-blast").unwrap()
    }

    fn sample_result() -> TaskResult {
        TaskResult {
            total_images: 12,
            total_entries: 2,
            final_loss: 0.2,
            final_accuracy: 0.91,
            artifact_locator: "mem://models/x.json".to_string(),
        }
    }

    #[test]
    fn only_three_edges_exist() {
        let allowed: Vec<_> = TaskStatus::ALL
            .iter()
            .flat_map(|a| TaskStatus::ALL.iter().map(move |b| (*a, *b)))
            .filter(|(a, b)| a.can_transition_to(*b))
            .collect();

        assert_eq!(
            allowed,
            vec![
                (TaskStatus::Pending, TaskStatus::Processing),
                (TaskStatus::Processing, TaskStatus::Completed),
                (TaskStatus::Processing, TaskStatus::Failed),
            ]
        );
    }

    #[test]
    fn task_lifecycle_to_completion() {
        let mut task = TrainingTask::new(subject());
        assert_eq!(task.status, TaskStatus::Pending);
        task.check_invariants().unwrap();

        Transition::claim().apply(&mut task).unwrap();
        assert_eq!(task.status, TaskStatus::Processing);
        assert!(task.started_at.is_some());
        task.check_invariants().unwrap();

        Transition::complete(sample_result()).apply(&mut task).unwrap();
        assert_eq!(task.status, TaskStatus::Completed);
        assert_eq!(task.result.as_ref().unwrap().final_accuracy, 0.91);
        assert!(task.failed_at.is_none());
        task.check_invariants().unwrap();
    }

    #[test]
    fn task_lifecycle_to_failure() {
        let mut task = TrainingTask::new(subject());
        Transition::claim().apply(&mut task).unwrap();
        Transition::fail("insufficient training data").apply(&mut task).unwrap();

        assert_eq!(task.status, TaskStatus::Failed);
        assert_eq!(task.error.as_deref(), Some("insufficient training data"));
        assert!(task.completed_at.is_none());
        assert_eq!(task.finished_at(), task.failed_at);
        task.check_invariants().unwrap();
    }

    #[test]
    fn terminal_states_cannot_be_left() {
        let mut task = TrainingTask::new(subject());
        Transition::claim().apply(&mut task).unwrap();
        Transition::fail("boom").apply(&mut task).unwrap();

        assert!(Transition::claim().apply(&mut task).is_err());
        assert!(Transition::complete(sample_result()).apply(&mut task).is_err());
        assert_eq!(task.status, TaskStatus::Failed);
    }

    #[test]
    fn pending_tasks_cannot_skip_processing() {
        let mut task = TrainingTask::new(subject());
        let err = Transition::complete(sample_result()).apply(&mut task).unwrap_err();
        assert!(matches!(err, DomainError::InvariantViolation(msg) if msg.contains("pending -> completed")));
    }

    #[test]
    fn invariant_check_catches_inconsistent_records() {
        let mut task = TrainingTask::new(subject());
        task.error = Some("stray".to_string());
        assert!(task.check_invariants().is_err());
    }

    #[test]
    fn status_parses_from_storage_names() {
        for status in TaskStatus::ALL {
            assert_eq!(status.as_str().parse::<TaskStatus>().unwrap(), status);
        }
        assert!("retrying".parse::<TaskStatus>().is_err());
    }
}
