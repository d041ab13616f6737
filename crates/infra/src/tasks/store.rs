//! Task storage implementations.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use chrono::{DateTime, Utc};

use agritrain_core::TaskId;

use super::types::{TaskStatus, TrainingTask, Transition};

/// Task store abstraction.
///
/// `compare_and_transition` is the only way a status changes. It must be
/// atomic: of any number of concurrent callers expecting the same status, at
/// most one succeeds.
pub trait TaskStore: Send + Sync {
    /// Insert a new task.
    fn insert(&self, task: TrainingTask) -> Result<TaskId, TaskStoreError>;

    /// Get a task by ID.
    fn get(&self, id: TaskId) -> Result<Option<TrainingTask>, TaskStoreError>;

    /// The single oldest PENDING task (by `enqueued_at`, then id).
    fn oldest_pending(&self) -> Result<Option<TrainingTask>, TaskStoreError>;

    /// Apply `transition` only if the stored status still equals `expected`.
    ///
    /// Returns the updated record, or `StatusConflict` when another writer got
    /// there first.
    fn compare_and_transition(
        &self,
        id: TaskId,
        expected: TaskStatus,
        transition: Transition,
    ) -> Result<TrainingTask, TaskStoreError>;

    /// Overwrite the non-status fields of a task the caller owns.
    ///
    /// Rejected with `StatusConflict` when the stored status differs from
    /// `task.status`: status changes must go through `compare_and_transition`.
    fn update(&self, task: &TrainingTask) -> Result<(), TaskStoreError>;

    /// List tasks, optionally filtered by status, oldest first.
    fn list_by_status(
        &self,
        status: Option<TaskStatus>,
        limit: usize,
    ) -> Result<Vec<TrainingTask>, TaskStoreError>;

    /// PROCESSING tasks claimed before `cutoff`.
    fn processing_started_before(
        &self,
        cutoff: DateTime<Utc>,
    ) -> Result<Vec<TrainingTask>, TaskStoreError>;

    /// Delete the given tasks if they are terminal; non-terminal or unknown
    /// ids are skipped. Returns the number of deleted records.
    fn delete_terminal(&self, ids: &[TaskId]) -> Result<usize, TaskStoreError>;

    /// Task counts per status.
    fn stats(&self) -> Result<TaskStats, TaskStoreError>;
}

/// Task store error.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum TaskStoreError {
    #[error("task not found: {0}")]
    NotFound(TaskId),
    #[error("task already exists: {0}")]
    AlreadyExists(TaskId),
    #[error("task {id} status conflict: expected {expected}, found {found}")]
    StatusConflict {
        id: TaskId,
        expected: TaskStatus,
        found: TaskStatus,
    },
    #[error("illegal transition {from} -> {to}")]
    InvalidTransition { from: TaskStatus, to: TaskStatus },
    #[error("storage error: {0}")]
    Storage(String),
}

impl TaskStoreError {
    /// Lost an optimistic concurrency race (as opposed to a broken store).
    pub fn is_conflict(&self) -> bool {
        matches!(self, TaskStoreError::StatusConflict { .. })
    }
}

/// Task counts per status.
#[derive(Debug, Clone, Default, PartialEq, Eq, serde::Serialize)]
pub struct TaskStats {
    pub pending: usize,
    pub processing: usize,
    pub completed: usize,
    pub failed: usize,
}

impl TaskStats {
    pub fn total(&self) -> usize {
        self.pending + self.processing + self.completed + self.failed
    }

    pub(crate) fn count(&mut self, status: TaskStatus) {
        match status {
            TaskStatus::Pending => self.pending += 1,
            TaskStatus::Processing => self.processing += 1,
            TaskStatus::Completed => self.completed += 1,
            TaskStatus::Failed => self.failed += 1,
        }
    }
}

/// Reject transitions that are not edges of the state machine before touching
/// storage.
pub(crate) fn check_edge(expected: TaskStatus, transition: &Transition) -> Result<(), TaskStoreError> {
    let to = transition.target();
    if expected.can_transition_to(to) {
        Ok(())
    } else {
        Err(TaskStoreError::InvalidTransition { from: expected, to })
    }
}

fn poisoned() -> TaskStoreError {
    TaskStoreError::Storage("lock poisoned".to_string())
}

/// In-memory task store for tests/dev.
///
/// A single `RwLock` guards the map, so `compare_and_transition` is atomic.
#[derive(Debug, Default)]
pub struct InMemoryTaskStore {
    tasks: RwLock<HashMap<TaskId, TrainingTask>>,
}

impl InMemoryTaskStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn arc() -> Arc<Self> {
        Arc::new(Self::new())
    }
}

impl TaskStore for InMemoryTaskStore {
    fn insert(&self, task: TrainingTask) -> Result<TaskId, TaskStoreError> {
        let mut tasks = self.tasks.write().map_err(|_| poisoned())?;
        if tasks.contains_key(&task.id) {
            return Err(TaskStoreError::AlreadyExists(task.id));
        }
        let id = task.id;
        tasks.insert(id, task);
        Ok(id)
    }

    fn get(&self, id: TaskId) -> Result<Option<TrainingTask>, TaskStoreError> {
        let tasks = self.tasks.read().map_err(|_| poisoned())?;
        Ok(tasks.get(&id).cloned())
    }

    fn oldest_pending(&self) -> Result<Option<TrainingTask>, TaskStoreError> {
        let tasks = self.tasks.read().map_err(|_| poisoned())?;
        Ok(tasks
            .values()
            .filter(|t| t.status == TaskStatus::Pending)
            .min_by_key(|t| (t.enqueued_at, t.id))
            .cloned())
    }

    fn compare_and_transition(
        &self,
        id: TaskId,
        expected: TaskStatus,
        transition: Transition,
    ) -> Result<TrainingTask, TaskStoreError> {
        check_edge(expected, &transition)?;

        let mut tasks = self.tasks.write().map_err(|_| poisoned())?;
        let task = tasks.get_mut(&id).ok_or(TaskStoreError::NotFound(id))?;

        if task.status != expected {
            return Err(TaskStoreError::StatusConflict {
                id,
                expected,
                found: task.status,
            });
        }

        let from = task.status;
        let to = transition.target();
        transition
            .apply(task)
            .map_err(|_| TaskStoreError::InvalidTransition { from, to })?;

        Ok(task.clone())
    }

    fn update(&self, task: &TrainingTask) -> Result<(), TaskStoreError> {
        let mut tasks = self.tasks.write().map_err(|_| poisoned())?;
        let stored = tasks.get_mut(&task.id).ok_or(TaskStoreError::NotFound(task.id))?;
        if stored.status != task.status {
            return Err(TaskStoreError::StatusConflict {
                id: task.id,
                expected: task.status,
                found: stored.status,
            });
        }
        *stored = task.clone();
        Ok(())
    }

    fn list_by_status(
        &self,
        status: Option<TaskStatus>,
        limit: usize,
    ) -> Result<Vec<TrainingTask>, TaskStoreError> {
        let tasks = self.tasks.read().map_err(|_| poisoned())?;
        let mut result: Vec<_> = tasks
            .values()
            .filter(|t| status.is_none_or(|s| t.status == s))
            .cloned()
            .collect();

        result.sort_by_key(|t| (t.enqueued_at, t.id));
        result.truncate(limit);
        Ok(result)
    }

    fn processing_started_before(
        &self,
        cutoff: DateTime<Utc>,
    ) -> Result<Vec<TrainingTask>, TaskStoreError> {
        let tasks = self.tasks.read().map_err(|_| poisoned())?;
        let mut result: Vec<_> = tasks
            .values()
            .filter(|t| {
                t.status == TaskStatus::Processing && t.started_at.is_some_and(|s| s < cutoff)
            })
            .cloned()
            .collect();
        result.sort_by_key(|t| (t.started_at, t.id));
        Ok(result)
    }

    fn delete_terminal(&self, ids: &[TaskId]) -> Result<usize, TaskStoreError> {
        let mut tasks = self.tasks.write().map_err(|_| poisoned())?;
        let mut deleted = 0;
        for id in ids {
            if tasks.get(id).is_some_and(|t| t.status.is_terminal()) {
                tasks.remove(id);
                deleted += 1;
            }
        }
        Ok(deleted)
    }

    fn stats(&self) -> Result<TaskStats, TaskStoreError> {
        let tasks = self.tasks.read().map_err(|_| poisoned())?;
        let mut stats = TaskStats::default();
        for task in tasks.values() {
            stats.count(task.status);
        }
        Ok(stats)
    }
}

impl<S> TaskStore for Arc<S>
where
    S: TaskStore + ?Sized,
{
    fn insert(&self, task: TrainingTask) -> Result<TaskId, TaskStoreError> {
        (**self).insert(task)
    }

    fn get(&self, id: TaskId) -> Result<Option<TrainingTask>, TaskStoreError> {
        (**self).get(id)
    }

    fn oldest_pending(&self) -> Result<Option<TrainingTask>, TaskStoreError> {
        (**self).oldest_pending()
    }

    fn compare_and_transition(
        &self,
        id: TaskId,
        expected: TaskStatus,
        transition: Transition,
    ) -> Result<TrainingTask, TaskStoreError> {
        (**self).compare_and_transition(id, expected, transition)
    }

    fn update(&self, task: &TrainingTask) -> Result<(), TaskStoreError> {
        (**self).update(task)
    }

    fn list_by_status(
        &self,
        status: Option<TaskStatus>,
        limit: usize,
    ) -> Result<Vec<TrainingTask>, TaskStoreError> {
        (**self).list_by_status(status, limit)
    }

    fn processing_started_before(
        &self,
        cutoff: DateTime<Utc>,
    ) -> Result<Vec<TrainingTask>, TaskStoreError> {
        (**self).processing_started_before(cutoff)
    }

    fn delete_terminal(&self, ids: &[TaskId]) -> Result<usize, TaskStoreError> {
        (**self).delete_terminal(ids)
    }

    fn stats(&self) -> Result<TaskStats, TaskStoreError> {
        (**self).stats()
    }
}
