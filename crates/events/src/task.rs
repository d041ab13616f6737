use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use agritrain_core::{EntryId, TaskId};

use crate::event::Event;

/// Announces that a PENDING training task was written to the task store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskEnqueued {
    pub task_id: TaskId,
    pub subject_id: EntryId,
    pub enqueued_at: DateTime<Utc>,
}

impl Event for TaskEnqueued {
    fn event_type(&self) -> &'static str {
        "training.task.enqueued"
    }

    fn version(&self) -> u32 {
        1
    }

    fn occurred_at(&self) -> DateTime<Utc> {
        self.enqueued_at
    }
}
