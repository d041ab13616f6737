//! Change watcher: turns knowledge-entry mutations into PENDING tasks.
//!
//! - creation: always enqueue
//! - update: enqueue only when the ordered image-reference list changed
//!
//! Every enqueue is one fresh insert; existing tasks are never read or
//! modified here, and the same subject may be queued many times.

pub mod worker;

use tracing::{debug, info, warn};

use agritrain_events::{EntryMutation, EventBus, TaskEnqueued};

use crate::tasks::{TaskStore, TaskStoreError, TrainingTask};

pub use worker::WatcherHandle;

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum WatchError {
    #[error("failed to enqueue training task: {0}")]
    Enqueue(#[from] TaskStoreError),
}

/// Producer side of the pipeline.
#[derive(Debug, Clone)]
pub struct ChangeWatcher<S, B> {
    store: S,
    announcements: B,
}

impl<S, B> ChangeWatcher<S, B>
where
    S: TaskStore,
    B: EventBus<TaskEnqueued>,
{
    pub fn new(store: S, announcements: B) -> Self {
        Self {
            store,
            announcements,
        }
    }

    /// Apply the enqueue rule to one mutation.
    ///
    /// Returns the inserted task, or `None` when the mutation does not
    /// qualify. A failed announcement is logged; the task is already durable.
    pub fn handle(&self, mutation: &EntryMutation) -> Result<Option<TrainingTask>, WatchError> {
        if !mutation.images_changed() {
            debug!(
                entry_id = %mutation.entry_id,
                "entry updated without image changes; not enqueuing"
            );
            return Ok(None);
        }

        let task = TrainingTask::new(mutation.entry_id.clone());
        self.store.insert(task.clone())?;

        info!(
            task_id = %task.id,
            entry_id = %task.subject_id,
            kind = ?mutation.kind(),
            "training task enqueued"
        );

        let announcement = TaskEnqueued {
            task_id: task.id,
            subject_id: task.subject_id.clone(),
            enqueued_at: task.enqueued_at,
        };
        if let Err(err) = self.announcements.publish(announcement) {
            warn!(task_id = %task.id, error = ?err, "failed to announce enqueued task");
        }

        Ok(Some(task))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use std::sync::Arc;

    use agritrain_core::{EntryId, EntryKind, KnowledgeEntry};
    use agritrain_events::InMemoryEventBus;

    use crate::tasks::{InMemoryTaskStore, TaskStatus};

    type Watcher = ChangeWatcher<Arc<InMemoryTaskStore>, Arc<InMemoryEventBus<TaskEnqueued>>>;

    fn setup() -> (Watcher, Arc<InMemoryTaskStore>, Arc<InMemoryEventBus<TaskEnqueued>>) {
        let store = InMemoryTaskStore::arc();
        let bus = Arc::new(InMemoryEventBus::new());
        (ChangeWatcher::new(store.clone(), bus.clone()), store, bus)
    }

    fn entry(images: &[&str]) -> KnowledgeEntry {
        KnowledgeEntry::new(EntryId::new("brown-planthopper").unwrap(), EntryKind::Pest, "planthopper")
            .with_images(images.iter().copied())
    }

    #[test]
    fn creation_always_enqueues() {
        let (watcher, store, bus) = setup();
        let announcements = bus.subscribe();

        let task = watcher
            .handle(&EntryMutation::created(entry(&[])))
            .unwrap()
            .unwrap();

        assert_eq!(task.status, TaskStatus::Pending);
        assert_eq!(task.subject_id.as_str(), "brown-planthopper");
        assert_eq!(store.get(task.id).unwrap(), Some(task.clone()));
        assert_eq!(announcements.try_recv().unwrap().task_id, task.id);
    }

    #[test]
    fn update_without_image_change_is_ignored() {
        let (watcher, store, _bus) = setup();
        let before = entry(&["a.jpg", "b.jpg"]);
        let after = before.clone().with_description("now with a longer description");

        let outcome = watcher.handle(&EntryMutation::updated(before, after)).unwrap();

        assert!(outcome.is_none());
        assert_eq!(store.stats().unwrap().total(), 0);
    }

    #[test]
    fn update_with_image_change_enqueues() {
        let (watcher, store, _bus) = setup();
        let before = entry(&["a.jpg"]);
        let after = entry(&["a.jpg", "b.jpg"]);

        assert!(watcher.handle(&EntryMutation::updated(before, after)).unwrap().is_some());
        assert_eq!(store.stats().unwrap().pending, 1);
    }

    #[test]
    fn reordering_images_counts_as_a_change() {
        let (watcher, _store, _bus) = setup();
        let mutation = EntryMutation::updated(entry(&["a.jpg", "b.jpg"]), entry(&["b.jpg", "a.jpg"]));
        assert!(watcher.handle(&mutation).unwrap().is_some());
    }

    #[test]
    fn equal_but_distinct_lists_are_not_a_change() {
        let (watcher, _store, _bus) = setup();
        // Separately allocated vectors with the same contents.
        let before = entry(&["a.jpg"]);
        let after = KnowledgeEntry {
            image_refs: vec![String::from("a.jpg")],
            ..before.clone()
        };
        assert!(watcher.handle(&EntryMutation::updated(before, after)).unwrap().is_none());
    }

    #[test]
    fn repeated_mutations_of_one_subject_are_not_deduplicated() {
        let (watcher, store, _bus) = setup();
        watcher.handle(&EntryMutation::created(entry(&["a.jpg"]))).unwrap();
        watcher
            .handle(&EntryMutation::updated(entry(&["a.jpg"]), entry(&["a.jpg", "b.jpg"])))
            .unwrap();

        let pending = store.list_by_status(Some(TaskStatus::Pending), 10).unwrap();
        assert_eq!(pending.len(), 2);
        assert!(pending.iter().all(|t| t.subject_id.as_str() == "brown-planthopper"));
    }
}
