use std::collections::BTreeMap;
use std::sync::{Arc, RwLock};

use chrono::Utc;
use tracing::warn;

use agritrain_core::{EntryId, KnowledgeEntry};
use agritrain_events::{EntryMutation, EventBus, InMemoryEventBus};

use super::{KnowledgeBase, KnowledgeBaseError};

/// In-memory knowledge base for tests/dev.
///
/// When a feed is attached, every `upsert` publishes the matching
/// [`EntryMutation`], standing in for the hosted store's change triggers.
#[derive(Debug, Default)]
pub struct InMemoryKnowledgeBase {
    entries: RwLock<BTreeMap<EntryId, KnowledgeEntry>>,
    feed: Option<Arc<InMemoryEventBus<EntryMutation>>>,
}

impl InMemoryKnowledgeBase {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_feed(feed: Arc<InMemoryEventBus<EntryMutation>>) -> Self {
        Self {
            entries: RwLock::default(),
            feed: Some(feed),
        }
    }

    /// Create or replace an entry and emit the mutation.
    ///
    /// Replacements keep the stored `created_at` and stamp `updated_at`.
    pub fn upsert(&self, mut entry: KnowledgeEntry) -> Result<EntryMutation, KnowledgeBaseError> {
        let mutation = {
            let mut entries = self.entries.write().map_err(|_| poisoned())?;
            let previous = entries.get(&entry.id).cloned();
            let mutation = match previous {
                Some(previous) => {
                    entry.created_at = previous.created_at;
                    entry.updated_at = Utc::now();
                    EntryMutation::updated(previous, entry.clone())
                }
                None => EntryMutation::created(entry.clone()),
            };
            entries.insert(entry.id.clone(), entry);
            mutation
        };

        if let Some(feed) = &self.feed {
            if let Err(err) = feed.publish(mutation.clone()) {
                warn!(entry_id = %mutation.entry_id, error = ?err, "failed to publish entry mutation");
            }
        }

        Ok(mutation)
    }

    pub fn get(&self, id: &EntryId) -> Result<Option<KnowledgeEntry>, KnowledgeBaseError> {
        let entries = self.entries.read().map_err(|_| poisoned())?;
        Ok(entries.get(id).cloned())
    }

    pub fn len(&self) -> usize {
        self.entries.read().map(|e| e.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl KnowledgeBase for InMemoryKnowledgeBase {
    fn list_entries(&self) -> Result<Vec<KnowledgeEntry>, KnowledgeBaseError> {
        let entries = self.entries.read().map_err(|_| poisoned())?;
        Ok(entries.values().cloned().collect())
    }
}

fn poisoned() -> KnowledgeBaseError {
    KnowledgeBaseError::Unavailable("lock poisoned".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    use agritrain_core::EntryKind;
    use agritrain_events::MutationKind;

    fn entry(id: &str, images: &[&str]) -> KnowledgeEntry {
        KnowledgeEntry::new(EntryId::new(id).unwrap(), EntryKind::Disease, id)
            .with_images(images.iter().copied())
    }

    #[test]
    fn upsert_reports_create_then_update() {
        let kb = InMemoryKnowledgeBase::new();

        let created = kb.upsert(entry("blast", &["a.jpg"])).unwrap();
        assert_eq!(created.kind(), MutationKind::Created);

        let updated = kb.upsert(entry("blast", &["a.jpg", "b.jpg"])).unwrap();
        assert_eq!(updated.kind(), MutationKind::Updated);
        assert_eq!(updated.previous.as_ref().unwrap().image_refs, vec!["a.jpg"]);
        assert!(updated.images_changed());
        assert_eq!(updated.current.created_at, created.current.created_at);
    }

    #[test]
    fn lists_entries_ordered_by_id() {
        let kb = InMemoryKnowledgeBase::new();
        kb.upsert(entry("tungro", &[])).unwrap();
        kb.upsert(entry("blast", &[])).unwrap();

        let ids: Vec<String> = kb
            .list_entries()
            .unwrap()
            .into_iter()
            .map(|e| e.id.to_string())
            .collect();
        assert_eq!(ids, vec!["blast", "tungro"]);
        assert_eq!(kb.len(), 2);
    }

    #[test]
    fn attached_feed_receives_mutations() {
        let feed = Arc::new(InMemoryEventBus::new());
        let subscription = feed.subscribe();
        let kb = InMemoryKnowledgeBase::with_feed(feed);

        kb.upsert(entry("blast", &["a.jpg"])).unwrap();

        let received = subscription.try_recv().unwrap();
        assert_eq!(received.entry_id.as_str(), "blast");
        assert_eq!(received.kind(), MutationKind::Created);
    }
}
