//! Mutation feed for knowledge entries.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use agritrain_core::{EntryId, KnowledgeEntry};

use crate::event::Event;

#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MutationKind {
    Created,
    Updated,
}

/// A create/update of a knowledge entry as delivered by the CRUD layer.
///
/// `previous` is `None` for creations and carries the prior document state
/// for updates.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntryMutation {
    pub entry_id: EntryId,
    pub previous: Option<KnowledgeEntry>,
    pub current: KnowledgeEntry,
    pub occurred_at: DateTime<Utc>,
}

impl EntryMutation {
    pub fn created(current: KnowledgeEntry) -> Self {
        Self {
            entry_id: current.id.clone(),
            previous: None,
            occurred_at: current.created_at,
            current,
        }
    }

    pub fn updated(previous: KnowledgeEntry, current: KnowledgeEntry) -> Self {
        Self {
            entry_id: current.id.clone(),
            previous: Some(previous),
            occurred_at: current.updated_at,
            current,
        }
    }

    pub fn kind(&self) -> MutationKind {
        match self.previous {
            None => MutationKind::Created,
            Some(_) => MutationKind::Updated,
        }
    }

    /// Whether the ordered image-reference list differs from the prior state.
    ///
    /// Compares element by element; reordering counts as a change. Creations
    /// always count as a change.
    pub fn images_changed(&self) -> bool {
        match &self.previous {
            None => true,
            Some(prev) => prev.image_refs != self.current.image_refs,
        }
    }
}

impl Event for EntryMutation {
    fn event_type(&self) -> &'static str {
        match self.kind() {
            MutationKind::Created => "knowledge.entry.created",
            MutationKind::Updated => "knowledge.entry.updated",
        }
    }

    fn version(&self) -> u32 {
        1
    }

    fn occurred_at(&self) -> DateTime<Utc> {
        self.occurred_at
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use agritrain_core::EntryKind;

    fn entry(images: &[&str]) -> KnowledgeEntry {
        KnowledgeEntry::new(EntryId::new("sheath-blight").unwrap(), EntryKind::Disease, "sheath_blight")
            .with_images(images.iter().copied())
    }

    #[test]
    fn creation_always_counts_as_image_change() {
        let m = EntryMutation::created(entry(&[]));
        assert_eq!(m.kind(), MutationKind::Created);
        assert!(m.images_changed());
        assert_eq!(m.event_type(), "knowledge.entry.created");
    }

    #[test]
    fn description_only_update_is_not_an_image_change() {
        let before = entry(&["a.jpg", "b.jpg"]);
        let after = before.clone().with_description("lesions on leaf sheath");
        let m = EntryMutation::updated(before, after);
        assert_eq!(m.kind(), MutationKind::Updated);
        assert!(!m.images_changed());
    }

    #[test]
    fn equal_lists_in_distinct_allocations_are_unchanged() {
        let before = entry(&["a.jpg"]);
        let after = entry(&["a.jpg"]);
        assert!(!EntryMutation::updated(before, after).images_changed());
    }

    #[test]
    fn added_removed_or_reordered_images_are_changes() {
        let base = entry(&["a.jpg", "b.jpg"]);
        assert!(EntryMutation::updated(base.clone(), entry(&["a.jpg", "b.jpg", "c.jpg"])).images_changed());
        assert!(EntryMutation::updated(base.clone(), entry(&["a.jpg"])).images_changed());
        assert!(EntryMutation::updated(base, entry(&["b.jpg", "a.jpg"])).images_changed());
    }
}
