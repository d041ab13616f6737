//! Knowledge entries as seen by the training pipeline.
//!
//! Entries are owned by the CRUD layer; this crate only reads them.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::id::EntryId;

/// Catalogue the entry belongs to.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntryKind {
    Variety,
    Pest,
    Disease,
}

impl EntryKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            EntryKind::Variety => "variety",
            EntryKind::Pest => "pest",
            EntryKind::Disease => "disease",
        }
    }
}

impl core::str::FromStr for EntryKind {
    type Err = crate::DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "variety" => Ok(EntryKind::Variety),
            "pest" => Ok(EntryKind::Pest),
            "disease" => Ok(EntryKind::Disease),
            other => Err(crate::DomainError::validation(format!(
                "unknown entry kind: {other}"
            ))),
        }
    }
}

/// A catalogued variety/pest/disease record with its image references.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KnowledgeEntry {
    pub id: EntryId,
    pub kind: EntryKind,
    /// Class name the classifier learns for this entry's images.
    pub label: String,
    pub description: String,
    /// Ordered blob paths of the entry's images.
    pub image_refs: Vec<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl KnowledgeEntry {
    pub fn new(id: EntryId, kind: EntryKind, label: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id,
            kind,
            label: label.into(),
            description: String::new(),
            image_refs: Vec::new(),
            created_at: now,
            updated_at: now,
        }
    }

    pub fn with_images<I, S>(mut self, refs: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.image_refs = refs.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    /// Image references that can be handed to a blob reader (non-blank).
    pub fn resolvable_images(&self) -> impl Iterator<Item = &str> {
        self.image_refs
            .iter()
            .map(|r| r.trim())
            .filter(|r| !r.is_empty())
    }

    pub fn resolvable_image_count(&self) -> usize {
        self.resolvable_images().count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn blank_references_are_not_resolvable() {
        let entry = KnowledgeEntry::new(EntryId::new("brown-planthopper").unwrap(), EntryKind::Pest, "bph")
            .with_images(["a.jpg", "", "  ", "b.jpg"]);
        assert_eq!(entry.resolvable_image_count(), 2);
        assert_eq!(entry.resolvable_images().collect::<Vec<_>>(), vec!["a.jpg", "b.jpg"]);
    }

    #[test]
    fn kind_parses_from_catalogue_names() {
        assert_eq!("disease".parse::<EntryKind>().unwrap(), EntryKind::Disease);
        assert!("fungus".parse::<EntryKind>().is_err());
    }
}
