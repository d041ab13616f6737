//! Dev seed file: a JSON array of knowledge entries loaded at startup.
//!
//! ```json
//! [{"id": "leaf-blast", "kind": "disease", "label": "leaf blast",
//!   "images": ["leaf-blast/1.jpg", "leaf-blast/2.jpg"]}]
//! ```

use std::fs;
use std::path::Path;

use anyhow::Context;
use serde::Deserialize;

use agritrain_core::{EntryId, EntryKind, KnowledgeEntry};

#[derive(Debug, Deserialize)]
struct SeedEntry {
    id: String,
    kind: String,
    label: String,
    #[serde(default)]
    description: String,
    #[serde(default)]
    images: Vec<String>,
}

pub fn load(path: &Path) -> anyhow::Result<Vec<KnowledgeEntry>> {
    let raw = fs::read_to_string(path)
        .with_context(|| format!("failed to read seed file {}", path.display()))?;
    parse(&raw).with_context(|| format!("invalid seed file {}", path.display()))
}

fn parse(raw: &str) -> anyhow::Result<Vec<KnowledgeEntry>> {
    let seeds: Vec<SeedEntry> = serde_json::from_str(raw)?;
    seeds
        .into_iter()
        .map(|s| {
            let kind: EntryKind = s.kind.parse()?;
            Ok(KnowledgeEntry::new(EntryId::new(s.id)?, kind, s.label)
                .with_description(s.description)
                .with_images(s.images))
        })
        .collect()
}
