//! The training corpus: every knowledge entry at the time of a run.

use tracing::warn;

use agritrain_core::{EntryId, KnowledgeEntry};

use crate::blob::BlobReader;

/// Snapshot of all knowledge entries, materialized in memory for one run.
#[derive(Debug, Clone, Default)]
pub struct Corpus {
    entries: Vec<KnowledgeEntry>,
}

impl Corpus {
    pub fn new(entries: Vec<KnowledgeEntry>) -> Self {
        Self { entries }
    }

    pub fn entries(&self) -> &[KnowledgeEntry] {
        &self.entries
    }

    pub fn entry_count(&self) -> usize {
        self.entries.len()
    }

    /// Resolvable (non-blank) image references across all entries.
    pub fn image_count(&self) -> usize {
        self.entries
            .iter()
            .map(KnowledgeEntry::resolvable_image_count)
            .sum()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Load every resolvable image through `blobs`.
    ///
    /// A reference that cannot be read, whether absent, malformed or failing
    /// in the store, is skipped and logged. It never aborts resolution.
    pub fn resolve<R>(&self, blobs: &R) -> ResolvedCorpus
    where
        R: BlobReader + ?Sized,
    {
        let mut samples = Vec::with_capacity(self.image_count());
        let mut missing = Vec::new();

        for entry in &self.entries {
            for path in entry.resolvable_images() {
                match blobs.read(path) {
                    Ok(Some(bytes)) => samples.push(LabeledImage {
                        entry_id: entry.id.clone(),
                        label: entry.label.clone(),
                        path: path.to_string(),
                        bytes,
                    }),
                    Ok(None) => {
                        warn!(entry_id = %entry.id, path, "image not found; skipping");
                        missing.push(path.to_string());
                    }
                    Err(e) => {
                        warn!(entry_id = %entry.id, path, error = %e, "image unreadable; skipping");
                        missing.push(path.to_string());
                    }
                }
            }
        }

        ResolvedCorpus { samples, missing }
    }
}

/// One training sample.
#[derive(Debug, Clone, PartialEq)]
pub struct LabeledImage {
    pub entry_id: EntryId,
    pub label: String,
    pub path: String,
    pub bytes: Vec<u8>,
}

/// Result of resolving a corpus against a blob store.
#[derive(Debug, Clone, Default)]
pub struct ResolvedCorpus {
    pub samples: Vec<LabeledImage>,
    /// Paths that were referenced but could not be read.
    pub missing: Vec<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::blob::{BlobError, BlobWriter, FsBlobStore, InMemoryBlobStore};
    use agritrain_core::EntryKind;

    fn entry(id: &str, label: &str, images: &[&str]) -> KnowledgeEntry {
        KnowledgeEntry::new(EntryId::new(id).unwrap(), EntryKind::Disease, label)
            .with_images(images.iter().copied())
    }

    #[test]
    fn image_count_sums_resolvable_references() {
        let corpus = Corpus::new(vec![
            entry("blast", "blast", &["b1.jpg", "b2.jpg", ""]),
            entry("smut", "smut", &["s1.jpg"]),
        ]);
        assert_eq!(corpus.entry_count(), 2);
        assert_eq!(corpus.image_count(), 3);
    }

    #[test]
    fn resolve_skips_missing_objects() {
        let blobs = InMemoryBlobStore::new();
        blobs.insert("b1.jpg", vec![10, 20]);

        let corpus = Corpus::new(vec![entry("blast", "blast", &["b1.jpg", "b2.jpg"])]);
        let resolved = corpus.resolve(&blobs);

        assert_eq!(resolved.samples.len(), 1);
        assert_eq!(resolved.samples[0].label, "blast");
        assert_eq!(resolved.missing, vec!["b2.jpg".to_string()]);
    }

    struct BrokenStore;

    impl BlobReader for BrokenStore {
        fn read(&self, _path: &str) -> Result<Option<Vec<u8>>, BlobError> {
            Err(BlobError::Storage("bucket unreachable".to_string()))
        }
    }

    #[test]
    fn resolve_skips_store_failures() {
        let corpus = Corpus::new(vec![entry("blast", "blast", &["b1.jpg", "b2.jpg"])]);
        let resolved = corpus.resolve(&BrokenStore);
        assert!(resolved.samples.is_empty());
        assert_eq!(resolved.missing, vec!["b1.jpg".to_string(), "b2.jpg".to_string()]);
    }

    #[test]
    fn resolve_skips_malformed_paths() {
        let root = std::env::temp_dir().join(format!("agritrain-corpus-{}", std::process::id()));
        let fs = FsBlobStore::new(&root);
        fs.write("blast/ok.jpg", &[7, 7, 7]).unwrap();

        let corpus = Corpus::new(vec![entry(
            "blast",
            "blast",
            &["blast/ok.jpg", "/legacy/absolute.jpg", "../outside.jpg"],
        )]);
        let resolved = corpus.resolve(&fs);

        assert_eq!(resolved.samples.len(), 1);
        assert_eq!(resolved.samples[0].path, "blast/ok.jpg");
        assert_eq!(
            resolved.missing,
            vec!["/legacy/absolute.jpg".to_string(), "../outside.jpg".to_string()]
        );
        let _ = std::fs::remove_dir_all(&root);
    }
}
