//! Blob read/write interfaces for images and model artifacts.
//!
//! A missing object is never an error: readers return `Ok(None)` and callers
//! decide whether the miss matters.

use std::collections::HashMap;
use std::io::ErrorKind;
use std::path::{Component, Path, PathBuf};
use std::sync::{Arc, RwLock};

use thiserror::Error;

#[derive(Debug, Error)]
pub enum BlobError {
    #[error("invalid blob path: {0}")]
    InvalidPath(String),

    #[error("blob io error at {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("blob storage error: {0}")]
    Storage(String),
}

/// Read side of a blob store.
pub trait BlobReader: Send + Sync {
    /// Returns the object's bytes, or `None` when nothing is stored at `path`.
    fn read(&self, path: &str) -> Result<Option<Vec<u8>>, BlobError>;
}

/// Write side of a blob store.
pub trait BlobWriter: Send + Sync {
    /// Stores `bytes` at `path` (overwriting) and returns an opaque locator.
    fn write(&self, path: &str, bytes: &[u8]) -> Result<String, BlobError>;
}

impl<B> BlobReader for Arc<B>
where
    B: BlobReader + ?Sized,
{
    fn read(&self, path: &str) -> Result<Option<Vec<u8>>, BlobError> {
        (**self).read(path)
    }
}

impl<B> BlobWriter for Arc<B>
where
    B: BlobWriter + ?Sized,
{
    fn write(&self, path: &str, bytes: &[u8]) -> Result<String, BlobError> {
        (**self).write(path, bytes)
    }
}

/// In-memory blob store for tests/dev.
#[derive(Debug, Default)]
pub struct InMemoryBlobStore {
    objects: RwLock<HashMap<String, Vec<u8>>>,
}

impl InMemoryBlobStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, path: impl Into<String>, bytes: impl Into<Vec<u8>>) {
        if let Ok(mut objects) = self.objects.write() {
            objects.insert(path.into(), bytes.into());
        }
    }

    pub fn remove(&self, path: &str) {
        if let Ok(mut objects) = self.objects.write() {
            objects.remove(path);
        }
    }

    pub fn contains(&self, path: &str) -> bool {
        self.objects
            .read()
            .map(|o| o.contains_key(path))
            .unwrap_or(false)
    }
}

impl BlobReader for InMemoryBlobStore {
    fn read(&self, path: &str) -> Result<Option<Vec<u8>>, BlobError> {
        let objects = self
            .objects
            .read()
            .map_err(|_| BlobError::Storage("lock poisoned".to_string()))?;
        Ok(objects.get(path).cloned())
    }
}

impl BlobWriter for InMemoryBlobStore {
    fn write(&self, path: &str, bytes: &[u8]) -> Result<String, BlobError> {
        let mut objects = self
            .objects
            .write()
            .map_err(|_| BlobError::Storage("lock poisoned".to_string()))?;
        objects.insert(path.to_string(), bytes.to_vec());
        Ok(format!("mem://{path}"))
    }
}

/// Filesystem-backed blob store rooted at a directory.
///
/// Paths are relative to the root; absolute paths and `..` components are
/// rejected.
#[derive(Debug, Clone)]
pub struct FsBlobStore {
    root: PathBuf,
}

impl FsBlobStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn resolve(&self, path: &str) -> Result<PathBuf, BlobError> {
        let rel = Path::new(path);
        let clean = rel
            .components()
            .all(|c| matches!(c, Component::Normal(_) | Component::CurDir));
        if path.is_empty() || !clean {
            return Err(BlobError::InvalidPath(path.to_string()));
        }
        Ok(self.root.join(rel))
    }
}

impl BlobReader for FsBlobStore {
    fn read(&self, path: &str) -> Result<Option<Vec<u8>>, BlobError> {
        let full = self.resolve(path)?;
        match std::fs::read(&full) {
            Ok(bytes) => Ok(Some(bytes)),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(source) => Err(BlobError::Io {
                path: path.to_string(),
                source,
            }),
        }
    }
}

impl BlobWriter for FsBlobStore {
    fn write(&self, path: &str, bytes: &[u8]) -> Result<String, BlobError> {
        let full = self.resolve(path)?;
        let io_err = |source| BlobError::Io {
            path: path.to_string(),
            source,
        };
        if let Some(parent) = full.parent() {
            std::fs::create_dir_all(parent).map_err(io_err)?;
        }
        std::fs::write(&full, bytes).map_err(io_err)?;
        Ok(full.display().to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn temp_root(name: &str) -> PathBuf {
        let dir = std::env::temp_dir().join(format!(
            "agritrain-blob-{name}-{}",
            std::process::id()
        ));
        let _ = std::fs::remove_dir_all(&dir);
        dir
    }

    #[test]
    fn in_memory_missing_object_is_none() {
        let store = InMemoryBlobStore::new();
        assert!(store.read("nope.jpg").unwrap().is_none());

        store.insert("leaf.jpg", vec![1, 2, 3]);
        assert_eq!(store.read("leaf.jpg").unwrap(), Some(vec![1, 2, 3]));
    }

    #[test]
    fn fs_store_round_trips_and_reports_misses() {
        let store = FsBlobStore::new(temp_root("roundtrip"));

        assert!(store.read("images/missing.jpg").unwrap().is_none());

        let locator = store.write("models/m.json", b"{}").unwrap();
        assert!(locator.ends_with("m.json"));
        assert_eq!(store.read("models/m.json").unwrap(), Some(b"{}".to_vec()));

        let _ = std::fs::remove_dir_all(store.root());
    }

    #[test]
    fn fs_store_rejects_escaping_paths() {
        let store = FsBlobStore::new(temp_root("escape"));
        assert!(matches!(store.read("../etc/passwd"), Err(BlobError::InvalidPath(_))));
        assert!(matches!(store.read("/etc/passwd"), Err(BlobError::InvalidPath(_))));
        assert!(matches!(store.write("", b"x"), Err(BlobError::InvalidPath(_))));
    }
}
