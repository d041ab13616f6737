//! Registry trait and in-memory implementation.

use std::sync::{Arc, Mutex};

use chrono::Utc;
use tracing::debug;

use agritrain_core::ExpectedVersion;

use super::types::{ModelMetadata, ModelRecord};

/// Bounded number of compare-and-swap attempts made by [`ModelRegistry::set`].
pub const SET_ATTEMPTS: u32 = 5;

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum RegistryError {
    #[error("registry version conflict (expected: {expected:?}, actual: {actual:?})")]
    VersionConflict {
        expected: ExpectedVersion,
        actual: Option<u64>,
    },
    #[error("registry storage error: {0}")]
    Storage(String),
}

pub trait ModelRegistry: Send + Sync {
    /// The current record, or `None` before the first successful run.
    fn current(&self) -> Result<Option<ModelRecord>, RegistryError>;

    /// Write `metadata` only if the stored version satisfies `expected`.
    ///
    /// On success the new record carries `previous version + 1` (or 1).
    fn compare_and_set(
        &self,
        expected: ExpectedVersion,
        metadata: ModelMetadata,
    ) -> Result<ModelRecord, RegistryError>;

    /// Overwrite the singleton (last writer wins).
    ///
    /// Reads the current version and swaps against it, retrying when another
    /// writer slipped in between.
    fn set(&self, metadata: ModelMetadata) -> Result<ModelRecord, RegistryError> {
        let mut attempt = 1;
        loop {
            let expected = ExpectedVersion::for_current(self.current()?.map(|r| r.version));
            match self.compare_and_set(expected, metadata.clone()) {
                Err(err @ RegistryError::VersionConflict { .. }) if attempt < SET_ATTEMPTS => {
                    debug!(attempt, error = %err, "registry write raced; retrying");
                    attempt += 1;
                }
                other => return other,
            }
        }
    }
}

impl<R> ModelRegistry for Arc<R>
where
    R: ModelRegistry + ?Sized,
{
    fn current(&self) -> Result<Option<ModelRecord>, RegistryError> {
        (**self).current()
    }

    fn compare_and_set(
        &self,
        expected: ExpectedVersion,
        metadata: ModelMetadata,
    ) -> Result<ModelRecord, RegistryError> {
        (**self).compare_and_set(expected, metadata)
    }

    fn set(&self, metadata: ModelMetadata) -> Result<ModelRecord, RegistryError> {
        (**self).set(metadata)
    }
}

/// In-memory registry for tests/dev.
#[derive(Debug, Default)]
pub struct InMemoryModelRegistry {
    record: Mutex<Option<ModelRecord>>,
}

impl InMemoryModelRegistry {
    pub fn new() -> Self {
        Self::default()
    }
}

impl ModelRegistry for InMemoryModelRegistry {
    fn current(&self) -> Result<Option<ModelRecord>, RegistryError> {
        let record = self
            .record
            .lock()
            .map_err(|_| RegistryError::Storage("lock poisoned".to_string()))?;
        Ok(record.clone())
    }

    fn compare_and_set(
        &self,
        expected: ExpectedVersion,
        metadata: ModelMetadata,
    ) -> Result<ModelRecord, RegistryError> {
        let mut record = self
            .record
            .lock()
            .map_err(|_| RegistryError::Storage("lock poisoned".to_string()))?;

        let actual = record.as_ref().map(|r| r.version);
        if !expected.matches(actual) {
            return Err(RegistryError::VersionConflict { expected, actual });
        }

        let next = ModelRecord {
            version: actual.unwrap_or(0) + 1,
            metadata,
            updated_at: Utc::now(),
        };
        *record = Some(next.clone());
        Ok(next)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use std::sync::atomic::{AtomicBool, Ordering};

    use agritrain_core::TaskId;

    fn sample(locator: &str) -> ModelMetadata {
        ModelMetadata {
            task_id: TaskId::new(),
            artifact_locator: locator.to_string(),
            total_images: 12,
            total_entries: 3,
            final_loss: 0.25,
            final_accuracy: 0.9,
            trained_at: Utc::now(),
        }
    }

    #[test]
    fn first_write_starts_at_version_one() {
        let registry = InMemoryModelRegistry::new();
        assert!(registry.current().unwrap().is_none());

        let record = registry.set(sample("mem://a")).unwrap();
        assert_eq!(record.version, 1);
        assert_eq!(registry.current().unwrap(), Some(record));
    }

    #[test]
    fn set_overwrites_and_bumps_version() {
        let registry = InMemoryModelRegistry::new();
        registry.set(sample("mem://a")).unwrap();
        let second = registry.set(sample("mem://b")).unwrap();

        assert_eq!(second.version, 2);
        let current = registry.current().unwrap().unwrap();
        assert_eq!(current.metadata.artifact_locator, "mem://b");
    }

    #[test]
    fn stale_expectation_is_rejected() {
        let registry = InMemoryModelRegistry::new();
        registry.set(sample("mem://a")).unwrap();
        registry.set(sample("mem://b")).unwrap();

        let err = registry
            .compare_and_set(ExpectedVersion::Exact(1), sample("mem://c"))
            .unwrap_err();
        assert_eq!(
            err,
            RegistryError::VersionConflict {
                expected: ExpectedVersion::Exact(1),
                actual: Some(2),
            }
        );
        let err = registry
            .compare_and_set(ExpectedVersion::Absent, sample("mem://c"))
            .unwrap_err();
        assert!(matches!(err, RegistryError::VersionConflict { .. }));
    }

    /// Loses the first swap to a simulated concurrent writer.
    struct RacyRegistry {
        inner: InMemoryModelRegistry,
        raced: AtomicBool,
    }

    impl ModelRegistry for RacyRegistry {
        fn current(&self) -> Result<Option<ModelRecord>, RegistryError> {
            self.inner.current()
        }

        fn compare_and_set(
            &self,
            expected: ExpectedVersion,
            metadata: ModelMetadata,
        ) -> Result<ModelRecord, RegistryError> {
            if !self.raced.swap(true, Ordering::SeqCst) {
                self.inner
                    .compare_and_set(ExpectedVersion::Any, sample("mem://other"))?;
            }
            self.inner.compare_and_set(expected, metadata)
        }
    }

    #[test]
    fn set_retries_after_losing_a_race() {
        let registry = RacyRegistry {
            inner: InMemoryModelRegistry::new(),
            raced: AtomicBool::new(false),
        };

        let record = registry.set(sample("mem://mine")).unwrap();
        assert_eq!(record.version, 2);
        assert_eq!(record.metadata.artifact_locator, "mem://mine");
    }
}
