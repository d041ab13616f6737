//! Read access to the knowledge base owned by the CRUD layer.
//!
//! The pipeline only ever enumerates entries to build a corpus. The in-memory
//! implementation additionally accepts writes so dev setups and tests can
//! drive the mutation feed.

pub mod memory;
pub mod postgres;

use std::sync::Arc;

use agritrain_core::KnowledgeEntry;

pub use memory::InMemoryKnowledgeBase;
pub use postgres::PostgresKnowledgeBase;

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum KnowledgeBaseError {
    #[error("knowledge base unavailable: {0}")]
    Unavailable(String),
    #[error("corrupt knowledge entry {id}: {reason}")]
    Corrupt { id: String, reason: String },
}

pub trait KnowledgeBase: Send + Sync {
    /// Every entry currently in the knowledge base, ordered by id.
    fn list_entries(&self) -> Result<Vec<KnowledgeEntry>, KnowledgeBaseError>;
}

impl<K> KnowledgeBase for Arc<K>
where
    K: KnowledgeBase + ?Sized,
{
    fn list_entries(&self) -> Result<Vec<KnowledgeEntry>, KnowledgeBaseError> {
        (**self).list_entries()
    }
}
