//! `agritrain-core`: shared building blocks for the training pipeline.
//!
//! This crate contains **pure** primitives (no infrastructure concerns):
//! identifiers, knowledge entries, the domain error model and optimistic
//! concurrency expectations.

pub mod entry;
pub mod error;
pub mod id;
pub mod version;

pub use entry::{EntryKind, KnowledgeEntry};
pub use error::{DomainError, DomainResult};
pub use id::{EntryId, TaskId};
pub use version::ExpectedVersion;
