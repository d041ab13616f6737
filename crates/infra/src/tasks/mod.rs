//! Training task records and their store.
//!
//! ## Lifecycle
//!
//! ```text
//! PENDING ──claim──▶ PROCESSING ──complete──▶ COMPLETED
//!                               └──fail─────▶ FAILED
//! ```
//!
//! - Tasks are created PENDING by the change watcher
//! - Every status change goes through `TaskStore::compare_and_transition`,
//!   which only applies when the stored status still equals the expected one
//! - COMPLETED and FAILED are terminal; FAILED tasks are never retried

pub mod postgres;
pub mod store;
pub mod types;

pub use postgres::PostgresTaskStore;
pub use store::{InMemoryTaskStore, TaskStats, TaskStore, TaskStoreError};
pub use types::{TaskResult, TaskStatus, TrainingTask, Transition};
