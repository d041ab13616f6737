//! Model registry: the singleton record describing the latest trained model.
//!
//! Every successful run overwrites the record under [`MODEL_REGISTRY_KEY`].
//! Writes are versioned compare-and-swap; [`ModelRegistry::set`] retries the
//! swap so concurrent finishers resolve as last-writer-wins without lost
//! updates to the version counter. No history is kept.

pub mod postgres;
pub mod store;
pub mod types;

pub use postgres::PostgresModelRegistry;
pub use store::{InMemoryModelRegistry, ModelRegistry, RegistryError};
pub use types::{MODEL_REGISTRY_KEY, ModelMetadata, ModelRecord};
