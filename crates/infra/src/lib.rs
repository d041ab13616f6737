//! Infrastructure layer: task queue, model registry, knowledge base access,
//! the producer/scheduler/processor pipeline and its configuration.

pub mod config;
pub mod knowledge;
pub mod maintenance;
pub mod pg;
pub mod processor;
pub mod registry;
pub mod scheduler;
pub mod tasks;
pub mod watcher;
