//! `agritrain-training`
//!
//! **Responsibility:** the Training Job boundary.
//!
//! The queue processor treats training as a black-box compute step: it hands
//! over the full corpus and gets back either metrics plus an artifact locator
//! or a single error. This crate defines that contract, the blob interfaces
//! images and artifacts travel through, and a deterministic reference job.
//! It must not touch task state.

pub mod blob;
pub mod centroid;
pub mod corpus;
pub mod job;
pub mod result;
pub mod scripted;

pub use blob::{BlobError, BlobReader, BlobWriter, FsBlobStore, InMemoryBlobStore};
pub use centroid::{CentroidTrainingJob, ClassCentroid, ClassifierArtifact, artifact_path};
pub use corpus::{Corpus, LabeledImage, ResolvedCorpus};
pub use job::{TrainingJob, TrainingRequest};
pub use result::{TrainingError, TrainingOutcome};
pub use scripted::ScriptedTrainingJob;
