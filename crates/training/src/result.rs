use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Metrics and artifact location of a successful training run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrainingOutcome {
    /// Opaque locator of the persisted model artifact.
    pub artifact_locator: String,
    pub final_loss: f64,
    /// Share of correctly classified samples, in \[0, 1\].
    pub final_accuracy: f64,
    /// Images actually decoded and used for fitting.
    pub images_used: usize,
    /// References skipped because they could not be read.
    pub images_missing: usize,
}

/// First fatal cause of a failed training run.
///
/// The `Display` text is stored verbatim on the failed task, so keep messages
/// operator-readable.
#[derive(Debug, Error)]
pub enum TrainingError {
    #[error("empty corpus after resolution")]
    EmptyCorpus,

    #[error("invalid training input: {0}")]
    InvalidInput(String),

    #[error("image decode failed: {0}")]
    Decode(String),

    /// Raw message of the failing compute step, kept verbatim.
    #[error("{0}")]
    Compute(String),

    #[error("artifact persistence failed: {0}")]
    Persist(String),

    /// Fewer images resolved than the run requires.
    #[error("insufficient training data: {usable} usable images, {required} required")]
    InsufficientImages { usable: usize, required: usize },
}
