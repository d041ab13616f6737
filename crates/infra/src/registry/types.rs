use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use agritrain_core::TaskId;

use crate::tasks::TaskResult;

/// Constant key of the singleton registry record.
pub const MODEL_REGISTRY_KEY: &str = "current";

/// What the registry knows about the deployed model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelMetadata {
    /// Task whose run produced the model.
    pub task_id: TaskId,
    pub artifact_locator: String,
    pub total_images: usize,
    pub total_entries: usize,
    pub final_loss: f64,
    pub final_accuracy: f64,
    pub trained_at: DateTime<Utc>,
}

impl ModelMetadata {
    pub fn from_result(task_id: TaskId, result: &TaskResult, trained_at: DateTime<Utc>) -> Self {
        Self {
            task_id,
            artifact_locator: result.artifact_locator.clone(),
            total_images: result.total_images,
            total_entries: result.total_entries,
            final_loss: result.final_loss,
            final_accuracy: result.final_accuracy,
            trained_at,
        }
    }
}

/// The stored singleton. `version` starts at 1 and increments on each write.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelRecord {
    pub version: u64,
    pub metadata: ModelMetadata,
    pub updated_at: DateTime<Utc>,
}
