use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use agritrain_core::TaskId;

use crate::blob::{BlobReader, BlobWriter};
use crate::corpus::LabeledImage;
use crate::job::{TrainingJob, TrainingRequest};
use crate::result::{TrainingError, TrainingOutcome};

/// Persisted form of a fitted centroid classifier.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClassifierArtifact {
    pub task_id: TaskId,
    pub bins: usize,
    pub classes: Vec<ClassCentroid>,
    pub trained_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClassCentroid {
    pub label: String,
    pub centroid: Vec<f64>,
    /// Number of samples the centroid was fitted on.
    pub support: usize,
}

/// Deterministic reference training job.
///
/// Model:
/// - Each image becomes a normalised histogram of its byte values (`bins` buckets).
/// - One centroid per label (mean histogram).
/// - Loss = mean squared distance from each sample to its own label's centroid.
/// - Accuracy = share of samples whose nearest centroid carries their label.
///
/// Stands in for the real image classifier; the queue processor only relies
/// on the `TrainingJob` contract.
#[derive(Debug, Clone)]
pub struct CentroidTrainingJob<R, W> {
    images: R,
    artifacts: W,
    bins: usize,
}

impl<R, W> CentroidTrainingJob<R, W>
where
    R: BlobReader,
    W: BlobWriter,
{
    pub fn new(images: R, artifacts: W) -> Self {
        Self {
            images,
            artifacts,
            bins: 16,
        }
    }

    pub fn with_bins(mut self, bins: usize) -> Self {
        self.bins = bins;
        self
    }
}

/// Blob path the classifier for `task_id` is persisted at.
pub fn artifact_path(task_id: TaskId) -> String {
    format!("models/classifier-{task_id}.json")
}

impl<R, W> TrainingJob for CentroidTrainingJob<R, W>
where
    R: BlobReader + 'static,
    W: BlobWriter + 'static,
{
    fn name(&self) -> &str {
        "centroid"
    }

    fn train(&self, request: TrainingRequest<'_>) -> Result<TrainingOutcome, TrainingError> {
        if !(1..=256).contains(&self.bins) {
            return Err(TrainingError::InvalidInput(format!(
                "bins must be within 1..=256, got {}",
                self.bins
            )));
        }

        let resolved = request.corpus.resolve(&self.images);
        if resolved.samples.len() < request.min_images {
            return Err(TrainingError::InsufficientImages {
                usable: resolved.samples.len(),
                required: request.min_images,
            });
        }
        if resolved.samples.is_empty() {
            return Err(TrainingError::EmptyCorpus);
        }

        let features = resolved
            .samples
            .iter()
            .map(|s| histogram(s, self.bins))
            .collect::<Result<Vec<_>, _>>()?;

        let classes = fit_centroids(&resolved.samples, &features, self.bins);
        if classes.len() < 2 {
            return Err(TrainingError::Compute(format!(
                "need at least two labels to train a classifier, found {}",
                classes.len()
            )));
        }

        let mut loss = 0.0;
        let mut correct = 0usize;
        for (sample, feature) in resolved.samples.iter().zip(&features) {
            if let Some(own) = classes.iter().find(|c| c.label == sample.label) {
                loss += squared_distance(feature, &own.centroid);
            }
            if nearest(&classes, feature) == Some(sample.label.as_str()) {
                correct += 1;
            }
        }
        let n = resolved.samples.len() as f64;
        let final_loss = loss / n;
        let final_accuracy = correct as f64 / n;

        debug!(
            task_id = %request.task_id,
            classes = classes.len(),
            samples = resolved.samples.len(),
            "fitted centroid classifier"
        );

        let artifact = ClassifierArtifact {
            task_id: request.task_id,
            bins: self.bins,
            classes,
            trained_at: Utc::now(),
        };
        let bytes = serde_json::to_vec_pretty(&artifact)
            .map_err(|e| TrainingError::Persist(e.to_string()))?;
        let artifact_locator = self
            .artifacts
            .write(&artifact_path(request.task_id), &bytes)
            .map_err(|e| TrainingError::Persist(e.to_string()))?;

        info!(
            task_id = %request.task_id,
            artifact = %artifact_locator,
            loss = final_loss,
            accuracy = final_accuracy,
            "centroid training finished"
        );

        Ok(TrainingOutcome {
            artifact_locator,
            final_loss,
            final_accuracy,
            images_used: resolved.samples.len(),
            images_missing: resolved.missing.len(),
        })
    }
}

fn histogram(sample: &LabeledImage, bins: usize) -> Result<Vec<f64>, TrainingError> {
    if sample.bytes.is_empty() {
        return Err(TrainingError::Decode(format!("image {} is empty", sample.path)));
    }
    let mut h = vec![0.0; bins];
    for &b in &sample.bytes {
        h[(b as usize * bins) / 256] += 1.0;
    }
    let total = sample.bytes.len() as f64;
    for v in &mut h {
        *v /= total;
    }
    Ok(h)
}

fn fit_centroids(samples: &[LabeledImage], features: &[Vec<f64>], bins: usize) -> Vec<ClassCentroid> {
    // BTreeMap keeps label order stable, which makes tie-breaking deterministic.
    let mut sums: BTreeMap<&str, (Vec<f64>, usize)> = BTreeMap::new();
    for (sample, feature) in samples.iter().zip(features) {
        let (sum, count) = sums
            .entry(sample.label.as_str())
            .or_insert_with(|| (vec![0.0; bins], 0));
        for (acc, v) in sum.iter_mut().zip(feature) {
            *acc += v;
        }
        *count += 1;
    }

    sums.into_iter()
        .map(|(label, (sum, count))| ClassCentroid {
            label: label.to_string(),
            centroid: sum.into_iter().map(|v| v / count as f64).collect(),
            support: count,
        })
        .collect()
}

fn squared_distance(a: &[f64], b: &[f64]) -> f64 {
    a.iter().zip(b).map(|(x, y)| (x - y) * (x - y)).sum()
}

fn nearest<'a>(classes: &'a [ClassCentroid], feature: &[f64]) -> Option<&'a str> {
    let mut best: Option<(&str, f64)> = None;
    for class in classes {
        let d = squared_distance(feature, &class.centroid);
        match best {
            Some((_, bd)) if bd <= d => {}
            _ => best = Some((class.label.as_str(), d)),
        }
    }
    best.map(|(label, _)| label)
}
