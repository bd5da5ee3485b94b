//! Labeled datasets: integrity checks, stratified splitting, and staging
//! to/from the object store for retraining runs.

use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::store::{ObjectStore, StoreError};

/// Store key for staged features awaiting retraining
pub const STAGED_FEATURES_KEY: &str = "staging/features.json";
/// Store key for staged labels awaiting retraining
pub const STAGED_LABELS_KEY: &str = "staging/labels.json";

/// The binary class-label set: 0 = legitimate, 1 = fraud
pub const EXPECTED_CLASSES: [u32; 2] = [0, 1];

#[derive(Debug, Error)]
pub enum DatasetError {
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error("staged dataset is corrupt: {0}")]
    Corrupt(String),
    #[error("dataset integrity: {0}")]
    Integrity(String),
}

/// Named columns plus row-major values; the staged-dataset wire form
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct FeatureTable {
    pub feature_names: Vec<String>,
    pub rows: Vec<Vec<f64>>,
}

/// Paired feature table and label vector, used both for initial training and
/// for incremental retraining
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DatasetSplit {
    pub features: FeatureTable,
    pub labels: Vec<u32>,
}

impl DatasetSplit {
    pub fn new(feature_names: Vec<String>, rows: Vec<Vec<f64>>, labels: Vec<u32>) -> Self {
        Self {
            features: FeatureTable { feature_names, rows },
            labels,
        }
    }

    pub fn len(&self) -> usize {
        self.labels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.labels.is_empty()
    }

    /// Check row widths, label count, and that every label is in {0, 1}
    pub fn validate(&self) -> Result<(), DatasetError> {
        let width = self.features.feature_names.len();
        if width == 0 {
            return Err(DatasetError::Integrity("no feature columns".to_string()));
        }
        if self.features.rows.len() != self.labels.len() {
            return Err(DatasetError::Integrity(format!(
                "{} rows but {} labels",
                self.features.rows.len(),
                self.labels.len()
            )));
        }
        for (i, row) in self.features.rows.iter().enumerate() {
            if row.len() != width {
                return Err(DatasetError::Integrity(format!(
                    "row {} has {} values, expected {}",
                    i,
                    row.len(),
                    width
                )));
            }
        }
        for (i, label) in self.labels.iter().enumerate() {
            if !EXPECTED_CLASSES.contains(label) {
                return Err(DatasetError::Integrity(format!(
                    "label {} at row {} is outside {{0, 1}}",
                    label, i
                )));
            }
        }
        Ok(())
    }

    /// Carve off a held-out split, stratified by label so both splits preserve
    /// the class balance. Deterministic for a fixed seed.
    pub fn stratified_split(
        &self,
        holdout_ratio: f64,
        seed: u64,
    ) -> Result<(DatasetSplit, DatasetSplit), DatasetError> {
        self.validate()?;
        if !(0.0..1.0).contains(&holdout_ratio) {
            return Err(DatasetError::Integrity(format!(
                "holdout ratio {} must be in [0, 1)",
                holdout_ratio
            )));
        }

        let mut rng = StdRng::seed_from_u64(seed);
        let mut train_idx = Vec::new();
        let mut holdout_idx = Vec::new();

        for class in EXPECTED_CLASSES {
            let mut indices: Vec<usize> = self
                .labels
                .iter()
                .enumerate()
                .filter(|(_, l)| **l == class)
                .map(|(i, _)| i)
                .collect();
            indices.shuffle(&mut rng);

            let holdout_count = (indices.len() as f64 * holdout_ratio).round() as usize;
            holdout_idx.extend(indices.drain(..holdout_count));
            train_idx.extend(indices);
        }

        // Stable row order within each split
        train_idx.sort_unstable();
        holdout_idx.sort_unstable();

        Ok((self.subset(&train_idx), self.subset(&holdout_idx)))
    }

    fn subset(&self, indices: &[usize]) -> DatasetSplit {
        DatasetSplit {
            features: FeatureTable {
                feature_names: self.features.feature_names.clone(),
                rows: indices.iter().map(|&i| self.features.rows[i].clone()).collect(),
            },
            labels: indices.iter().map(|&i| self.labels[i]).collect(),
        }
    }

    /// Write features and labels under the staging keys (two separate writes)
    pub async fn stage(&self, store: &dyn ObjectStore) -> Result<(), DatasetError> {
        let features = serde_json::to_vec(&self.features)
            .map_err(|e| DatasetError::Corrupt(e.to_string()))?;
        let labels = serde_json::to_vec(&self.labels)
            .map_err(|e| DatasetError::Corrupt(e.to_string()))?;
        store.put(STAGED_FEATURES_KEY, &features).await?;
        store.put(STAGED_LABELS_KEY, &labels).await?;
        Ok(())
    }

    /// Re-read the staged dataset from the store. Always fetches; no
    /// cross-run cache exists.
    pub async fn fetch_staged(store: &dyn ObjectStore) -> Result<Self, DatasetError> {
        let features_bytes = store.get(STAGED_FEATURES_KEY).await?;
        let labels_bytes = store.get(STAGED_LABELS_KEY).await?;

        let features: FeatureTable = serde_json::from_slice(&features_bytes)
            .map_err(|e| DatasetError::Corrupt(format!("features: {}", e)))?;
        let labels: Vec<u32> = serde_json::from_slice(&labels_bytes)
            .map_err(|e| DatasetError::Corrupt(format!("labels: {}", e)))?;

        let split = DatasetSplit { features, labels };
        split.validate()?;
        Ok(split)
    }
}
