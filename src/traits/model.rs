use thiserror::Error;

use crate::dataset::DatasetSplit;
use crate::traits::features::FeatureVector;

/// Error type for scoring-model operations
#[derive(Debug, Error)]
pub enum ModelError {
    /// Errors during training or fine-tuning
    #[error("training error: {0}")]
    Training(String),
    /// Errors during prediction
    #[error("prediction error: {0}")]
    Prediction(String),
    /// Data dimension mismatch errors
    #[error("dimension mismatch ({context}): expected {expected}, got {actual}")]
    DimensionMismatch {
        expected: usize,
        actual: usize,
        context: String,
    },
    /// Errors from serialization/deserialization
    #[error("serialization error: {0}")]
    Serialization(String),
}

/// Core trait for models that score a feature vector into per-class probabilities.
///
/// Class-label ordering is fixed at construction; `predict_proba` returns one
/// probability per entry of `classes()`, in that order.
pub trait ScoringModel: Send + Sync {
    /// The class-label set, in probability-output order
    fn classes(&self) -> &[u32];

    /// Feature names in the fixed schema order used at training time
    fn feature_names(&self) -> &[String];

    /// Probability per class for a single feature vector
    fn predict_proba(&self, feature: &FeatureVector) -> Result<Vec<f64>, ModelError>;
}

/// Trait for models whose trainable state can be fitted and incrementally updated.
///
/// `Clone` is required so a retraining job can copy the trainable state and
/// never touch the instance being served.
pub trait TrainableModel: ScoringModel + Clone {
    /// Fit from scratch on a labeled dataset
    fn fit(&mut self, split: &DatasetSplit) -> Result<(), ModelError>;

    /// Incremental fit against new data, starting from the current parameters
    fn fine_tune(&mut self, split: &DatasetSplit) -> Result<(), ModelError>;
}
