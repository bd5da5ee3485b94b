//! Fraudgate: fraud-probability serving with zero-downtime model updates
//!
//! This library serves a binary fraud score over HTTP from a versioned model
//! artifact, with atomic hot-swap of the active model and a retraining
//! coordinator that publishes new versions without disrupting live serving.

pub mod artifact;
pub mod config;
pub mod dataset;
pub mod models;
pub mod server;
pub mod store;
pub mod traits;

// Re-export key types for ergonomic use
pub use artifact::{artifact_key, LoadError, ModelArtifact, LATEST_KEY};
pub use config::AppConfig;
pub use dataset::{DatasetSplit, FeatureTable};
pub use models::pipeline::{FraudPipeline, TrainingParams};
pub use server::gateway::{PredictError, PredictionResponse, ServingGateway};
pub use server::http::{router, AppState};
pub use server::loader::{ActiveModel, ModelLoader};
pub use server::metrics::MetricsRegistry;
pub use server::retrain::{publish_initial_model, JobState, RetrainError, RetrainingCoordinator};
pub use store::{FsStore, MemoryStore, ObjectStore, StoreError};
pub use traits::features::FeatureVector;
pub use traits::model::{ModelError, ScoringModel, TrainableModel};

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_library_exports() {
        // Verify that key types are exported and accessible
        let _feature = FeatureVector::new(vec![1.0, 2.0, 3.0]);
        let _config = AppConfig::default();
        let _params = TrainingParams::default();
    }
}
