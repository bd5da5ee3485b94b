//! Versioned model artifacts: the serialized, immutable snapshot of a
//! pipeline's trainable state, plus the store keys it lives under.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::dataset::EXPECTED_CLASSES;
use crate::models::pipeline::FraudPipeline;
use crate::store::StoreError;
use crate::traits::model::{ModelError, ScoringModel};

/// Store key for the "latest version" pointer
pub const LATEST_KEY: &str = "models/fraud_pipeline/latest";

/// Store key for a specific artifact version. Version keys are never reused.
pub fn artifact_key(version: u64) -> String {
    format!("models/fraud_pipeline/v{}.json", version)
}

/// Errors while resolving or decoding an artifact
#[derive(Debug, Error)]
pub enum LoadError {
    #[error("artifact is corrupt: {0}")]
    Corrupt(String),
    #[error("class-label set mismatch: expected {expected:?}, got {actual:?}")]
    SchemaMismatch { expected: Vec<u32>, actual: Vec<u32> },
    #[error(transparent)]
    Store(#[from] StoreError),
}

/// JSON envelope around a serialized pipeline. Immutable once published;
/// versions increase monotonically.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelArtifact {
    pub version: u64,
    pub classes: Vec<u32>,
    payload: serde_json::Value,
}

impl ModelArtifact {
    pub fn from_pipeline(version: u64, pipeline: &FraudPipeline) -> Result<Self, ModelError> {
        let payload = serde_json::to_value(pipeline)
            .map_err(|e| ModelError::Serialization(e.to_string()))?;
        Ok(Self {
            version,
            classes: pipeline.classes().to_vec(),
            payload,
        })
    }

    pub fn encode(&self) -> Result<Vec<u8>, ModelError> {
        serde_json::to_vec(self).map_err(|e| ModelError::Serialization(e.to_string()))
    }

    pub fn decode(bytes: &[u8]) -> Result<Self, LoadError> {
        serde_json::from_slice(bytes).map_err(|e| LoadError::Corrupt(e.to_string()))
    }

    /// Deserialize the payload, rejecting any artifact whose declared label
    /// set is not exactly {0, 1}.
    pub fn to_pipeline(&self) -> Result<FraudPipeline, LoadError> {
        if self.classes != EXPECTED_CLASSES {
            return Err(LoadError::SchemaMismatch {
                expected: EXPECTED_CLASSES.to_vec(),
                actual: self.classes.clone(),
            });
        }
        let pipeline: FraudPipeline = serde_json::from_value(self.payload.clone())
            .map_err(|e| LoadError::Corrupt(e.to_string()))?;
        if !pipeline.is_trained() {
            return Err(LoadError::Corrupt("pipeline payload is untrained".to_string()));
        }
        Ok(pipeline)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dataset::DatasetSplit;
    use crate::models::pipeline::TrainingParams;
    use crate::traits::model::TrainableModel;

    fn trained_pipeline() -> FraudPipeline {
        let split = DatasetSplit::new(
            vec!["amount".to_string()],
            vec![vec![1.0], vec![2.0], vec![100.0], vec![101.0]],
            vec![0, 0, 1, 1],
        );
        let mut pipeline = FraudPipeline::new(TrainingParams::default());
        pipeline.fit(&split).unwrap();
        pipeline
    }

    #[test]
    fn test_roundtrip_preserves_pipeline() {
        let pipeline = trained_pipeline();
        let artifact = ModelArtifact::from_pipeline(3, &pipeline).unwrap();

        let decoded = ModelArtifact::decode(&artifact.encode().unwrap()).unwrap();
        assert_eq!(decoded.version, 3);
        assert_eq!(decoded.to_pipeline().unwrap(), pipeline);
    }

    #[test]
    fn test_decode_garbage() {
        let result = ModelArtifact::decode(b"{not json");
        assert!(matches!(result, Err(LoadError::Corrupt(_))));
    }

    #[test]
    fn test_rejects_wrong_label_set() {
        let pipeline = trained_pipeline();
        let mut artifact = ModelArtifact::from_pipeline(1, &pipeline).unwrap();
        artifact.classes = vec![0, 1, 2];

        let result = artifact.to_pipeline();
        assert!(matches!(result, Err(LoadError::SchemaMismatch { .. })));
    }

    #[test]
    fn test_rejects_untrained_payload() {
        let untrained = FraudPipeline::new(TrainingParams::default());
        let payload = serde_json::to_value(&untrained).unwrap();
        let artifact = ModelArtifact {
            version: 1,
            classes: EXPECTED_CLASSES.to_vec(),
            payload,
        };

        let result = artifact.to_pipeline();
        assert!(matches!(result, Err(LoadError::Corrupt(_))));
    }

    #[test]
    fn test_artifact_key_format() {
        assert_eq!(artifact_key(7), "models/fraud_pipeline/v7.json");
    }
}
