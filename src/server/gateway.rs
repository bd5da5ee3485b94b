//! Request-path scoring against the currently active model.

use std::sync::Arc;
use std::time::Instant;

use serde::Serialize;
use thiserror::Error;
use tracing::debug;

use crate::server::loader::ModelLoader;
use crate::server::metrics::MetricsRegistry;
use crate::traits::features::FeatureVector;
use crate::traits::model::ScoringModel;

/// Per-request failures. Each is reported to the caller and counted; none of
/// them terminates the process.
#[derive(Debug, Error)]
pub enum PredictError {
    /// Malformed, mistyped, or incomplete request payload
    #[error("invalid input: {0}")]
    Input(String),
    /// Well-formed payload carrying features outside the schema
    #[error("feature schema mismatch: {0}")]
    Schema(String),
    /// Scorer-internal fault during inference
    #[error("prediction failed: {0}")]
    Prediction(String),
}

#[derive(Debug, Serialize)]
pub struct PredictionResponse {
    pub fraud_probability: f64,
}

/// Answers prediction requests using the active model; never blocks on
/// retraining. All calls read only immutable state plus the atomic metrics.
pub struct ServingGateway {
    loader: Arc<ModelLoader>,
    metrics: Arc<MetricsRegistry>,
    decision_threshold: f64,
}

impl ServingGateway {
    pub fn new(loader: Arc<ModelLoader>, metrics: Arc<MetricsRegistry>, decision_threshold: f64) -> Self {
        Self {
            loader,
            metrics,
            decision_threshold,
        }
    }

    /// Validate, assemble, score, clamp. Latency is observed for every
    /// outcome; the fraud-rate gauge moves only on success.
    pub fn predict(&self, body: &serde_json::Value) -> Result<PredictionResponse, PredictError> {
        let started = Instant::now();
        let result = self.score(body);
        self.metrics
            .prediction_latency
            .observe(started.elapsed().as_secs_f64());

        match &result {
            Ok(response) => {
                self.metrics
                    .record_success(response.fraud_probability > self.decision_threshold);
            }
            Err(PredictError::Input(reason)) => {
                debug!(reason = %reason, "rejected request payload");
                self.metrics.input_errors.inc();
            }
            Err(PredictError::Schema(reason)) => {
                debug!(reason = %reason, "rejected feature schema");
                self.metrics.schema_errors.inc();
            }
            Err(PredictError::Prediction(reason)) => {
                debug!(reason = %reason, "inference failed");
                self.metrics.prediction_errors.inc();
            }
        }

        result
    }

    fn score(&self, body: &serde_json::Value) -> Result<PredictionResponse, PredictError> {
        let fields = body
            .as_object()
            .ok_or_else(|| PredictError::Input("request body must be a JSON object".to_string()))?;

        let active = self.loader.active();
        let schema = active.pipeline.feature_names();

        for name in fields.keys() {
            if !schema.iter().any(|expected| expected == name) {
                return Err(PredictError::Schema(format!("unexpected feature '{}'", name)));
            }
        }

        let mut values = Vec::with_capacity(schema.len());
        for name in schema {
            let value = fields
                .get(name)
                .ok_or_else(|| PredictError::Input(format!("missing feature '{}'", name)))?;
            let number = value
                .as_f64()
                .ok_or_else(|| PredictError::Input(format!("feature '{}' must be numeric", name)))?;
            values.push(number);
        }

        let probabilities = active
            .pipeline
            .predict_proba(&FeatureVector::new(values))
            .map_err(|e| PredictError::Prediction(e.to_string()))?;
        let fraud = probabilities
            .get(1)
            .copied()
            .ok_or_else(|| {
                PredictError::Prediction("scorer returned no probability for label 1".to_string())
            })?;
        if !fraud.is_finite() {
            return Err(PredictError::Prediction("non-finite probability".to_string()));
        }

        Ok(PredictionResponse {
            fraud_probability: fraud.clamp(0.0, 1.0),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::artifact::{artifact_key, ModelArtifact, LATEST_KEY};
    use crate::models::pipeline::{FraudPipeline, StandardScaler};
    use crate::store::{MemoryStore, ObjectStore};
    use serde_json::json;

    async fn gateway_with_fixture() -> (ServingGateway, Arc<MetricsRegistry>) {
        // Known parameters: no-op scaler, weights [0, 0], bias ln(3)
        let pipeline = FraudPipeline::from_parameters(
            vec!["amount".to_string(), "age".to_string()],
            StandardScaler::identity(2),
            vec![0.0, 0.0],
            3.0_f64.ln(),
        );
        let store = Arc::new(MemoryStore::new());
        let artifact = ModelArtifact::from_pipeline(1, &pipeline).unwrap();
        let key = artifact_key(1);
        store.put(&key, &artifact.encode().unwrap()).await.unwrap();
        store.put(LATEST_KEY, key.as_bytes()).await.unwrap();

        let metrics = Arc::new(MetricsRegistry::new(10));
        let loader = Arc::new(
            ModelLoader::init(store, LATEST_KEY.to_string(), metrics.clone())
                .await
                .unwrap(),
        );
        (
            ServingGateway::new(loader, metrics.clone(), 0.5),
            metrics,
        )
    }

    #[tokio::test]
    async fn test_predict_returns_probability_in_unit_interval() {
        let (gateway, _) = gateway_with_fixture().await;

        let response = gateway
            .predict(&json!({"amount": 120.5, "age": 44.0}))
            .unwrap();
        assert!((0.0..=1.0).contains(&response.fraud_probability));
    }

    #[tokio::test]
    async fn test_predict_matches_reference_fixture() {
        let (gateway, _) = gateway_with_fixture().await;

        // Zero weights + bias ln(3) score 0.75 for any input
        let response = gateway
            .predict(&json!({"amount": 1.0, "age": 2.0}))
            .unwrap();
        assert!((response.fraud_probability - 0.75).abs() < 1e-6);
    }

    #[tokio::test]
    async fn test_missing_feature_is_input_error() {
        let (gateway, metrics) = gateway_with_fixture().await;

        gateway.predict(&json!({"amount": 100.0, "age": 30.0})).unwrap();
        let fraud_rate_before = metrics.fraud_rate.get();

        let result = gateway.predict(&json!({"amount": 100.0}));
        assert!(matches!(result, Err(PredictError::Input(_))));

        // Failures leave the fraud-rate gauge untouched
        assert_eq!(metrics.fraud_rate.get(), fraud_rate_before);
        assert_eq!(metrics.input_errors.get(), 1);
    }

    #[tokio::test]
    async fn test_extra_feature_is_schema_error() {
        let (gateway, _) = gateway_with_fixture().await;

        let result = gateway.predict(&json!({
            "amount": 100.0,
            "age": 30.0,
            "color": 1.0
        }));
        assert!(matches!(result, Err(PredictError::Schema(_))));
    }

    #[tokio::test]
    async fn test_non_numeric_feature_is_input_error() {
        let (gateway, metrics) = gateway_with_fixture().await;

        let result = gateway.predict(&json!({"amount": "lots", "age": 30.0}));
        assert!(matches!(result, Err(PredictError::Input(_))));
        assert_eq!(metrics.input_errors.get(), 1);
    }

    #[tokio::test]
    async fn test_non_object_body_is_input_error() {
        let (gateway, _) = gateway_with_fixture().await;

        let result = gateway.predict(&json!([1.0, 2.0]));
        assert!(matches!(result, Err(PredictError::Input(_))));
    }

    #[tokio::test]
    async fn test_latency_observed_for_every_outcome() {
        let (gateway, metrics) = gateway_with_fixture().await;

        gateway.predict(&json!({"amount": 1.0, "age": 2.0})).unwrap();
        let _ = gateway.predict(&json!({"amount": 1.0}));

        assert_eq!(metrics.prediction_latency.count(), 2);
    }

    #[tokio::test]
    async fn test_fraud_rate_tracks_threshold() {
        let (gateway, metrics) = gateway_with_fixture().await;

        // Fixture scores 0.75 for everything, above the 0.5 threshold
        gateway.predict(&json!({"amount": 1.0, "age": 2.0})).unwrap();
        gateway.predict(&json!({"amount": 3.0, "age": 4.0})).unwrap();

        assert_eq!(metrics.fraud_rate.get(), 1.0);
        assert_eq!(metrics.predictions_total.get(), 2);
    }
}
