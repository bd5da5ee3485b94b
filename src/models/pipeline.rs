use ndarray::Array1;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use serde::{Deserialize, Serialize};

use crate::dataset::{DatasetSplit, EXPECTED_CLASSES};
use crate::traits::features::FeatureVector;
use crate::traits::model::{ModelError, ScoringModel, TrainableModel};

/// Hyperparameters for fitting and fine-tuning. Both operations are
/// deterministic given a fixed seed.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TrainingParams {
    pub learning_rate: f64,
    pub epochs: usize,
    pub fine_tune_epochs: usize,
    pub seed: u64,
}

impl Default for TrainingParams {
    fn default() -> Self {
        Self {
            learning_rate: 0.1,
            epochs: 200,
            fine_tune_epochs: 50,
            seed: 42,
        }
    }
}

/// Per-feature standardization fitted on the training split
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct StandardScaler {
    means: Vec<f64>,
    stds: Vec<f64>,
}

impl StandardScaler {
    pub fn fit(rows: &[Vec<f64>]) -> Self {
        let width = rows.first().map(|r| r.len()).unwrap_or(0);
        let n = rows.len() as f64;

        let mut means = vec![0.0; width];
        for row in rows {
            for (m, v) in means.iter_mut().zip(row) {
                *m += v;
            }
        }
        for m in &mut means {
            *m /= n;
        }

        let mut stds = vec![0.0; width];
        for row in rows {
            for ((s, v), m) in stds.iter_mut().zip(row).zip(&means) {
                *s += (v - m) * (v - m);
            }
        }
        for s in &mut stds {
            *s = (*s / n).sqrt();
            // Constant columns pass through unscaled
            if *s < f64::EPSILON {
                *s = 1.0;
            }
        }

        Self { means, stds }
    }

    /// A no-op scaler, for models whose parameters are set directly
    pub fn identity(width: usize) -> Self {
        Self {
            means: vec![0.0; width],
            stds: vec![1.0; width],
        }
    }

    pub fn transform(&self, x: &Array1<f64>) -> Array1<f64> {
        Array1::from_iter(
            x.iter()
                .zip(&self.means)
                .zip(&self.stds)
                .map(|((v, m), s)| (v - m) / s),
        )
    }
}

fn sigmoid(z: f64) -> f64 {
    1.0 / (1.0 + (-z).exp())
}

/// Binary logistic classifier trained by stochastic gradient descent
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LogisticRegression {
    weights: Vec<f64>,
    bias: f64,
}

impl LogisticRegression {
    fn zeroed(width: usize) -> Self {
        Self {
            weights: vec![0.0; width],
            bias: 0.0,
        }
    }

    fn decision(&self, x: &Array1<f64>) -> f64 {
        self.weights
            .iter()
            .zip(x.iter())
            .map(|(w, v)| w * v)
            .sum::<f64>()
            + self.bias
    }

    fn sgd_epochs(
        &mut self,
        rows: &[Array1<f64>],
        labels: &[u32],
        learning_rate: f64,
        epochs: usize,
        rng: &mut StdRng,
    ) {
        let mut order: Vec<usize> = (0..rows.len()).collect();
        for _ in 0..epochs {
            order.shuffle(rng);
            for &i in &order {
                let p = sigmoid(self.decision(&rows[i]));
                let err = p - labels[i] as f64;
                for (w, v) in self.weights.iter_mut().zip(rows[i].iter()) {
                    *w -= learning_rate * err * v;
                }
                self.bias -= learning_rate * err;
            }
        }
    }
}

/// Scaler plus binary classifier, built from one artifact and immutable while
/// serving. Fitting produces a new trainable state; the instance handed to the
/// serving path is never mutated.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct FraudPipeline {
    feature_names: Vec<String>,
    classes: Vec<u32>,
    params: TrainingParams,
    scaler: Option<StandardScaler>,
    classifier: LogisticRegression,
    trained: bool,
}

impl FraudPipeline {
    pub fn new(params: TrainingParams) -> Self {
        Self {
            feature_names: Vec::new(),
            classes: EXPECTED_CLASSES.to_vec(),
            params,
            scaler: None,
            classifier: LogisticRegression::zeroed(0),
            trained: false,
        }
    }

    /// Build a trained pipeline directly from parameters
    pub fn from_parameters(
        feature_names: Vec<String>,
        scaler: StandardScaler,
        weights: Vec<f64>,
        bias: f64,
    ) -> Self {
        Self {
            feature_names,
            classes: EXPECTED_CLASSES.to_vec(),
            params: TrainingParams::default(),
            scaler: Some(scaler),
            classifier: LogisticRegression { weights, bias },
            trained: true,
        }
    }

    pub fn params(&self) -> &TrainingParams {
        &self.params
    }

    pub fn is_trained(&self) -> bool {
        self.trained
    }

    fn scaled_rows(scaler: &StandardScaler, split: &DatasetSplit) -> Vec<Array1<f64>> {
        split
            .features
            .rows
            .iter()
            .map(|row| scaler.transform(&Array1::from(row.clone())))
            .collect()
    }

    fn check_split(&self, split: &DatasetSplit) -> Result<(), ModelError> {
        split
            .validate()
            .map_err(|e| ModelError::Training(e.to_string()))?;
        if split.is_empty() {
            return Err(ModelError::Training("empty training data".to_string()));
        }
        Ok(())
    }
}

impl ScoringModel for FraudPipeline {
    fn classes(&self) -> &[u32] {
        &self.classes
    }

    fn feature_names(&self) -> &[String] {
        &self.feature_names
    }

    fn predict_proba(&self, feature: &FeatureVector) -> Result<Vec<f64>, ModelError> {
        if !self.trained {
            return Err(ModelError::Prediction("model not trained".to_string()));
        }
        if feature.dimension() != self.feature_names.len() {
            return Err(ModelError::DimensionMismatch {
                expected: self.feature_names.len(),
                actual: feature.dimension(),
                context: "feature vector vs schema".to_string(),
            });
        }

        let scaler = self
            .scaler
            .as_ref()
            .ok_or_else(|| ModelError::Prediction("pipeline has no fitted scaler".to_string()))?;
        let scaled = scaler.transform(feature.as_array());
        let fraud = sigmoid(self.classifier.decision(&scaled));
        if !fraud.is_finite() {
            return Err(ModelError::Prediction("non-finite probability".to_string()));
        }

        Ok(vec![1.0 - fraud, fraud])
    }
}

impl TrainableModel for FraudPipeline {
    fn fit(&mut self, split: &DatasetSplit) -> Result<(), ModelError> {
        self.check_split(split)?;

        self.feature_names = split.features.feature_names.clone();
        let scaler = StandardScaler::fit(&split.features.rows);
        self.classifier = LogisticRegression::zeroed(self.feature_names.len());

        let rows = Self::scaled_rows(&scaler, split);
        self.scaler = Some(scaler);
        let mut rng = StdRng::seed_from_u64(self.params.seed);
        self.classifier.sgd_epochs(
            &rows,
            &split.labels,
            self.params.learning_rate,
            self.params.epochs,
            &mut rng,
        );
        self.trained = true;
        Ok(())
    }

    fn fine_tune(&mut self, split: &DatasetSplit) -> Result<(), ModelError> {
        if !self.trained {
            return Err(ModelError::Training(
                "cannot fine-tune an untrained model".to_string(),
            ));
        }
        self.check_split(split)?;
        if split.features.feature_names != self.feature_names {
            return Err(ModelError::Training(format!(
                "feature schema mismatch: expected {:?}, got {:?}",
                self.feature_names, split.features.feature_names
            )));
        }

        // Scaler stays frozen: the weights were trained against this transform
        let scaler = self
            .scaler
            .as_ref()
            .ok_or_else(|| ModelError::Training("pipeline has no fitted scaler".to_string()))?;
        let rows = Self::scaled_rows(scaler, split);
        let mut rng = StdRng::seed_from_u64(self.params.seed);
        self.classifier.sgd_epochs(
            &rows,
            &split.labels,
            self.params.learning_rate,
            self.params.fine_tune_epochs,
            &mut rng,
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn separable_split() -> DatasetSplit {
        let names = vec!["amount".to_string()];
        let mut rows = Vec::new();
        let mut labels = Vec::new();
        for i in 0..5 {
            rows.push(vec![1.0 + i as f64]);
            labels.push(0);
            rows.push(vec![100.0 + i as f64]);
            labels.push(1);
        }
        DatasetSplit::new(names, rows, labels)
    }

    fn fraud_probability(pipeline: &FraudPipeline, amount: f64) -> f64 {
        let probs = pipeline
            .predict_proba(&FeatureVector::new(vec![amount]))
            .unwrap();
        probs[1]
    }

    #[test]
    fn test_fit_separates_classes() {
        let mut pipeline = FraudPipeline::new(TrainingParams::default());
        pipeline.fit(&separable_split()).unwrap();

        assert!(fraud_probability(&pipeline, 2.0) < 0.5);
        assert!(fraud_probability(&pipeline, 103.0) > 0.5);
    }

    #[test]
    fn test_probabilities_are_a_distribution() {
        let mut pipeline = FraudPipeline::new(TrainingParams::default());
        pipeline.fit(&separable_split()).unwrap();

        let probs = pipeline
            .predict_proba(&FeatureVector::new(vec![50.0]))
            .unwrap();
        assert_eq!(probs.len(), 2);
        assert!(probs.iter().all(|p| (0.0..=1.0).contains(p)));
        assert!((probs[0] + probs[1] - 1.0).abs() < 1e-12);
    }

    #[test]
    fn test_fit_is_deterministic_for_fixed_seed() {
        let split = separable_split();
        let mut a = FraudPipeline::new(TrainingParams::default());
        let mut b = FraudPipeline::new(TrainingParams::default());
        a.fit(&split).unwrap();
        b.fit(&split).unwrap();

        assert_eq!(fraud_probability(&a, 7.0), fraud_probability(&b, 7.0));
        assert_eq!(a, b);
    }

    #[test]
    fn test_fit_empty_data() {
        let mut pipeline = FraudPipeline::new(TrainingParams::default());
        let empty = DatasetSplit::new(vec!["amount".to_string()], vec![], vec![]);
        let result = pipeline.fit(&empty);
        assert!(matches!(result, Err(ModelError::Training(_))));
    }

    #[test]
    fn test_fit_rejects_bad_labels() {
        let mut pipeline = FraudPipeline::new(TrainingParams::default());
        let split = DatasetSplit::new(vec!["amount".to_string()], vec![vec![1.0]], vec![3]);
        assert!(matches!(pipeline.fit(&split), Err(ModelError::Training(_))));
    }

    #[test]
    fn test_predict_before_training() {
        let pipeline = FraudPipeline::new(TrainingParams::default());
        let result = pipeline.predict_proba(&FeatureVector::new(vec![1.0]));
        assert!(matches!(result, Err(ModelError::Prediction(_))));
    }

    #[test]
    fn test_predict_dimension_mismatch() {
        let mut pipeline = FraudPipeline::new(TrainingParams::default());
        pipeline.fit(&separable_split()).unwrap();

        let result = pipeline.predict_proba(&FeatureVector::new(vec![1.0, 2.0]));
        assert!(matches!(result, Err(ModelError::DimensionMismatch { .. })));
    }

    #[test]
    fn test_fine_tune_requires_trained_model() {
        let mut pipeline = FraudPipeline::new(TrainingParams::default());
        let result = pipeline.fine_tune(&separable_split());
        assert!(matches!(result, Err(ModelError::Training(_))));
    }

    #[test]
    fn test_fine_tune_rejects_schema_change() {
        let mut pipeline = FraudPipeline::new(TrainingParams::default());
        pipeline.fit(&separable_split()).unwrap();

        let other = DatasetSplit::new(vec!["velocity".to_string()], vec![vec![1.0]], vec![1]);
        let result = pipeline.fine_tune(&other);
        assert!(matches!(result, Err(ModelError::Training(_))));
    }

    #[test]
    fn test_fine_tune_shifts_toward_new_data() {
        let mut pipeline = FraudPipeline::new(TrainingParams::default());
        pipeline.fit(&separable_split()).unwrap();

        let before = fraud_probability(&pipeline, 50.0);

        // New evidence: mid-range amounts are fraudulent
        let new_data = DatasetSplit::new(
            vec!["amount".to_string()],
            vec![vec![50.0]; 10],
            vec![1; 10],
        );
        pipeline.fine_tune(&new_data).unwrap();

        let after = fraud_probability(&pipeline, 50.0);
        assert!(after > before);
    }

    #[test]
    fn test_fine_tune_does_not_refit_scaler() {
        let mut pipeline = FraudPipeline::new(TrainingParams::default());
        pipeline.fit(&separable_split()).unwrap();
        let scaler_before = pipeline.scaler.clone();

        let new_data = DatasetSplit::new(
            vec!["amount".to_string()],
            vec![vec![1e6]; 5],
            vec![1; 5],
        );
        pipeline.fine_tune(&new_data).unwrap();

        assert_eq!(pipeline.scaler, scaler_before);
    }

    #[test]
    fn test_from_parameters_reference_probability() {
        // With a no-op scaler, zero weights and bias ln(3), the fraud
        // probability is exactly 1 / (1 + 1/3) = 0.75.
        let pipeline = FraudPipeline::from_parameters(
            vec!["amount".to_string()],
            StandardScaler::identity(1),
            vec![0.0],
            3.0_f64.ln(),
        );

        let p = fraud_probability(&pipeline, 123.0);
        assert!((p - 0.75).abs() < 1e-6);
    }
}
