//! Retraining orchestration: fetch new data, fine-tune a copy of the current
//! model, publish a new artifact version. Runs off the request path and never
//! touches the model being served.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use parking_lot::RwLock;
use thiserror::Error;
use tracing::{debug, error, info};

use crate::artifact::{artifact_key, ModelArtifact};
use crate::dataset::DatasetSplit;
use crate::models::pipeline::{FraudPipeline, TrainingParams};
use crate::server::metrics::MetricsRegistry;
use crate::store::ObjectStore;
use crate::traits::model::TrainableModel;

/// Failures confined to a single retraining job. The previously published
/// artifact is always left authoritative and untouched.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum RetrainError {
    #[error("fetch failed: {0}")]
    FetchFailed(String),
    #[error("training failed: {0}")]
    TrainFailed(String),
    #[error("publish failed: {0}")]
    PublishFailed(String),
    #[error("job cancelled")]
    Cancelled,
    #[error("a retraining job is already running")]
    AlreadyRunning,
}

/// Lifecycle of the current (or most recent) retraining job
#[derive(Debug, Clone, PartialEq)]
pub enum JobState {
    Idle,
    Fetching,
    Training,
    Publishing,
    Failed(RetrainError),
    Succeeded(u64),
}

/// Orchestrates fetch -> fine-tune -> publish. Externally triggered; at most
/// one job at a time; no automatic retry and no rollback (nothing previously
/// published is ever modified).
pub struct RetrainingCoordinator {
    store: Arc<dyn ObjectStore>,
    latest_key: String,
    metrics: Arc<MetricsRegistry>,
    state: RwLock<JobState>,
    running: AtomicBool,
    cancel_requested: AtomicBool,
}

impl RetrainingCoordinator {
    pub fn new(store: Arc<dyn ObjectStore>, latest_key: String, metrics: Arc<MetricsRegistry>) -> Self {
        Self {
            store,
            latest_key,
            metrics,
            state: RwLock::new(JobState::Idle),
            running: AtomicBool::new(false),
            cancel_requested: AtomicBool::new(false),
        }
    }

    pub fn state(&self) -> JobState {
        self.state.read().clone()
    }

    /// Request cancellation of the running job. Takes effect at the next
    /// state transition; a single-key write is never interrupted.
    pub fn cancel(&self) {
        self.cancel_requested.store(true, Ordering::SeqCst);
    }

    /// Run one retraining job to completion. Returns the newly published
    /// version on success.
    pub async fn run(&self) -> Result<u64, RetrainError> {
        if self.running.swap(true, Ordering::SeqCst) {
            return Err(RetrainError::AlreadyRunning);
        }

        let result = self.execute().await;

        match &result {
            Ok(version) => {
                self.metrics.retrain_success_total.inc();
                self.set_state(JobState::Succeeded(*version));
                info!(version = *version, "retraining job published new model");
            }
            Err(e) => {
                match e {
                    RetrainError::FetchFailed(_) => self.metrics.retrain_fetch_failures.inc(),
                    RetrainError::TrainFailed(_) => self.metrics.retrain_train_failures.inc(),
                    RetrainError::PublishFailed(_) => self.metrics.retrain_publish_failures.inc(),
                    RetrainError::Cancelled => self.metrics.retrain_cancellations.inc(),
                    RetrainError::AlreadyRunning => {}
                }
                self.set_state(JobState::Failed(e.clone()));
                error!(error = %e, "retraining job failed");
            }
        }

        self.cancel_requested.store(false, Ordering::SeqCst);
        self.running.store(false, Ordering::SeqCst);
        result
    }

    async fn execute(&self) -> Result<u64, RetrainError> {
        // Fetching: always re-read the current artifact and the staged data
        // from the store; no cross-run cache exists.
        self.set_state(JobState::Fetching);
        self.check_cancelled()?;

        let pointer = self
            .store
            .get(&self.latest_key)
            .await
            .map_err(|e| RetrainError::FetchFailed(e.to_string()))?;
        let current_key = String::from_utf8(pointer)
            .map_err(|e| RetrainError::FetchFailed(format!("latest pointer: {}", e)))?;
        let artifact_bytes = self
            .store
            .get(current_key.trim())
            .await
            .map_err(|e| RetrainError::FetchFailed(e.to_string()))?;
        let staged = DatasetSplit::fetch_staged(self.store.as_ref())
            .await
            .map_err(|e| RetrainError::FetchFailed(e.to_string()))?;

        // Training: fine-tune a clone; the served instance is never aliased
        self.set_state(JobState::Training);
        self.check_cancelled()?;

        let artifact = ModelArtifact::decode(&artifact_bytes)
            .map_err(|e| RetrainError::FetchFailed(e.to_string()))?;
        let current = artifact
            .to_pipeline()
            .map_err(|e| RetrainError::FetchFailed(e.to_string()))?;

        if staged.is_empty() {
            return Err(RetrainError::TrainFailed("staged dataset is empty".to_string()));
        }

        let mut candidate = current.clone();
        candidate
            .fine_tune(&staged)
            .map_err(|e| RetrainError::TrainFailed(e.to_string()))?;
        debug!(samples = staged.len(), "fine-tune complete");

        // Publishing: artifact write strictly precedes the pointer write.
        // A crash or failure between the two leaves the old version
        // authoritative; the new bytes stay durable under their version key.
        self.set_state(JobState::Publishing);
        self.check_cancelled()?;

        let version = artifact.version + 1;
        let new_artifact = ModelArtifact::from_pipeline(version, &candidate)
            .map_err(|e| RetrainError::PublishFailed(e.to_string()))?;
        let bytes = new_artifact
            .encode()
            .map_err(|e| RetrainError::PublishFailed(e.to_string()))?;
        let key = artifact_key(version);

        self.store
            .put(&key, &bytes)
            .await
            .map_err(|e| RetrainError::PublishFailed(format!("artifact write: {}", e)))?;
        self.store
            .put(&self.latest_key, key.as_bytes())
            .await
            .map_err(|e| {
                RetrainError::PublishFailed(format!(
                    "pointer write: {} (artifact v{} remains stored under {})",
                    e, version, key
                ))
            })?;

        Ok(version)
    }

    fn set_state(&self, state: JobState) {
        debug!(state = ?state, "retraining state transition");
        *self.state.write() = state;
    }

    fn check_cancelled(&self) -> Result<(), RetrainError> {
        if self.cancel_requested.load(Ordering::SeqCst) {
            return Err(RetrainError::Cancelled);
        }
        Ok(())
    }
}

/// Fit a pipeline from scratch on a staged dataset and publish it as version
/// 1, with the same two ordered writes as a retraining job.
pub async fn publish_initial_model(
    store: &dyn ObjectStore,
    latest_key: &str,
    params: TrainingParams,
    split: &DatasetSplit,
) -> Result<u64, RetrainError> {
    let mut pipeline = FraudPipeline::new(params);
    pipeline
        .fit(split)
        .map_err(|e| RetrainError::TrainFailed(e.to_string()))?;

    let artifact = ModelArtifact::from_pipeline(1, &pipeline)
        .map_err(|e| RetrainError::PublishFailed(e.to_string()))?;
    let bytes = artifact
        .encode()
        .map_err(|e| RetrainError::PublishFailed(e.to_string()))?;
    let key = artifact_key(1);

    store
        .put(&key, &bytes)
        .await
        .map_err(|e| RetrainError::PublishFailed(format!("artifact write: {}", e)))?;
    store
        .put(latest_key, key.as_bytes())
        .await
        .map_err(|e| RetrainError::PublishFailed(format!("pointer write: {}", e)))?;

    info!(version = 1, samples = split.len(), "initial model published");
    Ok(1)
}
