//! Loads model artifacts from the object store and owns the atomically
//! swappable active-model reference.

use std::sync::Arc;

use parking_lot::RwLock;
use tracing::{info, warn};

use crate::artifact::{LoadError, ModelArtifact};
use crate::models::pipeline::FraudPipeline;
use crate::server::metrics::MetricsRegistry;
use crate::store::ObjectStore;

/// A fully initialized model plus its artifact version. Immutable; shared by
/// reference with every in-flight request.
#[derive(Debug)]
pub struct ActiveModel {
    pub pipeline: FraudPipeline,
    pub version: u64,
}

/// Owns the currently active model and performs atomic hot-swap.
///
/// The active slot is the only state shared between the serving path and the
/// loader: it is written exactly at swap points and read-only everywhere
/// else. Readers take the lock just long enough to clone the Arc, so a swap
/// never waits on a request and a request never observes a partially loaded
/// model. The old model is dropped when the last request holding it finishes.
pub struct ModelLoader {
    store: Arc<dyn ObjectStore>,
    latest_key: String,
    active: RwLock<Arc<ActiveModel>>,
    // At most one refresh resolves and loads at a time
    refresh_gate: tokio::sync::Mutex<()>,
    metrics: Arc<MetricsRegistry>,
}

impl ModelLoader {
    /// Load the model the latest pointer resolves to and begin ownership.
    /// Failure here means there is no model to serve; callers treat it as
    /// fatal at startup.
    pub async fn init(
        store: Arc<dyn ObjectStore>,
        latest_key: String,
        metrics: Arc<MetricsRegistry>,
    ) -> Result<Self, LoadError> {
        let active = Self::load_latest(store.as_ref(), &latest_key).await?;
        info!(version = active.version, "initial model loaded");
        metrics.model_version.set(active.version as f64);

        Ok(Self {
            store,
            latest_key,
            active: RwLock::new(Arc::new(active)),
            refresh_gate: tokio::sync::Mutex::new(()),
            metrics,
        })
    }

    async fn load_latest(store: &dyn ObjectStore, latest_key: &str) -> Result<ActiveModel, LoadError> {
        let pointer = store.get(latest_key).await?;
        let artifact_key = String::from_utf8(pointer)
            .map_err(|e| LoadError::Corrupt(format!("latest pointer: {}", e)))?;

        let bytes = store.get(artifact_key.trim()).await?;
        let artifact = ModelArtifact::decode(&bytes)?;
        let pipeline = artifact.to_pipeline()?;

        Ok(ActiveModel {
            pipeline,
            version: artifact.version,
        })
    }

    /// Snapshot of the active model. Callers score against this snapshot;
    /// a concurrent refresh affects only later calls.
    pub fn active(&self) -> Arc<ActiveModel> {
        Arc::clone(&self.active.read())
    }

    pub fn version(&self) -> u64 {
        self.active.read().version
    }

    /// Re-resolve the latest pointer and swap the new model in. Refreshes are
    /// serialized with each other but never block concurrent reads: the new
    /// model is fully loaded and validated before the pointer-style swap.
    pub async fn refresh(&self) -> Result<u64, LoadError> {
        let _gate = self.refresh_gate.lock().await;

        let current = self.version();
        let fresh = Self::load_latest(self.store.as_ref(), &self.latest_key).await?;

        if fresh.version < current {
            warn!(
                current = current,
                resolved = fresh.version,
                "latest pointer resolves to an older version; keeping current model"
            );
            return Ok(current);
        }
        if fresh.version == current {
            return Ok(current);
        }

        let version = fresh.version;
        *self.active.write() = Arc::new(fresh);
        self.metrics.model_version.set(version as f64);
        info!(from = current, to = version, "active model swapped");
        Ok(version)
    }
}
