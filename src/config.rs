//! Configuration management for the serving process

use anyhow::{Context, Result};
use config::{Config, File};
use serde::Deserialize;
use std::path::Path;

use crate::artifact::LATEST_KEY;
use crate::models::pipeline::TrainingParams;

/// Main application configuration
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub store: StoreConfig,
    pub model: ModelConfig,
    pub training: TrainingConfig,
    pub logging: LoggingConfig,
}

/// HTTP listener configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 8080,
        }
    }
}

/// Object-store configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    /// Root directory for the filesystem store
    pub root_dir: String,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            root_dir: "data".to_string(),
        }
    }
}

/// Model serving configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ModelConfig {
    /// Store key of the "latest version" pointer
    pub latest_key: String,
    /// Probability above which a response counts as fraud for the
    /// rolling fraud-rate gauge
    pub decision_threshold: f64,
    /// Number of recent responses in the fraud-rate window
    pub fraud_window: usize,
    /// Bound on the initial artifact load; exceeding it is fatal
    pub startup_timeout_secs: u64,
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            latest_key: LATEST_KEY.to_string(),
            decision_threshold: 0.5,
            fraud_window: 100,
            startup_timeout_secs: 30,
        }
    }
}

/// Training hyperparameters used for initial fits and fine-tuning
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct TrainingConfig {
    pub seed: u64,
    pub learning_rate: f64,
    pub epochs: usize,
    pub fine_tune_epochs: usize,
    /// Fraction carved off as the held-out split
    pub holdout_ratio: f64,
}

impl Default for TrainingConfig {
    fn default() -> Self {
        let params = TrainingParams::default();
        Self {
            seed: params.seed,
            learning_rate: params.learning_rate,
            epochs: params.epochs,
            fine_tune_epochs: params.fine_tune_epochs,
            holdout_ratio: 0.2,
        }
    }
}

impl TrainingConfig {
    pub fn params(&self) -> TrainingParams {
        TrainingParams {
            learning_rate: self.learning_rate,
            epochs: self.epochs,
            fine_tune_epochs: self.fine_tune_epochs,
            seed: self.seed,
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}

impl AppConfig {
    /// Load configuration from file
    pub fn load() -> Result<Self> {
        Self::load_from_path("config/config.toml")
    }

    /// Load configuration from a specific path
    pub fn load_from_path<P: AsRef<Path>>(path: P) -> Result<Self> {
        let config = Config::builder()
            .add_source(File::from(path.as_ref()))
            .build()
            .context("Failed to build configuration")?;

        config
            .try_deserialize()
            .context("Failed to deserialize configuration")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_default_config() {
        let config = AppConfig::default();
        assert_eq!(config.server.port, 8080);
        assert_eq!(config.model.decision_threshold, 0.5);
        assert_eq!(config.model.latest_key, LATEST_KEY);
        assert_eq!(config.training.seed, 42);
        assert_eq!(config.training.holdout_ratio, 0.2);
    }

    #[test]
    fn test_load_from_path_with_overrides() {
        let mut file = tempfile::NamedTempFile::with_suffix(".toml").unwrap();
        writeln!(
            file,
            "[server]\nport = 9000\n\n[model]\ndecision_threshold = 0.61\n"
        )
        .unwrap();

        let config = AppConfig::load_from_path(file.path()).unwrap();
        assert_eq!(config.server.port, 9000);
        assert_eq!(config.model.decision_threshold, 0.61);
        // Unspecified sections keep their defaults
        assert_eq!(config.training.epochs, 200);
    }

    #[test]
    fn test_training_params_conversion() {
        let config = TrainingConfig::default();
        let params = config.params();
        assert_eq!(params, TrainingParams::default());
    }
}
