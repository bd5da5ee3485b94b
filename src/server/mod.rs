pub mod gateway;
pub mod http;
pub mod loader;
pub mod metrics;
pub mod retrain;
