use thiserror::Error;

pub mod fs;
pub mod memory;

pub use fs::FsStore;
pub use memory::MemoryStore;

/// Errors surfaced by an object store
#[derive(Debug, Error, Clone)]
pub enum StoreError {
    #[error("key not found: {0}")]
    NotFound(String),
    #[error("store unavailable: {0}")]
    Unavailable(String),
}

/// Key/value blob storage used for model artifacts and staged datasets.
///
/// `put` overwrites idempotently. No multi-key transactions are assumed
/// anywhere; publish safety comes from write ordering alone.
#[async_trait::async_trait]
pub trait ObjectStore: Send + Sync {
    async fn get(&self, key: &str) -> Result<Vec<u8>, StoreError>;
    async fn put(&self, key: &str, bytes: &[u8]) -> Result<(), StoreError>;
}
