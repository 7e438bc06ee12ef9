use kinvault_core::CoreError;
use kinvault_storage::StorageError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("core error: {0}")]
    Core(#[from] CoreError),

    #[error("invalid export options: {0}")]
    InvalidOptions(String),

    #[error("invalid archive: {}", .0.join("; "))]
    InvalidArchive(Vec<String>),

    #[error("snapshot read failed: {0}")]
    SnapshotRead(String),
}
