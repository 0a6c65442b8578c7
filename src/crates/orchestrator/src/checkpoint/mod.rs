//! Checkpoint store: versioned artifact metadata and the branch tree.

pub mod branch;
pub mod store;

pub use branch::next_child_branch;
pub use store::{ArtifactContent, CheckpointStore, TreeNode};

use crate::storage::StorageError;
use thiserror::Error;

/// Errors raised by the checkpoint store.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Database error: {0}")]
    Db(#[from] sqlx::Error),

    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Conflict: {0}")]
    Conflict(String),
}

/// Result type for checkpoint store operations.
pub type Result<T> = std::result::Result<T, StoreError>;
