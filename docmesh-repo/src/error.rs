//! Error types for the repo layer.

use docmesh_types::DocumentId;
use thiserror::Error;

/// Result type for repo and storage operations.
pub type RepoResult<T> = Result<T, RepoError>;

/// Errors that can occur in repo and storage operations.
#[derive(Debug, Error)]
pub enum RepoError {
    /// Persistence was requested but the repo has no store.
    #[error("no store configured")]
    NoStore,

    /// The document is not held by this repo.
    #[error("document {0} not found")]
    DocumentNotFound(DocumentId),

    /// The store has no data for the document.
    #[error("document {0} not found in storage")]
    NotFound(DocumentId),

    /// IO error (file system).
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// The CRDT engine rejected an operation or its input.
    #[error("engine error: {0}")]
    Engine(String),

    /// Invalid data.
    #[error("invalid data: {0}")]
    InvalidData(String),
}
