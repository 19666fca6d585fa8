//! Error types for the sync layer.

use docmesh_repo::RepoError;
use docmesh_types::{DocumentId, RepoId};
use std::sync::Arc;
use thiserror::Error;

/// Result type for sync operations.
pub type SyncResult<T> = Result<T, SyncError>;

/// Errors that can occur in sync operations.
///
/// Cloneable so the same failure can be returned to a caller, published as
/// an event and used as a connection's finish reason.
#[derive(Debug, Clone, Error)]
pub enum SyncError {
    /// IO error on the underlying stream.
    #[error("IO error: {0}")]
    Io(Arc<std::io::Error>),

    /// Protocol error (unexpected handshake, bad message kind, bad frame).
    #[error("protocol error: {0}")]
    Protocol(String),

    /// A message could not be encoded.
    #[error("encode error: {0}")]
    Encode(String),

    /// A message could not be decoded.
    #[error("decode error: {0}")]
    Decode(String),

    /// Frame exceeds the maximum size.
    #[error("frame too large: {0} bytes")]
    FrameTooLarge(usize),

    /// Peer not connected.
    #[error("peer not found: {0}")]
    PeerNotFound(RepoId),

    /// Document not held by the local repo.
    #[error("document not found: {0}")]
    DocumentNotFound(DocumentId),

    /// The connection was closed.
    #[error("connection closed")]
    ConnectionClosed,

    /// Timeout.
    #[error("operation timed out")]
    Timeout,

    /// The repo handle was closed.
    #[error("repo handle closed")]
    HandleClosed,

    /// Repo or storage error.
    #[error("repo error: {0}")]
    Repo(Arc<RepoError>),
}

impl From<std::io::Error> for SyncError {
    fn from(e: std::io::Error) -> Self {
        Self::Io(Arc::new(e))
    }
}

impl From<RepoError> for SyncError {
    fn from(e: RepoError) -> Self {
        Self::Repo(Arc::new(e))
    }
}
