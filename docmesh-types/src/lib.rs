//! Core type definitions for docmesh.
//!
//! This crate defines the fundamental types shared by every other crate in
//! the workspace:
//! - Repository and document identifiers (UUID)
//! - Scalar values stored in a document's root map
//!
//! Everything that touches the network, storage or the CRDT engine lives
//! elsewhere.

mod ids;
mod value;

pub use ids::{DocumentId, RepoId};
pub use value::Value;

/// Result type alias using the crate's error type.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in type operations.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("invalid UUID: {0}")]
    InvalidUuid(#[from] uuid::Error),
}
