//! Document collection for docmesh.
//!
//! A [`Repo`] holds [`Document`]s, each driven by a [`CrdtEngine`]. The repo
//! decides nothing about the network: the sync layer asks its
//! [`SharePolicy`] what may be shared, and persistence goes through an
//! optional [`StorageAdapter`].

mod document;
mod engine;
mod error;
mod handle;
pub mod mock;
mod policy;
mod repo;
mod storage;

pub use document::Document;
pub use engine::{AutomergeEngine, CrdtEngine};
pub use error::{RepoError, RepoResult};
pub use handle::DocumentHandle;
pub use policy::{DenyListPolicy, PermissiveSharePolicy, ShareDecision, SharePolicy};
pub use repo::{Repo, COMPACTION_THRESHOLD};
pub use storage::{MemoryStore, StorageAdapter};
