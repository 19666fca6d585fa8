//! Filesystem storage for docmesh documents.
//!
//! Each document lives in one file, `<dir>/<document-id>.<ext>`. The file
//! starts with a full snapshot and grows by appended incremental chunks
//! until the document is compacted back into a single snapshot.

mod config;
mod fs_store;

pub use config::StorageConfig;
pub use fs_store::FsStore;
