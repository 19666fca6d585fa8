//! Persistence contract for documents, plus an in-memory store.

use crate::document::Document;
use crate::engine::CrdtEngine;
use crate::error::{RepoError, RepoResult};
use docmesh_types::DocumentId;
use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard, PoisonError};
use tracing::debug;

/// Durable storage for documents.
pub trait StorageAdapter<E>: Send + Sync {
    /// Loads a document. Fails with [`RepoError::NotFound`] when the store
    /// has no data for it.
    fn load(&self, id: &DocumentId) -> RepoResult<Document<E>>;

    /// Persists a document: appends its incremental changes when data
    /// already exists, writes a full snapshot otherwise.
    fn save(&self, doc: &Document<E>) -> RepoResult<()>;

    /// Replaces any stored data with a full snapshot.
    fn compact(&self, doc: &Document<E>) -> RepoResult<()>;

    /// Lists every stored document.
    fn list(&self) -> RepoResult<Vec<DocumentId>>;
}

/// Keeps documents in a map of snapshot bytes followed by appended
/// increments.
#[derive(Debug, Default)]
pub struct MemoryStore {
    blobs: Mutex<HashMap<DocumentId, Vec<u8>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<DocumentId, Vec<u8>>> {
        self.blobs.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn contains(&self, id: &DocumentId) -> bool {
        self.lock().contains_key(id)
    }

    /// Size of the stored bytes for a document.
    pub fn stored_len(&self, id: &DocumentId) -> Option<usize> {
        self.lock().get(id).map(Vec::len)
    }
}

impl<E: CrdtEngine> StorageAdapter<E> for MemoryStore {
    fn load(&self, id: &DocumentId) -> RepoResult<Document<E>> {
        let blobs = self.lock();
        let data = blobs.get(id).ok_or(RepoError::NotFound(*id))?;
        Document::load(*id, data)
    }

    fn save(&self, doc: &Document<E>) -> RepoResult<()> {
        let mut blobs = self.lock();
        match blobs.get_mut(&doc.id()) {
            Some(data) => {
                let increment = doc.save_incremental();
                debug!(document = %doc.id(), bytes = increment.len(), "appending increment");
                data.extend_from_slice(&increment);
            }
            None => {
                blobs.insert(doc.id(), doc.save());
            }
        }
        Ok(())
    }

    fn compact(&self, doc: &Document<E>) -> RepoResult<()> {
        // snapshot under the lock so a concurrent append cannot land on
        // the blob being replaced
        let mut blobs = self.lock();
        let snapshot = doc.save();
        debug!(document = %doc.id(), bytes = snapshot.len(), "compacting");
        blobs.insert(doc.id(), snapshot);
        Ok(())
    }

    fn list(&self) -> RepoResult<Vec<DocumentId>> {
        let mut ids: Vec<_> = self.lock().keys().copied().collect();
        ids.sort();
        Ok(ids)
    }
}
