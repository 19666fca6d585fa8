//! The local collection of documents.

use crate::document::Document;
use crate::engine::{AutomergeEngine, CrdtEngine};
use crate::error::{RepoError, RepoResult};
use crate::handle::DocumentHandle;
use crate::policy::{PermissiveSharePolicy, SharePolicy};
use crate::storage::StorageAdapter;
use docmesh_types::{DocumentId, RepoId};
use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};
use tracing::{debug, info};

/// Number of local changes after which `save_doc` compacts instead of
/// appending.
pub const COMPACTION_THRESHOLD: usize = 10;

type DocMap<E> = HashMap<DocumentId, Arc<Document<E>>>;

/// A set of documents owned by one replica.
pub struct Repo<E = AutomergeEngine> {
    id: RepoId,
    docs: RwLock<DocMap<E>>,
    store: Option<Arc<dyn StorageAdapter<E>>>,
    share_policy: Arc<dyn SharePolicy>,
}

impl<E: CrdtEngine> Default for Repo<E> {
    fn default() -> Self {
        Self::new()
    }
}

impl<E: CrdtEngine> Repo<E> {
    /// Creates a repo with a fresh id, no store and a permissive policy.
    pub fn new() -> Self {
        Self::with_id(RepoId::new())
    }

    pub fn with_id(id: RepoId) -> Self {
        Self {
            id,
            docs: RwLock::new(HashMap::new()),
            store: None,
            share_policy: Arc::new(PermissiveSharePolicy),
        }
    }

    pub fn with_store(mut self, store: Arc<dyn StorageAdapter<E>>) -> Self {
        self.store = Some(store);
        self
    }

    pub fn with_share_policy(mut self, policy: impl SharePolicy + 'static) -> Self {
        self.share_policy = Arc::new(policy);
        self
    }

    pub fn id(&self) -> RepoId {
        self.id
    }

    pub fn share_policy(&self) -> &dyn SharePolicy {
        self.share_policy.as_ref()
    }

    pub fn has_store(&self) -> bool {
        self.store.is_some()
    }

    fn read_docs(&self) -> RwLockReadGuard<'_, DocMap<E>> {
        self.docs.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write_docs(&self) -> RwLockWriteGuard<'_, DocMap<E>> {
        self.docs.write().unwrap_or_else(PoisonError::into_inner)
    }

    fn store(&self) -> RepoResult<&Arc<dyn StorageAdapter<E>>> {
        self.store.as_ref().ok_or(RepoError::NoStore)
    }

    /// Creates and registers an empty document.
    pub fn new_doc(&self) -> Arc<Document<E>> {
        let doc = Arc::new(Document::new(DocumentId::new()));
        self.write_docs().insert(doc.id(), Arc::clone(&doc));
        debug!(document = %doc.id(), "created document");
        doc
    }

    pub fn get_doc(&self, id: &DocumentId) -> Option<Arc<Document<E>>> {
        self.read_docs().get(id).cloned()
    }

    /// Returns the document, creating an empty one under `id` if absent.
    pub fn get_or_create_doc(&self, id: DocumentId) -> Arc<Document<E>> {
        let mut docs = self.write_docs();
        Arc::clone(
            docs.entry(id)
                .or_insert_with(|| Arc::new(Document::new(id))),
        )
    }

    /// Ids of all documents held in memory, in a stable order.
    pub fn document_ids(&self) -> Vec<DocumentId> {
        let mut ids: Vec<_> = self.read_docs().keys().copied().collect();
        ids.sort();
        ids
    }

    /// Persists a document, compacting once enough changes accumulated.
    pub fn save_doc(&self, id: &DocumentId) -> RepoResult<()> {
        let store = self.store()?;
        let doc = self.get_doc(id).ok_or(RepoError::DocumentNotFound(*id))?;
        if doc.changes_since_compact() >= COMPACTION_THRESHOLD {
            return self.compact(store, &doc);
        }
        store.save(&doc)
    }

    /// Rewrites the stored document as a single snapshot.
    pub fn compact_doc(&self, id: &DocumentId) -> RepoResult<()> {
        let store = self.store()?;
        let doc = self.get_doc(id).ok_or(RepoError::DocumentNotFound(*id))?;
        self.compact(store, &doc)
    }

    fn compact(&self, store: &Arc<dyn StorageAdapter<E>>, doc: &Document<E>) -> RepoResult<()> {
        store.compact(doc)?;
        doc.reset_compaction_counter();
        info!(document = %doc.id(), "compacted document");
        Ok(())
    }

    /// Loads a document from the store and registers it, replacing any
    /// in-memory copy.
    pub fn load_doc(&self, id: &DocumentId) -> RepoResult<Arc<Document<E>>> {
        let doc = Arc::new(self.store()?.load(id)?);
        self.write_docs().insert(*id, Arc::clone(&doc));
        debug!(document = %id, "loaded document");
        Ok(doc)
    }

    /// Ids of every document in the store.
    pub fn stored_document_ids(&self) -> RepoResult<Vec<DocumentId>> {
        self.store()?.list()
    }

    /// Drops every in-memory document. Stored data is untouched.
    pub fn clear_docs(&self) {
        self.write_docs().clear();
    }

    /// Creates a new document and returns a handle to it.
    pub fn new_doc_handle(self: &Arc<Self>) -> DocumentHandle<E> {
        DocumentHandle::new(Arc::clone(self), self.new_doc())
    }

    /// Returns a handle to an existing document.
    pub fn doc_handle(self: &Arc<Self>, id: &DocumentId) -> Option<DocumentHandle<E>> {
        self.get_doc(id)
            .map(|doc| DocumentHandle::new(Arc::clone(self), doc))
    }
}

impl<E> std::fmt::Debug for Repo<E> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Repo")
            .field("id", &self.id)
            .field("has_store", &self.store.is_some())
            .finish_non_exhaustive()
    }
}
