//! Application-facing handle to one document.

use crate::document::Document;
use crate::engine::{AutomergeEngine, CrdtEngine};
use crate::error::RepoResult;
use crate::repo::Repo;
use docmesh_types::{DocumentId, Value};
use std::sync::Arc;
use tokio::sync::oneshot;

/// A document together with the repo that owns it.
///
/// Mutations through the handle are persisted when the repo has a store.
pub struct DocumentHandle<E = AutomergeEngine> {
    repo: Arc<Repo<E>>,
    doc: Arc<Document<E>>,
}

impl<E> Clone for DocumentHandle<E> {
    fn clone(&self) -> Self {
        Self {
            repo: Arc::clone(&self.repo),
            doc: Arc::clone(&self.doc),
        }
    }
}

impl<E: CrdtEngine> DocumentHandle<E> {
    pub(crate) fn new(repo: Arc<Repo<E>>, doc: Arc<Document<E>>) -> Self {
        Self { repo, doc }
    }

    pub fn id(&self) -> DocumentId {
        self.doc.id()
    }

    pub fn document(&self) -> &Arc<Document<E>> {
        &self.doc
    }

    pub fn get(&self, key: &str) -> Option<Value> {
        self.doc.get(key)
    }

    /// Resolves on the next change to the document.
    pub fn changed(&self) -> oneshot::Receiver<()> {
        self.doc.changed()
    }

    pub fn with_doc<R>(&self, f: impl FnOnce(&E) -> R) -> R {
        self.doc.with_engine(f)
    }

    /// Mutates the document and persists it if the repo has a store.
    pub fn with_doc_mut<R>(&self, f: impl FnOnce(&mut E) -> RepoResult<R>) -> RepoResult<R> {
        let out = self.doc.with_engine_mut(f)?;
        self.save()?;
        Ok(out)
    }

    /// Sets a single key and persists.
    pub fn set(&self, key: &str, value: impl Into<Value>) -> RepoResult<()> {
        let value = value.into();
        self.with_doc_mut(|engine| engine.set(key, value))
    }

    /// Persists the document. Does nothing without a store.
    pub fn save(&self) -> RepoResult<()> {
        if !self.repo.has_store() {
            return Ok(());
        }
        self.repo.save_doc(&self.doc.id())
    }
}
