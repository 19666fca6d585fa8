//! A single replicated document.
//!
//! A `Document` owns its engine behind a mutex so that the sync layer, the
//! repo and application handles can all share it through an `Arc`.

use crate::engine::{AutomergeEngine, CrdtEngine};
use crate::error::RepoResult;
use docmesh_types::{DocumentId, Value};
use std::collections::BTreeMap;
use std::sync::{Mutex, MutexGuard, PoisonError};
use tokio::sync::oneshot;

/// A replicated document and its local bookkeeping.
pub struct Document<E = AutomergeEngine> {
    id: DocumentId,
    inner: Mutex<DocumentInner<E>>,
}

struct DocumentInner<E> {
    engine: E,
    changes_since_compact: usize,
    watchers: Vec<oneshot::Sender<()>>,
}

impl<E> DocumentInner<E> {
    fn notify(&mut self) {
        for watcher in self.watchers.drain(..) {
            let _ = watcher.send(());
        }
    }
}

impl<E: CrdtEngine> Document<E> {
    /// Creates an empty document.
    pub fn new(id: DocumentId) -> Self {
        Self::from_engine(id, E::new())
    }

    /// Wraps an existing engine instance.
    pub fn from_engine(id: DocumentId, engine: E) -> Self {
        Self {
            id,
            inner: Mutex::new(DocumentInner {
                engine,
                changes_since_compact: 0,
                watchers: Vec::new(),
            }),
        }
    }

    /// Loads a document from saved bytes.
    pub fn load(id: DocumentId, data: &[u8]) -> RepoResult<Self> {
        Ok(Self::from_engine(id, E::load(data)?))
    }

    pub fn id(&self) -> DocumentId {
        self.id
    }

    fn lock(&self) -> MutexGuard<'_, DocumentInner<E>> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Reads a value from the root map.
    pub fn get(&self, key: &str) -> Option<Value> {
        self.lock().engine.get(key)
    }

    /// Writes a value into the root map.
    ///
    /// Counts as one change towards compaction and fires change watchers.
    pub fn set(&self, key: &str, value: impl Into<Value>) -> RepoResult<()> {
        let mut inner = self.lock();
        inner.engine.set(key, value.into())?;
        inner.changes_since_compact += 1;
        inner.notify();
        Ok(())
    }

    pub fn keys(&self) -> Vec<String> {
        self.lock().engine.keys()
    }

    /// Snapshot of the whole root map.
    pub fn to_map(&self) -> BTreeMap<String, Value> {
        let inner = self.lock();
        inner
            .engine
            .keys()
            .into_iter()
            .filter_map(|key| inner.engine.get(&key).map(|value| (key, value)))
            .collect()
    }

    /// Returns a receiver that resolves on the next change to this
    /// document. Each receiver fires at most once.
    pub fn changed(&self) -> oneshot::Receiver<()> {
        let (tx, rx) = oneshot::channel();
        self.lock().watchers.push(tx);
        rx
    }

    /// Number of local changes since the last compaction.
    pub fn changes_since_compact(&self) -> usize {
        self.lock().changes_since_compact
    }

    pub(crate) fn reset_compaction_counter(&self) {
        self.lock().changes_since_compact = 0;
    }

    /// Serializes the full document.
    pub fn save(&self) -> Vec<u8> {
        self.lock().engine.save()
    }

    /// Serializes changes since the last save.
    pub fn save_incremental(&self) -> Vec<u8> {
        self.lock().engine.save_incremental()
    }

    /// Read access to the engine.
    pub fn with_engine<R>(&self, f: impl FnOnce(&E) -> R) -> R {
        f(&self.lock().engine)
    }

    /// Mutable access to the engine. A successful call counts as one change
    /// and fires change watchers.
    pub fn with_engine_mut<R>(&self, f: impl FnOnce(&mut E) -> RepoResult<R>) -> RepoResult<R> {
        let mut inner = self.lock();
        let out = f(&mut inner.engine)?;
        inner.changes_since_compact += 1;
        inner.notify();
        Ok(out)
    }

    /// Creates sync state for a new peer.
    pub fn new_sync_state(&self) -> E::SyncState {
        self.lock().engine.new_sync_state()
    }

    /// Produces the next sync message for a peer.
    pub fn generate_sync_message(&self, state: &mut E::SyncState) -> Option<Vec<u8>> {
        self.lock().engine.generate_sync_message(state)
    }

    /// Applies a sync message from a peer and returns whether the document
    /// changed. Watchers fire only on change.
    pub fn receive_sync_message(&self, state: &mut E::SyncState, message: &[u8]) -> RepoResult<bool> {
        let mut inner = self.lock();
        let changed = inner.engine.receive_sync_message(state, message)?;
        if changed {
            inner.notify();
        }
        Ok(changed)
    }
}

impl<E> std::fmt::Debug for Document<E> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Document").field("id", &self.id).finish_non_exhaustive()
    }
}
