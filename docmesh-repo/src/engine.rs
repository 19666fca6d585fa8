//! The CRDT engine capability and its automerge implementation.
//!
//! The repo layer never merges anything itself. It drives an engine through
//! a narrow interface: load/save, get/set on the root map, and the two
//! halves of the sync protocol. Everything about change hashes, conflict
//! resolution and message contents stays inside the engine.

use crate::error::{RepoError, RepoResult};
use automerge::sync::{self, SyncDoc};
use automerge::transaction::Transactable;
use automerge::{AutoCommit, ReadDoc, ScalarValue, ROOT};
use docmesh_types::Value;

/// A CRDT document engine.
pub trait CrdtEngine: Send + Sized + 'static {
    /// Per-peer protocol state tracking what has been exchanged.
    type SyncState: Send + 'static;

    /// Creates an empty document.
    fn new() -> Self;

    /// Loads a document from bytes produced by `save`, optionally followed
    /// by any number of `save_incremental` chunks.
    fn load(data: &[u8]) -> RepoResult<Self>;

    /// Serializes the full document.
    fn save(&mut self) -> Vec<u8>;

    /// Serializes the changes made since the last `save` or
    /// `save_incremental`.
    fn save_incremental(&mut self) -> Vec<u8>;

    /// Reads a scalar from the root map.
    fn get(&self, key: &str) -> Option<Value>;

    /// Writes a scalar into the root map and commits it.
    fn set(&mut self, key: &str, value: Value) -> RepoResult<()>;

    /// Keys present in the root map.
    fn keys(&self) -> Vec<String>;

    /// Creates fresh sync state for a new peer.
    fn new_sync_state(&self) -> Self::SyncState;

    /// Produces the next message for the peer, or `None` when the peer
    /// needs nothing more until it answers.
    fn generate_sync_message(&mut self, state: &mut Self::SyncState) -> Option<Vec<u8>>;

    /// Applies a message from the peer. Returns whether the document changed.
    fn receive_sync_message(
        &mut self,
        state: &mut Self::SyncState,
        message: &[u8],
    ) -> RepoResult<bool>;
}

/// Engine backed by an automerge `AutoCommit` document.
#[derive(Debug, Default)]
pub struct AutomergeEngine {
    doc: AutoCommit,
}

impl AutomergeEngine {
    /// Returns the underlying automerge document.
    pub fn doc(&self) -> &AutoCommit {
        &self.doc
    }

    /// Returns the underlying automerge document mutably.
    pub fn doc_mut(&mut self) -> &mut AutoCommit {
        &mut self.doc
    }
}

impl CrdtEngine for AutomergeEngine {
    type SyncState = sync::State;

    fn new() -> Self {
        Self {
            doc: AutoCommit::new(),
        }
    }

    fn load(data: &[u8]) -> RepoResult<Self> {
        let doc = AutoCommit::load(data).map_err(|e| RepoError::Engine(e.to_string()))?;
        Ok(Self { doc })
    }

    fn save(&mut self) -> Vec<u8> {
        self.doc.save()
    }

    fn save_incremental(&mut self) -> Vec<u8> {
        self.doc.save_incremental()
    }

    fn get(&self, key: &str) -> Option<Value> {
        match self.doc.get(ROOT, key) {
            Ok(Some((automerge::Value::Scalar(scalar), _))) => Some(from_scalar(&scalar)),
            _ => None,
        }
    }

    fn set(&mut self, key: &str, value: Value) -> RepoResult<()> {
        self.doc
            .put(ROOT, key, to_scalar(value))
            .map_err(|e| RepoError::Engine(e.to_string()))?;
        let _ = self.doc.commit();
        Ok(())
    }

    fn keys(&self) -> Vec<String> {
        self.doc.keys(ROOT).collect()
    }

    fn new_sync_state(&self) -> Self::SyncState {
        sync::State::new()
    }

    fn generate_sync_message(&mut self, state: &mut Self::SyncState) -> Option<Vec<u8>> {
        self.doc
            .sync()
            .generate_sync_message(state)
            .map(|message| message.encode())
    }

    fn receive_sync_message(
        &mut self,
        state: &mut Self::SyncState,
        message: &[u8],
    ) -> RepoResult<bool> {
        let message =
            sync::Message::decode(message).map_err(|e| RepoError::Engine(e.to_string()))?;
        let heads_before = self.doc.get_heads();
        self.doc
            .sync()
            .receive_sync_message(state, message)
            .map_err(|e| RepoError::Engine(e.to_string()))?;
        Ok(self.doc.get_heads() != heads_before)
    }
}

fn to_scalar(value: Value) -> ScalarValue {
    match value {
        Value::Null => ScalarValue::Null,
        Value::Bool(b) => ScalarValue::Boolean(b),
        Value::Int(i) => ScalarValue::Int(i),
        Value::Uint(u) => ScalarValue::Uint(u),
        Value::F64(f) => ScalarValue::F64(f),
        Value::Str(s) => ScalarValue::Str(s.into()),
        Value::Bytes(b) => ScalarValue::Bytes(b),
    }
}

fn from_scalar(scalar: &ScalarValue) -> Value {
    match scalar {
        ScalarValue::Null => Value::Null,
        ScalarValue::Boolean(b) => Value::Bool(*b),
        ScalarValue::Int(i) => Value::Int(*i),
        ScalarValue::Uint(u) => Value::Uint(*u),
        ScalarValue::F64(f) => Value::F64(*f),
        ScalarValue::Str(s) => Value::Str(s.to_string()),
        ScalarValue::Bytes(b) => Value::Bytes(b.clone()),
        ScalarValue::Timestamp(t) => Value::Int(*t),
        // counters and unknown types surface in their display form
        other => Value::Str(other.to_string()),
    }
}
