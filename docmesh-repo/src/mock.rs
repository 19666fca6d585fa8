//! Deterministic in-memory engine for tests.
//!
//! The document is a flat map. Each sync message carries exactly one entry
//! the peer has not seen yet, so a document with several keys takes several
//! messages to transfer. Incoming entries overwrite local ones; there is no
//! conflict resolution.

use crate::engine::CrdtEngine;
use crate::error::{RepoError, RepoResult};
use docmesh_types::Value;
use std::collections::{BTreeMap, BTreeSet};

#[derive(Debug, Clone, Default)]
pub struct MockEngine {
    entries: BTreeMap<String, Value>,
    unsaved: BTreeSet<String>,
}

/// Entries known to be held by the peer.
#[derive(Debug, Clone, Default)]
pub struct MockSyncState {
    known: BTreeMap<String, Value>,
}

impl MockEngine {
    fn encode_entries<'a>(entries: impl Iterator<Item = (&'a String, &'a Value)>) -> Vec<u8> {
        let mut out = Vec::new();
        for entry in entries {
            // serde_json cannot fail on these types
            if let Ok(line) = serde_json::to_vec(&entry) {
                out.extend_from_slice(&line);
                out.push(b'\n');
            }
        }
        out
    }
}

impl CrdtEngine for MockEngine {
    type SyncState = MockSyncState;

    fn new() -> Self {
        Self::default()
    }

    fn load(data: &[u8]) -> RepoResult<Self> {
        let mut engine = Self::default();
        for line in data.split(|b| *b == b'\n').filter(|l| !l.is_empty()) {
            let (key, value): (String, Value) = serde_json::from_slice(line)
                .map_err(|e| RepoError::InvalidData(e.to_string()))?;
            engine.entries.insert(key, value);
        }
        Ok(engine)
    }

    fn save(&mut self) -> Vec<u8> {
        self.unsaved.clear();
        Self::encode_entries(self.entries.iter())
    }

    fn save_incremental(&mut self) -> Vec<u8> {
        let unsaved = std::mem::take(&mut self.unsaved);
        Self::encode_entries(self.entries.iter().filter(|(k, _)| unsaved.contains(*k)))
    }

    fn get(&self, key: &str) -> Option<Value> {
        self.entries.get(key).cloned()
    }

    fn set(&mut self, key: &str, value: Value) -> RepoResult<()> {
        self.entries.insert(key.to_string(), value);
        self.unsaved.insert(key.to_string());
        Ok(())
    }

    fn keys(&self) -> Vec<String> {
        self.entries.keys().cloned().collect()
    }

    fn new_sync_state(&self) -> Self::SyncState {
        MockSyncState::default()
    }

    fn generate_sync_message(&mut self, state: &mut Self::SyncState) -> Option<Vec<u8>> {
        let (key, value) = self
            .entries
            .iter()
            .find(|(k, v)| state.known.get(*k) != Some(*v))?;
        state.known.insert(key.clone(), value.clone());
        serde_json::to_vec(&(key, value)).ok()
    }

    fn receive_sync_message(
        &mut self,
        state: &mut Self::SyncState,
        message: &[u8],
    ) -> RepoResult<bool> {
        let (key, value): (String, Value) = serde_json::from_slice(message)
            .map_err(|e| RepoError::Engine(format!("bad mock sync message: {e}")))?;
        state.known.insert(key.clone(), value.clone());
        if self.entries.get(&key) == Some(&value) {
            return Ok(false);
        }
        self.unsaved.insert(key.clone());
        self.entries.insert(key, value);
        Ok(true)
    }
}
