#![allow(dead_code)]

use docmesh_repo::mock::MockEngine;
use docmesh_repo::{MemoryStore, Repo};
use std::sync::Arc;

pub type MockRepo = Repo<MockEngine>;

/// A mock-engine repo backed by a memory store the caller can inspect.
pub fn repo_with_store() -> (Arc<MockRepo>, Arc<MemoryStore>) {
    let store = Arc::new(MemoryStore::new());
    let repo = Repo::<MockEngine>::new().with_store(store.clone());
    (Arc::new(repo), store)
}

/// Drives two documents to convergence by alternating generate/receive
/// until neither side has anything left to send.
pub fn converge<E: docmesh_repo::CrdtEngine>(
    a: &docmesh_repo::Document<E>,
    b: &docmesh_repo::Document<E>,
) -> usize {
    let mut state_a = a.new_sync_state();
    let mut state_b = b.new_sync_state();
    let mut rounds = 0;
    loop {
        let mut progressed = false;
        while let Some(msg) = a.generate_sync_message(&mut state_a) {
            b.receive_sync_message(&mut state_b, &msg).unwrap();
            progressed = true;
        }
        while let Some(msg) = b.generate_sync_message(&mut state_b) {
            a.receive_sync_message(&mut state_a, &msg).unwrap();
            progressed = true;
        }
        if !progressed {
            return rounds;
        }
        rounds += 1;
        assert!(rounds < 50, "sync did not settle");
    }
}
