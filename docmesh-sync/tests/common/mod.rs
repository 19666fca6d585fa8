#![allow(dead_code)]

use docmesh_repo::mock::MockEngine;
use docmesh_repo::{CrdtEngine, Repo, SharePolicy};
use docmesh_sync::transport::mock::MemoryConn;
use docmesh_sync::{ConnComplete, HandleEvent, HandleEventKind, RepoHandle};
use std::sync::Arc;
use std::time::Duration;

pub const WAIT: Duration = Duration::from_secs(5);

pub type MockHandle = RepoHandle<MockEngine>;

pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

pub fn mock_handle() -> MockHandle {
    RepoHandle::new(Arc::new(Repo::new()))
}

pub fn mock_handle_with_policy(policy: impl SharePolicy + 'static) -> MockHandle {
    RepoHandle::new(Arc::new(Repo::new().with_share_policy(policy)))
}

/// Connects two handles over an in-memory pair. Returns the completions of
/// `a`'s and `b`'s side.
pub async fn link<E: CrdtEngine>(
    a: &RepoHandle<E>,
    b: &RepoHandle<E>,
) -> (ConnComplete, ConnComplete) {
    let (conn_a, conn_b) = MemoryConn::pair();
    let complete_a = a.add_conn(b.local_id(), conn_a).await;
    let complete_b = b.add_conn(a.local_id(), conn_b).await;
    (complete_a, complete_b)
}

/// Waits for the next event, failing the test after [`WAIT`].
pub async fn next_event<E: CrdtEngine>(handle: &RepoHandle<E>) -> HandleEvent {
    tokio::time::timeout(WAIT, handle.next_event())
        .await
        .expect("timed out waiting for event")
        .expect("event channel closed")
}

pub async fn expect_event<E: CrdtEngine>(handle: &RepoHandle<E>, kind: HandleEventKind) -> HandleEvent {
    let event = next_event(handle).await;
    assert_eq!(event.kind, kind, "unexpected event {event:?}");
    event
}

/// Polls `check` until it holds, failing the test after [`WAIT`].
pub async fn eventually(mut check: impl FnMut() -> bool) {
    let deadline = tokio::time::Instant::now() + WAIT;
    while !check() {
        assert!(tokio::time::Instant::now() < deadline, "condition not reached");
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
}

/// A connection whose writes always fail while reads pass through.
pub struct BrokenPipe(pub MemoryConn);

#[async_trait::async_trait]
impl docmesh_sync::Conn for BrokenPipe {
    async fn send_message(&self, _: docmesh_sync::RepoMessage) -> docmesh_sync::SyncResult<()> {
        Err(std::io::Error::new(std::io::ErrorKind::BrokenPipe, "broken pipe").into())
    }

    async fn recv_message(&self) -> docmesh_sync::SyncResult<docmesh_sync::RepoMessage> {
        self.0.recv_message().await
    }

    async fn close(&self) -> docmesh_sync::SyncResult<()> {
        self.0.close().await
    }
}

/// A connection whose close takes a while, widening the teardown window.
pub struct SlowClose(pub MemoryConn, pub Duration);

#[async_trait::async_trait]
impl docmesh_sync::Conn for SlowClose {
    async fn send_message(&self, message: docmesh_sync::RepoMessage) -> docmesh_sync::SyncResult<()> {
        self.0.send_message(message).await
    }

    async fn recv_message(&self) -> docmesh_sync::SyncResult<docmesh_sync::RepoMessage> {
        self.0.recv_message().await
    }

    async fn close(&self) -> docmesh_sync::SyncResult<()> {
        tokio::time::sleep(self.1).await;
        self.0.close().await
    }
}

/// Drains every event already published.
pub fn drain_events<E: CrdtEngine>(handle: &RepoHandle<E>) -> Vec<HandleEventKind> {
    std::iter::from_fn(|| handle.try_next_event())
        .map(|event| event.kind)
        .collect()
}
