//! Share policy enforcement at the handle.

mod common;

use common::{eventually, link, mock_handle, mock_handle_with_policy};
use docmesh_repo::DenyListPolicy;
use docmesh_sync::transport::mock::MemoryConn;
use docmesh_sync::{Conn, RepoMessage};
use docmesh_types::{DocumentId, RepoId};
use std::time::Duration;

const QUIET: Duration = Duration::from_millis(100);

#[tokio::test]
async fn denied_sync_sends_nothing() {
    let doc_id = DocumentId::new();
    let handle = mock_handle_with_policy(DenyListPolicy::new().block_document(doc_id));
    let doc = handle.repo().get_or_create_doc(doc_id);
    doc.set("secret", "x").unwrap();

    let remote = RepoId::new();
    let (conn, peer) = MemoryConn::pair();
    let _complete = handle.add_conn(remote, conn).await;

    handle.sync_document(remote, doc_id).await.unwrap();
    assert!(tokio::time::timeout(QUIET, peer.recv_message()).await.is_err());
}

#[tokio::test]
async fn blocked_peer_gets_nothing_from_sync_all() {
    let remote = RepoId::new();
    let handle = mock_handle_with_policy(DenyListPolicy::new().block_peer(remote));
    handle.repo().new_doc().set("k", 1i64).unwrap();
    handle.repo().new_doc().set("k", 2i64).unwrap();

    let (conn, peer) = MemoryConn::pair();
    let _complete = handle.add_conn(remote, conn).await;
    handle.sync_all(remote).await.unwrap();
    assert!(tokio::time::timeout(QUIET, peer.recv_message()).await.is_err());
}

#[tokio::test]
async fn hidden_document_is_not_announced_but_syncs_on_request() {
    let hidden = DocumentId::new();
    let a = mock_handle_with_policy(DenyListPolicy::new().hide_document(hidden));
    let b = mock_handle();
    let doc = a.repo().get_or_create_doc(hidden);
    doc.set("k", "v").unwrap();

    let _completes = link(&a, &b).await;
    a.sync_all(b.local_id()).await.unwrap();
    tokio::time::sleep(QUIET).await;
    assert!(b.repo().get_doc(&hidden).is_none());

    // an explicit sync is still allowed
    a.sync_document(b.local_id(), hidden).await.unwrap();
    eventually(|| b.repo().get_doc(&hidden).is_some_and(|d| d.get("k").is_some())).await;
}

#[tokio::test]
async fn inbound_sync_for_denied_document_is_dropped() {
    let doc_id = DocumentId::new();
    let a = mock_handle();
    let b = mock_handle_with_policy(DenyListPolicy::new().block_document(doc_id));
    let doc = a.repo().get_or_create_doc(doc_id);
    doc.set("k", "v").unwrap();

    let _completes = link(&a, &b).await;
    a.sync_document(b.local_id(), doc_id).await.unwrap();
    tokio::time::sleep(QUIET).await;
    assert!(b.repo().get_doc(&doc_id).is_none());
}

#[tokio::test]
async fn refused_request_does_not_materialize_document() {
    let handle = mock_handle_with_policy(DenyListPolicy::new().refuse_requests());
    let remote = RepoId::new();
    let (conn, peer) = MemoryConn::pair();
    let _complete = handle.add_conn(remote, conn).await;

    let unknown = DocumentId::new();
    let payload = serde_json::to_vec(&("k", docmesh_types::Value::Int(1))).unwrap();
    peer.send_message(RepoMessage::sync(remote, handle.local_id(), unknown, payload))
        .await
        .unwrap();

    tokio::time::sleep(QUIET).await;
    assert!(handle.repo().get_doc(&unknown).is_none());
    // no reply either
    assert!(tokio::time::timeout(QUIET, peer.recv_message()).await.is_err());
}

#[tokio::test]
async fn permitted_request_materializes_and_replies() {
    let handle = mock_handle();
    let remote = RepoId::new();
    let (conn, peer) = MemoryConn::pair();
    let _complete = handle.add_conn(remote, conn).await;

    // our local copy also has an entry the peer lacks, so we answer
    let unknown = DocumentId::new();
    let payload = serde_json::to_vec(&("k", docmesh_types::Value::Int(1))).unwrap();
    peer.send_message(RepoMessage::sync(remote, handle.local_id(), unknown, payload))
        .await
        .unwrap();

    eventually(|| handle.repo().get_doc(&unknown).is_some()).await;
    let doc = handle.repo().get_doc(&unknown).unwrap();
    assert_eq!(doc.get("k"), Some(docmesh_types::Value::Int(1)));

    doc.set("extra", true).unwrap();
    handle.sync_document(remote, unknown).await.unwrap();
    let reply = tokio::time::timeout(common::WAIT, peer.recv_message())
        .await
        .unwrap()
        .unwrap();
    assert!(reply.is_sync());
    assert_eq!(reply.document, unknown);
}
