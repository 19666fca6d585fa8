use docmesh_sync::{
    connect, handshake, read_frame, write_frame, Conn, ConnDirection, HandshakeMessage,
    RepoMessage, SyncError,
};
use docmesh_types::{DocumentId, RepoId};
use proptest::prelude::*;
use std::str::FromStr;
use std::time::Duration;

// ── Direction ─────────────────────────────────────────────────────

#[test]
fn direction_parse() {
    assert_eq!(ConnDirection::from_str("incoming").unwrap(), ConnDirection::Incoming);
    assert_eq!(ConnDirection::from_str("outgoing").unwrap(), ConnDirection::Outgoing);
    assert_eq!(ConnDirection::Outgoing.to_string(), "outgoing");
    assert!(matches!(ConnDirection::from_str("sideways"), Err(SyncError::Protocol(_))));
    assert!(ConnDirection::from_str("Incoming").is_err());
}

// ── Exchange ──────────────────────────────────────────────────────

#[tokio::test]
async fn both_sides_learn_each_other() {
    let (mut a, mut b) = tokio::io::duplex(1024);
    let (id_a, id_b) = (RepoId::new(), RepoId::new());

    let dialer = tokio::spawn(async move {
        handshake(&mut a, id_a, ConnDirection::Outgoing, None).await
    });
    let seen_by_b = handshake(&mut b, id_b, ConnDirection::Incoming, None).await.unwrap();
    let seen_by_a = dialer.await.unwrap().unwrap();

    assert_eq!(seen_by_b, id_a);
    assert_eq!(seen_by_a, id_b);
}

#[tokio::test]
async fn outgoing_sends_join_first() {
    let (mut a, mut b) = tokio::io::duplex(1024);
    let id_a = RepoId::new();
    let id_b = RepoId::new();

    let dialer = tokio::spawn(async move {
        handshake(&mut a, id_a, ConnDirection::Outgoing, None).await
    });

    let first = HandshakeMessage::decode(&read_frame(&mut b).await.unwrap()).unwrap();
    assert_eq!(first, HandshakeMessage::join(id_a));

    write_frame(&mut b, &HandshakeMessage::peer(id_b).encode().unwrap())
        .await
        .unwrap();
    assert_eq!(dialer.await.unwrap().unwrap(), id_b);
}

#[tokio::test]
async fn outgoing_rejects_non_peer_reply() {
    let (mut a, mut b) = tokio::io::duplex(1024);
    let dialer = tokio::spawn(async move {
        handshake(&mut a, RepoId::new(), ConnDirection::Outgoing, None).await
    });

    read_frame(&mut b).await.unwrap();
    write_frame(&mut b, &HandshakeMessage::join(RepoId::new()).encode().unwrap())
        .await
        .unwrap();
    assert!(matches!(dialer.await.unwrap(), Err(SyncError::Protocol(_))));
}

#[tokio::test]
async fn incoming_rejects_non_join() {
    let (mut a, mut b) = tokio::io::duplex(1024);
    let acceptor = tokio::spawn(async move {
        handshake(&mut b, RepoId::new(), ConnDirection::Incoming, None).await
    });

    let bogus = HandshakeMessage {
        kind: "hello".into(),
        sender_id: RepoId::new().to_string(),
    };
    write_frame(&mut a, &bogus.encode().unwrap()).await.unwrap();
    assert!(matches!(acceptor.await.unwrap(), Err(SyncError::Protocol(_))));
}

#[tokio::test]
async fn foreign_sender_id_is_mapped() {
    let (mut a, mut b) = tokio::io::duplex(1024);
    let acceptor = tokio::spawn(async move {
        handshake(&mut b, RepoId::new(), ConnDirection::Incoming, None).await
    });

    let join = HandshakeMessage {
        kind: "join".into(),
        sender_id: "browser-peer-42".into(),
    };
    write_frame(&mut a, &join.encode().unwrap()).await.unwrap();
    let remote = acceptor.await.unwrap().unwrap();
    assert_eq!(remote, RepoId::from_peer_string("browser-peer-42"));
}

#[tokio::test]
async fn closed_stream_fails() {
    let (a, mut b) = tokio::io::duplex(1024);
    drop(a);
    let result = handshake(&mut b, RepoId::new(), ConnDirection::Incoming, None).await;
    assert!(matches!(result, Err(SyncError::Io(_))));
}

#[tokio::test(start_paused = true)]
async fn silent_peer_times_out() {
    let (_a, mut b) = tokio::io::duplex(1024);
    let result = handshake(
        &mut b,
        RepoId::new(),
        ConnDirection::Incoming,
        Some(Duration::from_secs(5)),
    )
    .await;
    assert!(matches!(result, Err(SyncError::Timeout)));
}

// ── connect ───────────────────────────────────────────────────────

#[tokio::test]
async fn connect_yields_working_conns() {
    let (a, b) = tokio::io::duplex(4096);
    let (id_a, id_b) = (RepoId::new(), RepoId::new());
    let timeout = Some(Duration::from_secs(5));

    let dialer = tokio::spawn(async move { connect(a, id_a, ConnDirection::Outgoing, timeout).await });
    let (conn_b, remote_a) = connect(b, id_b, ConnDirection::Incoming, timeout).await.unwrap();
    let (conn_a, remote_b) = dialer.await.unwrap().unwrap();
    assert_eq!(remote_a, id_a);
    assert_eq!(remote_b, id_b);

    let msg = RepoMessage::ephemeral(id_a, id_b, DocumentId::new(), b"ping".to_vec());
    conn_a.send_message(msg.clone()).await.unwrap();
    assert_eq!(conn_b.recv_message().await.unwrap(), msg);

    conn_a.close().await.unwrap();
    assert!(conn_a.is_closed());
    assert!(matches!(conn_a.send_message(msg).await, Err(SyncError::ConnectionClosed)));
    // the remote sees end of stream
    assert!(conn_b.recv_message().await.is_err());
}

#[tokio::test]
async fn close_wakes_pending_receive() {
    let (a, _b) = tokio::io::duplex(1024);
    let conn = std::sync::Arc::new(docmesh_sync::FramedConn::new(a));
    let receiver = {
        let conn = conn.clone();
        tokio::spawn(async move { conn.recv_message().await })
    };
    tokio::task::yield_now().await;
    conn.close().await.unwrap();
    assert!(matches!(receiver.await.unwrap(), Err(SyncError::ConnectionClosed)));
}

// ── Properties ────────────────────────────────────────────────────

fn repo_id() -> impl Strategy<Value = RepoId> {
    any::<u128>().prop_map(|bits| RepoId::from_uuid(uuid::Uuid::from_u128(bits)))
}

fn runtime() -> tokio::runtime::Runtime {
    tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .unwrap()
}

/// Runs the incoming side against a raw `join` carrying `sender`.
async fn accept_foreign(sender: &str) -> RepoId {
    let (mut a, mut b) = tokio::io::duplex(1024);
    let acceptor = tokio::spawn(async move {
        handshake(&mut b, RepoId::new(), ConnDirection::Incoming, None).await
    });
    let join = HandshakeMessage {
        kind: "join".into(),
        sender_id: sender.to_string(),
    };
    write_frame(&mut a, &join.encode().unwrap()).await.unwrap();
    let remote = acceptor.await.unwrap().unwrap();
    // drain the reply so the acceptor's write never blocks
    let _ = read_frame(&mut a).await;
    remote
}

proptest! {
    #[test]
    fn handshake_is_symmetric(id_a in repo_id(), id_b in repo_id()) {
        let (seen_by_a, seen_by_b) = runtime().block_on(async move {
            let (mut a, mut b) = tokio::io::duplex(1024);
            let dialer = tokio::spawn(async move {
                handshake(&mut a, id_a, ConnDirection::Outgoing, None).await
            });
            let seen_by_b = handshake(&mut b, id_b, ConnDirection::Incoming, None).await.unwrap();
            (dialer.await.unwrap().unwrap(), seen_by_b)
        });
        prop_assert_eq!(seen_by_a, id_b);
        prop_assert_eq!(seen_by_b, id_a);
    }

    #[test]
    fn foreign_sender_maps_the_same_every_time(sender in "[a-zA-Z0-9:_-]{1,48}") {
        let rt = runtime();
        let first = rt.block_on(accept_foreign(&sender));
        let second = rt.block_on(accept_foreign(&sender));
        prop_assert_eq!(first, second);
        prop_assert_eq!(first, RepoId::from_peer_string(&sender));
    }
}
