//! Tests for framing: size limits and truncated input.

use docmesh_sync::{
    read_frame, read_message, write_frame, write_message, RepoMessage, SyncError, MAX_FRAME_SIZE,
};
use docmesh_types::{DocumentId, RepoId};
use proptest::prelude::*;

/// Helper: write a raw length-prefixed payload into a buffer.
fn make_length_prefixed(payload: &[u8]) -> Vec<u8> {
    let len = payload.len() as u32;
    let mut buf = Vec::with_capacity(4 + payload.len());
    buf.extend_from_slice(&len.to_be_bytes());
    buf.extend_from_slice(payload);
    buf
}

fn sample_message() -> RepoMessage {
    RepoMessage::sync(RepoId::new(), RepoId::new(), DocumentId::new(), vec![1, 2, 3])
}

#[tokio::test]
async fn test_frame_layout_is_big_endian_length() {
    let mut buf = Vec::new();
    write_frame(&mut buf, b"abc").await.unwrap();
    assert_eq!(buf, vec![0, 0, 0, 3, b'a', b'b', b'c']);
}

#[tokio::test]
async fn test_read_frame_roundtrip() {
    let data = make_length_prefixed(b"hello");
    let mut reader = &data[..];
    assert_eq!(read_frame(&mut reader).await.unwrap(), b"hello");
}

#[tokio::test]
async fn test_empty_frame() {
    let mut buf = Vec::new();
    write_frame(&mut buf, &[]).await.unwrap();
    let mut reader = &buf[..];
    assert!(read_frame(&mut reader).await.unwrap().is_empty());
}

#[tokio::test]
async fn test_consecutive_frames() {
    let mut buf = Vec::new();
    write_frame(&mut buf, b"one").await.unwrap();
    write_frame(&mut buf, b"two").await.unwrap();
    let mut reader = &buf[..];
    assert_eq!(read_frame(&mut reader).await.unwrap(), b"one");
    assert_eq!(read_frame(&mut reader).await.unwrap(), b"two");
}

#[tokio::test]
async fn test_read_frame_too_large() {
    // Craft a length prefix that exceeds 16 MB
    let huge_len: u32 = MAX_FRAME_SIZE as u32 + 1;
    let data = huge_len.to_be_bytes().to_vec();

    let mut reader = &data[..];
    let err = read_frame(&mut reader).await.unwrap_err();
    assert!(matches!(err, SyncError::FrameTooLarge(n) if n == MAX_FRAME_SIZE + 1));
}

#[tokio::test]
async fn test_write_frame_too_large() {
    let data = vec![0u8; MAX_FRAME_SIZE + 1];
    let mut buf = Vec::new();
    let err = write_frame(&mut buf, &data).await.unwrap_err();
    assert!(matches!(err, SyncError::FrameTooLarge(_)));
    assert!(buf.is_empty());
}

#[tokio::test]
async fn test_truncated_length_prefix() {
    let data = [0u8, 0];
    let mut reader = &data[..];
    let err = read_frame(&mut reader).await.unwrap_err();
    match err {
        SyncError::Io(e) => assert_eq!(e.kind(), std::io::ErrorKind::UnexpectedEof),
        other => panic!("expected Io, got {other:?}"),
    }
}

#[tokio::test]
async fn test_truncated_body() {
    let mut data = make_length_prefixed(b"hello");
    data.truncate(6);
    let mut reader = &data[..];
    assert!(matches!(read_frame(&mut reader).await, Err(SyncError::Io(_))));
}

#[tokio::test]
async fn test_message_roundtrip() {
    let msg = sample_message();
    let mut buf = Vec::new();
    write_message(&mut buf, &msg).await.unwrap();

    let mut reader = &buf[..];
    assert_eq!(read_message(&mut reader).await.unwrap(), msg);
}

#[tokio::test]
async fn test_read_message_garbage_body() {
    let data = make_length_prefixed(b"\xff\xff not cbor");
    let mut reader = &data[..];
    assert!(matches!(read_message(&mut reader).await, Err(SyncError::Decode(_))));
}

#[tokio::test]
async fn test_message_over_duplex_stream() {
    let (mut a, mut b) = tokio::io::duplex(64);
    let msg = RepoMessage::ephemeral(RepoId::new(), RepoId::new(), DocumentId::new(), vec![7; 1000]);
    let expected = msg.clone();

    let writer = tokio::spawn(async move { write_message(&mut a, &msg).await });
    let received = read_message(&mut b).await.unwrap();
    writer.await.unwrap().unwrap();
    assert_eq!(received, expected);
}

proptest! {
    #[test]
    fn frames_preserve_payload(payload in proptest::collection::vec(any::<u8>(), 0..4096)) {
        let rt = tokio::runtime::Builder::new_current_thread().build().unwrap();
        rt.block_on(async {
            let mut buf = Vec::new();
            write_frame(&mut buf, &payload).await.unwrap();
            prop_assert_eq!(buf.len(), payload.len() + 4);
            let mut reader = &buf[..];
            let read = read_frame(&mut reader).await.unwrap();
            prop_assert_eq!(read, payload.clone());
            Ok(())
        })?;
    }
}
