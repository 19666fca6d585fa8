//! Connection abstraction.
//!
//! The repo handle only needs to send and receive [`RepoMessage`]s and to
//! close the link. [`FramedConn`] does this over any tokio byte stream;
//! [`mock::MemoryConn`] does it over in-process channels.

use crate::codec;
use crate::error::{SyncError, SyncResult};
use crate::protocol::RepoMessage;
use async_trait::async_trait;
use tokio::io::{AsyncRead, AsyncWrite, AsyncWriteExt, ReadHalf, WriteHalf};
use tokio::sync::{watch, Mutex};

/// A message-oriented link to one remote repo.
///
/// `recv_message` and `send_message` may run concurrently. `close` must
/// wake a pending `recv_message`, and every call after `close` fails with
/// [`SyncError::ConnectionClosed`].
#[async_trait]
pub trait Conn: Send + Sync {
    async fn send_message(&self, message: RepoMessage) -> SyncResult<()>;

    async fn recv_message(&self) -> SyncResult<RepoMessage>;

    async fn close(&self) -> SyncResult<()>;
}

/// A [`Conn`] over a byte stream using length-prefixed CBOR frames.
pub struct FramedConn<S> {
    reader: Mutex<ReadHalf<S>>,
    writer: Mutex<WriteHalf<S>>,
    closed: watch::Sender<bool>,
}

impl<S> FramedConn<S>
where
    S: AsyncRead + AsyncWrite + Send + 'static,
{
    /// Wraps a stream on which the handshake already happened.
    pub fn new(stream: S) -> Self {
        let (reader, writer) = tokio::io::split(stream);
        Self {
            reader: Mutex::new(reader),
            writer: Mutex::new(writer),
            closed: watch::channel(false).0,
        }
    }

    pub fn is_closed(&self) -> bool {
        *self.closed.borrow()
    }
}

#[async_trait]
impl<S> Conn for FramedConn<S>
where
    S: AsyncRead + AsyncWrite + Send + 'static,
{
    async fn send_message(&self, message: RepoMessage) -> SyncResult<()> {
        if self.is_closed() {
            return Err(SyncError::ConnectionClosed);
        }
        let mut writer = self.writer.lock().await;
        codec::write_message(&mut *writer, &message).await
    }

    async fn recv_message(&self) -> SyncResult<RepoMessage> {
        let mut closed = self.closed.subscribe();
        if *closed.borrow_and_update() {
            return Err(SyncError::ConnectionClosed);
        }
        let mut reader = self.reader.lock().await;
        tokio::select! {
            result = codec::read_message(&mut *reader) => result,
            _ = closed.wait_for(|closed| *closed) => Err(SyncError::ConnectionClosed),
        }
    }

    async fn close(&self) -> SyncResult<()> {
        if self.closed.send_replace(true) {
            return Ok(());
        }
        // a writer stuck on a slow peer keeps the lock; the stream is
        // released when the last reference drops
        if let Ok(mut writer) = self.writer.try_lock() {
            writer.shutdown().await?;
        }
        Ok(())
    }
}

/// In-memory connections for testing.
pub mod mock {
    use super::*;
    use tokio::sync::mpsc;

    /// One end of an in-memory connection pair.
    pub struct MemoryConn {
        outgoing: std::sync::Mutex<Option<mpsc::UnboundedSender<RepoMessage>>>,
        incoming: Mutex<mpsc::UnboundedReceiver<RepoMessage>>,
        closed: watch::Sender<bool>,
    }

    impl MemoryConn {
        /// Creates a pair of connected ends.
        pub fn pair() -> (Self, Self) {
            let (tx1, rx1) = mpsc::unbounded_channel();
            let (tx2, rx2) = mpsc::unbounded_channel();
            (Self::new(tx1, rx2), Self::new(tx2, rx1))
        }

        fn new(
            outgoing: mpsc::UnboundedSender<RepoMessage>,
            incoming: mpsc::UnboundedReceiver<RepoMessage>,
        ) -> Self {
            Self {
                outgoing: std::sync::Mutex::new(Some(outgoing)),
                incoming: Mutex::new(incoming),
                closed: watch::channel(false).0,
            }
        }

        pub fn is_closed(&self) -> bool {
            *self.closed.borrow()
        }

        /// Returns the next message if one is already queued.
        pub async fn try_recv_message(&self) -> Option<RepoMessage> {
            self.incoming.lock().await.try_recv().ok()
        }
    }

    #[async_trait]
    impl Conn for MemoryConn {
        async fn send_message(&self, message: RepoMessage) -> SyncResult<()> {
            let outgoing = self
                .outgoing
                .lock()
                .unwrap_or_else(std::sync::PoisonError::into_inner);
            match outgoing.as_ref() {
                Some(tx) => tx.send(message).map_err(|_| SyncError::ConnectionClosed),
                None => Err(SyncError::ConnectionClosed),
            }
        }

        async fn recv_message(&self) -> SyncResult<RepoMessage> {
            let mut closed = self.closed.subscribe();
            if *closed.borrow_and_update() {
                return Err(SyncError::ConnectionClosed);
            }
            let mut incoming = self.incoming.lock().await;
            tokio::select! {
                message = incoming.recv() => message.ok_or(SyncError::ConnectionClosed),
                _ = closed.wait_for(|closed| *closed) => Err(SyncError::ConnectionClosed),
            }
        }

        async fn close(&self) -> SyncResult<()> {
            if self.closed.send_replace(true) {
                return Ok(());
            }
            // dropping our sender ends the peer's receive side
            self.outgoing
                .lock()
                .unwrap_or_else(std::sync::PoisonError::into_inner)
                .take();
            // closing our receiver makes the peer's sends fail
            self.incoming.lock().await.close();
            Ok(())
        }
    }
}
