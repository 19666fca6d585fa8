//! Lifecycle notifications published by the repo handle.

use crate::error::SyncError;
use docmesh_types::RepoId;
use tokio::sync::oneshot;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HandleEventKind {
    PeerConnected,
    PeerDisconnected,
    ConnError,
}

/// A peer lifecycle event.
#[derive(Debug, Clone)]
pub struct HandleEvent {
    pub kind: HandleEventKind,
    pub peer: RepoId,
    /// Set for [`HandleEventKind::ConnError`].
    pub error: Option<SyncError>,
}

impl HandleEvent {
    pub(crate) fn connected(peer: RepoId) -> Self {
        Self {
            kind: HandleEventKind::PeerConnected,
            peer,
            error: None,
        }
    }

    pub(crate) fn disconnected(peer: RepoId) -> Self {
        Self {
            kind: HandleEventKind::PeerDisconnected,
            peer,
            error: None,
        }
    }

    pub(crate) fn conn_error(peer: RepoId, error: SyncError) -> Self {
        Self {
            kind: HandleEventKind::ConnError,
            peer,
            error: Some(error),
        }
    }
}

/// Why a connection ended.
#[derive(Debug, Clone)]
pub enum ConnFinished {
    /// Receiving from the peer failed.
    ReceiveError(SyncError),
    /// Sending to the peer failed.
    SendError(SyncError),
    /// The connection was removed or the handle closed.
    LocalClose,
    /// A retry supervisor was canceled.
    Canceled,
    /// A retry supervisor could not dial.
    DialFailed(SyncError),
}

impl ConnFinished {
    pub fn error(&self) -> Option<&SyncError> {
        match self {
            Self::ReceiveError(e) | Self::SendError(e) | Self::DialFailed(e) => Some(e),
            Self::LocalClose | Self::Canceled => None,
        }
    }
}

/// Resolves once when a connection (or retry supervisor) finishes.
#[derive(Debug)]
pub struct ConnComplete {
    rx: oneshot::Receiver<ConnFinished>,
}

impl ConnComplete {
    pub(crate) fn new(rx: oneshot::Receiver<ConnFinished>) -> Self {
        Self { rx }
    }

    pub(crate) fn finished(reason: ConnFinished) -> Self {
        let (tx, rx) = oneshot::channel();
        let _ = tx.send(reason);
        Self { rx }
    }

    /// Waits for the finish reason.
    pub async fn wait(self) -> ConnFinished {
        // the sender is only dropped unsent if its task was torn down
        self.rx.await.unwrap_or(ConnFinished::LocalClose)
    }
}
