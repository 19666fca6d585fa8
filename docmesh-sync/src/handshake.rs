//! The join/peer handshake that opens every connection.

use crate::codec::{read_handshake, write_handshake};
use crate::error::{SyncError, SyncResult};
use crate::protocol::{HandshakeMessage, JOIN, PEER};
use crate::transport::FramedConn;
use docmesh_types::RepoId;
use std::fmt;
use std::str::FromStr;
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncWrite};
use tracing::debug;

/// Which side of the connection we are.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnDirection {
    /// We accepted the connection and wait for `join`.
    Incoming,
    /// We dialed and send `join` first.
    Outgoing,
}

impl fmt::Display for ConnDirection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Incoming => f.write_str("incoming"),
            Self::Outgoing => f.write_str("outgoing"),
        }
    }
}

impl FromStr for ConnDirection {
    type Err = SyncError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "incoming" => Ok(Self::Incoming),
            "outgoing" => Ok(Self::Outgoing),
            other => Err(SyncError::Protocol(format!("invalid direction {other:?}"))),
        }
    }
}

/// Runs the handshake and returns the remote repo id.
///
/// With a timeout, the whole exchange must finish within it.
pub async fn handshake<S>(
    stream: &mut S,
    local: RepoId,
    direction: ConnDirection,
    timeout: Option<Duration>,
) -> SyncResult<RepoId>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    match timeout {
        Some(limit) => tokio::time::timeout(limit, exchange(stream, local, direction))
            .await
            .map_err(|_| SyncError::Timeout)?,
        None => exchange(stream, local, direction).await,
    }
}

async fn exchange<S>(stream: &mut S, local: RepoId, direction: ConnDirection) -> SyncResult<RepoId>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let remote = match direction {
        ConnDirection::Outgoing => {
            write_handshake(stream, &HandshakeMessage::join(local)).await?;
            let reply = read_handshake(stream).await?;
            expect_kind(&reply, PEER)?;
            reply.sender_id
        }
        ConnDirection::Incoming => {
            let request = read_handshake(stream).await?;
            expect_kind(&request, JOIN)?;
            write_handshake(stream, &HandshakeMessage::peer(local)).await?;
            request.sender_id
        }
    };
    let remote = RepoId::from_peer_string(&remote);
    debug!(%remote, %direction, "handshake complete");
    Ok(remote)
}

fn expect_kind(message: &HandshakeMessage, expected: &str) -> SyncResult<()> {
    if message.kind != expected {
        return Err(SyncError::Protocol(format!(
            "unexpected message {:?}, expected {expected:?}",
            message.kind
        )));
    }
    Ok(())
}

/// Runs the handshake and wraps the stream as a connection.
pub async fn connect<S>(
    mut stream: S,
    local: RepoId,
    direction: ConnDirection,
    timeout: Option<Duration>,
) -> SyncResult<(FramedConn<S>, RepoId)>
where
    S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
{
    let remote = handshake(&mut stream, local, direction, timeout).await?;
    Ok((FramedConn::new(stream), remote))
}
