//! Length-prefixed framing over tokio byte streams.
//!
//! A frame is a 4-byte big-endian length followed by that many bytes.

use crate::error::{SyncError, SyncResult};
use crate::protocol::{HandshakeMessage, RepoMessage};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

/// Maximum frame size (16 MB).
pub const MAX_FRAME_SIZE: usize = 16 * 1024 * 1024;

/// Reads one frame. A stream that ends mid-frame is an error.
pub async fn read_frame<R: AsyncRead + Unpin>(io: &mut R) -> SyncResult<Vec<u8>> {
    // Read 4-byte length prefix
    let mut len_bytes = [0u8; 4];
    io.read_exact(&mut len_bytes).await?;
    let len = u32::from_be_bytes(len_bytes) as usize;

    if len > MAX_FRAME_SIZE {
        return Err(SyncError::FrameTooLarge(len));
    }

    let mut buf = vec![0u8; len];
    io.read_exact(&mut buf).await?;
    Ok(buf)
}

/// Writes one frame and flushes.
pub async fn write_frame<W: AsyncWrite + Unpin>(io: &mut W, data: &[u8]) -> SyncResult<()> {
    if data.len() > MAX_FRAME_SIZE {
        return Err(SyncError::FrameTooLarge(data.len()));
    }

    let len_bytes = (data.len() as u32).to_be_bytes();
    io.write_all(&len_bytes).await?;
    io.write_all(data).await?;
    io.flush().await?;
    Ok(())
}

/// Reads a framed [`RepoMessage`].
pub async fn read_message<R: AsyncRead + Unpin>(io: &mut R) -> SyncResult<RepoMessage> {
    let frame = read_frame(io).await?;
    RepoMessage::decode(&frame)
}

/// Writes a framed [`RepoMessage`].
pub async fn write_message<W: AsyncWrite + Unpin>(io: &mut W, message: &RepoMessage) -> SyncResult<()> {
    write_frame(io, &message.encode()?).await
}

pub(crate) async fn read_handshake<R: AsyncRead + Unpin>(io: &mut R) -> SyncResult<HandshakeMessage> {
    let frame = read_frame(io).await?;
    HandshakeMessage::decode(&frame)
}

pub(crate) async fn write_handshake<W: AsyncWrite + Unpin>(
    io: &mut W,
    message: &HandshakeMessage,
) -> SyncResult<()> {
    write_frame(io, &message.encode()?).await
}
