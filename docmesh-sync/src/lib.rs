//! Peer-to-peer document replication for docmesh.
//!
//! # Architecture
//!
//! - **Protocol**: `RepoMessage` and the handshake message, CBOR encoded
//! - **Codec**: 4-byte big-endian length-prefixed frames
//! - **Handshake**: `join`/`peer` exchange that identifies the remote repo
//! - **Transport**: the `Conn` capability over byte streams or channels
//! - **Handle**: `RepoHandle`, which owns peer connections and drives sync
//!
//! # Example
//!
//! ```no_run
//! use docmesh_repo::Repo;
//! use docmesh_sync::{ConnDirection, RepoHandle};
//! use std::sync::Arc;
//! use tokio::net::TcpStream;
//!
//! # async fn run() -> docmesh_sync::SyncResult<()> {
//! let handle: RepoHandle = RepoHandle::new(Arc::new(Repo::new()));
//! let doc = handle.repo().new_doc();
//! doc.set("greeting", "hello")?;
//!
//! let stream = TcpStream::connect("127.0.0.1:9000").await?;
//! let (remote, _complete) = handle.connect_stream(stream, ConnDirection::Outgoing).await?;
//! handle.sync_all(remote).await?;
//! # Ok(())
//! # }
//! ```

mod codec;
mod config;
mod error;
mod events;
mod handle;
mod handshake;
pub mod protocol;
mod supervisor;
pub mod transport;

pub use codec::{read_frame, read_message, write_frame, write_message, MAX_FRAME_SIZE};
pub use config::{HandleConfig, DEFAULT_INBOX_CAPACITY};
pub use error::{SyncError, SyncResult};
pub use events::{ConnComplete, ConnFinished, HandleEvent, HandleEventKind};
pub use handle::RepoHandle;
pub use handshake::{connect, handshake, ConnDirection};
pub use protocol::{HandshakeMessage, MessageKind, RepoMessage};
pub use transport::{Conn, FramedConn};
