//! Wire messages exchanged between repos.
//!
//! Every message is a CBOR map. Ids travel as canonical UUID strings and the
//! payload as a CBOR byte string. Remote repo ids that are not canonical
//! UUIDs are mapped deterministically through [`RepoId::from_peer_string`].

use crate::error::{SyncError, SyncResult};
use docmesh_types::{DocumentId, RepoId};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Handshake message type sent by the dialing side.
pub const JOIN: &str = "join";
/// Handshake message type sent by the accepting side.
pub const PEER: &str = "peer";

/// Kind of a [`RepoMessage`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MessageKind {
    /// CRDT sync traffic, handled by the repo handle itself.
    Sync,
    /// Application traffic, delivered to the inbox.
    Ephemeral,
}

impl MessageKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Sync => "sync",
            Self::Ephemeral => "ephemeral",
        }
    }
}

impl fmt::Display for MessageKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for MessageKind {
    type Err = SyncError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "sync" => Ok(Self::Sync),
            "ephemeral" => Ok(Self::Ephemeral),
            other => Err(SyncError::Protocol(format!("invalid message type {other:?}"))),
        }
    }
}

/// A message between two repos about one document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RepoMessage {
    pub kind: MessageKind,
    pub from: RepoId,
    pub to: RepoId,
    pub document: DocumentId,
    pub payload: Vec<u8>,
}

#[derive(Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct WireMessage {
    #[serde(rename = "type")]
    kind: String,
    sender_id: String,
    target_id: String,
    document_id: String,
    #[serde(with = "serde_bytes")]
    message: Vec<u8>,
}

impl RepoMessage {
    pub fn sync(from: RepoId, to: RepoId, document: DocumentId, payload: Vec<u8>) -> Self {
        Self {
            kind: MessageKind::Sync,
            from,
            to,
            document,
            payload,
        }
    }

    pub fn ephemeral(from: RepoId, to: RepoId, document: DocumentId, payload: Vec<u8>) -> Self {
        Self {
            kind: MessageKind::Ephemeral,
            from,
            to,
            document,
            payload,
        }
    }

    pub fn is_sync(&self) -> bool {
        self.kind == MessageKind::Sync
    }

    /// Encodes to CBOR.
    pub fn encode(&self) -> SyncResult<Vec<u8>> {
        encode_cbor(&WireMessage {
            kind: self.kind.as_str().to_string(),
            sender_id: self.from.to_string(),
            target_id: self.to.to_string(),
            document_id: self.document.to_string(),
            message: self.payload.clone(),
        })
    }

    /// Decodes from CBOR, rejecting unknown message types and malformed
    /// document ids.
    pub fn decode(data: &[u8]) -> SyncResult<Self> {
        let wire: WireMessage = decode_cbor(data)?;
        let kind = wire.kind.parse()?;
        let document = DocumentId::parse(&wire.document_id)
            .map_err(|e| SyncError::Decode(format!("invalid document id: {e}")))?;
        Ok(Self {
            kind,
            from: RepoId::from_peer_string(&wire.sender_id),
            to: RepoId::from_peer_string(&wire.target_id),
            document,
            payload: wire.message,
        })
    }
}

/// The first message on a connection.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HandshakeMessage {
    #[serde(rename = "type")]
    pub kind: String,
    pub sender_id: String,
}

impl HandshakeMessage {
    pub fn join(sender: RepoId) -> Self {
        Self {
            kind: JOIN.to_string(),
            sender_id: sender.to_string(),
        }
    }

    pub fn peer(sender: RepoId) -> Self {
        Self {
            kind: PEER.to_string(),
            sender_id: sender.to_string(),
        }
    }

    pub fn encode(&self) -> SyncResult<Vec<u8>> {
        encode_cbor(self)
    }

    pub fn decode(data: &[u8]) -> SyncResult<Self> {
        decode_cbor(data)
    }
}

fn encode_cbor<T: Serialize>(value: &T) -> SyncResult<Vec<u8>> {
    let mut buf = Vec::new();
    ciborium::into_writer(value, &mut buf).map_err(|e| SyncError::Encode(e.to_string()))?;
    Ok(buf)
}

fn decode_cbor<T: DeserializeOwned>(data: &[u8]) -> SyncResult<T> {
    ciborium::from_reader(data).map_err(|e| SyncError::Decode(e.to_string()))
}
