//! Share policy: which documents may flow to which peers.
//!
//! Policies are consulted while the sync layer holds its peer registry lock,
//! so implementations must be synchronous and must not call back into the
//! handle.

use docmesh_types::{DocumentId, RepoId};
use std::collections::HashSet;

/// Outcome of a policy check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShareDecision {
    Share,
    DontShare,
}

impl ShareDecision {
    pub fn is_share(self) -> bool {
        matches!(self, Self::Share)
    }
}

impl From<bool> for ShareDecision {
    fn from(share: bool) -> Self {
        if share {
            Self::Share
        } else {
            Self::DontShare
        }
    }
}

/// Decides what is shared with whom.
pub trait SharePolicy: Send + Sync {
    /// Whether sync traffic for `document` may be exchanged with `peer`.
    fn should_sync(&self, document: &DocumentId, peer: &RepoId) -> ShareDecision;

    /// Whether an unknown `document` referenced by `peer` may be created
    /// locally.
    fn should_request(&self, document: &DocumentId, peer: &RepoId) -> ShareDecision;

    /// Whether `document` may be offered to `peer` unprompted.
    fn should_announce(&self, document: &DocumentId, peer: &RepoId) -> ShareDecision;
}

/// Shares everything with everyone.
#[derive(Debug, Default, Clone, Copy)]
pub struct PermissiveSharePolicy;

impl SharePolicy for PermissiveSharePolicy {
    fn should_sync(&self, _: &DocumentId, _: &RepoId) -> ShareDecision {
        ShareDecision::Share
    }

    fn should_request(&self, _: &DocumentId, _: &RepoId) -> ShareDecision {
        ShareDecision::Share
    }

    fn should_announce(&self, _: &DocumentId, _: &RepoId) -> ShareDecision {
        ShareDecision::Share
    }
}

/// A static policy built from deny lists.
///
/// Blocked documents are never synced, requested or announced. Blocked
/// peers receive nothing. Hidden documents still sync when a peer asks for
/// them but are never announced.
#[derive(Debug, Default, Clone)]
pub struct DenyListPolicy {
    blocked_documents: HashSet<DocumentId>,
    hidden_documents: HashSet<DocumentId>,
    blocked_peers: HashSet<RepoId>,
    refuse_requests: bool,
}

impl DenyListPolicy {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn block_document(mut self, document: DocumentId) -> Self {
        self.blocked_documents.insert(document);
        self
    }

    pub fn hide_document(mut self, document: DocumentId) -> Self {
        self.hidden_documents.insert(document);
        self
    }

    pub fn block_peer(mut self, peer: RepoId) -> Self {
        self.blocked_peers.insert(peer);
        self
    }

    /// Never materialize documents that peers reference but this repo
    /// does not hold.
    pub fn refuse_requests(mut self) -> Self {
        self.refuse_requests = true;
        self
    }

    fn allowed(&self, document: &DocumentId, peer: &RepoId) -> bool {
        !self.blocked_documents.contains(document) && !self.blocked_peers.contains(peer)
    }
}

impl SharePolicy for DenyListPolicy {
    fn should_sync(&self, document: &DocumentId, peer: &RepoId) -> ShareDecision {
        self.allowed(document, peer).into()
    }

    fn should_request(&self, document: &DocumentId, peer: &RepoId) -> ShareDecision {
        (!self.refuse_requests && self.allowed(document, peer)).into()
    }

    fn should_announce(&self, document: &DocumentId, peer: &RepoId) -> ShareDecision {
        (self.allowed(document, peer) && !self.hidden_documents.contains(document)).into()
    }
}
