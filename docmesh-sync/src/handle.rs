//! The connection and sync orchestrator.
//!
//! A [`RepoHandle`] owns the set of live peer connections for one [`Repo`].
//! Each connection gets a receive loop that answers sync traffic inline and
//! forwards everything else to the inbox. Per-(peer, document) sync state
//! lives in the peer registry and is only touched under its lock; network
//! writes happen after the lock is released. Lifecycle events are
//! published inside the same critical section that changes the registry,
//! so per-peer events always follow registry order.
//!
//! Lock order is registry, then the repo's document map, then a document.

use crate::config::HandleConfig;
use crate::error::{SyncError, SyncResult};
use crate::events::{ConnComplete, ConnFinished, HandleEvent};
use crate::handshake::{connect, ConnDirection};
use crate::protocol::{MessageKind, RepoMessage};
use crate::transport::Conn;
use docmesh_repo::{AutomergeEngine, CrdtEngine, Repo};
use docmesh_types::{DocumentId, RepoId};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::sync::{mpsc, oneshot, watch};
use tracing::{debug, info, warn};

/// A registered connection and its per-document sync state.
struct PeerInfo<E: CrdtEngine> {
    conn: Arc<dyn Conn>,
    /// Distinguishes successive connections to the same peer.
    generation: u64,
    complete: oneshot::Sender<ConnFinished>,
    sync_states: HashMap<DocumentId, E::SyncState>,
}

struct Registry<E: CrdtEngine> {
    peers: HashMap<RepoId, PeerInfo<E>>,
    closed: bool,
}

/// Sync payloads ready to be written to one connection.
struct Outbound {
    conn: Arc<dyn Conn>,
    generation: u64,
    payloads: Vec<Vec<u8>>,
}

struct HandleInner<E: CrdtEngine> {
    repo: Arc<Repo<E>>,
    config: HandleConfig,
    registry: Mutex<Registry<E>>,
    next_generation: AtomicU64,
    events_tx: Mutex<Option<mpsc::UnboundedSender<HandleEvent>>>,
    events_rx: tokio::sync::Mutex<mpsc::UnboundedReceiver<HandleEvent>>,
    inbox_tx: Mutex<Option<mpsc::Sender<RepoMessage>>>,
    inbox_rx: tokio::sync::Mutex<mpsc::Receiver<RepoMessage>>,
    shutdown: watch::Sender<bool>,
}

impl<E: CrdtEngine> HandleInner<E> {
    fn registry(&self) -> MutexGuard<'_, Registry<E>> {
        self.registry.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Publishes an event. A no-op once the handle is closed.
    fn publish(&self, event: HandleEvent) {
        let events = self.events_tx.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(tx) = events.as_ref() {
            let _ = tx.send(event);
        }
    }

    fn inbox_sender(&self) -> Option<mpsc::Sender<RepoMessage>> {
        self.inbox_tx
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn close_channels(&self, events: bool) {
        drop(self.inbox_tx.lock().unwrap_or_else(PoisonError::into_inner).take());
        if events {
            drop(self.events_tx.lock().unwrap_or_else(PoisonError::into_inner).take());
        }
    }

    /// Removes `remote` from the registry and publishes its teardown events
    /// in the same critical section, so no later `PeerConnected` for the
    /// same peer can be published ahead of them.
    ///
    /// With `generation` set, only that connection is removed. With `error`
    /// set, `ConnError` precedes `PeerDisconnected`.
    fn detach(
        &self,
        remote: RepoId,
        generation: Option<u64>,
        error: Option<&SyncError>,
    ) -> Option<PeerInfo<E>> {
        let mut registry = self.registry();
        let live = registry.peers.get(&remote)?.generation;
        if generation.is_some_and(|g| g != live) {
            return None;
        }
        if let Some(error) = error {
            self.publish(HandleEvent::conn_error(remote, error.clone()));
        }
        self.publish(HandleEvent::disconnected(remote));
        registry.peers.remove(&remote)
    }

    fn connection(&self, peer: RepoId) -> SyncResult<(Arc<dyn Conn>, u64)> {
        let registry = self.registry();
        if registry.closed {
            return Err(SyncError::HandleClosed);
        }
        let info = registry.peers.get(&peer).ok_or(SyncError::PeerNotFound(peer))?;
        Ok((Arc::clone(&info.conn), info.generation))
    }
}

/// Orchestrates connections and document sync for one repo.
///
/// Cloning is cheap; all clones share the same state.
pub struct RepoHandle<E: CrdtEngine = AutomergeEngine> {
    inner: Arc<HandleInner<E>>,
}

impl<E: CrdtEngine> Clone for RepoHandle<E> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<E: CrdtEngine> RepoHandle<E> {
    pub fn new(repo: Arc<Repo<E>>) -> Self {
        Self::with_config(repo, HandleConfig::default())
    }

    pub fn with_config(repo: Arc<Repo<E>>, config: HandleConfig) -> Self {
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let (inbox_tx, inbox_rx) = mpsc::channel(config.inbox_capacity.max(1));
        Self {
            inner: Arc::new(HandleInner {
                repo,
                config,
                registry: Mutex::new(Registry {
                    peers: HashMap::new(),
                    closed: false,
                }),
                next_generation: AtomicU64::new(0),
                events_tx: Mutex::new(Some(events_tx)),
                events_rx: tokio::sync::Mutex::new(events_rx),
                inbox_tx: Mutex::new(Some(inbox_tx)),
                inbox_rx: tokio::sync::Mutex::new(inbox_rx),
                shutdown: watch::channel(false).0,
            }),
        }
    }

    pub fn repo(&self) -> &Arc<Repo<E>> {
        &self.inner.repo
    }

    pub fn local_id(&self) -> RepoId {
        self.inner.repo.id()
    }

    pub fn config(&self) -> &HandleConfig {
        &self.inner.config
    }

    /// Connected peers in a stable order.
    pub fn peers(&self) -> Vec<RepoId> {
        let mut peers: Vec<_> = self.inner.registry().peers.keys().copied().collect();
        peers.sort();
        peers
    }

    pub fn is_connected(&self, peer: &RepoId) -> bool {
        self.inner.registry().peers.contains_key(peer)
    }

    pub fn is_closed(&self) -> bool {
        self.inner.registry().closed
    }

    // ── Inbox and events ─────────────────────────────────────────

    /// Next non-sync message from any peer. `None` once the handle is
    /// closed and the inbox drained.
    pub async fn recv_message(&self) -> Option<RepoMessage> {
        self.inner.inbox_rx.lock().await.recv().await
    }

    /// Next lifecycle event. `None` once the handle is closed and every
    /// event was consumed.
    pub async fn next_event(&self) -> Option<HandleEvent> {
        self.inner.events_rx.lock().await.recv().await
    }

    /// Returns an already published event without waiting.
    pub fn try_next_event(&self) -> Option<HandleEvent> {
        self.inner.events_rx.try_lock().ok()?.try_recv().ok()
    }

    // ── Connection lifecycle ─────────────────────────────────────

    /// Registers a connection to `remote` and starts its receive loop.
    ///
    /// A live connection to the same peer is torn down first. On a closed
    /// handle the connection is closed and completes with
    /// [`ConnFinished::LocalClose`] immediately.
    pub async fn add_conn<C: Conn + 'static>(&self, remote: RepoId, conn: C) -> ConnComplete {
        self.register(remote, Arc::new(conn)).await.1
    }

    /// Performs the handshake on `stream` and registers the result.
    pub async fn connect_stream<S>(
        &self,
        stream: S,
        direction: ConnDirection,
    ) -> SyncResult<(RepoId, ConnComplete)>
    where
        S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
    {
        let timeout = self.inner.config.handshake_timeout;
        let (conn, remote) = connect(stream, self.local_id(), direction, timeout).await?;
        let complete = self.add_conn(remote, conn).await;
        Ok((remote, complete))
    }

    pub(crate) async fn register(
        &self,
        remote: RepoId,
        conn: Arc<dyn Conn>,
    ) -> (Option<u64>, ConnComplete) {
        let (tx, rx) = oneshot::channel();
        let generation = self.inner.next_generation.fetch_add(1, Ordering::Relaxed);
        let inserted = {
            let mut registry = self.inner.registry();
            if registry.closed {
                None
            } else {
                let replaced = registry.peers.insert(
                    remote,
                    PeerInfo {
                        conn: Arc::clone(&conn),
                        generation,
                        complete: tx,
                        sync_states: HashMap::new(),
                    },
                );
                if replaced.is_some() {
                    self.inner.publish(HandleEvent::disconnected(remote));
                }
                self.inner.publish(HandleEvent::connected(remote));
                Some(replaced)
            }
        };

        let Some(replaced) = inserted else {
            debug!(%remote, "handle closed, rejecting connection");
            let _ = conn.close().await;
            return (None, ConnComplete::finished(ConnFinished::LocalClose));
        };
        if let Some(old) = replaced {
            info!(%remote, "replaced existing connection");
            self.finish(remote, old, ConnFinished::LocalClose).await;
        }

        info!(%remote, generation, "peer connected");
        self.spawn_receive_loop(remote, generation, conn);
        (Some(generation), ConnComplete::new(rx))
    }

    /// Closes and forgets the connection to `remote`. Returns whether a
    /// connection was removed; repeated calls are no-ops.
    pub async fn remove_conn(&self, remote: RepoId) -> bool {
        match self.inner.detach(remote, None, None) {
            Some(info) => {
                self.finish(remote, info, ConnFinished::LocalClose).await;
                true
            }
            None => false,
        }
    }

    /// Removes `remote` only if `generation` is still its live connection.
    pub(crate) async fn remove_generation(&self, remote: RepoId, generation: u64) -> bool {
        match self.inner.detach(remote, Some(generation), None) {
            Some(info) => {
                self.finish(remote, info, ConnFinished::LocalClose).await;
                true
            }
            None => false,
        }
    }

    /// Closes every connection, then the inbox and event channels.
    ///
    /// Each peer gets a `PeerDisconnected` event and completes with
    /// [`ConnFinished::LocalClose`]. Calling `close` again does nothing.
    pub async fn close(&self) {
        let peers = {
            let mut registry = self.inner.registry();
            if registry.closed {
                return;
            }
            registry.closed = true;
            let mut peers: Vec<_> = std::mem::take(&mut registry.peers).into_iter().collect();
            peers.sort_by_key(|(id, _)| *id);
            for (remote, _) in &peers {
                self.inner.publish(HandleEvent::disconnected(*remote));
            }
            peers
        };

        self.inner.shutdown.send_replace(true);
        self.inner.close_channels(false);

        for (remote, info) in peers {
            self.finish(remote, info, ConnFinished::LocalClose).await;
        }

        self.inner.close_channels(true);
        info!(repo = %self.local_id(), "repo handle closed");
    }

    /// Closes a connection already detached from the registry and reports
    /// its completion. Events were published when it was detached.
    async fn finish(&self, remote: RepoId, info: PeerInfo<E>, reason: ConnFinished) {
        if let Err(error) = info.conn.close().await {
            debug!(%remote, %error, "error closing connection");
        }
        let _ = info.complete.send(reason);
        info!(%remote, "peer disconnected");
    }

    /// Tears down a connection whose transport failed, if it is still the
    /// live one.
    async fn fail(
        &self,
        remote: RepoId,
        generation: u64,
        error: SyncError,
        reason: fn(SyncError) -> ConnFinished,
    ) {
        match self.inner.detach(remote, Some(generation), Some(&error)) {
            Some(info) => {
                warn!(%remote, %error, "connection failed");
                self.finish(remote, info, reason(error)).await;
            }
            None => debug!(%remote, "connection already removed"),
        }
    }

    // ── Receive loop ─────────────────────────────────────────────

    fn spawn_receive_loop(&self, remote: RepoId, generation: u64, conn: Arc<dyn Conn>) {
        let handle = self.clone();
        tokio::spawn(async move {
            handle.receive_loop(remote, generation, conn).await;
        });
    }

    async fn receive_loop(self, remote: RepoId, generation: u64, conn: Arc<dyn Conn>) {
        let mut shutdown = self.inner.shutdown.subscribe();
        loop {
            let message = match conn.recv_message().await {
                Ok(message) => message,
                Err(error) => {
                    self.fail(remote, generation, error, ConnFinished::ReceiveError)
                        .await;
                    return;
                }
            };
            match message.kind {
                MessageKind::Sync => self.handle_sync_message(remote, message).await,
                MessageKind::Ephemeral => {
                    if !self.deliver(message, &mut shutdown).await {
                        debug!(%remote, "inbox closed, receive loop exiting");
                        return;
                    }
                }
            }
        }
    }

    /// Waits for inbox capacity. Returns `false` if the handle shut down
    /// first.
    async fn deliver(&self, message: RepoMessage, shutdown: &mut watch::Receiver<bool>) -> bool {
        let Some(inbox) = self.inner.inbox_sender() else {
            return false;
        };
        tokio::select! {
            sent = inbox.send(message) => sent.is_ok(),
            _ = shutdown.wait_for(|closed| *closed) => false,
        }
    }

    // ── Sync ─────────────────────────────────────────────────────

    /// Sends every pending sync message for `document` to `peer`.
    ///
    /// Does nothing if the share policy denies syncing the document with
    /// the peer. A failed write tears the connection down and is returned.
    pub async fn sync_document(&self, peer: RepoId, document: DocumentId) -> SyncResult<()> {
        let Some(outbound) = self.generate_sync(peer, document)? else {
            return Ok(());
        };
        let local = self.local_id();
        for payload in outbound.payloads {
            let message = RepoMessage::sync(local, peer, document, payload);
            self.send_on(peer, outbound.generation, &outbound.conn, message)
                .await?;
        }
        Ok(())
    }

    fn generate_sync(&self, peer: RepoId, document: DocumentId) -> SyncResult<Option<Outbound>> {
        let mut registry = self.inner.registry();
        if registry.closed {
            return Err(SyncError::HandleClosed);
        }
        let info = registry
            .peers
            .get_mut(&peer)
            .ok_or(SyncError::PeerNotFound(peer))?;
        let repo = &self.inner.repo;
        let doc = repo
            .get_doc(&document)
            .ok_or(SyncError::DocumentNotFound(document))?;
        if !repo.share_policy().should_sync(&document, &peer).is_share() {
            debug!(%peer, %document, "share policy denied sync");
            return Ok(None);
        }

        let state = info
            .sync_states
            .entry(document)
            .or_insert_with(|| doc.new_sync_state());
        let mut payloads = Vec::new();
        while let Some(payload) = doc.generate_sync_message(state) {
            payloads.push(payload);
        }
        Ok(Some(Outbound {
            conn: Arc::clone(&info.conn),
            generation: info.generation,
            payloads,
        }))
    }

    async fn handle_sync_message(&self, remote: RepoId, message: RepoMessage) {
        let document = message.document;
        if !self.apply_sync_message(remote, &message) {
            return;
        }
        if let Err(error) = self.sync_document(remote, document).await {
            debug!(%remote, %document, %error, "reply sync failed");
        }
    }

    /// Applies an inbound sync message. Returns whether a reply should be
    /// attempted.
    fn apply_sync_message(&self, remote: RepoId, message: &RepoMessage) -> bool {
        let mut registry = self.inner.registry();
        let Some(info) = registry.peers.get_mut(&remote) else {
            debug!(%remote, "sync message from unregistered peer dropped");
            return false;
        };
        let repo = &self.inner.repo;
        let policy = repo.share_policy();
        let document = message.document;
        if !policy.should_sync(&document, &remote).is_share() {
            debug!(%remote, %document, "share policy denied inbound sync");
            return false;
        }

        let doc = match repo.get_doc(&document) {
            Some(doc) => doc,
            None => {
                if !policy.should_request(&document, &remote).is_share() {
                    debug!(%remote, %document, "share policy denied request for unknown document");
                    return false;
                }
                info!(%remote, %document, "creating document announced by peer");
                repo.get_or_create_doc(document)
            }
        };

        let state = info
            .sync_states
            .entry(document)
            .or_insert_with(|| doc.new_sync_state());
        match doc.receive_sync_message(state, &message.payload) {
            Ok(true) => debug!(%remote, %document, "document updated by peer"),
            Ok(false) => {}
            Err(error) => warn!(%remote, %document, %error, "failed to apply sync message"),
        }
        true
    }

    /// Syncs every local document the policy allows announcing to `peer`.
    /// Stops at the first error.
    pub async fn sync_all(&self, peer: RepoId) -> SyncResult<()> {
        self.inner.connection(peer)?;
        let repo = &self.inner.repo;
        for document in repo.document_ids() {
            if !repo.share_policy().should_announce(&document, &peer).is_share() {
                debug!(%peer, %document, "share policy denied announce");
                continue;
            }
            self.sync_document(peer, document).await?;
        }
        Ok(())
    }

    // ── Direct messages ──────────────────────────────────────────

    /// Builds an ephemeral message from this repo.
    pub fn ephemeral_message(&self, to: RepoId, document: DocumentId, payload: Vec<u8>) -> RepoMessage {
        RepoMessage::ephemeral(self.local_id(), to, document, payload)
    }

    /// Sends an ephemeral `message` to `peer` as is.
    ///
    /// Sync traffic only flows through [`sync_document`](Self::sync_document),
    /// so a `Sync` message is rejected with [`SyncError::Protocol`].
    pub async fn send_message(&self, peer: RepoId, message: RepoMessage) -> SyncResult<()> {
        ensure_ephemeral(&message)?;
        let (conn, generation) = self.inner.connection(peer)?;
        self.send_on(peer, generation, &conn, message).await
    }

    /// Sends `message` to every connected peer, addressed to each in turn.
    /// Stops at the first failure.
    pub async fn broadcast(&self, message: RepoMessage) -> SyncResult<()> {
        ensure_ephemeral(&message)?;
        let mut targets: Vec<_> = {
            let registry = self.inner.registry();
            if registry.closed {
                return Err(SyncError::HandleClosed);
            }
            registry
                .peers
                .iter()
                .map(|(id, info)| (*id, Arc::clone(&info.conn), info.generation))
                .collect()
        };
        targets.sort_by_key(|(id, _, _)| *id);

        for (peer, conn, generation) in targets {
            let mut message = message.clone();
            message.to = peer;
            self.send_on(peer, generation, &conn, message).await?;
        }
        Ok(())
    }

    async fn send_on(
        &self,
        peer: RepoId,
        generation: u64,
        conn: &Arc<dyn Conn>,
        message: RepoMessage,
    ) -> SyncResult<()> {
        if let Err(error) = conn.send_message(message).await {
            self.fail(peer, generation, error.clone(), ConnFinished::SendError)
                .await;
            return Err(error);
        }
        Ok(())
    }
}

impl<E: CrdtEngine> std::fmt::Debug for RepoHandle<E> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RepoHandle")
            .field("local_id", &self.local_id())
            .field("peers", &self.peers())
            .finish_non_exhaustive()
    }
}

fn ensure_ephemeral(message: &RepoMessage) -> SyncResult<()> {
    if message.is_sync() {
        return Err(SyncError::Protocol(
            "sync messages must go through sync_document".into(),
        ));
    }
    Ok(())
}
