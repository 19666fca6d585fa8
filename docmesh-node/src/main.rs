//! docmesh node
//!
//! A small interactive peer. It listens for and/or dials TCP peers, keeps
//! its documents in memory (or on disk with `--data-dir`), and pushes every
//! local edit to all connected peers.
//!
//! Usage:
//!   docmesh-node --listen 127.0.0.1:7400
//!   docmesh-node --connect 127.0.0.1:7400 --data-dir ./node-b

mod command;

use anyhow::{Context, Result};
use clap::Parser;
use command::{Command, HELP};
use docmesh_repo::Repo;
use docmesh_storage::FsStore;
use docmesh_sync::{ConnDirection, HandleConfig, HandleEventKind, RepoHandle};
use docmesh_types::DocumentId;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::net::{TcpListener, TcpStream};
use tracing::{debug, info, warn};
use tracing_subscriber::filter::LevelFilter;
use tracing_subscriber::{EnvFilter, FmtSubscriber};

#[derive(Parser, Debug)]
#[command(name = "docmesh-node")]
#[command(about = "Interactive docmesh peer")]
struct Args {
    /// Address to accept peers on
    #[arg(short, long)]
    listen: Option<SocketAddr>,

    /// Peer address to dial on startup (repeatable)
    #[arg(short, long)]
    connect: Vec<SocketAddr>,

    /// Persist documents under this directory
    #[arg(short, long)]
    data_dir: Option<PathBuf>,

    /// Handshake timeout in seconds
    #[arg(long, default_value = "5")]
    handshake_timeout: u64,

    /// Enable verbose debug logging
    #[arg(short, long)]
    verbose: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    let log_level = if args.verbose { LevelFilter::DEBUG } else { LevelFilter::INFO };
    FmtSubscriber::builder()
        .with_env_filter(EnvFilter::from_default_env().add_directive(log_level.into()))
        .with_target(false)
        .with_writer(std::io::stderr)
        .compact()
        .init();

    let mut repo: Repo = Repo::new();
    if let Some(dir) = &args.data_dir {
        repo = repo.with_store(Arc::new(FsStore::new(dir)));
    }
    let repo = Arc::new(repo);
    if repo.has_store() {
        for id in repo.stored_document_ids().context("Failed to list stored documents")? {
            repo.load_doc(&id)
                .with_context(|| format!("Failed to load document {id}"))?;
        }
        info!(count = repo.document_ids().len(), "loaded stored documents");
    }

    let config = HandleConfig {
        handshake_timeout: Some(Duration::from_secs(args.handshake_timeout)),
        ..HandleConfig::default()
    };
    let handle = RepoHandle::with_config(repo, config);
    info!(repo = %handle.local_id(), "docmesh node starting");

    tokio::spawn(watch_events(handle.clone()));
    tokio::spawn(drain_inbox(handle.clone()));

    if let Some(addr) = args.listen {
        let listener = TcpListener::bind(addr)
            .await
            .with_context(|| format!("Failed to bind {addr}"))?;
        info!(%addr, "listening for peers");
        tokio::spawn(accept_loop(handle.clone(), listener));
    }

    for addr in &args.connect {
        let stream = TcpStream::connect(addr)
            .await
            .with_context(|| format!("Failed to connect to {addr}"))?;
        let (peer, _complete) = handle
            .connect_stream(stream, ConnDirection::Outgoing)
            .await
            .with_context(|| format!("Handshake with {addr} failed"))?;
        info!(%addr, %peer, "connected");
    }

    tokio::select! {
        result = shell(&handle) => result?,
        _ = tokio::signal::ctrl_c() => info!("interrupted"),
    }

    handle.close().await;
    persist_all(&handle)
}

/// Writes every document, including ones received from peers.
fn persist_all(handle: &RepoHandle) -> Result<()> {
    let repo = handle.repo();
    if !repo.has_store() {
        return Ok(());
    }
    for id in repo.document_ids() {
        repo.save_doc(&id)
            .with_context(|| format!("Failed to save document {id}"))?;
    }
    Ok(())
}

async fn accept_loop(handle: RepoHandle, listener: TcpListener) {
    loop {
        let (stream, addr) = match listener.accept().await {
            Ok(accepted) => accepted,
            Err(e) => {
                warn!("accept failed: {}", e);
                continue;
            }
        };
        let handle = handle.clone();
        tokio::spawn(async move {
            match handle.connect_stream(stream, ConnDirection::Incoming).await {
                Ok((peer, _complete)) => info!(%addr, %peer, "accepted peer"),
                Err(e) => warn!(%addr, "handshake failed: {}", e),
            }
        });
    }
}

/// Logs connection events and brings every new peer up to date.
async fn watch_events(handle: RepoHandle) {
    while let Some(event) = handle.next_event().await {
        match event.kind {
            HandleEventKind::PeerConnected => {
                if let Err(e) = handle.sync_all(event.peer).await {
                    warn!(peer = %event.peer, "initial sync failed: {}", e);
                }
            }
            HandleEventKind::PeerDisconnected => info!(peer = %event.peer, "peer disconnected"),
            HandleEventKind::ConnError => {
                if let Some(error) = event.error {
                    warn!(peer = %event.peer, "connection error: {}", error);
                }
            }
        }
    }
    debug!("event stream ended");
}

async fn drain_inbox(handle: RepoHandle) {
    while let Some(message) = handle.recv_message().await {
        info!(
            from = %message.from,
            document = %message.document,
            bytes = message.payload.len(),
            "ephemeral message"
        );
    }
}

async fn shell(handle: &RepoHandle) -> Result<()> {
    println!("{HELP}");
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while let Some(line) = lines.next_line().await.context("Failed to read stdin")? {
        if line.trim().is_empty() {
            continue;
        }
        let command = match line.parse::<Command>() {
            Ok(command) => command,
            Err(e) => {
                println!("{e}");
                continue;
            }
        };
        if command == Command::Exit {
            break;
        }
        if let Err(e) = run(handle, command).await {
            println!("error: {e:#}");
        }
    }
    Ok(())
}

async fn run(handle: &RepoHandle, command: Command) -> Result<()> {
    let repo = handle.repo();
    match command {
        Command::New => {
            let doc = repo.new_doc();
            println!("{}", doc.id());
        }
        Command::Docs => {
            for id in repo.document_ids() {
                println!("{id}");
            }
        }
        Command::Peers => {
            for peer in handle.peers() {
                println!("{peer}");
            }
        }
        Command::Show(id) => {
            let doc = repo.get_doc(&id).context("No such document")?;
            for (key, value) in doc.to_map() {
                println!("{key} = {value}");
            }
        }
        Command::Get(id, key) => {
            let doc = repo.get_doc(&id).context("No such document")?;
            match doc.get(&key) {
                Some(value) => println!("{value}"),
                None => println!("(unset)"),
            }
        }
        Command::Set(id, key, value) => {
            let doc = repo.get_or_create_doc(id);
            doc.set(&key, value)?;
            if repo.has_store() {
                repo.save_doc(&id)?;
            }
            push_to_peers(handle, id).await;
        }
        Command::Help => println!("{HELP}"),
        Command::Exit => {}
    }
    Ok(())
}

async fn push_to_peers(handle: &RepoHandle, document: DocumentId) {
    for peer in handle.peers() {
        if let Err(e) = handle.sync_document(peer, document).await {
            warn!(%peer, %document, "sync failed: {}", e);
        }
    }
}
