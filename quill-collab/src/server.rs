//! TCP collaboration server.
//!
//! Architecture:
//! ```text
//! Client ── TCP ──► handshake (username → role store → session slot)
//!                      │
//!                      ▼
//!             reader task ──► CommandQueue ──► batch loop (engine)
//!                  │                               │
//!                  │ queries                       │ delta
//!                  ▼                               ▼
//!             outbound mpsc ◄──────────── registry broadcast
//!                  │
//!                  ▼
//!             writer task ── TCP ──► Client
//! ```
//!
//! Each connection owns a reader task and a writer task joined by an
//! outbound channel. Broadcast deltas and inline query responses travel
//! through the same channel, so they never interleave on the socket.
//!
//! The bound address is printed on stdout at startup; whatever supervises
//! the process reads it there and hands it to clients.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader, Lines};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{mpsc, watch, RwLock};

use quill_core::Document;

use crate::audit::AuditLog;
use crate::engine;
use crate::protocol::{self, Command, REJECT_FULL, REJECT_UNAUTHORISED};
use crate::queue::CommandQueue;
use crate::registry::{AdmitError, SessionRegistry};
use crate::roles::{Role, RoleStore};
use crate::snapshot;

#[derive(Debug, Error)]
pub enum ServerError {
    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),
}

/// Server configuration.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Address to bind to. Port 0 picks an ephemeral port, printed on
    /// stdout at startup.
    pub bind_addr: String,
    /// Batch tick interval, the one mandatory startup parameter.
    pub broadcast_interval: Duration,
    /// Role store file, re-read per authentication attempt.
    pub roles_path: PathBuf,
    /// Snapshot file written on shutdown and on session disconnect.
    pub snapshot_path: PathBuf,
    /// Session table capacity.
    pub max_sessions: usize,
    /// Command queue bound before back-pressure kicks in.
    pub queue_capacity: usize,
    /// Outbound messages buffered per session before it counts as lagging.
    pub session_buffer: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: "127.0.0.1:9400".to_string(),
            broadcast_interval: Duration::from_millis(1000),
            roles_path: PathBuf::from("roles.txt"),
            snapshot_path: PathBuf::from("doc.md"),
            max_sessions: 100,
            queue_capacity: 1024,
            session_buffer: 64,
        }
    }
}

/// Everything the server shares between tasks: document, queue, session
/// registry, role store, audit log, shutdown flag. Passed around as one
/// explicit context; there is no process-wide state.
pub struct ServerContext {
    pub config: ServerConfig,
    pub document: RwLock<Document>,
    pub queue: CommandQueue,
    pub registry: SessionRegistry,
    pub roles: RoleStore,
    pub audit: AuditLog,
    shutdown: watch::Sender<bool>,
}

impl ServerContext {
    pub fn new(config: ServerConfig) -> Arc<Self> {
        let (shutdown, _) = watch::channel(false);
        Arc::new(Self {
            document: RwLock::new(Document::new()),
            queue: CommandQueue::new(config.queue_capacity),
            registry: SessionRegistry::new(config.max_sessions),
            roles: RoleStore::new(config.roles_path.clone()),
            audit: AuditLog::new(),
            config,
            shutdown,
        })
    }

    /// Flags the server for shutdown: the batch loop and accept loop
    /// observe it and stop.
    pub fn shutdown(&self) {
        self.shutdown.send_replace(true);
    }

    pub fn shutdown_signal(&self) -> watch::Receiver<bool> {
        self.shutdown.subscribe()
    }

    pub fn is_shutting_down(&self) -> bool {
        *self.shutdown.borrow()
    }
}

/// The collaboration server.
pub struct CollabServer {
    ctx: Arc<ServerContext>,
}

impl CollabServer {
    pub fn new(config: ServerConfig) -> Self {
        Self {
            ctx: ServerContext::new(config),
        }
    }

    /// Shared context, for the operator console and tests.
    pub fn context(&self) -> Arc<ServerContext> {
        self.ctx.clone()
    }

    /// Binds, starts the batch loop and serves connections until
    /// shutdown. Writes the final snapshot before returning.
    pub async fn run(&self) -> Result<(), ServerError> {
        let listener = TcpListener::bind(&self.ctx.config.bind_addr).await?;
        let addr = listener.local_addr()?;
        // The transport identifier consumed by whatever launched us.
        println!("{addr}");
        log::info!("collab server listening on {addr}");

        let batch = tokio::spawn(engine::run(self.ctx.clone()));
        let mut shutdown = self.ctx.shutdown_signal();

        loop {
            tokio::select! {
                accepted = listener.accept() => {
                    let (stream, peer) = accepted?;
                    log::debug!("connection from {peer}");
                    let ctx = self.ctx.clone();
                    tokio::spawn(async move {
                        if let Err(err) = handle_connection(ctx, stream, peer).await {
                            log::error!("session from {peer} ended with error: {err}");
                        }
                    });
                }
                _ = shutdown.changed() => break,
            }
        }

        let _ = batch.await;
        if let Err(err) = snapshot::write_snapshot(&self.ctx).await {
            log::error!("final snapshot failed: {err}");
        }
        log::info!("collab server stopped");
        Ok(())
    }
}

async fn handle_connection(
    ctx: Arc<ServerContext>,
    stream: TcpStream,
    peer: SocketAddr,
) -> std::io::Result<()> {
    let (read_half, mut write_half) = stream.into_split();
    let mut lines = BufReader::new(read_half).lines();

    let Some(first) = lines.next_line().await? else {
        return Ok(());
    };
    let username = first.trim().to_string();
    if username.is_empty() {
        return Ok(());
    }

    let (outbound_tx, outbound_rx) = mpsc::channel::<Arc<str>>(ctx.config.session_buffer);

    // Admission and the bootstrap snapshot happen under one document read
    // lock, so the first delta a session can receive is always for a
    // version after the one it bootstrapped at.
    let admitted = {
        let doc = ctx.document.read().await;
        match ctx
            .registry
            .admit(&ctx.roles, &username, outbound_tx.clone())
            .await
        {
            Ok((slot, role)) => {
                let body = doc.flatten();
                let header = format!("{}\n{}\n{}\n", role.as_str(), doc.version(), body.len());
                Ok((slot, role, header, body))
            }
            Err(err) => Err(err),
        }
    };

    let (slot, role, header, body) = match admitted {
        Ok(parts) => parts,
        Err(AdmitError::Unauthorised) => {
            log::warn!("handshake from {peer} rejected: {username} not in role store");
            write_half
                .write_all(format!("{REJECT_UNAUTHORISED}\n").as_bytes())
                .await?;
            return Ok(());
        }
        Err(AdmitError::Full) => {
            log::warn!("handshake from {peer} rejected: session table full");
            write_half
                .write_all(format!("{REJECT_FULL}\n").as_bytes())
                .await?;
            return Ok(());
        }
    };

    let bootstrap = async {
        write_half.write_all(header.as_bytes()).await?;
        write_half.write_all(&body).await?;
        write_half.flush().await
    }
    .await;
    if let Err(err) = bootstrap {
        ctx.registry.release(slot).await;
        return Err(err);
    }

    let writer = tokio::spawn(write_outbound(outbound_rx, write_half));

    let result = session_loop(&ctx, &mut lines, &outbound_tx, &username, role).await;

    ctx.registry.release(slot).await;
    drop(outbound_tx);
    if let Err(err) = snapshot::write_snapshot(&ctx).await {
        log::error!("snapshot after disconnect of {username} failed: {err}");
    }
    let _ = writer.await;
    log::info!("{username} from {peer} disconnected");
    result
}

/// Reader side of a session: queries are answered inline through the
/// outbound channel, everything else is enqueued for the next batch.
async fn session_loop(
    ctx: &ServerContext,
    lines: &mut Lines<BufReader<OwnedReadHalf>>,
    outbound: &mpsc::Sender<Arc<str>>,
    user: &str,
    role: Role,
) -> std::io::Result<()> {
    while let Some(line) = lines.next_line().await? {
        let line = line.trim_end_matches('\r');
        if line.is_empty() {
            continue;
        }
        match Command::parse(line) {
            Ok(Command::Disconnect) => break,
            Ok(Command::Doc) => {
                let flattened = ctx.document.read().await.flatten_text();
                send_direct(outbound, protocol::doc_response(&flattened)).await;
            }
            Ok(Command::Perm) => {
                send_direct(outbound, protocol::perm_response(role)).await;
            }
            Ok(Command::Log) => {
                let contents = ctx.audit.contents().await;
                send_direct(outbound, protocol::log_response(&contents)).await;
            }
            // Edits and even unparseable lines go through the queue so
            // their rejection still earns a delta line.
            _ => {
                if !ctx.queue.enqueue(user, line).await {
                    log::warn!("command queue full, dropping command from {user}");
                }
            }
        }
    }
    Ok(())
}

async fn send_direct(outbound: &mpsc::Sender<Arc<str>>, response: String) {
    if outbound.send(Arc::from(response)).await.is_err() {
        log::debug!("session writer gone, dropping query response");
    }
}

/// Writer side of a session: forwards the outbound channel to the socket
/// until the channel closes or the peer goes away.
async fn write_outbound(mut rx: mpsc::Receiver<Arc<str>>, mut writer: OwnedWriteHalf) {
    while let Some(message) = rx.recv().await {
        if let Err(err) = writer.write_all(message.as_bytes()).await {
            log::debug!("outbound write failed: {err}");
            break;
        }
    }
}
