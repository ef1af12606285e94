//! # quill-collab: server-mediated collaboration layer
//!
//! Turns a stream of per-client command lines into totally-ordered,
//! versioned document deltas:
//!
//! ```text
//! Client A ──┐                         ┌──► Client A
//!            ├── CommandQueue ── tick ─┤
//! Client B ──┘        │                └──► Client B
//!                     ▼
//!              Document (quill-core)
//!                     │ commit
//!                     ▼
//!              Delta (VERSION n … END)
//!                     │
//!              AuditLog + broadcast
//! ```
//!
//! Every broadcast interval the batch loop drains the queue, applies the
//! commands in arrival order against the committed baseline, commits them
//! atomically as one new version and fans the resulting delta out to every
//! admitted session. Queries (`DOC?`, `PERM?`, `LOG?`) bypass the queue and
//! are answered inline by the session task.
//!
//! ## Modules
//!
//! - [`protocol`]: line-oriented command grammar, results, delta blocks
//! - [`queue`]: FIFO command queue shared by all producers
//! - [`roles`]: on-disk role store (`name role` per line)
//! - [`registry`]: fixed-capacity session table and broadcast fan-out
//! - [`audit`]: append-only log of every delta ever committed
//! - [`engine`]: the batch/commit/broadcast tick
//! - [`server`]: TCP server: handshake, session tasks, shutdown
//! - [`client`]: line client used by the interactive binary
//! - [`snapshot`]: committed-document snapshot writer

pub mod audit;
pub mod client;
pub mod engine;
pub mod protocol;
pub mod queue;
pub mod registry;
pub mod roles;
pub mod server;
pub mod snapshot;

pub use audit::AuditLog;
pub use client::{Bootstrap, ClientError, SyncClient};
pub use protocol::{Command, CommandOutcome, Delta, DeltaEntry, ProtocolError};
pub use queue::{CommandQueue, QueuedCommand};
pub use registry::{AdmitError, SessionRegistry};
pub use roles::{Role, RoleStore};
pub use server::{CollabServer, ServerConfig, ServerContext, ServerError};
