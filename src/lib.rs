//! # snapkv - A Single-Node In-Memory Key-Value Server
//!
//! snapkv keeps string keys and values in memory, expires them lazily, and
//! survives restarts through a compact binary snapshot file. Clients talk to
//! it over TCP with one plain-text command per line.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                              snapkv                                     │
//! │                                                                         │
//! │  ┌─────────────┐    ┌─────────────┐    ┌─────────────┐                  │
//! │  │ TCP Server  │───>│ Connection  │───>│  Command    │                  │
//! │  │ (Listener)  │    │  Handler    │    │  Registry   │                  │
//! │  └─────────────┘    └─────────────┘    └──────┬──────┘                  │
//! │                                               │                         │
//! │                                               ▼                         │
//! │  ┌─────────────┐    ┌──────────────────────────────────────────────┐    │
//! │  │ Line Parser │    │         Store (RwLock<HashMap>)              │    │
//! │  │ RespValue   │    │   lazy expiry on read, no background sweep   │    │
//! │  └─────────────┘    └──────────────────────┬───────────────────────┘    │
//! │                                            │                            │
//! │                     ┌──────────────────────┴───────────────────────┐    │
//! │                     │  SnapshotCodec <── SnapshotScheduler         │    │
//! │                     │        ▲                                     │    │
//! │                     │        └──────── AppendLog (SET)             │    │
//! │                     └──────────────────────────────────────────────┘    │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```ignore
//! use snapkv::commands::{CommandRegistry, ServerContext};
//! use snapkv::config::ServerConfig;
//! use snapkv::connection::{handle_connection, ConnectionStats};
//! use snapkv::persistence::SnapshotCodec;
//! use snapkv::storage::Store;
//! use std::sync::Arc;
//! use tokio::net::TcpListener;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = ServerConfig::default();
//!     let store = Arc::new(Store::new());
//!     let codec = Arc::new(SnapshotCodec::new(config.db_path()));
//!
//!     let ctx = ServerContext {
//!         store,
//!         codec,
//!         config: Arc::new(config.clone()),
//!         append_log: None,
//!     };
//!     let registry = Arc::new(CommandRegistry::with_defaults(&ctx));
//!     let stats = Arc::new(ConnectionStats::new());
//!
//!     let listener = TcpListener::bind(config.bind_address()).await?;
//!     loop {
//!         let (stream, addr) = listener.accept().await?;
//!         tokio::spawn(handle_connection(
//!             stream,
//!             addr.to_string(),
//!             Arc::clone(&registry),
//!             Arc::clone(&stats),
//!         ));
//!     }
//! }
//! ```
//!
//! ## Supported Commands
//!
//! - `PING`
//! - `ECHO [word ...]`
//! - `SET key value [px seconds]`
//! - `GET key`
//! - `CONFIG GET name`
//! - `KEYS *`
//! - `INFO [replication|keyspace]`
//! - `SAVE`
//! - `DEBUG RELOAD`
//!
//! ## Module Overview
//!
//! - [`storage`]: The concurrent expiring store
//! - [`persistence`]: Snapshot codec, periodic scheduler and append log
//! - [`protocol`]: Line framing and wire response types
//! - [`commands`]: Verb registry and command handlers
//! - [`connection`]: Client connection management
//! - [`config`]: Startup flags

pub mod commands;
pub mod config;
pub mod connection;
pub mod persistence;
pub mod protocol;
pub mod storage;

// Re-export commonly used types for convenience
pub use commands::{CommandRegistry, ServerContext};
pub use config::{ServerConfig, DEFAULT_HOST, DEFAULT_PORT};
pub use connection::{handle_connection, ConnectionStats};
pub use persistence::{AppendLog, SnapshotCodec, SnapshotScheduler};
pub use protocol::{ErrorKind, RespValue};
pub use storage::{Entry, Store};

/// Version of snapkv
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
