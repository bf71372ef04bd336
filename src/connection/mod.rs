//! Connection Handler Module
//!
//! Each accepted client runs in its own task, so one slow client never holds
//! up another. The loop is generic over the stream type; the server hands it
//! a `TcpStream`, tests hand it a mock.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                     TCP Listener                            │
//! │                     (main.rs)                               │
//! └──────────────────────┬──────────────────────────────────────┘
//!                        │
//!                        │ accept(), spawn task
//!                        ▼
//! ┌─────────────────────────────────────────────────────────────┐
//! │                 ConnectionHandler                           │
//! │                                                             │
//! │  ┌─────────────┐    ┌─────────────┐    ┌─────────────┐      │
//! │  │ Read bytes  │───>│ Split lines │───>│ Registry    │      │
//! │  └─────────────┘    └─────────────┘    └──────┬──────┘      │
//! │                                               │             │
//! │                                               ▼             │
//! │                                      ┌─────────────┐        │
//! │                                      │ Send resp   │        │
//! │                                      └─────────────┘        │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Example
//!
//! ```ignore
//! use snapkv::commands::CommandRegistry;
//! use snapkv::connection::{handle_connection, ConnectionStats};
//! use std::sync::Arc;
//!
//! let registry = Arc::new(CommandRegistry::with_defaults(&ctx));
//! let stats = Arc::new(ConnectionStats::new());
//!
//! // For each accepted connection...
//! let (stream, addr) = listener.accept().await?;
//! tokio::spawn(handle_connection(stream, addr.to_string(), registry.clone(), stats.clone()));
//! ```

pub mod handler;

pub use handler::{handle_connection, ConnectionError, ConnectionHandler, ConnectionStats};
