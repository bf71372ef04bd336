//! Command Module
//!
//! Turns a command line into a response: the registry resolves the verb,
//! the handler does the work against the store and returns a value.
//!
//! ## Architecture
//!
//! ```text
//! Client Line
//!       │
//!       ▼
//! ┌─────────────────┐
//! │ CommandRegistry │  longest-prefix verb lookup
//! └────────┬────────┘
//!          │
//!          ▼
//! ┌─────────────────┐
//! │   Command impl  │  PING, ECHO, SET, GET, CONFIG GET, KEYS,
//! │                 │  INFO, SAVE, DEBUG RELOAD
//! └────────┬────────┘
//!          │
//!          ▼
//! ┌─────────────────┐
//! │ Store / Codec   │  (storage, persistence modules)
//! └─────────────────┘
//! ```
//!
//! Failures come back as [`CommandError`] and are serialized like any other
//! response.

pub mod error;
pub mod handler;
pub mod registry;

pub use error::{CommandError, CommandResult};
pub use handler::ServerContext;
pub use registry::{Command, CommandMatch, CommandRegistry};
