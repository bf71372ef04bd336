//! Storage Module
//!
//! This module provides the concurrent expiring map that backs snapkv.
//!
//! ## Features
//!
//! - **RwLock**: Multiple concurrent readers, exclusive writers
//! - **Absolute Expiry**: Entries may carry a wall-clock expiry
//! - **Lazy Expiry**: Expired keys are ignored and removed on access
//!
//! ## Example
//!
//! ```
//! use snapkv::storage::{Entry, Store};
//! use std::time::Duration;
//!
//! let store = Store::new();
//! store.put("name", "snapkv", None);
//! store.put_entry("session".to_string(), Entry::with_ttl("abc", Duration::from_secs(5)));
//!
//! assert_eq!(store.get("session"), Some("abc".to_string()));
//! ```

pub mod engine;

pub use engine::{from_epoch_secs, to_epoch_secs, Entry, Store, StoreStats};
