//! Persistence Module
//!
//! Snapshot files, the timer that writes them and the append log that keeps
//! them current between full saves.
//!
//! ## Architecture
//!
//! ```text
//!   SET handler ──> AppendLog ──> (task) ──> SnapshotCodec::append_entry
//!                                                  │
//!   SnapshotScheduler ──(every period)──> SnapshotCodec::save ──> dump.rdb
//!                                                  │
//!   startup ──> SnapshotCodec::write_header, SnapshotCodec::load
//! ```
//!
//! ## Modules
//!
//! - `codec`: binary snapshot format, save/append/load
//! - `scheduler`: periodic background save
//! - `append`: non-blocking single-mutation durability

pub mod append;
pub mod codec;
pub mod scheduler;

pub use append::{AppendLog, AppendRecord};
pub use codec::{LoadReport, SaveReport, SnapshotCodec, SnapshotError, SnapshotResult, MAGIC_HEADER};
pub use scheduler::{run_snapshot, SchedulerConfig, SnapshotScheduler};
