//! Append Log
//!
//! SET hands every mutation to this sink so it reaches the snapshot file
//! between full saves. The client's response never waits on the disk: records
//! go into an unbounded channel and a single background task appends them one
//! at a time, in the order they were sent.

use crate::persistence::SnapshotCodec;
use crate::storage::Entry;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, error, trace, warn};

/// One mutation waiting to be appended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppendRecord {
    pub key: String,
    pub entry: Entry,
}

/// Sending half of the append log. Cheap to clone.
#[derive(Debug, Clone)]
pub struct AppendLog {
    tx: mpsc::UnboundedSender<AppendRecord>,
}

impl AppendLog {
    /// Creates a log whose records are delivered to the returned receiver.
    pub fn channel() -> (Self, mpsc::UnboundedReceiver<AppendRecord>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }

    /// Creates a log backed by a background task that appends to `codec`.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn start(codec: Arc<SnapshotCodec>) -> Self {
        let (log, rx) = Self::channel();
        tokio::spawn(drain(rx, codec));
        log
    }

    /// Queues a record. Never blocks and never fails the caller.
    pub fn record(&self, key: &str, entry: &Entry) {
        let record = AppendRecord {
            key: key.to_string(),
            entry: entry.clone(),
        };
        if self.tx.send(record).is_err() {
            warn!(key, "Append log is closed, mutation not persisted");
        }
    }
}

async fn drain(mut rx: mpsc::UnboundedReceiver<AppendRecord>, codec: Arc<SnapshotCodec>) {
    while let Some(record) = rx.recv().await {
        let codec = Arc::clone(&codec);
        let key = record.key.clone();

        match tokio::task::spawn_blocking(move || codec.append_entry(&record.key, &record.entry)).await {
            Ok(Ok(())) => trace!(key = %key, "Mutation appended"),
            Ok(Err(e)) => warn!(key = %key, error = %e, "Append to snapshot failed"),
            Err(e) => error!(key = %key, error = %e, "Append task panicked"),
        }
    }
    debug!("Append log closed");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::Store;
    use std::time::Duration;
    use tempfile::tempdir;

    #[test]
    fn test_record_delivers_in_order() {
        let (log, mut rx) = AppendLog::channel();

        log.record("a", &Entry::new("1"));
        log.record("a", &Entry::new("2"));

        assert_eq!(rx.try_recv().unwrap().entry.value, "1");
        assert_eq!(rx.try_recv().unwrap().entry.value, "2");
    }

    #[test]
    fn test_record_after_close_does_not_panic() {
        let (log, rx) = AppendLog::channel();
        drop(rx);
        log.record("a", &Entry::new("1"));
    }

    #[tokio::test]
    async fn test_started_log_appends_to_file() {
        let dir = tempdir().unwrap();
        let codec = Arc::new(SnapshotCodec::new(dir.path().join("dump.rdb")));
        let log = AppendLog::start(Arc::clone(&codec));

        log.record("first", &Entry::new("1"));
        log.record("second", &Entry::new("2"));
        log.record("first", &Entry::new("3"));
        tokio::time::sleep(Duration::from_millis(100)).await;

        let store = Store::new();
        let report = codec.load(&store).unwrap();
        assert_eq!(report.appended, 3);
        assert_eq!(store.get("first"), Some("3".to_string()));
        assert_eq!(store.get("second"), Some("2".to_string()));
    }
}
