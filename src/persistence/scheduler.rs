//! Periodic Snapshot Scheduler
//!
//! A background task that rewrites the snapshot file on a fixed period.
//!
//! ## Design
//!
//! The scheduler runs as a Tokio task and:
//! 1. Waits for the initial delay
//! 2. Calls [`SnapshotCodec::save`] on the blocking pool
//! 3. Logs the outcome and sleeps for one period
//!
//! A failed save is logged and the next tick runs as usual. The scheduler
//! owns no data of its own.

use crate::persistence::SnapshotCodec;
use crate::storage::Store;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tracing::{debug, error, info};

/// Configuration for the snapshot scheduler.
#[derive(Debug, Clone)]
pub struct SchedulerConfig {
    /// Delay before the first snapshot (default: none)
    pub initial_delay: Duration,

    /// Time between snapshots (default: 24 hours)
    pub period: Duration,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            initial_delay: Duration::ZERO,
            period: Duration::from_secs(24 * 60 * 60),
        }
    }
}

/// A handle to the running scheduler.
///
/// When this handle is dropped, the scheduler task is stopped.
#[derive(Debug)]
pub struct SnapshotScheduler {
    /// Sender to signal shutdown
    shutdown_tx: watch::Sender<bool>,
}

impl SnapshotScheduler {
    /// Starts the scheduler as a background task.
    ///
    /// # Example
    ///
    /// ```ignore
    /// use snapkv::persistence::{SchedulerConfig, SnapshotCodec, SnapshotScheduler};
    /// use snapkv::storage::Store;
    /// use std::sync::Arc;
    ///
    /// let store = Arc::new(Store::new());
    /// let codec = Arc::new(SnapshotCodec::new("/tmp/snapkv/dump.rdb"));
    /// let scheduler = SnapshotScheduler::start(store, codec, SchedulerConfig::default());
    ///
    /// // Dropping the handle stops the timer
    /// drop(scheduler);
    /// ```
    pub fn start(store: Arc<Store>, codec: Arc<SnapshotCodec>, config: SchedulerConfig) -> Self {
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        info!(
            initial_delay_secs = config.initial_delay.as_secs(),
            period_secs = config.period.as_secs(),
            path = %codec.path().display(),
            "Snapshot scheduler started"
        );

        tokio::spawn(scheduler_loop(store, codec, config, shutdown_rx));

        Self { shutdown_tx }
    }

    /// Stops the scheduler.
    ///
    /// This is called automatically when the handle is dropped.
    pub fn stop(&self) {
        if self.shutdown_tx.send(true).is_ok() {
            info!("Snapshot scheduler stopped");
        }
    }
}

impl Drop for SnapshotScheduler {
    fn drop(&mut self) {
        self.stop();
    }
}

/// The main scheduler loop.
async fn scheduler_loop(
    store: Arc<Store>,
    codec: Arc<SnapshotCodec>,
    config: SchedulerConfig,
    mut shutdown_rx: watch::Receiver<bool>,
) {
    // A zero period would make `interval_at` panic
    let period = config.period.max(Duration::from_millis(1));
    let mut ticker = interval_at(Instant::now() + config.initial_delay, period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = ticker.tick() => {}
            result = shutdown_rx.changed() => {
                if result.is_err() || *shutdown_rx.borrow() {
                    debug!("Snapshot scheduler received shutdown signal");
                    return;
                }
            }
        }

        run_snapshot(&store, &codec).await;
    }
}

/// Runs one save on the blocking pool and logs the outcome.
pub async fn run_snapshot(store: &Arc<Store>, codec: &Arc<SnapshotCodec>) {
    let store = Arc::clone(store);
    let codec = Arc::clone(codec);
    let path = codec.path().to_path_buf();

    match tokio::task::spawn_blocking(move || codec.save(&store)).await {
        Ok(Ok(report)) => debug!(
            written = report.written,
            skipped_expired = report.skipped_expired,
            "Periodic snapshot complete"
        ),
        Ok(Err(e)) => error!(path = %path.display(), error = %e, "Periodic snapshot failed"),
        Err(e) => error!(path = %path.display(), error = %e, "Snapshot task panicked"),
    }
}
