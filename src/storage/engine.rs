//! Concurrent Expiring Store
//!
//! This module implements the in-memory key-value map that every other part of
//! snapkv reads from and writes to. Values are UTF-8 strings and may carry an
//! absolute expiry expressed as wall-clock time.
//!
//! ## Design Decisions
//!
//! 1. **One RwLock**: Readers run concurrently, a writer excludes everybody.
//! 2. **Lazy Expiry**: There is no background sweep. A read that finds an
//!    expired entry treats it as absent and removes it on the spot.
//! 3. **Wall-Clock Expiry**: Expiry is a `SystemTime` so it survives a
//!    snapshot round trip as epoch seconds.
//!
//! ## Read-or-Evict
//!
//! ```text
//!   read lock ──> live?  ──yes──> return value
//!                   │
//!                   no (expired)
//!                   │
//!   release read, take write ──> still expired (fresh clock)? ──> remove
//!                   │
//!   downgrade write to read ──> return None
//! ```
//!
//! The second check under the write lock matters: between releasing the read
//! lock and acquiring the write lock another client may have replaced the key
//! with a live value, and that value must not be deleted.

use parking_lot::{RwLock, RwLockWriteGuard};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use tracing::trace;

/// A stored value with an optional absolute expiry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Entry {
    /// The stored value
    pub value: String,
    /// When this entry stops being visible (None = never)
    pub expiry: Option<SystemTime>,
}

impl Entry {
    /// Creates an entry that never expires.
    pub fn new(value: impl Into<String>) -> Self {
        Self {
            value: value.into(),
            expiry: None,
        }
    }

    /// Creates an entry that expires at an absolute point in time.
    pub fn with_expiry(value: impl Into<String>, expiry: SystemTime) -> Self {
        Self {
            value: value.into(),
            expiry: Some(expiry),
        }
    }

    /// Creates an entry that expires `ttl` from now.
    ///
    /// A TTL too large to represent is treated as "never expires".
    pub fn with_ttl(value: impl Into<String>, ttl: Duration) -> Self {
        Self {
            value: value.into(),
            expiry: SystemTime::now().checked_add(ttl),
        }
    }

    /// Checks if this entry is expired at `now`.
    ///
    /// An entry is live only while its expiry is strictly after `now`.
    #[inline]
    pub fn is_expired_at(&self, now: SystemTime) -> bool {
        self.expiry.map(|exp| exp <= now).unwrap_or(false)
    }

    /// Returns the expiry as whole seconds since the Unix epoch.
    pub fn expiry_epoch_secs(&self) -> Option<i64> {
        self.expiry.map(to_epoch_secs)
    }
}

/// Converts a wall-clock time to whole seconds since the Unix epoch.
///
/// Times before the epoch map to negative values.
pub fn to_epoch_secs(time: SystemTime) -> i64 {
    match time.duration_since(UNIX_EPOCH) {
        Ok(after) => i64::try_from(after.as_secs()).unwrap_or(i64::MAX),
        Err(before) => -i64::try_from(before.duration().as_secs()).unwrap_or(i64::MAX),
    }
}

/// Converts seconds since the Unix epoch back to a wall-clock time.
pub fn from_epoch_secs(secs: i64) -> SystemTime {
    let magnitude = Duration::from_secs(secs.unsigned_abs());
    if secs >= 0 {
        UNIX_EPOCH.checked_add(magnitude).unwrap_or(UNIX_EPOCH)
    } else {
        UNIX_EPOCH.checked_sub(magnitude).unwrap_or(UNIX_EPOCH)
    }
}

/// Removes `key` if its entry is expired at `now`. A live entry stays.
fn evict_if_expired(data: &mut HashMap<String, Entry>, key: &str, now: SystemTime) -> bool {
    let expired = data.get(key).is_some_and(|entry| entry.is_expired_at(now));
    if expired {
        data.remove(key);
    }
    expired
}

/// Counters describing store activity.
#[derive(Debug, Clone, Default)]
pub struct StoreStats {
    /// Number of keys in the backing map (may include not-yet-evicted keys)
    pub keys: u64,
    /// Total GET operations
    pub get_ops: u64,
    /// Total PUT operations
    pub put_ops: u64,
    /// Keys removed by lazy eviction
    pub expired: u64,
}

/// The shared key-value store.
///
/// Construct one per server and hand it around in an `Arc`; there is no
/// global instance.
///
/// # Example
///
/// ```
/// use snapkv::storage::Store;
///
/// let store = Store::new();
/// store.put("name", "snapkv", None);
/// assert_eq!(store.get("name"), Some("snapkv".to_string()));
/// ```
pub struct Store {
    data: RwLock<HashMap<String, Entry>>,

    /// Statistics: total GET operations
    get_count: AtomicU64,

    /// Statistics: total PUT operations
    put_count: AtomicU64,

    /// Statistics: keys removed by lazy eviction
    expired_count: AtomicU64,
}

impl std::fmt::Debug for Store {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Store")
            .field("keys", &self.data.read().len())
            .field("get_count", &self.get_count.load(Ordering::Relaxed))
            .field("put_count", &self.put_count.load(Ordering::Relaxed))
            .finish()
    }
}

impl Default for Store {
    fn default() -> Self {
        Self::new()
    }
}

impl Store {
    /// Creates an empty store.
    pub fn new() -> Self {
        Self {
            data: RwLock::new(HashMap::new()),
            get_count: AtomicU64::new(0),
            put_count: AtomicU64::new(0),
            expired_count: AtomicU64::new(0),
        }
    }

    /// Stores `value` under `key`, replacing whatever was there.
    pub fn put(&self, key: impl Into<String>, value: impl Into<String>, expiry: Option<SystemTime>) {
        self.put_entry(
            key.into(),
            Entry {
                value: value.into(),
                expiry,
            },
        );
    }

    /// Stores a prepared entry under `key`, replacing whatever was there.
    pub fn put_entry(&self, key: String, entry: Entry) {
        self.put_entry_with(key, entry, |_, _| {});
    }

    /// Stores a prepared entry and calls `on_write` before releasing the
    /// write lock.
    ///
    /// Writers to the same key run `on_write` in the order their values land
    /// in the map, so anything recorded there replays in the same order.
    pub fn put_entry_with<F>(&self, key: String, entry: Entry, on_write: F)
    where
        F: FnOnce(&str, &Entry),
    {
        self.put_count.fetch_add(1, Ordering::Relaxed);
        let mut data = self.data.write();
        on_write(&key, &entry);
        data.insert(key, entry);
    }

    /// Replaces the whole contents of the store in one step.
    ///
    /// Readers see either the old map or the new one, never a mix.
    pub fn replace_all(&self, entries: Vec<(String, Entry)>) {
        let fresh: HashMap<String, Entry> = entries.into_iter().collect();
        *self.data.write() = fresh;
    }

    /// Gets the value for a key.
    ///
    /// Returns `None` if the key doesn't exist or its expiry is not after now.
    pub fn get(&self, key: &str) -> Option<String> {
        self.get_entry(key).map(|entry| entry.value)
    }

    /// Gets the full entry for a key, including its expiry.
    pub fn get_entry(&self, key: &str) -> Option<Entry> {
        self.get_count.fetch_add(1, Ordering::Relaxed);
        self.read_or_evict(key)
    }

    /// The two-phase read path.
    ///
    /// Fast path under the read lock. When the entry is expired the read lock
    /// is released, the write lock taken, the entry re-checked against a
    /// freshly sampled clock and removed only if it is still expired. The
    /// write lock is then downgraded so the call ends under read access.
    fn read_or_evict(&self, key: &str) -> Option<Entry> {
        {
            let data = self.data.read();
            match data.get(key) {
                None => return None,
                Some(entry) if !entry.is_expired_at(SystemTime::now()) => {
                    return Some(entry.clone());
                }
                Some(_) => {}
            }
        }

        self.evict_slow(key)
    }

    /// Write phase of [`Store::read_or_evict`].
    ///
    /// The answer was decided under the read lock, so this returns `None`
    /// even when a writer replaced the key in the meantime.
    fn evict_slow(&self, key: &str) -> Option<Entry> {
        let mut data = self.data.write();
        if evict_if_expired(&mut data, key, SystemTime::now()) {
            self.expired_count.fetch_add(1, Ordering::Relaxed);
            trace!(key, "Evicted expired key");
        }

        let _read = RwLockWriteGuard::downgrade(data);
        None
    }

    /// Returns a copy of every (key, entry) pair as of now.
    ///
    /// Expired entries that have not been evicted yet are included; callers
    /// filter with [`Entry::is_expired_at`]. No lock is held once this returns.
    pub fn entries(&self) -> Vec<(String, Entry)> {
        self.data
            .read()
            .iter()
            .map(|(key, entry)| (key.clone(), entry.clone()))
            .collect()
    }

    /// Returns every key whose entry is live right now.
    pub fn live_keys(&self) -> Vec<String> {
        let now = SystemTime::now();
        self.data
            .read()
            .iter()
            .filter(|(_, entry)| !entry.is_expired_at(now))
            .map(|(key, _)| key.clone())
            .collect()
    }

    /// Returns the number of keys in the backing map.
    ///
    /// Expired keys that nobody has read yet are still counted.
    pub fn len(&self) -> usize {
        self.data.read().len()
    }

    /// Returns true if the backing map is empty.
    pub fn is_empty(&self) -> bool {
        self.data.read().is_empty()
    }

    /// Returns the current statistics.
    pub fn stats(&self) -> StoreStats {
        StoreStats {
            keys: self.len() as u64,
            get_ops: self.get_count.load(Ordering::Relaxed),
            put_ops: self.put_count.load(Ordering::Relaxed),
            expired: self.expired_count.load(Ordering::Relaxed),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;

    fn past() -> SystemTime {
        SystemTime::now() - Duration::from_secs(1)
    }

    #[test]
    fn test_put_get() {
        let store = Store::new();

        store.put("key", "value", None);
        assert_eq!(store.get("key"), Some("value".to_string()));
        assert_eq!(store.get("key"), Some("value".to_string()));
    }

    #[test]
    fn test_get_missing() {
        let store = Store::new();
        assert_eq!(store.get("missing"), None);
    }

    #[test]
    fn test_put_replaces() {
        let store = Store::new();

        store.put("key", "old", Some(past()));
        store.put("key", "new", None);

        assert_eq!(store.get("key"), Some("new".to_string()));
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn test_expired_is_absent_and_evicted() {
        let store = Store::new();

        store.put("key", "value", Some(past()));
        assert_eq!(store.len(), 1);

        assert_eq!(store.get("key"), None);
        assert_eq!(store.len(), 0);
        assert_eq!(store.stats().expired, 1);

        // Stays absent on every later read
        assert_eq!(store.get("key"), None);
        assert_eq!(store.get("key"), None);
    }

    #[test]
    fn test_future_expiry_is_visible() {
        let store = Store::new();

        store.put_entry("key".into(), Entry::with_ttl("value", Duration::from_secs(60)));
        assert_eq!(store.get("key"), Some("value".to_string()));
    }

    #[test]
    fn test_expiry_boundary_is_expired() {
        let now = SystemTime::now();
        let entry = Entry::with_expiry("value", now);

        assert!(entry.is_expired_at(now));
        assert!(!entry.is_expired_at(now - Duration::from_millis(1)));
        assert!(!Entry::new("value").is_expired_at(now));
    }

    #[test]
    fn test_short_ttl_expires() {
        let store = Store::new();

        store.put_entry("key".into(), Entry::with_ttl("value", Duration::from_millis(20)));
        assert_eq!(store.get("key"), Some("value".to_string()));

        thread::sleep(Duration::from_millis(50));
        assert_eq!(store.get("key"), None);
    }

    #[test]
    fn test_entries_and_live_keys() {
        let store = Store::new();

        store.put("a", "1", None);
        store.put("b", "2", None);
        store.put("gone", "3", Some(past()));

        assert_eq!(store.entries().len(), 3);

        let mut keys = store.live_keys();
        keys.sort();
        assert_eq!(keys, vec!["a".to_string(), "b".to_string()]);
    }

    #[test]
    fn test_epoch_conversion() {
        let time = UNIX_EPOCH + Duration::from_secs(1_700_000_000);
        assert_eq!(to_epoch_secs(time), 1_700_000_000);
        assert_eq!(from_epoch_secs(1_700_000_000), time);

        let before = UNIX_EPOCH - Duration::from_secs(5);
        assert_eq!(to_epoch_secs(before), -5);
        assert_eq!(from_epoch_secs(-5), before);
    }

    #[test]
    fn test_concurrent_put_get_never_torn() {
        let store = Arc::new(Store::new());
        let v1 = "a".repeat(4096);
        let v2 = "b".repeat(4096);
        store.put("k", v2.clone(), None);

        let mut handles = vec![];

        for i in 0..4 {
            let store = Arc::clone(&store);
            let (v1, v2) = (v1.clone(), v2.clone());
            handles.push(thread::spawn(move || {
                for j in 0..500 {
                    let value = if (i + j) % 2 == 0 { &v1 } else { &v2 };
                    store.put("k", value.clone(), None);
                }
            }));
        }

        for _ in 0..4 {
            let store = Arc::clone(&store);
            let (v1, v2) = (v1.clone(), v2.clone());
            handles.push(thread::spawn(move || {
                for _ in 0..500 {
                    let seen = store.get("k").unwrap_or_default();
                    assert!(seen == v1 || seen == v2);
                }
            }));
        }

        for handle in handles {
            handle.join().unwrap();
        }
    }

    #[test]
    fn test_evict_if_expired_keeps_live_replacement() {
        let now = SystemTime::now();
        let mut data = HashMap::new();
        data.insert("fresh".to_string(), Entry::with_ttl("new", Duration::from_secs(60)));
        data.insert("stale".to_string(), Entry::with_expiry("old", now));

        assert!(!evict_if_expired(&mut data, "fresh", now));
        assert!(evict_if_expired(&mut data, "stale", now));
        assert!(!evict_if_expired(&mut data, "missing", now));

        assert_eq!(data.get("fresh").map(|e| e.value.as_str()), Some("new"));
        assert!(!data.contains_key("stale"));
    }

    #[test]
    fn test_evict_slow_after_replacement_misses_but_keeps_value() {
        let store = Store::new();

        // Simulates a writer landing between the read and write phases
        store.put("key", "old", Some(past()));
        store.put("key", "new", None);

        assert_eq!(store.evict_slow("key"), None);
        assert_eq!(store.stats().expired, 0);
        assert_eq!(store.get("key"), Some("new".to_string()));
    }

    #[test]
    fn test_put_entry_with_runs_under_write_lock() {
        let store = Store::new();
        let mut seen = None;

        store.put_entry_with("key".into(), Entry::new("value"), |key, entry| {
            assert!(store.data.try_read().is_none());
            seen = Some((key.to_string(), entry.value.clone()));
        });

        assert_eq!(seen, Some(("key".to_string(), "value".to_string())));
        assert_eq!(store.get("key"), Some("value".to_string()));
    }

    #[test]
    fn test_put_entry_with_orders_hook_like_map() {
        let store = Arc::new(Store::new());
        let log = Arc::new(parking_lot::Mutex::new(Vec::new()));

        let mut handles = vec![];
        for i in 0..8 {
            let store = Arc::clone(&store);
            let log = Arc::clone(&log);
            handles.push(thread::spawn(move || {
                for j in 0..200 {
                    let value = format!("{}-{}", i, j);
                    store.put_entry_with("k".into(), Entry::new(value), |_, entry| {
                        log.lock().push(entry.value.clone());
                    });
                }
            }));
        }

        for handle in handles {
            handle.join().unwrap();
        }

        assert_eq!(log.lock().last().cloned(), store.get("k"));
    }

    #[test]
    fn test_replace_all_drops_missing_keys() {
        let store = Store::new();
        store.put("old", "1", None);
        store.put("kept", "2", None);

        store.replace_all(vec![
            ("kept".to_string(), Entry::new("3")),
            ("new".to_string(), Entry::new("4")),
        ]);

        assert_eq!(store.get("old"), None);
        assert_eq!(store.get("kept"), Some("3".to_string()));
        assert_eq!(store.get("new"), Some("4".to_string()));
        assert_eq!(store.len(), 2);
    }

    #[test]
    fn test_stats_counts_operations() {
        let store = Store::new();
        store.put("a", "1", None);
        store.put("b", "2", Some(past()));
        store.get("a");
        store.get("b");

        let stats = store.stats();
        assert_eq!(stats.keys, 1);
        assert_eq!(stats.put_ops, 2);
        assert_eq!(stats.get_ops, 2);
        assert_eq!(stats.expired, 1);
    }

    #[test]
    fn test_concurrent_eviction() {
        let store = Arc::new(Store::new());
        for i in 0..100 {
            store.put(format!("key-{}", i), "value", Some(past()));
        }

        let mut handles = vec![];
        for _ in 0..8 {
            let store = Arc::clone(&store);
            handles.push(thread::spawn(move || {
                for i in 0..100 {
                    assert_eq!(store.get(&format!("key-{}", i)), None);
                }
            }));
        }

        for handle in handles {
            handle.join().unwrap();
        }

        assert!(store.is_empty());
    }
}
