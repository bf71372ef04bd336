//! Binary Snapshot Codec
//!
//! This module encodes the store's entries into the snapshot file format and
//! decodes them back. It knows nothing about the network or about timers.
//!
//! ## File Format
//!
//! All integers are big-endian.
//!
//! ```text
//! [ header length: u16 ][ header bytes: "BYDRDB" ]
//! [ entry count: i32 ]
//! repeated entry count times:
//!   [ key length: i32 ][ key bytes ]
//!   [ value length: i32 ][ value bytes ]
//!   [ expiry flag: u8, 0 or 1 ]
//!   [ expiry: i64 epoch seconds, only if flag == 1 ]
//! [ zero or more appended records, same layout, not counted ]
//! ```
//!
//! Example record for key `foo`, value `bar`, no expiry:
//!
//! ```text
//! 00 00 00 03  66 6f 6f  00 00 00 03  62 61 72  00
//! ```
//!
//! ## Write Modes
//!
//! - `save` rebuilds the whole file in a temp file and renames it over the
//!   target, so readers see either the old image or the new one.
//! - `append_entry` adds a single record at the end without touching the
//!   count. `load` picks these up after the counted records and stops quietly
//!   at a partially written tail.
//!
//! Every write to the file goes through one mutex owned by the codec.

use crate::storage::{from_epoch_secs, Entry, Store};
use bytes::{Buf, BufMut, BytesMut};
use parking_lot::Mutex;
use std::fs::{self, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::string::FromUtf8Error;
use std::time::SystemTime;
use thiserror::Error;
use tracing::{debug, info, warn};

/// The magic string every snapshot file starts with.
pub const MAGIC_HEADER: &str = "BYDRDB";

/// Errors that can occur while reading or writing a snapshot.
#[derive(Debug, Error)]
pub enum SnapshotError {
    /// The file could not be read or written
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// The file does not start with the expected magic header
    #[error("unrecognized snapshot header: {found:?}")]
    BadHeader { found: String },

    /// A key or value is not valid UTF-8
    #[error("invalid UTF-8 in snapshot record: {0}")]
    InvalidUtf8(#[from] FromUtf8Error),

    /// A key, value or entry count does not fit the format's i32 fields
    #[error("record too large: {0} bytes")]
    TooLarge(usize),
}

/// Result type for snapshot operations.
pub type SnapshotResult<T> = Result<T, SnapshotError>;

/// What a `save` wrote.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct SaveReport {
    /// Records written to the file
    pub written: usize,
    /// Entries left out because they were expired at flush time
    pub skipped_expired: usize,
}

/// What a `load` read.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct LoadReport {
    /// Entry count declared after the header
    pub declared: usize,
    /// Records applied to the store, counted and appended
    pub loaded: usize,
    /// Records found after the counted section
    pub appended: usize,
    /// True if decoding stopped at an incomplete record
    pub truncated: bool,
}

/// Reads and writes the snapshot file at one path.
#[derive(Debug)]
pub struct SnapshotCodec {
    path: PathBuf,
    /// Serializes all writers of `path`
    gate: Mutex<()>,
}

impl SnapshotCodec {
    /// Creates a codec for the snapshot file at `path`.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            gate: Mutex::new(()),
        }
    }

    /// The snapshot file this codec reads and writes.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Stamps the magic header into the file if it is absent or empty.
    ///
    /// Returns `true` if the header was written. Calling it on a file that
    /// already has content does nothing.
    pub fn write_header(&self) -> SnapshotResult<bool> {
        let _gate = self.gate.lock();

        if file_len(&self.path)? > 0 {
            return Ok(false);
        }

        ensure_parent(&self.path)?;
        let mut buf = BytesMut::with_capacity(header_len());
        encode_header(&mut buf);
        fs::write(&self.path, &buf)?;

        debug!(path = %self.path.display(), "Wrote snapshot header");
        Ok(true)
    }

    /// Rewrites the whole file from the store's live entries.
    pub fn save(&self, store: &Store) -> SnapshotResult<SaveReport> {
        // Held across enumeration so an append for a newer write cannot land
        // in the file this save is about to replace.
        let _gate = self.gate.lock();
        let now = SystemTime::now();
        let mut report = SaveReport::default();
        let mut body = BytesMut::new();

        for (key, entry) in store.entries() {
            if entry.is_expired_at(now) {
                report.skipped_expired += 1;
                debug!(key = %key, "Skipping expired entry");
                continue;
            }
            encode_record(&mut body, &key, &entry)?;
            report.written += 1;
        }

        let count = i32::try_from(report.written).map_err(|_| SnapshotError::TooLarge(report.written))?;
        let mut buf = BytesMut::with_capacity(header_len() + 4 + body.len());
        encode_header(&mut buf);
        buf.put_i32(count);
        buf.unsplit(body);

        ensure_parent(&self.path)?;

        let temp = temp_path(&self.path);
        if let Err(e) = write_synced(&temp, &buf).and_then(|_| fs::rename(&temp, &self.path)) {
            let _ = fs::remove_file(&temp);
            return Err(e.into());
        }

        info!(
            path = %self.path.display(),
            written = report.written,
            skipped_expired = report.skipped_expired,
            "Snapshot saved"
        );
        Ok(report)
    }

    /// Appends one record to the end of the file.
    ///
    /// The entry count is left alone. A missing or empty file first gets a
    /// header and a zero count, a header-only file gets a zero count, so the
    /// record always lands after the counted section.
    pub fn append_entry(&self, key: &str, entry: &Entry) -> SnapshotResult<()> {
        let _gate = self.gate.lock();

        let existing = file_len(&self.path)?;
        let mut buf = BytesMut::new();
        if existing == 0 {
            encode_header(&mut buf);
            buf.put_i32(0);
        } else if existing == header_len() as u64 {
            buf.put_i32(0);
        }
        encode_record(&mut buf, key, entry)?;

        ensure_parent(&self.path)?;
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)?;
        file.write_all(&buf)?;
        file.flush()?;

        debug!(path = %self.path.display(), key = %key, bytes = buf.len(), "Appended snapshot record");
        Ok(())
    }

    /// Reads the file and puts every decoded entry into `store`.
    ///
    /// The header must match exactly; on a mismatch the store is not touched.
    /// Entries already in the store under the same key are overwritten, and a
    /// key that occurs twice in the file keeps its last value.
    pub fn load(&self, store: &Store) -> SnapshotResult<LoadReport> {
        let (entries, report) = self.read_image()?;

        for (key, entry) in entries {
            store.put_entry(key, entry);
        }

        info!(
            path = %self.path.display(),
            loaded = report.loaded,
            appended = report.appended,
            "Snapshot loaded"
        );
        Ok(report)
    }

    /// Replaces the store's contents with the file's.
    ///
    /// Keys absent from the file are gone afterwards. The file is decoded in
    /// full first, so a bad header or unreadable file leaves the store as is.
    pub fn reload(&self, store: &Store) -> SnapshotResult<LoadReport> {
        let (entries, report) = self.read_image()?;
        store.replace_all(entries);

        info!(
            path = %self.path.display(),
            loaded = report.loaded,
            appended = report.appended,
            "Snapshot reloaded"
        );
        Ok(report)
    }

    /// Startup restore: stamps the header, loads the file, and rewrites it
    /// when it ends in a torn record.
    ///
    /// Records appended after a torn tail would be unreachable on the next
    /// load, so the tail has to go before the append log starts writing.
    pub fn restore(&self, store: &Store) -> SnapshotResult<LoadReport> {
        self.write_header()?;
        let report = self.load(store)?;

        if report.truncated {
            let saved = self.save(store)?;
            warn!(
                path = %self.path.display(),
                written = saved.written,
                "Rewrote snapshot without its incomplete tail"
            );
        }
        Ok(report)
    }

    fn read_image(&self) -> SnapshotResult<(Vec<(String, Entry)>, LoadReport)> {
        let bytes = fs::read(&self.path)?;
        let (entries, report) = decode(&bytes)?;

        if report.truncated {
            warn!(
                path = %self.path.display(),
                loaded = report.loaded,
                declared = report.declared,
                "Snapshot ends with an incomplete record, ignoring the tail"
            );
        }
        Ok((entries, report))
    }
}

/// Decodes a complete snapshot image.
///
/// Nothing is applied to a store here, so a failure leaves callers untouched.
fn decode(bytes: &[u8]) -> SnapshotResult<(Vec<(String, Entry)>, LoadReport)> {
    let mut report = LoadReport::default();
    let mut entries = Vec::new();

    if bytes.is_empty() {
        return Ok((entries, report));
    }

    let mut buf = bytes;
    check_header(&mut buf)?;

    if buf.remaining() < 4 {
        // Header-only file, nothing stored yet
        report.truncated = buf.has_remaining();
        return Ok((entries, report));
    }
    report.declared = usize::try_from(buf.get_i32()).unwrap_or(0);

    for _ in 0..report.declared {
        match decode_record(&mut buf)? {
            Some(record) => entries.push(record),
            None => {
                report.truncated = true;
                break;
            }
        }
    }

    while !report.truncated && buf.has_remaining() {
        match decode_record(&mut buf)? {
            Some(record) => {
                entries.push(record);
                report.appended += 1;
            }
            None => report.truncated = true,
        }
    }

    report.loaded = entries.len();
    Ok((entries, report))
}

fn check_header(buf: &mut &[u8]) -> SnapshotResult<()> {
    let expected = MAGIC_HEADER.as_bytes();

    if buf.remaining() < 2 {
        return Err(SnapshotError::BadHeader {
            found: String::from_utf8_lossy(buf).into_owned(),
        });
    }
    let len = usize::from(buf.get_u16());
    let available = len.min(buf.remaining());
    let found = &buf[..available];

    if len != expected.len() || found != expected {
        return Err(SnapshotError::BadHeader {
            found: String::from_utf8_lossy(found).into_owned(),
        });
    }
    buf.advance(len);
    Ok(())
}

/// Decodes one record, or returns `None` if the bytes run out first.
///
/// `buf` only advances when a whole record was read.
fn decode_record(buf: &mut &[u8]) -> SnapshotResult<Option<(String, Entry)>> {
    let mut cursor = *buf;

    let Some(key) = take_string(&mut cursor)? else {
        return Ok(None);
    };
    let Some(value) = take_string(&mut cursor)? else {
        return Ok(None);
    };

    if !cursor.has_remaining() {
        return Ok(None);
    }
    let expiry = match cursor.get_u8() {
        0 => None,
        1 => {
            if cursor.remaining() < 8 {
                return Ok(None);
            }
            Some(from_epoch_secs(cursor.get_i64()))
        }
        // A damaged flag byte is treated like a torn write
        _ => return Ok(None),
    };

    *buf = cursor;
    Ok(Some((key, Entry { value, expiry })))
}

fn take_string(cursor: &mut &[u8]) -> SnapshotResult<Option<String>> {
    if cursor.remaining() < 4 {
        return Ok(None);
    }
    let Ok(len) = usize::try_from(cursor.get_i32()) else {
        return Ok(None);
    };
    if cursor.remaining() < len {
        return Ok(None);
    }
    let text = String::from_utf8(cursor[..len].to_vec())?;
    cursor.advance(len);
    Ok(Some(text))
}

fn encode_header(buf: &mut BytesMut) {
    buf.put_u16(MAGIC_HEADER.len() as u16);
    buf.put_slice(MAGIC_HEADER.as_bytes());
}

fn header_len() -> usize {
    2 + MAGIC_HEADER.len()
}

fn encode_record(buf: &mut BytesMut, key: &str, entry: &Entry) -> SnapshotResult<()> {
    put_string(buf, key)?;
    put_string(buf, &entry.value)?;
    match entry.expiry_epoch_secs() {
        Some(secs) => {
            buf.put_u8(1);
            buf.put_i64(secs);
        }
        None => buf.put_u8(0),
    }
    Ok(())
}

fn put_string(buf: &mut BytesMut, s: &str) -> SnapshotResult<()> {
    let len = i32::try_from(s.len()).map_err(|_| SnapshotError::TooLarge(s.len()))?;
    buf.put_i32(len);
    buf.put_slice(s.as_bytes());
    Ok(())
}

fn file_len(path: &Path) -> io::Result<u64> {
    match fs::metadata(path) {
        Ok(meta) => Ok(meta.len()),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(0),
        Err(e) => Err(e),
    }
}

fn ensure_parent(path: &Path) -> io::Result<()> {
    match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => fs::create_dir_all(parent),
        _ => Ok(()),
    }
}

fn temp_path(path: &Path) -> PathBuf {
    let mut name = path.as_os_str().to_owned();
    name.push(".tmp");
    PathBuf::from(name)
}

fn write_synced(path: &Path, bytes: &[u8]) -> io::Result<()> {
    let mut file = fs::File::create(path)?;
    file.write_all(bytes)?;
    file.sync_all()
}
