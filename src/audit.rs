//! Persisted audit trail of notification dispatch attempts.
//!
//! Every call to [`Dispatcher::send`](crate::dispatch::Dispatcher::send)
//! that reaches the delivery stage appends exactly one [`LogEntry`], whether
//! the provider accepted the message or not. The trail is bounded: once it
//! holds [`AUDIT_LOG_CAPACITY`] entries, each append evicts the oldest one.
//!
//! # Storage
//!
//! The trail is stored as a single JSON array under [`AUDIT_LOG_KEY`] in a
//! key-value [`AuditStore`]. [`FileStore`] keeps one `<key>.json` file per
//! key in a directory; [`MemoryStore`] is the in-process variant.
//!
//! ```text
//! .metrosite/
//! └── emailLogs.json   # [{"status":"success","senderIdentity":...}, ...]
//! ```
//!
//! # Failure policy
//!
//! Logging is best-effort. A missing key, unreadable file, or corrupt JSON
//! reads as an empty trail, and a failed write is reported through
//! `tracing` and otherwise ignored. Nothing in this module can make a
//! dispatch fail.

use chrono::{SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, VecDeque};
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use tracing::{debug, warn};

/// Maximum number of entries kept in the trail.
pub const AUDIT_LOG_CAPACITY: usize = 50;

/// Store key holding the JSON-encoded trail.
pub const AUDIT_LOG_KEY: &str = "emailLogs";

/// Outcome of a single dispatch attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AttemptStatus {
    Success,
    Error,
}

/// One dispatch attempt. Never mutated after it is appended.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LogEntry {
    pub status: AttemptStatus,
    /// Sender email address of the message.
    pub sender_identity: String,
    pub subject: String,
    /// RFC 3339 UTC timestamp with millisecond precision.
    pub timestamp: String,
    /// Provider response descriptor on success, error message on failure.
    pub detail: String,
}

impl LogEntry {
    /// Build an entry stamped with the current time.
    pub fn now(
        status: AttemptStatus,
        sender_identity: impl Into<String>,
        subject: impl Into<String>,
        detail: impl Into<String>,
    ) -> Self {
        Self {
            status,
            sender_identity: sender_identity.into(),
            subject: subject.into(),
            timestamp: Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true),
            detail: detail.into(),
        }
    }
}

/// Bounded FIFO buffer of entries, oldest first.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuditTrail {
    entries: VecDeque<LogEntry>,
    capacity: usize,
}

impl AuditTrail {
    pub fn new(capacity: usize) -> Self {
        Self {
            entries: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    /// Decode a stored JSON array. Anything that is not a JSON array yields
    /// an empty trail; elements that are not valid entries are skipped.
    /// Arrays longer than `capacity` keep their newest entries.
    pub fn decode(json: &str, capacity: usize) -> Self {
        let values: Vec<serde_json::Value> = match serde_json::from_str(json) {
            Ok(v) => v,
            Err(err) => {
                debug!("discarding unreadable audit log: {err}");
                return Self::new(capacity);
            }
        };
        let mut trail = Self::new(capacity);
        for value in values {
            match serde_json::from_value::<LogEntry>(value) {
                Ok(entry) => trail.push(entry),
                Err(err) => debug!("skipping unreadable audit log entry: {err}"),
            }
        }
        trail
    }

    pub fn encode(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(&self.entries)
    }

    /// Append an entry, evicting from the front while over capacity.
    pub fn push(&mut self, entry: LogEntry) {
        self.entries.push_back(entry);
        while self.entries.len() > self.capacity {
            self.entries.pop_front();
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn into_vec(self) -> Vec<LogEntry> {
        self.entries.into()
    }
}

/// Key-value storage of string values.
pub trait AuditStore: Send + Sync {
    /// Read a value. `Ok(None)` when the key has never been written.
    fn read(&self, key: &str) -> io::Result<Option<String>>;

    fn write(&self, key: &str, value: &str) -> io::Result<()>;

    fn remove(&self, key: &str) -> io::Result<()>;
}

/// Directory-backed store: each key lives in `<dir>/<key>.json`.
#[derive(Debug, Clone)]
pub struct FileStore {
    dir: PathBuf,
}

impl FileStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn key_path(&self, key: &str) -> PathBuf {
        self.dir.join(format!("{key}.json"))
    }
}

impl AuditStore for FileStore {
    fn read(&self, key: &str) -> io::Result<Option<String>> {
        match std::fs::read_to_string(self.key_path(key)) {
            Ok(content) => Ok(Some(content)),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e),
        }
    }

    fn write(&self, key: &str, value: &str) -> io::Result<()> {
        std::fs::create_dir_all(&self.dir)?;
        std::fs::write(self.key_path(key), value)
    }

    fn remove(&self, key: &str) -> io::Result<()> {
        match std::fs::remove_file(self.key_path(key)) {
            Err(e) if e.kind() != io::ErrorKind::NotFound => Err(e),
            _ => Ok(()),
        }
    }
}

/// In-process store. Contents are lost when the process exits.
#[derive(Debug, Default)]
pub struct MemoryStore {
    values: Mutex<HashMap<String, String>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn poisoned() -> io::Error {
        io::Error::other("memory store lock poisoned")
    }
}

impl AuditStore for MemoryStore {
    fn read(&self, key: &str) -> io::Result<Option<String>> {
        let values = self.values.lock().map_err(|_| Self::poisoned())?;
        Ok(values.get(key).cloned())
    }

    fn write(&self, key: &str, value: &str) -> io::Result<()> {
        let mut values = self.values.lock().map_err(|_| Self::poisoned())?;
        values.insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn remove(&self, key: &str) -> io::Result<()> {
        let mut values = self.values.lock().map_err(|_| Self::poisoned())?;
        values.remove(key);
        Ok(())
    }
}

/// The persisted audit log.
///
/// Append is a read-modify-write of the stored array. It runs under an
/// internal lock so that concurrent dispatches cannot lose each other's
/// entries or overshoot the capacity.
pub struct AuditLog {
    store: Box<dyn AuditStore>,
    capacity: usize,
    write_lock: Mutex<()>,
}

impl AuditLog {
    pub fn new(store: impl AuditStore + 'static) -> Self {
        Self::with_capacity(store, AUDIT_LOG_CAPACITY)
    }

    pub fn with_capacity(store: impl AuditStore + 'static, capacity: usize) -> Self {
        Self {
            store: Box::new(store),
            capacity,
            write_lock: Mutex::new(()),
        }
    }

    /// Full trail, oldest first. Empty when nothing usable is stored.
    pub fn entries(&self) -> Vec<LogEntry> {
        self.load().into_vec()
    }

    /// Append one entry and persist the trimmed trail. Failures are logged
    /// and swallowed.
    pub fn append(&self, entry: LogEntry) {
        let _guard = match self.write_lock.lock() {
            Ok(g) => g,
            Err(poisoned) => poisoned.into_inner(),
        };
        let mut trail = self.load();
        trail.push(entry);
        let json = match trail.encode() {
            Ok(j) => j,
            Err(e) => {
                warn!("failed to encode audit log: {e}");
                return;
            }
        };
        if let Err(e) = self.store.write(AUDIT_LOG_KEY, &json) {
            warn!("failed to persist audit log entry: {e}");
        }
    }

    /// Remove every entry.
    pub fn clear(&self) -> io::Result<()> {
        let _guard = match self.write_lock.lock() {
            Ok(g) => g,
            Err(poisoned) => poisoned.into_inner(),
        };
        self.store.remove(AUDIT_LOG_KEY)
    }

    fn load(&self) -> AuditTrail {
        match self.store.read(AUDIT_LOG_KEY) {
            Ok(Some(json)) => AuditTrail::decode(&json, self.capacity),
            Ok(None) => AuditTrail::new(self.capacity),
            Err(e) => {
                warn!("failed to read audit log: {e}");
                AuditTrail::new(self.capacity)
            }
        }
    }
}

impl std::fmt::Debug for AuditLog {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuditLog")
            .field("capacity", &self.capacity)
            .finish_non_exhaustive()
    }
}
