//! Store configuration.

use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use crate::clock::{Clock, SystemClock};

/// How long a cached username stays trusted after the peer was last observed.
pub const USERNAME_TTL: Duration = Duration::from_secs(8 * 60 * 60);

/// Where the store keeps its data.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum StoreLocation {
    /// An SQLite file on disk (created if missing).
    File(PathBuf),
    /// A private in-memory database, gone on close.
    Memory,
}

/// Configuration for [`crate::Store::open`].
#[derive(Clone)]
pub struct StoreConfig {
    pub location:         StoreLocation,
    /// Freshness window for username lookups (default: 8 hours).
    pub username_ttl:     Duration,
    /// How long a statement waits on a lock held by another reader.
    pub busy_timeout:     Duration,
    /// Enable write-ahead journaling on file stores (default: true).
    pub journal_mode_wal: bool,
    /// Run `VACUUM` after opening (default: true).
    pub vacuum_on_open:   bool,
    pub clock:            Arc<dyn Clock>,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            location:         StoreLocation::File(PathBuf::from("tgstore.session")),
            username_ttl:     USERNAME_TTL,
            busy_timeout:     Duration::from_secs(1),
            journal_mode_wal: true,
            vacuum_on_open:   true,
            clock:            Arc::new(SystemClock),
        }
    }
}

impl fmt::Debug for StoreConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StoreConfig")
            .field("location", &self.location)
            .field("username_ttl", &self.username_ttl)
            .field("busy_timeout", &self.busy_timeout)
            .field("journal_mode_wal", &self.journal_mode_wal)
            .field("vacuum_on_open", &self.vacuum_on_open)
            .finish_non_exhaustive()
    }
}

impl StoreConfig {
    /// File-backed store at `path`; a `.session` extension is conventional.
    pub fn file(path: impl Into<PathBuf>) -> Self {
        Self { location: StoreLocation::File(path.into()), ..Default::default() }
    }

    /// In-memory store. Nothing survives [`crate::Store::close`].
    pub fn memory() -> Self {
        Self { location: StoreLocation::Memory, ..Default::default() }
    }

    pub fn with_username_ttl(mut self, ttl: Duration) -> Self {
        self.username_ttl = ttl; self
    }

    pub fn with_busy_timeout(mut self, timeout: Duration) -> Self {
        self.busy_timeout = timeout; self
    }

    pub fn with_journal_mode_wal(mut self, v: bool) -> Self {
        self.journal_mode_wal = v; self
    }

    pub fn with_vacuum_on_open(mut self, v: bool) -> Self {
        self.vacuum_on_open = v; self
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock; self
    }
}
