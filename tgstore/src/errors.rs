//! Error types for tgstore.
//!
//! Cache misses ([`StoreError::NotFound`], [`StoreError::Expired`]) are normal
//! outcomes: the caller resolves the peer over the network, feeds the result to
//! [`crate::Store::update_peers`] and retries. Everything else is a real failure.

use std::{fmt, io};
use std::time::Duration;

// ─── Lookup ───────────────────────────────────────────────────────────────────

/// The identifier a peer lookup was keyed on.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Lookup {
    Id(i64),
    Username(String),
    Phone(String),
}

impl fmt::Display for Lookup {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Id(id)       => write!(f, "ID not found: {id}"),
            Self::Username(u)  => write!(f, "Username not found: {u}"),
            Self::Phone(p)     => write!(f, "Phone number not found: {p}"),
        }
    }
}

// ─── SchemaError ──────────────────────────────────────────────────────────────

/// The store's schema could not be read or brought up to date.
///
/// Always fatal: the store must not be used after one of these.
#[derive(Debug)]
pub enum SchemaError {
    /// `schema_version` is missing, empty, or not an integer.
    Unreadable(rusqlite::Error),
    /// The stored version number is not a version this crate ever wrote.
    Invalid(u32),
    /// The file was written by a newer version of this crate.
    TooNew { found: u32, supported: u32 },
    /// Migration step `from → to` failed and was rolled back.
    Migration { from: u32, to: u32, source: rusqlite::Error },
}

impl fmt::Display for SchemaError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Unreadable(e) => write!(f, "schema version unreadable: {e}"),
            Self::Invalid(n)    => write!(f, "schema version {n} is not a valid version"),
            Self::TooNew { found, supported } => write!(
                f, "schema version {found} is newer than the supported version {supported}"
            ),
            Self::Migration { from, to, source } => write!(
                f, "migration {from} → {to} failed: {source}"
            ),
        }
    }
}

impl std::error::Error for SchemaError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Unreadable(e)              => Some(e),
            Self::Migration { source, .. }   => Some(source),
            Self::Invalid(_) | Self::TooNew { .. } => None,
        }
    }
}

// ─── StoreError ───────────────────────────────────────────────────────────────

/// The error type returned from every [`crate::Store`] operation.
#[derive(Debug)]
pub enum StoreError {
    /// No cached peer for this identifier.
    NotFound(Lookup),
    /// The username is cached, but older than the freshness window.
    Expired { username: String, age: Duration },
    /// Schema bootstrap or migration failure.
    Schema(SchemaError),
    /// File-system failure (open, delete).
    Io(io::Error),
    /// Unexpected engine failure.
    Sqlite(rusqlite::Error),
    /// A `peers.kind` value that is not one of the known kinds.
    InvalidPeerKind(String),
    /// A marked peer id outside every known id range.
    InvalidPeerId(i64),
    /// A session string that does not decode to a session record.
    InvalidSessionString(String),
    /// The session record lacks a field needed for export.
    IncompleteSession(&'static str),
    /// The store has been closed; its worker thread is gone.
    Closed,
    /// An operation panicked on the worker. Its transaction was rolled back
    /// and the store keeps serving other operations.
    WorkerPanicked(String),
}

impl fmt::Display for StoreError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NotFound(l)                => write!(f, "{l}"),
            Self::Expired { username, age }  => write!(
                f, "Username expired: {username} (cached {}s ago)", age.as_secs()
            ),
            Self::Schema(e)                  => write!(f, "schema error: {e}"),
            Self::Io(e)                      => write!(f, "I/O error: {e}"),
            Self::Sqlite(e)                  => write!(f, "sqlite error: {e}"),
            Self::InvalidPeerKind(k)         => write!(f, "invalid peer kind: {k:?}"),
            Self::InvalidPeerId(id)          => write!(f, "peer id invalid: {id}"),
            Self::InvalidSessionString(why)  => write!(f, "invalid session string: {why}"),
            Self::IncompleteSession(field)   => write!(f, "session has no {field}"),
            Self::Closed                     => write!(f, "store is closed"),
            Self::WorkerPanicked(msg)        => write!(f, "store operation panicked: {msg}"),
        }
    }
}

impl std::error::Error for StoreError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Schema(e) => Some(e),
            Self::Io(e)     => Some(e),
            Self::Sqlite(e) => Some(e),
            _               => None,
        }
    }
}

impl From<io::Error> for StoreError {
    fn from(e: io::Error) -> Self { Self::Io(e) }
}

impl From<rusqlite::Error> for StoreError {
    fn from(e: rusqlite::Error) -> Self { Self::Sqlite(e) }
}

impl From<SchemaError> for StoreError {
    fn from(e: SchemaError) -> Self { Self::Schema(e) }
}

impl StoreError {
    /// `true` for [`StoreError::NotFound`].
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound(_))
    }

    /// `true` for [`StoreError::Expired`].
    pub fn is_expired(&self) -> bool {
        matches!(self, Self::Expired { .. })
    }

    /// `true` if the caller should resolve the peer over the network and retry.
    pub fn is_cache_miss(&self) -> bool {
        self.is_not_found() || self.is_expired()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cache_miss_covers_not_found_and_expired() {
        let missing = StoreError::NotFound(Lookup::Id(42));
        let stale   = StoreError::Expired { username: "bob".into(), age: Duration::from_secs(1) };
        assert!(missing.is_cache_miss() && missing.is_not_found());
        assert!(stale.is_cache_miss() && stale.is_expired());
        assert!(!StoreError::Closed.is_cache_miss());
    }

    #[test]
    fn display_names_the_identifier() {
        let e = StoreError::NotFound(Lookup::Username("alice".into()));
        assert_eq!(e.to_string(), "Username not found: alice");
        let e = SchemaError::TooNew { found: 9, supported: 5 };
        assert!(e.to_string().contains("9"));
    }
}
