//! The [`Store`] facade.

use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use rusqlite::Connection;

use crate::clock::Clock;
use crate::config::{StoreConfig, StoreLocation};
use crate::errors::StoreError;
use crate::executor::Executor;
use crate::peers::{self, InputPeer, PeerRecord, PeerUpdate};
use crate::schema::{self, SchemaState};
use crate::session::{self, AuthKey, SessionField, SessionRecord};
use crate::session_string;
use crate::update_state::{self, UpdateOffset};

struct StoreInner {
    exec:         Executor,
    location:     StoreLocation,
    username_ttl: Duration,
    clock:        Arc<dyn Clock>,
}

/// Durable session state: credentials, peer cache and update checkpoints.
///
/// Cheap to clone. Every clone talks to the same worker thread, and every
/// operation is applied atomically in the order it was issued.
///
/// ```rust,no_run
/// use tgstore::{PeerKind, PeerUpdate, Store, StoreConfig};
///
/// # async fn demo() -> Result<(), tgstore::StoreError> {
/// let store = Store::open(StoreConfig::file("account.session")).await?;
///
/// store.update_peers(vec![
///     PeerUpdate::new(777, Some(0x1234), PeerKind::User).usernames(["alice"]),
/// ]).await?;
/// let peer = store.get_peer_by_username("@alice").await?;
///
/// store.save().await?;
/// store.close().await?;
/// # Ok(()) }
/// ```
#[derive(Clone)]
pub struct Store {
    inner: Arc<StoreInner>,
}

macro_rules! session_accessors {
    ($( $(#[$doc:meta])* $get:ident, $set:ident: $ty:ty => $field:ident; )*) => { $(
        $(#[$doc])*
        pub async fn $get(&self) -> Result<$ty, StoreError> {
            self.run(|c| session::get(c, SessionField::$field)).await
        }

        #[doc = concat!("Write `", stringify!($get), "` and commit.")]
        pub async fn $set(&self, value: $ty) -> Result<(), StoreError> {
            self.run(move |c| session::set(c, SessionField::$field, value)).await
        }
    )* };
}

impl Store {
    // ── Lifecycle ──────────────────────────────────────────────────────────

    /// Open (creating or migrating as needed) the store described by `config`.
    pub async fn open(config: StoreConfig) -> Result<Self, StoreError> {
        let conn = {
            let config = config.clone();
            tokio::task::spawn_blocking(move || open_connection(&config))
                .await
                .map_err(|e| StoreError::Io(io::Error::other(e)))??
        };

        let exec = Executor::spawn(conn, "tgstore")?;
        let vacuum = config.vacuum_on_open;
        let state = exec.run(move |c| {
            let state = schema::bootstrap(c)?;
            if vacuum {
                c.execute_batch("VACUUM")?;
            }
            Ok(state)
        }).await?;

        match state {
            SchemaState::Created           => tracing::info!("[tgstore] new store at {}", describe(&config.location)),
            SchemaState::Upgraded { from } => tracing::info!("[tgstore] opened {} (upgraded from v{from})", describe(&config.location)),
            SchemaState::Current           => tracing::info!("[tgstore] opened {}", describe(&config.location)),
        }

        Ok(Self {
            inner: Arc::new(StoreInner {
                exec,
                location:     config.location,
                username_ttl: config.username_ttl,
                clock:        config.clock,
            }),
        })
    }

    /// A fresh in-memory store with default settings.
    pub async fn in_memory() -> Result<Self, StoreError> {
        Self::open(StoreConfig::memory()).await
    }

    /// An in-memory store seeded from a session string.
    ///
    /// Only the location of `config` is overridden.
    pub async fn from_session_string(s: &str, config: StoreConfig) -> Result<Self, StoreError> {
        let store = Self::open(StoreConfig { location: StoreLocation::Memory, ..config }).await?;
        store.import_session_string(s).await?;
        Ok(store)
    }

    pub fn location(&self) -> &StoreLocation {
        &self.inner.location
    }

    /// Stamp `date` with the current time and flush the write-ahead log.
    pub async fn save(&self) -> Result<(), StoreError> {
        let now = self.inner.clock.now();
        self.run(move |c| {
            session::set(c, SessionField::Date, now)?;
            c.query_row("PRAGMA wal_checkpoint(PASSIVE)", [], |_| Ok(()))?;
            Ok(())
        }).await?;
        tracing::debug!("[tgstore] session saved");
        Ok(())
    }

    /// Release the database and stop the worker thread.
    ///
    /// Affects every clone. Operations afterwards fail with [`StoreError::Closed`].
    pub async fn close(&self) -> Result<(), StoreError> {
        self.inner.exec.close().await?;
        tracing::info!("[tgstore] closed {}", describe(&self.inner.location));
        Ok(())
    }

    pub fn is_closed(&self) -> bool {
        self.inner.exec.is_closed()
    }

    /// Close the store and remove its file (e.g. on sign-out).
    ///
    /// Fails with [`StoreError::Io`] if the file is already gone.
    pub async fn delete(&self) -> Result<(), StoreError> {
        self.close().await?;
        if let StoreLocation::File(path) = &self.inner.location {
            std::fs::remove_file(path)?;
            for side in [wal_path(path, "-wal"), wal_path(path, "-shm")] {
                match std::fs::remove_file(&side) {
                    Err(e) if e.kind() != io::ErrorKind::NotFound => return Err(e.into()),
                    _ => {}
                }
            }
            tracing::info!("[tgstore] deleted {}", path.display());
        }
        Ok(())
    }

    // ── Schema ─────────────────────────────────────────────────────────────

    pub async fn schema_version(&self) -> Result<u32, StoreError> {
        self.run(|c| Ok(schema::version(c)?)).await
    }

    /// Overwrite the stored schema version. Only useful for repair tooling.
    pub async fn set_schema_version(&self, number: u32) -> Result<(), StoreError> {
        self.run(move |c| Ok(schema::set_version(c, number)?)).await
    }

    // ── Session record ─────────────────────────────────────────────────────

    session_accessors! {
        /// Home data-center id.
        dc_id, set_dc_id: i32 => DcId;
        /// API id the session was created with.
        api_id, set_api_id: Option<i32> => ApiId;
        /// Secret authorization key for the home DC.
        auth_key, set_auth_key: Option<AuthKey> => AuthKey;
        /// Unix seconds of the last [`Store::save`].
        date, set_date: i64 => Date;
        /// Id of the logged-in account.
        user_id, set_user_id: Option<i64> => UserId;
        is_bot, set_is_bot: Option<bool> => IsBot;
    }

    /// Whether the session targets the test servers.
    pub async fn test_mode(&self) -> Result<bool, StoreError> {
        self.run(|c| Ok(session::get::<Option<bool>>(c, SessionField::TestMode)?.unwrap_or(false))).await
    }

    pub async fn set_test_mode(&self, value: bool) -> Result<(), StoreError> {
        self.run(move |c| session::set(c, SessionField::TestMode, value)).await
    }

    /// The whole session row.
    pub async fn session(&self) -> Result<SessionRecord, StoreError> {
        self.run(|c| session::record(c)).await
    }

    /// Encode the session as a portable string.
    pub async fn export_session_string(&self) -> Result<String, StoreError> {
        let record = self.session().await?;
        session_string::encode(&record)
    }

    /// Replace the session row with the one encoded in `s`.
    pub async fn import_session_string(&self, s: &str) -> Result<(), StoreError> {
        let record = session_string::decode(s)?;
        self.run(move |c| session::replace(c, &record)).await?;
        tracing::info!("[tgstore] session imported");
        Ok(())
    }

    // ── Peer cache ─────────────────────────────────────────────────────────

    /// Cache a batch of peer observations.
    ///
    /// Each peer's row and full username set are replaced; the batch as a
    /// whole is applied atomically.
    pub async fn update_peers(&self, peers: Vec<PeerUpdate>) -> Result<(), StoreError> {
        if peers.is_empty() {
            return Ok(());
        }
        self.run(move |c| peers::update_peers(c, &peers)).await
    }

    pub async fn get_peer_by_id(&self, id: i64) -> Result<InputPeer, StoreError> {
        self.run(move |c| peers::get_peer_by_id(c, id)).await
    }

    /// Resolve a username. Fails with [`StoreError::Expired`] if the mapping
    /// is older than the configured freshness window.
    pub async fn get_peer_by_username(&self, username: &str) -> Result<InputPeer, StoreError> {
        let username = username.to_owned();
        let now = self.inner.clock.now();
        let ttl = self.inner.username_ttl;
        self.run(move |c| peers::get_peer_by_username(c, &username, now, ttl)).await
    }

    pub async fn get_peer_by_phone_number(&self, phone: &str) -> Result<InputPeer, StoreError> {
        let phone = phone.to_owned();
        self.run(move |c| peers::get_peer_by_phone_number(c, &phone)).await
    }

    /// Everything cached about one peer.
    pub async fn get_peer(&self, id: i64) -> Result<PeerRecord, StoreError> {
        self.run(move |c| peers::get_peer(c, id)).await
    }

    pub async fn peer_count(&self) -> Result<u64, StoreError> {
        self.run(|c| peers::peer_count(c)).await
    }

    // ── Update offsets ─────────────────────────────────────────────────────

    /// Every checkpoint, oldest `date` first.
    pub async fn update_offsets(&self) -> Result<Vec<UpdateOffset>, StoreError> {
        self.run(|c| update_state::all(c)).await
    }

    pub async fn upsert_update_offset(&self, offset: UpdateOffset) -> Result<(), StoreError> {
        self.run(move |c| update_state::upsert(c, &offset)).await
    }

    /// Forget one source's checkpoint. Returns `true` if it existed.
    pub async fn delete_update_offset(&self, source_id: i64) -> Result<bool, StoreError> {
        self.run(move |c| update_state::delete(c, source_id)).await
    }

    /// Forget every checkpoint. Returns how many were removed.
    pub async fn clear_update_offsets(&self) -> Result<usize, StoreError> {
        self.run(|c| update_state::clear(c)).await
    }

    async fn run<T, F>(&self, f: F) -> Result<T, StoreError>
    where
        F: FnOnce(&mut Connection) -> Result<T, StoreError> + Send + 'static,
        T: Send + 'static,
    {
        self.inner.exec.run(f).await
    }
}

fn open_connection(config: &StoreConfig) -> Result<Connection, StoreError> {
    let conn = match &config.location {
        StoreLocation::File(path) => {
            if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
                std::fs::create_dir_all(parent)?;
            }
            Connection::open(path)?
        }
        StoreLocation::Memory => Connection::open_in_memory()?,
    };
    conn.busy_timeout(config.busy_timeout)?;
    if config.journal_mode_wal && matches!(config.location, StoreLocation::File(_)) {
        let mode: String = conn.pragma_update_and_check(None, "journal_mode", "WAL", |row| row.get(0))?;
        tracing::debug!("[tgstore] journal_mode={mode}");
    }
    Ok(conn)
}

fn wal_path(path: &Path, suffix: &str) -> PathBuf {
    let mut s = path.as_os_str().to_owned();
    s.push(suffix);
    PathBuf::from(s)
}

fn describe(location: &StoreLocation) -> String {
    match location {
        StoreLocation::File(p) => p.display().to_string(),
        StoreLocation::Memory  => ":memory:".to_string(),
    }
}
