//! Peer cache — access hashes keyed by id, username and phone number.
//!
//! Every response that carries users or chats is fed back through
//! [`update_peers`] so request builders can turn whatever identifier the
//! caller gave them into an [`InputPeer`] without a network round trip.
//!
//! Username mappings are only trusted for a limited window after the peer was
//! last observed: handles can be released and claimed by somebody else. The
//! window is enforced at read time against `peers.last_update_on`, which the
//! database stamps on every write.

use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use rusqlite::{Connection, OptionalExtension, Row, params};

use crate::errors::{Lookup, StoreError};
use crate::peer_id::{self, PeerType};

// ─── PeerKind ─────────────────────────────────────────────────────────────────

/// What sort of chat entity a cached peer is.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "lowercase"))]
pub enum PeerKind {
    User,
    Bot,
    Group,
    Channel,
    Supergroup,
}

impl PeerKind {
    /// The name stored in `peers.kind`.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::User       => "user",
            Self::Bot        => "bot",
            Self::Group      => "group",
            Self::Channel    => "channel",
            Self::Supergroup => "supergroup",
        }
    }

    /// The id range a peer of this kind must be keyed in.
    pub fn peer_type(self) -> PeerType {
        match self {
            Self::User | Self::Bot           => PeerType::User,
            Self::Group                      => PeerType::Chat,
            Self::Channel | Self::Supergroup => PeerType::Channel,
        }
    }
}

impl fmt::Display for PeerKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PeerKind {
    type Err = StoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "user"       => Ok(Self::User),
            "bot"        => Ok(Self::Bot),
            "group"      => Ok(Self::Group),
            "channel"    => Ok(Self::Channel),
            "supergroup" => Ok(Self::Supergroup),
            other        => Err(StoreError::InvalidPeerKind(other.to_string())),
        }
    }
}

// ─── InputPeer ────────────────────────────────────────────────────────────────

/// The addressing handle a request needs to reach a peer.
///
/// Mirrors the `InputPeer` constructors of the TL schema; the request layer
/// converts it one-to-one.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum InputPeer {
    User    { user_id: i64, access_hash: i64 },
    Chat    { chat_id: i64 },
    Channel { channel_id: i64, access_hash: i64 },
}

impl InputPeer {
    /// Build the handle for a cached `(id, access_hash, kind)` triple.
    ///
    /// `id` is the marked id; a missing access hash is sent as `0`.
    /// Fails with [`StoreError::InvalidPeerId`] if `id` has no raw form.
    pub fn from_cached(id: i64, access_hash: Option<i64>, kind: PeerKind) -> Result<Self, StoreError> {
        let access_hash = access_hash.unwrap_or(0);
        Ok(match kind.peer_type() {
            PeerType::User    => Self::User { user_id: id, access_hash },
            PeerType::Chat    => Self::Chat { chat_id: peer_id::chat_id(id)? },
            PeerType::Channel => Self::Channel { channel_id: peer_id::channel_id(id)?, access_hash },
        })
    }

    /// The marked id this handle addresses.
    pub fn peer_id(&self) -> Result<i64, StoreError> {
        match *self {
            Self::User { user_id, .. }       => Ok(user_id),
            Self::Chat { chat_id }           => peer_id::marked_chat_id(chat_id),
            Self::Channel { channel_id, .. } => peer_id::marked_channel_id(channel_id),
        }
    }
}

// ─── PeerUpdate / PeerRecord ──────────────────────────────────────────────────

/// One observation of a peer, as handed to [`crate::Store::update_peers`].
#[derive(Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct PeerUpdate {
    /// Marked id.
    pub id:           i64,
    pub access_hash:  Option<i64>,
    pub kind:         PeerKind,
    /// Every username the peer currently holds. Empty if it has none.
    pub usernames:    Vec<String>,
    pub phone_number: Option<String>,
}

impl PeerUpdate {
    pub fn new(id: i64, access_hash: Option<i64>, kind: PeerKind) -> Self {
        Self { id, access_hash, kind, usernames: Vec::new(), phone_number: None }
    }

    pub fn usernames<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.usernames = names.into_iter().map(Into::into).collect(); self
    }

    pub fn phone_number(mut self, phone: impl Into<String>) -> Self {
        self.phone_number = Some(phone.into()); self
    }
}

/// Everything the cache knows about one peer.
#[derive(Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct PeerRecord {
    pub id:             i64,
    pub access_hash:    Option<i64>,
    pub kind:           PeerKind,
    pub phone_number:   Option<String>,
    pub usernames:      Vec<String>,
    /// Unix seconds of the last write to this peer's row.
    pub last_update_on: i64,
}

impl PeerRecord {
    pub fn input_peer(&self) -> Result<InputPeer, StoreError> {
        InputPeer::from_cached(self.id, self.access_hash, self.kind)
    }
}

/// Usernames are case-insensitive and often written with a leading `@`.
pub fn normalize_username(username: &str) -> String {
    username.trim().trim_start_matches('@').to_lowercase()
}

// ─── Queries ──────────────────────────────────────────────────────────────────

fn input_peer_from_row(row: &Row<'_>) -> rusqlite::Result<(i64, Option<i64>, String)> {
    Ok((row.get(0)?, row.get(1)?, row.get(2)?))
}

fn to_input_peer((id, access_hash, kind): (i64, Option<i64>, String)) -> Result<InputPeer, StoreError> {
    InputPeer::from_cached(id, access_hash, kind.parse()?)
}

/// Replace the row and the full alias set of every peer in `peers`.
///
/// The whole batch is one transaction. A peer whose id is outside the range
/// of its kind rejects the batch before anything is written.
pub(crate) fn update_peers(conn: &mut Connection, peers: &[PeerUpdate]) -> Result<(), StoreError> {
    for peer in peers {
        if peer_id::peer_type(peer.id)? != peer.kind.peer_type() {
            return Err(StoreError::InvalidPeerId(peer.id));
        }
    }

    let tx = conn.transaction()?;
    {
        let mut replace = tx.prepare_cached(
            "REPLACE INTO peers (id, access_hash, kind, phone_number) VALUES (?1, ?2, ?3, ?4)",
        )?;
        let mut clear = tx.prepare_cached("DELETE FROM usernames WHERE peer_id = ?1")?;
        let mut alias = tx.prepare_cached("INSERT INTO usernames (peer_id, username) VALUES (?1, ?2)")?;

        for peer in peers {
            replace.execute(params![peer.id, peer.access_hash, peer.kind.as_str(), peer.phone_number])?;
            clear.execute([peer.id])?;

            let mut names: Vec<String> = Vec::with_capacity(peer.usernames.len());
            for name in peer.usernames.iter().map(|u| normalize_username(u)) {
                if !name.is_empty() && !names.contains(&name) {
                    names.push(name);
                }
            }
            if names.is_empty() {
                alias.execute(params![peer.id, None::<String>])?;
            }
            for name in &names {
                alias.execute(params![peer.id, name])?;
            }
        }
    }
    tx.commit()?;
    tracing::debug!("[tgstore] cached {} peer(s)", peers.len());
    Ok(())
}

pub(crate) fn get_peer_by_id(conn: &Connection, id: i64) -> Result<InputPeer, StoreError> {
    let row = conn
        .prepare_cached("SELECT id, access_hash, kind FROM peers WHERE id = ?1")?
        .query_row([id], input_peer_from_row)
        .optional()?;
    match row {
        Some(r) => to_input_peer(r),
        None => {
            tracing::trace!("[tgstore] peer {id} not cached");
            Err(StoreError::NotFound(Lookup::Id(id)))
        }
    }
}

pub(crate) fn get_peer_by_username(
    conn:     &Connection,
    username: &str,
    now:      i64,
    ttl:      Duration,
) -> Result<InputPeer, StoreError> {
    let username = normalize_username(username);
    // Newest owner first: a reassigned handle may still be mapped to its old peer.
    let row = conn
        .prepare_cached(
            "SELECT p.id, p.access_hash, p.kind, p.last_update_on FROM peers p
             JOIN usernames u ON p.id = u.peer_id
             WHERE u.username = ?1
             ORDER BY p.last_update_on DESC, u.rowid DESC
             LIMIT 1",
        )?
        .query_row([&username], |row| Ok((input_peer_from_row(row)?, row.get::<_, i64>(3)?)))
        .optional()?;

    let Some((peer, last_update_on)) = row else {
        tracing::trace!("[tgstore] username {username} not cached");
        return Err(StoreError::NotFound(Lookup::Username(username)));
    };

    let age = now.abs_diff(last_update_on);
    if age > ttl.as_secs() {
        tracing::debug!("[tgstore] username {username} expired ({age}s old)");
        return Err(StoreError::Expired { username, age: Duration::from_secs(age) });
    }
    to_input_peer(peer)
}

pub(crate) fn get_peer_by_phone_number(conn: &Connection, phone: &str) -> Result<InputPeer, StoreError> {
    let row = conn
        .prepare_cached(
            "SELECT id, access_hash, kind FROM peers WHERE phone_number = ?1
             ORDER BY last_update_on DESC
             LIMIT 1",
        )?
        .query_row([phone], input_peer_from_row)
        .optional()?;
    match row {
        Some(r) => to_input_peer(r),
        None => Err(StoreError::NotFound(Lookup::Phone(phone.to_string()))),
    }
}

pub(crate) fn get_peer(conn: &Connection, id: i64) -> Result<PeerRecord, StoreError> {
    let row = conn
        .prepare_cached(
            "SELECT id, access_hash, kind, phone_number, last_update_on FROM peers WHERE id = ?1",
        )?
        .query_row([id], |row| {
            Ok((
                row.get::<_, i64>(0)?,
                row.get::<_, Option<i64>>(1)?,
                row.get::<_, String>(2)?,
                row.get::<_, Option<String>>(3)?,
                row.get::<_, i64>(4)?,
            ))
        })
        .optional()?;
    let Some((id, access_hash, kind, phone_number, last_update_on)) = row else {
        return Err(StoreError::NotFound(Lookup::Id(id)));
    };

    let mut stmt = conn.prepare_cached(
        "SELECT username FROM usernames WHERE peer_id = ?1 AND username IS NOT NULL ORDER BY rowid",
    )?;
    let usernames = stmt
        .query_map([id], |row| row.get::<_, String>(0))?
        .collect::<Result<Vec<_>, _>>()?;

    Ok(PeerRecord { id, access_hash, kind: kind.parse()?, phone_number, usernames, last_update_on })
}

pub(crate) fn peer_count(conn: &Connection) -> Result<u64, StoreError> {
    let n: i64 = conn.query_row("SELECT COUNT(*) FROM peers", [], |row| row.get(0))?;
    Ok(u64::try_from(n).unwrap_or(0))
}
