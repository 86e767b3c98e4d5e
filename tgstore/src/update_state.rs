//! Update-stream checkpoints.
//!
//! The dispatcher stores the last applied **pts** / **qts** / **date** /
//! **seq** per update source so that after a restart it can ask the server for
//! exactly the difference it missed. Source `0` is the account-wide stream;
//! every other source id is a channel with its own pts sequence.

use rusqlite::{Connection, params};

use crate::errors::StoreError;

/// Source id of the account-wide (non-channel) update stream.
pub const ACCOUNT_SOURCE_ID: i64 = 0;

/// Checkpoint for one update source.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct UpdateOffset {
    /// [`ACCOUNT_SOURCE_ID`] or a channel id.
    pub source_id: i64,
    /// Main sequence counter (messages, channels).
    pub pts:  i32,
    /// Secondary counter for secret chats and bot updates.
    pub qts:  i32,
    /// Date of the last known update (Unix timestamp).
    pub date: i32,
    /// Combined updates sequence.
    pub seq:  i32,
}

impl UpdateOffset {
    /// Checkpoint for the account-wide stream.
    pub fn account(pts: i32, qts: i32, date: i32, seq: i32) -> Self {
        Self { source_id: ACCOUNT_SOURCE_ID, pts, qts, date, seq }
    }

    /// Checkpoint for one channel's stream. Channels only carry `pts`.
    pub fn channel(channel_id: i64, pts: i32, date: i32) -> Self {
        Self { source_id: channel_id, pts, qts: 0, date, seq: 0 }
    }

    pub fn is_account(&self) -> bool {
        self.source_id == ACCOUNT_SOURCE_ID
    }
}

/// Every checkpoint, oldest `date` first.
pub(crate) fn all(conn: &Connection) -> Result<Vec<UpdateOffset>, StoreError> {
    let mut stmt = conn.prepare_cached(
        "SELECT source_id, pts, qts, date, seq FROM update_state ORDER BY date ASC, source_id ASC",
    )?;
    let rows = stmt
        .query_map([], |row| {
            Ok(UpdateOffset {
                source_id: row.get(0)?,
                pts:       row.get::<_, Option<i32>>(1)?.unwrap_or(0),
                qts:       row.get::<_, Option<i32>>(2)?.unwrap_or(0),
                date:      row.get::<_, Option<i32>>(3)?.unwrap_or(0),
                seq:       row.get::<_, Option<i32>>(4)?.unwrap_or(0),
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}

pub(crate) fn upsert(conn: &Connection, offset: &UpdateOffset) -> Result<(), StoreError> {
    conn.prepare_cached(
        "REPLACE INTO update_state (source_id, pts, qts, date, seq) VALUES (?1, ?2, ?3, ?4, ?5)",
    )?
    .execute(params![offset.source_id, offset.pts, offset.qts, offset.date, offset.seq])?;
    tracing::trace!(
        "[tgstore] checkpoint source={} pts={} qts={} seq={}",
        offset.source_id, offset.pts, offset.qts, offset.seq
    );
    Ok(())
}

/// Returns `true` if a checkpoint existed.
pub(crate) fn delete(conn: &Connection, source_id: i64) -> Result<bool, StoreError> {
    let n = conn
        .prepare_cached("DELETE FROM update_state WHERE source_id = ?1")?
        .execute([source_id])?;
    Ok(n > 0)
}

/// Returns how many checkpoints were removed.
pub(crate) fn clear(conn: &Connection) -> Result<usize, StoreError> {
    Ok(conn.execute("DELETE FROM update_state", [])?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema;

    #[test]
    fn upsert_replaces_by_source() {
        let mut c = Connection::open_in_memory().unwrap();
        schema::create(&mut c).unwrap();

        upsert(&c, &UpdateOffset::account(1, 2, 3, 4)).unwrap();
        upsert(&c, &UpdateOffset::account(10, 20, 30, 40)).unwrap();
        upsert(&c, &UpdateOffset::channel(777, 5, 1)).unwrap();

        let rows = all(&c).unwrap();
        assert_eq!(rows, vec![UpdateOffset::channel(777, 5, 1), UpdateOffset::account(10, 20, 30, 40)]);
        assert!(rows[1].is_account());

        assert!(delete(&c, 777).unwrap());
        assert!(!delete(&c, 777).unwrap());
        assert_eq!(clear(&c).unwrap(), 1);
        assert!(all(&c).unwrap().is_empty());
    }
}
