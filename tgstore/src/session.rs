//! Session record — auth key, home DC and account flags.
//!
//! The `sessions` table holds exactly one row. Accessors are typed per field;
//! [`SessionField`] maps each field to its column so the SQL is built from a
//! closed set of names.

use std::fmt;

use rusqlite::types::{FromSql, FromSqlResult, ToSql, ToSqlOutput, ValueRef};
use rusqlite::Connection;

use crate::errors::StoreError;

// ─── AuthKey ──────────────────────────────────────────────────────────────────

/// Secret authorization key produced by the DH key exchange.
///
/// `Debug` only prints the length.
#[derive(Clone, PartialEq, Eq)]
pub struct AuthKey(Vec<u8>);

impl AuthKey {
    /// Length of a key produced by the MTProto handshake.
    pub const LEN: usize = 256;

    pub fn new(bytes: impl Into<Vec<u8>>) -> Self {
        Self(bytes.into())
    }

    pub fn as_bytes(&self) -> &[u8] { &self.0 }

    pub fn into_bytes(self) -> Vec<u8> { self.0 }

    pub fn len(&self) -> usize { self.0.len() }

    pub fn is_empty(&self) -> bool { self.0.is_empty() }

    /// The key as a fixed-size array, if it has the handshake length.
    pub fn to_array(&self) -> Option<[u8; 256]> {
        self.0.as_slice().try_into().ok()
    }
}

impl From<[u8; 256]> for AuthKey {
    fn from(key: [u8; 256]) -> Self { Self(key.to_vec()) }
}

impl fmt::Debug for AuthKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "AuthKey(<{} bytes>)", self.0.len())
    }
}

impl ToSql for AuthKey {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        Ok(ToSqlOutput::Borrowed(ValueRef::Blob(&self.0)))
    }
}

impl FromSql for AuthKey {
    fn column_result(value: ValueRef<'_>) -> FromSqlResult<Self> {
        value.as_blob().map(|b| Self(b.to_vec()))
    }
}

// ─── SessionRecord ────────────────────────────────────────────────────────────

/// The whole session row.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SessionRecord {
    pub dc_id:     i32,
    pub api_id:    Option<i32>,
    pub test_mode: bool,
    pub auth_key:  Option<AuthKey>,
    /// Unix seconds of the last [`crate::Store::save`].
    pub date:      i64,
    pub user_id:   Option<i64>,
    pub is_bot:    Option<bool>,
}

// ─── SessionField ─────────────────────────────────────────────────────────────

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum SessionField {
    DcId,
    ApiId,
    TestMode,
    AuthKey,
    Date,
    UserId,
    IsBot,
}

impl SessionField {
    fn column(self) -> &'static str {
        match self {
            Self::DcId     => "dc_id",
            Self::ApiId    => "api_id",
            Self::TestMode => "test_mode",
            Self::AuthKey  => "auth_key",
            Self::Date     => "date",
            Self::UserId   => "user_id",
            Self::IsBot    => "is_bot",
        }
    }
}

pub(crate) fn get<T: FromSql>(conn: &Connection, field: SessionField) -> Result<T, StoreError> {
    let sql = format!("SELECT {} FROM sessions", field.column());
    Ok(conn.prepare_cached(&sql)?.query_row([], |row| row.get(0))?)
}

pub(crate) fn set<V: ToSql>(conn: &Connection, field: SessionField, value: V) -> Result<(), StoreError> {
    let sql = format!("UPDATE sessions SET {} = ?1", field.column());
    conn.prepare_cached(&sql)?.execute([value])?;
    tracing::trace!("[tgstore] session.{} updated", field.column());
    Ok(())
}

pub(crate) fn record(conn: &Connection) -> Result<SessionRecord, StoreError> {
    let record = conn.query_row(
        "SELECT dc_id, api_id, test_mode, auth_key, date, user_id, is_bot FROM sessions",
        [],
        |row| {
            Ok(SessionRecord {
                dc_id:     row.get(0)?,
                api_id:    row.get(1)?,
                test_mode: row.get::<_, Option<bool>>(2)?.unwrap_or(false),
                auth_key:  row.get(3)?,
                date:      row.get(4)?,
                user_id:   row.get(5)?,
                is_bot:    row.get(6)?,
            })
        },
    )?;
    Ok(record)
}

/// Overwrite every field at once.
pub(crate) fn replace(conn: &Connection, r: &SessionRecord) -> Result<(), StoreError> {
    conn.execute(
        "UPDATE sessions SET dc_id = ?1, api_id = ?2, test_mode = ?3, auth_key = ?4,
                             date = ?5, user_id = ?6, is_bot = ?7",
        rusqlite::params![r.dc_id, r.api_id, r.test_mode, r.auth_key, r.date, r.user_id, r.is_bot],
    )?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema;

    #[test]
    fn fields_round_trip() {
        let mut c = Connection::open_in_memory().unwrap();
        schema::create(&mut c).unwrap();

        let seeded = record(&c).unwrap();
        assert_eq!(seeded.dc_id, 2);
        assert_eq!((seeded.api_id, seeded.test_mode, seeded.auth_key.clone()), (None, false, None));

        set(&c, SessionField::DcId, 4).unwrap();
        set(&c, SessionField::AuthKey, AuthKey::new(vec![1, 2, 3])).unwrap();
        set(&c, SessionField::IsBot, Some(true)).unwrap();
        assert_eq!(get::<i32>(&c, SessionField::DcId).unwrap(), 4);
        assert_eq!(get::<Option<AuthKey>>(&c, SessionField::AuthKey).unwrap(), Some(AuthKey::new(vec![1, 2, 3])));
        assert_eq!(get::<Option<bool>>(&c, SessionField::IsBot).unwrap(), Some(true));
        assert_eq!(get::<Option<i64>>(&c, SessionField::UserId).unwrap(), None);
    }

    #[test]
    fn auth_key_debug_is_redacted() {
        let key = AuthKey::from([7u8; 256]);
        assert_eq!(format!("{key:?}"), "AuthKey(<256 bytes>)");
        assert_eq!(key.to_array(), Some([7u8; 256]));
        assert_eq!(AuthKey::new(vec![1]).to_array(), None);
    }
}
