//! Schema bootstrap and migrations.
//!
//! A fresh database gets [`SCHEMA`] in one go. An existing one is walked
//! forward from its stored version one step at a time; each step runs in its
//! own transaction together with the version bump, so an interrupted upgrade
//! always resumes from a version whose schema is fully in place.

use rusqlite::Connection;

use crate::errors::{SchemaError, StoreError};

/// Version written by [`create`] and reached by [`update`].
pub const CURRENT_VERSION: u32 = 5;

/// `dc_id` of the placeholder session row seeded on bootstrap.
pub(crate) const DEFAULT_DC_ID: i32 = 2;

// language=SQLite
pub(crate) const SCHEMA: &str = "
CREATE TABLE sessions
(
    dc_id     INTEGER PRIMARY KEY,
    api_id    INTEGER,
    test_mode INTEGER,
    auth_key  BLOB,
    date      INTEGER NOT NULL,
    user_id   INTEGER,
    is_bot    INTEGER
);

CREATE TABLE peers
(
    id             INTEGER PRIMARY KEY,
    access_hash    INTEGER,
    kind           TEXT NOT NULL,
    phone_number   TEXT,
    last_update_on INTEGER NOT NULL DEFAULT (CAST(STRFTIME('%s', 'now') AS INTEGER))
);

CREATE TABLE usernames
(
    peer_id  INTEGER,
    username TEXT,
    FOREIGN KEY (peer_id) REFERENCES peers(id)
);

CREATE TABLE update_state
(
    source_id INTEGER PRIMARY KEY,
    pts       INTEGER,
    qts       INTEGER,
    date      INTEGER,
    seq       INTEGER
);

CREATE TABLE schema_version
(
    number INTEGER PRIMARY KEY
);

CREATE INDEX idx_peers_id ON peers (id);
CREATE INDEX idx_peers_phone_number ON peers (phone_number);
CREATE INDEX idx_usernames_username ON usernames (username);

CREATE TRIGGER trg_peers_last_update_on
    AFTER UPDATE
    ON peers
BEGIN
    UPDATE peers
    SET last_update_on = CAST(STRFTIME('%s', 'now') AS INTEGER)
    WHERE id = NEW.id;
END;
";

// ─── Migrations ───────────────────────────────────────────────────────────────

struct Migration {
    /// Version the store is at after this step.
    to:          u32,
    description: &'static str,
    apply:       fn(&Connection) -> rusqlite::Result<()>,
}

/// `MIGRATIONS[i]` takes a store from version `i + 1` to `i + 2`.
const MIGRATIONS: [Migration; 4] = [
    Migration { to: 2, description: "purge legacy peer cache",        apply: purge_peers },
    Migration { to: 3, description: "add sessions.api_id",            apply: add_api_id },
    Migration { to: 4, description: "move v3 usernames to own table", apply: split_usernames },
    Migration { to: 5, description: "add update_state",               apply: add_update_state },
];

fn purge_peers(conn: &Connection) -> rusqlite::Result<()> {
    conn.execute("DELETE FROM peers", []).map(drop)
}

fn add_api_id(conn: &Connection) -> rusqlite::Result<()> {
    conn.execute_batch("ALTER TABLE sessions ADD COLUMN api_id INTEGER")
}

// Only stores that started at v3 still have peers to copy; the v1 → v2 step
// has already emptied the table of anything older.
fn split_usernames(conn: &Connection) -> rusqlite::Result<()> {
    conn.execute_batch(
        "CREATE TABLE usernames
        (
            peer_id  INTEGER,
            username TEXT,
            FOREIGN KEY (peer_id) REFERENCES peers(id)
        );
        CREATE INDEX idx_usernames_username ON usernames (username);

        INSERT INTO usernames (peer_id, username)
            SELECT id, lower(username) FROM peers;

        DROP INDEX IF EXISTS idx_peers_username;
        ALTER TABLE peers DROP COLUMN username;",
    )
}

fn add_update_state(conn: &Connection) -> rusqlite::Result<()> {
    conn.execute_batch(
        "CREATE TABLE update_state
        (
            source_id INTEGER PRIMARY KEY,
            pts       INTEGER,
            qts       INTEGER,
            date      INTEGER,
            seq       INTEGER
        );",
    )
}

// ─── Operations ───────────────────────────────────────────────────────────────

/// What [`bootstrap`] had to do.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SchemaState {
    /// The database was empty and got the current schema.
    Created,
    /// The database was migrated from an older version.
    Upgraded { from: u32 },
    /// Already at [`CURRENT_VERSION`].
    Current,
}

/// Create the schema on an empty database, or migrate an existing one.
pub(crate) fn bootstrap(conn: &mut Connection) -> Result<SchemaState, StoreError> {
    if !is_initialized(conn)? {
        create(conn)?;
        return Ok(SchemaState::Created);
    }
    let from = update(conn)?;
    if from == CURRENT_VERSION {
        Ok(SchemaState::Current)
    } else {
        Ok(SchemaState::Upgraded { from })
    }
}

pub(crate) fn is_initialized(conn: &Connection) -> Result<bool, StoreError> {
    let n: i64 = conn.query_row(
        "SELECT COUNT(*) FROM sqlite_master WHERE type = 'table' AND name = 'schema_version'",
        [],
        |row| row.get(0),
    )?;
    Ok(n > 0)
}

/// Define the current schema and seed the placeholder session row.
pub(crate) fn create(conn: &mut Connection) -> Result<(), StoreError> {
    let tx = conn.transaction()?;
    tx.execute_batch(SCHEMA)?;
    tx.execute("INSERT INTO schema_version (number) VALUES (?1)", [CURRENT_VERSION])?;
    tx.execute(
        "INSERT INTO sessions (dc_id, api_id, test_mode, auth_key, date, user_id, is_bot)
         VALUES (?1, NULL, NULL, NULL, 0, NULL, NULL)",
        [DEFAULT_DC_ID],
    )?;
    tx.commit()?;
    tracing::info!("[tgstore] created schema v{CURRENT_VERSION}");
    Ok(())
}

/// Apply every pending migration. Returns the version the store was at.
pub(crate) fn update(conn: &mut Connection) -> Result<u32, StoreError> {
    let from = version(conn)?;
    if from > CURRENT_VERSION {
        return Err(SchemaError::TooNew { found: from, supported: CURRENT_VERSION }.into());
    }
    if from == 0 {
        return Err(SchemaError::Invalid(from).into());
    }

    let mut current = from;
    for step in MIGRATIONS.iter().filter(|m| m.to > from) {
        tracing::info!("[tgstore] migrating schema v{current} → v{}: {}", step.to, step.description);
        let failed = |source| SchemaError::Migration { from: current, to: step.to, source };

        let tx = conn.transaction().map_err(failed)?;
        (step.apply)(&tx).map_err(failed)?;
        set_version(&tx, step.to).map_err(failed)?;
        tx.commit().map_err(failed)?;
        current = step.to;
    }
    Ok(from)
}

/// Read the stored schema version.
pub(crate) fn version(conn: &Connection) -> Result<u32, SchemaError> {
    conn.query_row("SELECT number FROM schema_version", [], |row| row.get::<_, u32>(0))
        .map_err(SchemaError::Unreadable)
}

/// Overwrite the stored schema version.
pub(crate) fn set_version(conn: &Connection, number: u32) -> rusqlite::Result<()> {
    conn.execute("UPDATE schema_version SET number = ?1", [number]).map(drop)
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    // The layout shipped as version 1.
    pub(crate) const LEGACY_V1_SCHEMA: &str = "
    CREATE TABLE sessions
    (
        dc_id     INTEGER PRIMARY KEY,
        test_mode INTEGER,
        auth_key  BLOB,
        date      INTEGER NOT NULL,
        user_id   INTEGER,
        is_bot    INTEGER
    );

    CREATE TABLE peers
    (
        id             INTEGER PRIMARY KEY,
        access_hash    INTEGER,
        kind           TEXT NOT NULL,
        username       TEXT,
        phone_number   TEXT,
        last_update_on INTEGER NOT NULL DEFAULT (CAST(STRFTIME('%s', 'now') AS INTEGER))
    );

    CREATE TABLE schema_version
    (
        number INTEGER PRIMARY KEY
    );

    CREATE INDEX idx_peers_id ON peers (id);
    CREATE INDEX idx_peers_username ON peers (username);
    CREATE INDEX idx_peers_phone_number ON peers (phone_number);

    CREATE TRIGGER trg_peers_last_update_on
        AFTER UPDATE
        ON peers
    BEGIN
        UPDATE peers
        SET last_update_on = CAST(STRFTIME('%s', 'now') AS INTEGER)
        WHERE id = NEW.id;
    END;

    INSERT INTO schema_version VALUES (1);
    INSERT INTO sessions VALUES (2, NULL, NULL, 0, NULL, NULL);
    ";

    /// Every table column plus every index and trigger name, order-independent.
    pub(crate) fn layout(conn: &Connection) -> Vec<String> {
        let mut out = Vec::new();
        let mut tables = conn
            .prepare("SELECT name FROM sqlite_master WHERE type = 'table' ORDER BY name")
            .unwrap();
        let names: Vec<String> = tables
            .query_map([], |r| r.get(0))
            .unwrap()
            .map(Result::unwrap)
            .collect();
        for t in names {
            let mut cols = conn
                .prepare("SELECT name, type, \"notnull\", dflt_value, pk FROM pragma_table_info(?1)")
                .unwrap();
            let rows = cols
                .query_map([&t], |r| {
                    Ok(format!(
                        "{t}.{}:{}:{}:{:?}:{}",
                        r.get::<_, String>(0)?,
                        r.get::<_, String>(1)?,
                        r.get::<_, i64>(2)?,
                        r.get::<_, Option<String>>(3)?,
                        r.get::<_, i64>(4)?,
                    ))
                })
                .unwrap();
            out.extend(rows.map(Result::unwrap));
        }
        let mut other = conn
            .prepare("SELECT type, name FROM sqlite_master WHERE type IN ('index', 'trigger')")
            .unwrap();
        out.extend(
            other
                .query_map([], |r| Ok(format!("{}:{}", r.get::<_, String>(0)?, r.get::<_, String>(1)?)))
                .unwrap()
                .map(Result::unwrap),
        );
        out.sort();
        out
    }

    #[test]
    fn fresh_store_is_current() {
        let mut conn = Connection::open_in_memory().unwrap();
        assert_eq!(bootstrap(&mut conn).unwrap(), SchemaState::Created);
        assert_eq!(version(&conn).unwrap(), CURRENT_VERSION);
        assert_eq!(bootstrap(&mut conn).unwrap(), SchemaState::Current);
    }

    #[test]
    fn upgraded_v1_matches_fresh_layout() {
        let mut fresh = Connection::open_in_memory().unwrap();
        create(&mut fresh).unwrap();

        let mut old = Connection::open_in_memory().unwrap();
        old.execute_batch(LEGACY_V1_SCHEMA).unwrap();
        old.execute(
            "INSERT INTO peers (id, access_hash, kind, username) VALUES (1, 2, 'user', 'stale')",
            [],
        ).unwrap();

        assert_eq!(bootstrap(&mut old).unwrap(), SchemaState::Upgraded { from: 1 });
        assert_eq!(version(&old).unwrap(), CURRENT_VERSION);
        assert_eq!(layout(&old), layout(&fresh));

        let peers: i64 = old.query_row("SELECT COUNT(*) FROM peers", [], |r| r.get(0)).unwrap();
        assert_eq!(peers, 0, "v1 peers are purged");
        let dc: i32 = old.query_row("SELECT dc_id FROM sessions", [], |r| r.get(0)).unwrap();
        assert_eq!(dc, DEFAULT_DC_ID);
    }

    #[test]
    fn v3_usernames_move_to_alias_table() {
        let mut conn = Connection::open_in_memory().unwrap();
        conn.execute_batch(LEGACY_V1_SCHEMA).unwrap();
        conn.execute_batch("ALTER TABLE sessions ADD COLUMN api_id INTEGER").unwrap();
        set_version(&conn, 3).unwrap();
        conn.execute(
            "INSERT INTO peers (id, access_hash, kind, username) VALUES (10, 20, 'user', 'Alice')",
            [],
        ).unwrap();

        update(&mut conn).unwrap();
        let (id, name): (i64, String) = conn
            .query_row("SELECT peer_id, username FROM usernames", [], |r| Ok((r.get(0)?, r.get(1)?)))
            .unwrap();
        assert_eq!((id, name.as_str()), (10, "alice"));
    }

    #[test]
    fn newer_version_is_rejected() {
        let mut conn = Connection::open_in_memory().unwrap();
        create(&mut conn).unwrap();
        set_version(&conn, CURRENT_VERSION + 1).unwrap();
        let err = update(&mut conn).unwrap_err();
        assert!(matches!(err, StoreError::Schema(SchemaError::TooNew { found: 6, supported: 5 })));
    }

    #[test]
    fn failed_step_rolls_back_to_last_good_version() {
        let mut conn = Connection::open_in_memory().unwrap();
        conn.execute_batch(LEGACY_V1_SCHEMA).unwrap();
        // Make step 4 → 5 collide with an existing table.
        conn.execute_batch("CREATE TABLE update_state (x INTEGER)").unwrap();

        let err = update(&mut conn).unwrap_err();
        assert!(matches!(
            err,
            StoreError::Schema(SchemaError::Migration { from: 4, to: 5, .. })
        ));
        assert_eq!(version(&conn).unwrap(), 4);
    }

    #[test]
    fn missing_version_row_is_unreadable() {
        let mut conn = Connection::open_in_memory().unwrap();
        create(&mut conn).unwrap();
        conn.execute("DELETE FROM schema_version", []).unwrap();
        assert!(matches!(version(&conn), Err(SchemaError::Unreadable(_))));
    }
}
