//! SQLite DDL for the activity store.
//!
//! All `CREATE TABLE` / `CREATE INDEX` statements live here so they are
//! reviewable and testable in isolation.

use rusqlite::Connection;

/// Current schema version stamp.
pub(crate) const CURRENT_SCHEMA_VERSION: u32 = 1;

/// Complete DDL for the activity database.
///
/// Uses `IF NOT EXISTS` throughout so `apply_schema` is idempotent.
pub(crate) const SCHEMA_SQL: &str = r#"
-- Enable WAL mode for concurrent reads during writes.
PRAGMA journal_mode = WAL;

-- Enforce foreign key constraints.
PRAGMA foreign_keys = ON;

-- Schema version tracking.
CREATE TABLE IF NOT EXISTS schema_meta (
    key   TEXT PRIMARY KEY,
    value TEXT NOT NULL
);

-- Training activities (sessions, matches).
CREATE TABLE IF NOT EXISTS activities (
    id               TEXT PRIMARY KEY,
    title            TEXT NOT NULL,
    starts_at        INTEGER NOT NULL,   -- epoch seconds, UTC
    duration_minutes INTEGER NOT NULL DEFAULT 90,
    deleted          INTEGER NOT NULL DEFAULT 0,
    updated_at       INTEGER NOT NULL DEFAULT 0
);

CREATE INDEX IF NOT EXISTS idx_activities_starts_at ON activities(starts_at);
CREATE INDEX IF NOT EXISTS idx_activities_deleted   ON activities(deleted);

-- Per-activity tasks; reminder_minutes is the pre-start offset.
CREATE TABLE IF NOT EXISTS activity_tasks (
    id               TEXT PRIMARY KEY,
    activity_id      TEXT NOT NULL REFERENCES activities(id),
    title            TEXT NOT NULL,
    details          TEXT NOT NULL DEFAULT '',
    reminder_minutes INTEGER,            -- NULL = no reminder configured
    deleted          INTEGER NOT NULL DEFAULT 0,
    updated_at       INTEGER NOT NULL DEFAULT 0
);

CREATE INDEX IF NOT EXISTS idx_tasks_activity_id ON activity_tasks(activity_id);

"#;

/// Apply the full schema to an open connection.
///
/// Safe to call multiple times — all statements use `IF NOT EXISTS`.
/// Inserts the current schema version into `schema_meta` if not already
/// present.
pub(crate) fn apply_schema(conn: &Connection) -> rusqlite::Result<()> {
    conn.execute_batch(SCHEMA_SQL)?;

    // Seed schema version if this is a fresh database.
    let version_str = CURRENT_SCHEMA_VERSION.to_string();
    conn.execute(
        "INSERT OR IGNORE INTO schema_meta (key, value) VALUES ('schema_version', ?1)",
        rusqlite::params![version_str],
    )?;

    Ok(())
}

/// Read the current schema version from the database.
///
/// Returns `None` if the `schema_meta` table is empty or the key is missing.
pub(crate) fn read_schema_version(conn: &Connection) -> rusqlite::Result<Option<u32>> {
    let mut stmt = conn.prepare("SELECT value FROM schema_meta WHERE key = 'schema_version'")?;
    let mut rows = stmt.query([])?;
    match rows.next()? {
        Some(row) => {
            let val: String = row.get(0)?;
            Ok(val.parse::<u32>().ok())
        }
        None => Ok(None),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn apply_schema_creates_tables() {
        let conn = Connection::open_in_memory().expect("open in-memory db");
        apply_schema(&conn).expect("first apply_schema");

        let tables: Vec<String> = conn
            .prepare("SELECT name FROM sqlite_master WHERE type='table' ORDER BY name")
            .expect("prepare")
            .query_map([], |row| row.get(0))
            .expect("query")
            .filter_map(|r| r.ok())
            .collect();

        assert!(tables.contains(&"activities".to_owned()));
        assert!(tables.contains(&"activity_tasks".to_owned()));
        assert!(tables.contains(&"schema_meta".to_owned()));
    }

    #[test]
    fn apply_schema_is_idempotent() {
        let conn = Connection::open_in_memory().expect("open in-memory db");
        apply_schema(&conn).expect("first apply_schema");
        apply_schema(&conn).expect("second apply_schema (idempotent)");
    }

    #[test]
    fn schema_version_is_seeded() {
        let conn = Connection::open_in_memory().expect("open in-memory db");
        apply_schema(&conn).expect("apply_schema");

        let version = read_schema_version(&conn)
            .expect("read_schema_version")
            .expect("version should exist");

        assert_eq!(version, CURRENT_SCHEMA_VERSION);
    }

    #[test]
    fn schema_version_not_overwritten_on_reapply() {
        let conn = Connection::open_in_memory().expect("open in-memory db");
        apply_schema(&conn).expect("first apply");

        conn.execute(
            "UPDATE schema_meta SET value = '999' WHERE key = 'schema_version'",
            [],
        )
        .expect("bump version");

        apply_schema(&conn).expect("second apply");

        let version = read_schema_version(&conn)
            .expect("read")
            .expect("version exists");
        assert_eq!(version, 999);
    }
}
