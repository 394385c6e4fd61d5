//! Versioned schema migrations
//!
//! The applied version is tracked in `PRAGMA user_version`. Each migration
//! runs in its own transaction and bumps the version on success.

use rusqlite::Connection;
use tracing::{debug, info};

use crate::errors::{StoreError, StoreResult};

struct Migration {
    version: u32,
    description: &'static str,
    sql: &'static str,
}

const MIGRATIONS: &[Migration] = &[
    Migration {
        version: 1,
        description: "feeds, items and raw metadata",
        sql: "
            CREATE TABLE feeds (
                id               INTEGER PRIMARY KEY AUTOINCREMENT,
                shortname        TEXT NOT NULL UNIQUE,
                episode_count    INTEGER NOT NULL DEFAULT 0,
                last_pub_date    TEXT,
                last_build_date  TEXT
            );

            CREATE TABLE feed_xml (
                feed_id  INTEGER PRIMARY KEY REFERENCES feeds(id) ON DELETE CASCADE,
                channel  TEXT NOT NULL
            );

            CREATE TABLE items (
                id               INTEGER PRIMARY KEY AUTOINCREMENT,
                feed_id          INTEGER NOT NULL REFERENCES feeds(id) ON DELETE CASCADE,
                hash             TEXT NOT NULL,
                guid             TEXT NOT NULL,
                url              TEXT NOT NULL,
                filename         TEXT NOT NULL,
                filename_suffix  TEXT,
                episode_count    INTEGER NOT NULL,
                downloaded       INTEGER NOT NULL DEFAULT 0,
                archived         INTEGER NOT NULL DEFAULT 0,
                cd_filename      TEXT,
                pub_date         TEXT,
                deleted_at       TEXT
            );

            CREATE UNIQUE INDEX idx_items_feed_hash
                ON items(feed_id, hash) WHERE deleted_at IS NULL;
            CREATE INDEX idx_items_feed_pub_date ON items(feed_id, pub_date);

            CREATE TABLE item_xml (
                item_id  INTEGER PRIMARY KEY REFERENCES items(id) ON DELETE CASCADE,
                item     TEXT NOT NULL
            );
        ",
    },
    Migration {
        version: 2,
        description: "feed images",
        sql: "
            CREATE TABLE images (
                id          INTEGER PRIMARY KEY AUTOINCREMENT,
                feed_id     INTEGER NOT NULL REFERENCES feeds(id) ON DELETE CASCADE,
                url         TEXT NOT NULL,
                filename    TEXT NOT NULL,
                downloaded  INTEGER NOT NULL DEFAULT 0,
                archived    INTEGER NOT NULL DEFAULT 0,
                UNIQUE(feed_id, url)
            );
        ",
    },
];

/// Latest schema version this build knows about
pub fn latest_version() -> u32 {
    MIGRATIONS.last().map_or(0, |migration| migration.version)
}

/// Current schema version of a database
pub fn current_version(conn: &Connection) -> StoreResult<u32> {
    Ok(conn.query_row("PRAGMA user_version", [], |row| row.get(0))?)
}

/// Bring a database up to the latest schema version
pub fn migrate(conn: &mut Connection) -> StoreResult<()> {
    let current = current_version(conn)?;
    if current > latest_version() {
        return Err(StoreError::MigrationFailed {
            version: current,
            reason: format!(
                "database schema is newer than this build supports ({})",
                latest_version()
            ),
        });
    }

    for migration in MIGRATIONS.iter().filter(|m| m.version > current) {
        info!(
            "Applying schema migration {} ({})",
            migration.version, migration.description
        );
        let tx = conn.transaction()?;
        tx.execute_batch(migration.sql)
            .map_err(|e| StoreError::MigrationFailed {
                version: migration.version,
                reason: e.to_string(),
            })?;
        tx.pragma_update(None, "user_version", migration.version)?;
        tx.commit()?;
    }

    debug!("Schema at version {}", latest_version());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_migrate_fresh_database() {
        let mut conn = Connection::open_in_memory().unwrap();
        migrate(&mut conn).unwrap();
        assert_eq!(current_version(&conn).unwrap(), latest_version());

        let tables: i64 = conn
            .query_row(
                "SELECT COUNT(*) FROM sqlite_master WHERE type = 'table' AND name IN
                 ('feeds', 'feed_xml', 'items', 'item_xml', 'images')",
                [],
                |row| row.get(0),
            )
            .unwrap();
        assert_eq!(tables, 5);
    }

    #[test]
    fn test_migrate_is_idempotent() {
        let mut conn = Connection::open_in_memory().unwrap();
        migrate(&mut conn).unwrap();
        migrate(&mut conn).unwrap();
        assert_eq!(current_version(&conn).unwrap(), 2);
    }

    #[test]
    fn test_partial_upgrade() {
        let mut conn = Connection::open_in_memory().unwrap();
        conn.execute_batch(MIGRATIONS[0].sql).unwrap();
        conn.pragma_update(None, "user_version", 1).unwrap();

        migrate(&mut conn).unwrap();
        assert_eq!(current_version(&conn).unwrap(), 2);
    }

    #[test]
    fn test_newer_schema_rejected() {
        let mut conn = Connection::open_in_memory().unwrap();
        conn.pragma_update(None, "user_version", 99).unwrap();
        assert!(matches!(
            migrate(&mut conn),
            Err(StoreError::MigrationFailed { version: 99, .. })
        ));
    }
}
