// Lockbox - SQLite Database Management
//
// Opens the item database and runs migrations. With the `sqlcipher` feature
// the store key is also applied via `PRAGMA key` before any table is
// touched, so the file itself is encrypted.

use std::path::Path;

use rusqlite::Connection;

use super::BackendError;

/// Wrapper around the item database connection.
pub struct Database {
    conn: Connection,
}

impl Database {
    /// Open (or create) the database at `path`.
    #[cfg_attr(not(feature = "sqlcipher"), allow(unused_variables))]
    pub fn open(path: &Path, store_key: &[u8]) -> Result<Self, BackendError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let conn = Connection::open(path)?;

        #[cfg(feature = "sqlcipher")]
        {
            conn.execute_batch(&format!("PRAGMA key = \"x'{}'\";", hex::encode(store_key)))?;
            // A wrong key only shows up on first read: "file is not a database".
            conn.execute_batch("SELECT count(*) FROM sqlite_master;")
                .map_err(|_| BackendError::Decode("database key rejected".to_string()))?;
        }

        let db = Self { conn };
        db.run_migrations()?;
        tracing::debug!(path = %path.display(), "Item database opened");
        Ok(db)
    }

    /// Open an in-memory database (unencrypted, for testing only).
    #[cfg(test)]
    pub fn open_in_memory() -> Result<Self, BackendError> {
        let conn = Connection::open_in_memory()?;
        let db = Self { conn };
        db.run_migrations()?;
        Ok(db)
    }

    pub fn conn(&self) -> &Connection {
        &self.conn
    }

    /// `access_group` is '' for ungrouped items so the primary key stays total.
    fn run_migrations(&self) -> Result<(), BackendError> {
        self.conn.execute_batch(
            "
            CREATE TABLE IF NOT EXISTS items (
                class           TEXT NOT NULL,
                service         TEXT NOT NULL,
                account         TEXT NOT NULL,
                access_group    TEXT NOT NULL DEFAULT '',
                value           BLOB NOT NULL,
                accessibility   TEXT NOT NULL,
                access_control  TEXT NOT NULL DEFAULT '[]',
                created_at      TEXT NOT NULL,
                updated_at      TEXT NOT NULL,
                PRIMARY KEY (class, service, account, access_group)
            );

            CREATE INDEX IF NOT EXISTS idx_items_service
                ON items(class, service);
            ",
        )?;

        tracing::debug!("Database migrations completed successfully");
        Ok(())
    }
}

// ─── Tests ───────────────────────────────────────────────────────────────────
