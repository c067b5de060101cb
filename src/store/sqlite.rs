// Lockbox - SQLite Secure Store
//
// Durable backend for desktop and server hosts. Values are sealed with the
// Argon2id-derived store key before they reach SQLite; attributes stay in
// clear so `lookup` never needs the key. There is no device lock on these
// hosts, so accessibility tiers are recorded and always satisfied.

use std::path::Path;

use chrono::Utc;
use parking_lot::Mutex;
use rusqlite::{params, Connection, ErrorCode};

use super::access::{self, GroupPolicy, LockState};
use super::backend::{
    GroupScope, ItemAttributes, ItemClass, ItemKey, ItemMetadata, SecureStoreBackend, StoredItem,
    WriteMode,
};
use super::db::Database;
use super::seal::Sealer;
use super::BackendError;
use crate::enclave::{derive_store_key, KdfParams, MasterKeySource};
use crate::policy::{AccessControl, Accessibility, ReadingOptions};

/// One row, value still sealed.
struct Row {
    group: Option<String>,
    sealed: Vec<u8>,
    attributes: ItemAttributes,
}

fn group_column(group: Option<&str>) -> &str {
    group.unwrap_or("")
}

fn group_from_column(column: String) -> Option<String> {
    if column.is_empty() {
        None
    } else {
        Some(column)
    }
}

/// Associated data binding a sealed value to its row.
fn identity(class: ItemClass, service: &str, account: &str, group: Option<&str>) -> Vec<u8> {
    format!(
        "{}\u{0}{}\u{0}{}\u{0}{}",
        class,
        service,
        account,
        group_column(group)
    )
    .into_bytes()
}

fn decode_attributes(accessibility: &str, access_control: &str) -> Result<ItemAttributes, BackendError> {
    let accessibility: Accessibility = accessibility.parse().map_err(BackendError::Decode)?;
    let access_control: AccessControl = serde_json::from_str(access_control)
        .map_err(|e| BackendError::Decode(format!("access control: {}", e)))?;
    Ok(ItemAttributes {
        accessibility,
        access_control,
    })
}

/// SQLite-backed `SecureStoreBackend`.
pub struct SqliteBackend {
    db: Mutex<Database>,
    sealer: Sealer,
    groups: GroupPolicy,
}

impl SqliteBackend {
    /// Open the store at `path` with an already-derived store key.
    pub fn open(path: &Path, store_key: &[u8], groups: GroupPolicy) -> Result<Self, BackendError> {
        let sealer = Sealer::new(store_key)?;
        let db = Database::open(path, store_key)?;
        Ok(Self {
            db: Mutex::new(db),
            sealer,
            groups,
        })
    }

    /// Open the store, deriving the store key from the master secret in `source`.
    pub fn open_with_source(
        path: &Path,
        source: &dyn MasterKeySource,
        kdf: &KdfParams,
        groups: GroupPolicy,
    ) -> Result<Self, BackendError> {
        let master = source.get()?;
        let store_key = derive_store_key(&master, &source.salt(), kdf)?;
        Self::open(path, &store_key, groups)
    }

    #[cfg(test)]
    fn open_in_memory(store_key: &[u8], groups: GroupPolicy) -> Result<Self, BackendError> {
        Ok(Self {
            db: Mutex::new(Database::open_in_memory()?),
            sealer: Sealer::new(store_key)?,
            groups,
        })
    }

    /// All rows for `key`'s identity visible under its scope, ungrouped first.
    fn rows(&self, key: &ItemKey) -> Result<Vec<Row>, BackendError> {
        self.groups.check(&key.scope)?;

        let db = self.db.lock();
        self.rows_in(db.conn(), key)
    }

    fn rows_in(&self, conn: &Connection, key: &ItemKey) -> Result<Vec<Row>, BackendError> {
        let mut stmt = conn.prepare(
            "SELECT access_group, value, accessibility, access_control
             FROM items
             WHERE class = ?1 AND service = ?2 AND account = ?3
             ORDER BY access_group",
        )?;
        let raw = stmt
            .query_map(
                params![key.class.as_str(), key.service, key.account],
                |row| {
                    Ok((
                        row.get::<_, String>(0)?,
                        row.get::<_, Vec<u8>>(1)?,
                        row.get::<_, String>(2)?,
                        row.get::<_, String>(3)?,
                    ))
                },
            )?
            .collect::<rusqlite::Result<Vec<_>>>()?;

        let mut rows = Vec::new();
        for (group, sealed, accessibility, access_control) in raw {
            let group = group_from_column(group);
            if !self.groups.matches(&key.scope, group.as_deref()) {
                continue;
            }
            rows.push(Row {
                group,
                sealed,
                attributes: decode_attributes(&accessibility, &access_control)?,
            });
        }
        Ok(rows)
    }

    fn first_row(&self, key: &ItemKey) -> Result<Row, BackendError> {
        self.rows(key)?
            .into_iter()
            .next()
            .ok_or(BackendError::ItemNotFound)
    }
}

impl SecureStoreBackend for SqliteBackend {
    fn put(
        &self,
        key: &ItemKey,
        value: &[u8],
        attributes: &ItemAttributes,
        mode: WriteMode,
        authorization: &ReadingOptions,
    ) -> Result<(), BackendError> {
        let group = self.groups.resolve_write(&key.scope)?;
        let exact = key.exact(group.as_deref());

        let aad = identity(key.class, &key.service, &key.account, group.as_deref());
        let sealed = self.sealer.seal(&aad, value)?;
        let access_control = serde_json::to_string(&attributes.access_control)
            .map_err(|e| BackendError::Decode(format!("access control: {}", e)))?;

        let sql = match mode {
            WriteMode::Add => {
                "INSERT INTO items
                    (class, service, account, access_group, value,
                     accessibility, access_control, created_at, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?8)"
            }
            WriteMode::Replace => {
                "INSERT INTO items
                    (class, service, account, access_group, value,
                     accessibility, access_control, created_at, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?8)
                 ON CONFLICT (class, service, account, access_group) DO UPDATE SET
                    value = excluded.value,
                    accessibility = excluded.accessibility,
                    access_control = excluded.access_control,
                    updated_at = excluded.updated_at"
            }
        };

        // Authorization runs without the connection lock; the write commits
        // only if the row still carries the attributes that were authorized.
        for _ in 0..access::WRITE_ATTEMPTS {
            let snapshot = match self.first_row(&exact) {
                Ok(row) => Some(row.attributes),
                Err(BackendError::ItemNotFound) => None,
                Err(e) => return Err(e),
            };
            match (&snapshot, mode) {
                (Some(_), WriteMode::Add) => return Err(BackendError::DuplicateItem),
                (Some(current), WriteMode::Replace) => {
                    access::authorize(LockState::Unlocked, current, authorization)?
                }
                (None, _) => {}
            }

            let db = self.db.lock();
            let tx = db.conn().unchecked_transaction()?;
            let current = self.rows_in(&tx, &exact)?.into_iter().next().map(|row| row.attributes);
            if current != snapshot {
                tracing::debug!(class = %key.class, "Item changed during authorization, retrying");
                continue;
            }

            let result = tx.execute(
                sql,
                params![
                    key.class.as_str(),
                    key.service,
                    key.account,
                    group_column(group.as_deref()),
                    sealed,
                    attributes.accessibility.as_str(),
                    access_control,
                    Utc::now().to_rfc3339(),
                ],
            );

            return match result {
                Ok(_) => Ok(tx.commit()?),
                Err(rusqlite::Error::SqliteFailure(e, _)) if e.code == ErrorCode::ConstraintViolation => {
                    Err(BackendError::DuplicateItem)
                }
                Err(e) => Err(e.into()),
            };
        }
        Err(BackendError::ItemChanged)
    }

    fn get(&self, key: &ItemKey, options: &ReadingOptions) -> Result<StoredItem, BackendError> {
        let row = self.first_row(key)?;
        access::authorize(LockState::Unlocked, &row.attributes, options)?;

        let aad = identity(key.class, &key.service, &key.account, row.group.as_deref());
        let value = self.sealer.open(&aad, &row.sealed)?;

        Ok(StoredItem {
            value,
            access_group: row.group,
            attributes: row.attributes,
        })
    }

    fn lookup(&self, key: &ItemKey) -> Result<ItemMetadata, BackendError> {
        let row = self.first_row(key)?;
        Ok(ItemMetadata {
            access_group: row.group,
            attributes: row.attributes,
        })
    }

    fn delete(&self, key: &ItemKey) -> Result<(), BackendError> {
        let groups: Vec<Option<String>> = self.rows(key)?.into_iter().map(|row| row.group).collect();
        if groups.is_empty() {
            return Err(BackendError::ItemNotFound);
        }

        let db = self.db.lock();
        let tx = db.conn().unchecked_transaction()?;
        for group in &groups {
            tx.execute(
                "DELETE FROM items
                 WHERE class = ?1 AND service = ?2 AND account = ?3 AND access_group = ?4",
                params![
                    key.class.as_str(),
                    key.service,
                    key.account,
                    group_column(group.as_deref())
                ],
            )?;
        }
        tx.commit()?;
        Ok(())
    }

    fn delete_all(
        &self,
        class: ItemClass,
        service: &str,
        access_group: Option<&str>,
    ) -> Result<usize, BackendError> {
        let scope = GroupScope::from_option(access_group);
        self.groups.check(&scope)?;

        let db = self.db.lock();
        let tx = db.conn().unchecked_transaction()?;

        let groups: Vec<String> = {
            let mut stmt = tx.prepare(
                "SELECT DISTINCT access_group FROM items WHERE class = ?1 AND service = ?2",
            )?;
            let all = stmt
                .query_map(params![class.as_str(), service], |row| row.get::<_, String>(0))?
                .collect::<rusqlite::Result<Vec<_>>>()?;
            all
        };

        let mut removed = 0;
        for group in groups {
            let visible = self
                .groups
                .matches(&scope, group_from_column(group.clone()).as_deref());
            if !visible {
                continue;
            }
            removed += tx.execute(
                "DELETE FROM items WHERE class = ?1 AND service = ?2 AND access_group = ?3",
                params![class.as_str(), service, group],
            )?;
        }
        tx.commit()?;
        Ok(removed)
    }

    fn default_access_group(&self) -> Option<String> {
        self.groups.default_group().map(str::to_string)
    }
}

// ─── Tests ───────────────────────────────────────────────────────────────────
