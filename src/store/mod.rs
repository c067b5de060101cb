// Lockbox - Store Module
//
// The secure store backend contract, the access rules every adapter
// enforces, and the two shipped adapters: SQLite (durable, sealed values)
// and in-memory.

mod access;
mod backend;
mod db;
mod error;
mod memory;
mod seal;
mod sqlite;

pub use access::{authorize, GroupPolicy, LockState};
pub use backend::{
    GroupScope, ItemAttributes, ItemClass, ItemKey, ItemMetadata, SecureStoreBackend, StoredItem,
    WriteMode,
};
pub use db::Database;
pub use error::{status, BackendError};
pub use memory::MemoryBackend;
pub use sqlite::SqliteBackend;
