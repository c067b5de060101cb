// Lockbox - In-memory secure store
//
// Process-local backend with the same access rules as the SQLite adapter.
// Used by tests and by embedders that want nothing on disk. The device lock
// state, entitlements and one-shot faults can be set from outside to exercise
// failure paths.

use std::collections::BTreeMap;

use parking_lot::{Mutex, RwLock};
use zeroize::Zeroizing;

use super::access::{self, GroupPolicy, LockState};
use super::backend::{
    GroupScope, ItemAttributes, ItemClass, ItemKey, ItemMetadata, SecureStoreBackend, StoredItem,
    WriteMode,
};
use super::BackendError;
use crate::policy::ReadingOptions;

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
struct Slot {
    class: ItemClass,
    service: String,
    account: String,
    group: Option<String>,
}

impl Slot {
    fn new(key: &ItemKey, group: Option<String>) -> Self {
        Self {
            class: key.class,
            service: key.service.clone(),
            account: key.account.clone(),
            group,
        }
    }

    fn same_identity(&self, key: &ItemKey) -> bool {
        self.class == key.class && self.service == key.service && self.account == key.account
    }
}

struct Entry {
    value: Zeroizing<Vec<u8>>,
    attributes: ItemAttributes,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum FaultOp {
    Put,
    Delete,
}

struct Fault {
    op: FaultOp,
    class: ItemClass,
    error: BackendError,
}

/// In-memory `SecureStoreBackend`.
#[derive(Default)]
pub struct MemoryBackend {
    items: RwLock<BTreeMap<Slot, Entry>>,
    lock_state: Mutex<LockState>,
    groups: GroupPolicy,
    faults: Mutex<Vec<Fault>>,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_group_policy(groups: GroupPolicy) -> Self {
        Self {
            groups,
            ..Self::default()
        }
    }

    pub fn set_lock_state(&self, state: LockState) {
        *self.lock_state.lock() = state;
    }

    pub fn lock_state(&self) -> LockState {
        *self.lock_state.lock()
    }

    /// Make the next `put` of an item of `class` fail with `error`.
    pub fn fail_next_put(&self, class: ItemClass, error: BackendError) {
        self.faults.lock().push(Fault {
            op: FaultOp::Put,
            class,
            error,
        });
    }

    /// Make the next `delete` of an item of `class` fail with `error`.
    pub fn fail_next_delete(&self, class: ItemClass, error: BackendError) {
        self.faults.lock().push(Fault {
            op: FaultOp::Delete,
            class,
            error,
        });
    }

    /// Number of stored items across all classes and groups.
    pub fn len(&self) -> usize {
        self.items.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.read().is_empty()
    }

    fn take_fault(&self, op: FaultOp, class: ItemClass) -> Result<(), BackendError> {
        let mut faults = self.faults.lock();
        match faults.iter().position(|f| f.op == op && f.class == class) {
            Some(index) => {
                let fault = faults.remove(index);
                tracing::debug!(?op, %class, "Injected backend fault");
                Err(fault.error)
            }
            None => Ok(()),
        }
    }

    /// First visible match for `key`, ungrouped items first.
    fn find<T>(
        &self,
        key: &ItemKey,
        project: impl FnOnce(&Slot, &Entry) -> T,
    ) -> Result<T, BackendError> {
        self.groups.check(&key.scope)?;
        let items = self.items.read();
        items
            .iter()
            .find(|(slot, _)| {
                slot.same_identity(key) && self.groups.matches(&key.scope, slot.group.as_deref())
            })
            .map(|(slot, entry)| project(slot, entry))
            .ok_or(BackendError::ItemNotFound)
    }
}

impl SecureStoreBackend for MemoryBackend {
    fn put(
        &self,
        key: &ItemKey,
        value: &[u8],
        attributes: &ItemAttributes,
        mode: WriteMode,
        authorization: &ReadingOptions,
    ) -> Result<(), BackendError> {
        self.take_fault(FaultOp::Put, key.class)?;

        let group = self.groups.resolve_write(&key.scope)?;
        let slot = Slot::new(key, group);

        // Authorization runs unlocked, so the write only lands if the slot
        // still holds what was authorized; otherwise authorize again.
        for _ in 0..access::WRITE_ATTEMPTS {
            let snapshot = self.items.read().get(&slot).map(|e| e.attributes.clone());
            match (&snapshot, mode) {
                (Some(_), WriteMode::Add) => return Err(BackendError::DuplicateItem),
                (Some(current), WriteMode::Replace) => {
                    access::authorize(self.lock_state(), current, authorization)?
                }
                (None, _) => {}
            }

            let mut items = self.items.write();
            if items.get(&slot).map(|e| &e.attributes) != snapshot.as_ref() {
                tracing::debug!(class = %key.class, "Item changed during authorization, retrying");
                continue;
            }
            items.insert(
                slot,
                Entry {
                    value: Zeroizing::new(value.to_vec()),
                    attributes: attributes.clone(),
                },
            );
            return Ok(());
        }
        Err(BackendError::ItemChanged)
    }

    fn get(&self, key: &ItemKey, options: &ReadingOptions) -> Result<StoredItem, BackendError> {
        let item = self.find(key, |slot, entry| StoredItem {
            value: entry.value.clone(),
            access_group: slot.group.clone(),
            attributes: entry.attributes.clone(),
        })?;

        access::authorize(self.lock_state(), &item.attributes, options)?;
        Ok(item)
    }

    fn lookup(&self, key: &ItemKey) -> Result<ItemMetadata, BackendError> {
        self.find(key, |slot, entry| ItemMetadata {
            access_group: slot.group.clone(),
            attributes: entry.attributes.clone(),
        })
    }

    fn delete(&self, key: &ItemKey) -> Result<(), BackendError> {
        self.take_fault(FaultOp::Delete, key.class)?;
        self.groups.check(&key.scope)?;

        let mut items = self.items.write();
        let before = items.len();
        items.retain(|slot, _| {
            !(slot.same_identity(key) && self.groups.matches(&key.scope, slot.group.as_deref()))
        });

        if items.len() == before {
            Err(BackendError::ItemNotFound)
        } else {
            Ok(())
        }
    }

    fn delete_all(
        &self,
        class: ItemClass,
        service: &str,
        access_group: Option<&str>,
    ) -> Result<usize, BackendError> {
        let scope = GroupScope::from_option(access_group);
        self.groups.check(&scope)?;

        let mut items = self.items.write();
        let before = items.len();
        items.retain(|slot, _| {
            !(slot.class == class
                && slot.service == service
                && self.groups.matches(&scope, slot.group.as_deref()))
        });
        Ok(before - items.len())
    }

    fn default_access_group(&self) -> Option<String> {
        self.groups.default_group().map(str::to_string)
    }
}

// ─── Tests ───────────────────────────────────────────────────────────────────
