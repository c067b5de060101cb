// Lockbox - Secure Store Backend
//
// The durable, access-controlled storage substrate under CredentialStore and
// KeyManager. Backends own persisted secret and private-key bytes and are the
// only component that invokes an authentication context.

use std::fmt;
use std::str::FromStr;

use zeroize::Zeroizing;

use super::BackendError;
use crate::policy::{AccessControl, Accessibility, ReadingOptions};

// ─── Item identity ───────────────────────────────────────────────────────────

/// Namespace an item lives in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ItemClass {
    GenericPassword,
    GenericSecret,
    RsaPublicKey,
    RsaPrivateKey,
}

impl ItemClass {
    pub const ALL: [ItemClass; 4] = [
        ItemClass::GenericPassword,
        ItemClass::GenericSecret,
        ItemClass::RsaPublicKey,
        ItemClass::RsaPrivateKey,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ItemClass::GenericPassword => "password",
            ItemClass::GenericSecret => "secret",
            ItemClass::RsaPublicKey => "rsa-public",
            ItemClass::RsaPrivateKey => "rsa-private",
        }
    }
}

impl fmt::Display for ItemClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ItemClass {
    type Err = BackendError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        ItemClass::ALL
            .into_iter()
            .find(|class| class.as_str() == s)
            .ok_or_else(|| BackendError::Decode(format!("unknown item class '{}'", s)))
    }
}

/// Which access group(s) an operation targets.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum GroupScope {
    /// Writes go to the backend default group; reads and deletes match every
    /// entitled group, ungrouped items first.
    Unspecified,
    /// Exactly this partition. `None` is the ungrouped partition.
    Exact(Option<String>),
}

impl GroupScope {
    /// Scope for a caller-supplied optional group name.
    pub fn from_option(group: Option<&str>) -> Self {
        match group {
            Some(group) => GroupScope::Exact(Some(group.to_string())),
            None => GroupScope::Unspecified,
        }
    }
}

/// Identity of a stored item. RSA halves use an empty `service` and the tag
/// as `account`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ItemKey {
    pub class: ItemClass,
    pub service: String,
    pub account: String,
    pub scope: GroupScope,
}

impl ItemKey {
    pub fn new(class: ItemClass, service: &str, account: &str, scope: GroupScope) -> Self {
        Self {
            class,
            service: service.to_string(),
            account: account.to_string(),
            scope,
        }
    }

    /// Key for one half of an RSA pair.
    pub fn key_half(class: ItemClass, tag: &str, scope: GroupScope) -> Self {
        Self::new(class, "", tag, scope)
    }

    /// Same identity, pinned to one partition.
    pub fn exact(&self, group: Option<&str>) -> Self {
        Self {
            scope: GroupScope::Exact(group.map(str::to_string)),
            ..self.clone()
        }
    }
}

impl fmt::Display for ItemKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}/{}", self.class, self.service, self.account)?;
        match &self.scope {
            GroupScope::Unspecified => Ok(()),
            GroupScope::Exact(None) => f.write_str("@-"),
            GroupScope::Exact(Some(group)) => write!(f, "@{}", group),
        }
    }
}

// ─── Item payloads ───────────────────────────────────────────────────────────

/// Protection attributes persisted alongside a value.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ItemAttributes {
    pub accessibility: Accessibility,
    pub access_control: AccessControl,
}

/// Metadata visible without authenticating.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ItemMetadata {
    pub access_group: Option<String>,
    pub attributes: ItemAttributes,
}

/// A value returned by an authorized read.
pub struct StoredItem {
    pub value: Zeroizing<Vec<u8>>,
    pub access_group: Option<String>,
    pub attributes: ItemAttributes,
}

impl fmt::Debug for StoredItem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StoredItem")
            .field("value", &"[REDACTED]")
            .field("access_group", &self.access_group)
            .field("attributes", &self.attributes)
            .finish()
    }
}

/// How `put` treats an existing item under the same identity.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteMode {
    /// Fail with `DuplicateItem` if the identity is taken.
    Add,
    /// Atomically replace value and attributes.
    Replace,
}

// ─── Trait ───────────────────────────────────────────────────────────────────

/// Storage interface implemented by secure store adapters.
pub trait SecureStoreBackend: Send + Sync {
    /// Store `value` under `key`.
    ///
    /// Replacing an item that itself requires authentication runs the
    /// authentication context in `authorization` first.
    fn put(
        &self,
        key: &ItemKey,
        value: &[u8],
        attributes: &ItemAttributes,
        mode: WriteMode,
        authorization: &ReadingOptions,
    ) -> Result<(), BackendError>;

    /// Read an item, enforcing accessibility and access control.
    fn get(&self, key: &ItemKey, options: &ReadingOptions) -> Result<StoredItem, BackendError>;

    /// Read an item's metadata. Never prompts.
    fn lookup(&self, key: &ItemKey) -> Result<ItemMetadata, BackendError>;

    /// Remove every item matching `key`. `ItemNotFound` if nothing matched.
    fn delete(&self, key: &ItemKey) -> Result<(), BackendError>;

    /// Remove every item of `class` under `service`, optionally within one
    /// group. Returns the number removed.
    fn delete_all(
        &self,
        class: ItemClass,
        service: &str,
        access_group: Option<&str>,
    ) -> Result<usize, BackendError>;

    /// Group that unscoped writes land in.
    fn default_access_group(&self) -> Option<String>;
}

impl<T> SecureStoreBackend for Box<T>
where
    T: SecureStoreBackend + ?Sized,
{
    fn put(
        &self,
        key: &ItemKey,
        value: &[u8],
        attributes: &ItemAttributes,
        mode: WriteMode,
        authorization: &ReadingOptions,
    ) -> Result<(), BackendError> {
        (**self).put(key, value, attributes, mode, authorization)
    }

    fn get(&self, key: &ItemKey, options: &ReadingOptions) -> Result<StoredItem, BackendError> {
        (**self).get(key, options)
    }

    fn lookup(&self, key: &ItemKey) -> Result<ItemMetadata, BackendError> {
        (**self).lookup(key)
    }

    fn delete(&self, key: &ItemKey) -> Result<(), BackendError> {
        (**self).delete(key)
    }

    fn delete_all(
        &self,
        class: ItemClass,
        service: &str,
        access_group: Option<&str>,
    ) -> Result<usize, BackendError> {
        (**self).delete_all(class, service, access_group)
    }

    fn default_access_group(&self) -> Option<String> {
        (**self).default_access_group()
    }
}

impl<T> SecureStoreBackend for std::sync::Arc<T>
where
    T: SecureStoreBackend + ?Sized,
{
    fn put(
        &self,
        key: &ItemKey,
        value: &[u8],
        attributes: &ItemAttributes,
        mode: WriteMode,
        authorization: &ReadingOptions,
    ) -> Result<(), BackendError> {
        (**self).put(key, value, attributes, mode, authorization)
    }

    fn get(&self, key: &ItemKey, options: &ReadingOptions) -> Result<StoredItem, BackendError> {
        (**self).get(key, options)
    }

    fn lookup(&self, key: &ItemKey) -> Result<ItemMetadata, BackendError> {
        (**self).lookup(key)
    }

    fn delete(&self, key: &ItemKey) -> Result<(), BackendError> {
        (**self).delete(key)
    }

    fn delete_all(
        &self,
        class: ItemClass,
        service: &str,
        access_group: Option<&str>,
    ) -> Result<usize, BackendError> {
        (**self).delete_all(class, service, access_group)
    }

    fn default_access_group(&self) -> Option<String> {
        (**self).default_access_group()
    }
}
