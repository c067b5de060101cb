// Lockbox - Credential Store
//
// Password and opaque-secret CRUD over a SecureStoreBackend. `get`, `set`
// and `delete` on a `CredentialId` are the canonical operations; the
// `*_password` / `*_secret` methods are shorthands over them.

use zeroize::Zeroizing;

use super::models::CredentialId;
use crate::error::{ErrorReporter, LockboxError, Result};
use crate::policy::{ReadingOptions, WritingOptions};
use crate::store::{status, BackendError, ItemAttributes, ItemClass, SecureStoreBackend, WriteMode};
use crate::validate::{group_scope, require_non_empty};

/// Stateless credential service borrowing a backend.
pub struct CredentialStore<'a, B: SecureStoreBackend + ?Sized> {
    backend: &'a B,
}

impl<'a, B: SecureStoreBackend + ?Sized> CredentialStore<'a, B> {
    pub fn new(backend: &'a B) -> Self {
        Self { backend }
    }

    /// True iff a credential matches. Never returns the secret and never
    /// prompts.
    pub fn exists(&self, id: &CredentialId, options: &ReadingOptions) -> Result<bool> {
        id.validate()?;
        let key = id.item_key(group_scope(options.access_group.as_deref())?);

        match self.backend.lookup(&key) {
            Ok(_) => Ok(true),
            Err(BackendError::ItemNotFound) => Ok(false),
            Err(e) => Err(ErrorReporter::from_backend("credentials.exists", e)),
        }
    }

    pub fn get(&self, id: &CredentialId, options: &ReadingOptions) -> Result<Zeroizing<Vec<u8>>> {
        id.validate()?;
        let key = id.item_key(group_scope(options.access_group.as_deref())?);

        let item = self
            .backend
            .get(&key, options)
            .map_err(ErrorReporter::backend("credentials.get"))?;

        tracing::debug!(
            kind = ?id.kind(),
            service = %id.service(),
            account = %id.account(),
            group = ?item.access_group,
            "Credential read"
        );
        Ok(item.value)
    }

    /// Read a password as text. Stored bytes that are not UTF-8 are a
    /// decode failure of the store.
    pub fn get_password(
        &self,
        username: &str,
        service: &str,
        options: &ReadingOptions,
    ) -> Result<Zeroizing<String>> {
        let bytes = self.get(&CredentialId::password(username, service), options)?;
        match std::str::from_utf8(&bytes) {
            Ok(text) => Ok(Zeroizing::new(text.to_owned())),
            Err(_) => {
                tracing::warn!(service, username, "Stored password is not valid UTF-8");
                Err(LockboxError::UnderlyingStoreFailure(status::DECODE))
            }
        }
    }

    pub fn get_secret(
        &self,
        key: &str,
        service: &str,
        options: &ReadingOptions,
    ) -> Result<Zeroizing<Vec<u8>>> {
        self.get(&CredentialId::secret(key, service), options)
    }

    /// Store `secret` under `id`. Without `overwrite_existing` an existing
    /// credential is left untouched and `DuplicateItem` is returned.
    pub fn set(&self, id: &CredentialId, secret: &[u8], options: &WritingOptions) -> Result<()> {
        id.validate()?;
        let key = id.item_key(group_scope(options.access_group.as_deref())?);

        let attributes = ItemAttributes {
            accessibility: options.accessibility,
            access_control: options.access_control.clone(),
        };
        let mode = if options.overwrite_existing {
            WriteMode::Replace
        } else {
            WriteMode::Add
        };

        self.backend
            .put(&key, secret, &attributes, mode, &options.reading())
            .map_err(ErrorReporter::backend("credentials.set"))?;

        tracing::info!(
            kind = ?id.kind(),
            service = %id.service(),
            account = %id.account(),
            accessibility = %options.accessibility,
            overwrite = options.overwrite_existing,
            "Credential stored"
        );
        Ok(())
    }

    pub fn set_password(
        &self,
        username: &str,
        service: &str,
        password: &str,
        options: &WritingOptions,
    ) -> Result<()> {
        self.set(&CredentialId::password(username, service), password.as_bytes(), options)
    }

    pub fn set_secret(
        &self,
        key: &str,
        service: &str,
        secret: &[u8],
        options: &WritingOptions,
    ) -> Result<()> {
        self.set(&CredentialId::secret(key, service), secret, options)
    }

    /// Remove a credential. Removing an absent credential succeeds.
    pub fn delete(&self, id: &CredentialId, options: &WritingOptions) -> Result<()> {
        id.validate()?;
        let key = id.item_key(group_scope(options.access_group.as_deref())?);

        match self.backend.delete(&key) {
            Ok(()) => {
                tracing::info!(
                    kind = ?id.kind(),
                    service = %id.service(),
                    account = %id.account(),
                    "Credential deleted"
                );
                Ok(())
            }
            Err(BackendError::ItemNotFound) => {
                tracing::debug!(service = %id.service(), account = %id.account(), "Nothing to delete");
                Ok(())
            }
            Err(e) => Err(ErrorReporter::from_backend("credentials.delete", e)),
        }
    }

    /// Remove every password and secret under `service`, within
    /// `options.access_group` when given. Returns how many were removed.
    pub fn delete_all_for_service(&self, service: &str, options: &WritingOptions) -> Result<usize> {
        require_non_empty("service", service)?;
        group_scope(options.access_group.as_deref())?;

        let mut removed = 0;
        for class in [ItemClass::GenericPassword, ItemClass::GenericSecret] {
            removed += self
                .backend
                .delete_all(class, service, options.access_group.as_deref())
                .map_err(ErrorReporter::backend("credentials.delete_all_for_service"))?;
        }

        tracing::info!(service, removed, "Service credentials purged");
        Ok(removed)
    }
}

// ─── Tests ───────────────────────────────────────────────────────────────────
