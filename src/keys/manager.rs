// Lockbox - Key Manager
//
// RSA key-pair lifecycle over a SecureStoreBackend and a CryptoProvider.
//
// A pair is two backend items under one tag: the public half (no access
// control, readable without prompting) and the private half (carries the
// caller's access control). The backend has no multi-item transactions, so
// pair writes and deletes are made atomic by compensation:
//   - store:  public, then private; on private failure the public half is
//             restored to its prior value or removed
//   - delete: public, then private; on private failure the public half is
//             put back

use std::collections::BTreeSet;

use zeroize::Zeroizing;

use super::models::KeyPair;
use crate::crypto::{CryptoProvider, KeyRef, PrivateKey, ProviderError, PublicKey};
use crate::error::{ErrorReporter, LockboxError, Result};
use crate::policy::{AccessControl, ReadingOptions, WritingOptions};
use crate::store::{
    status, BackendError, GroupScope, ItemAttributes, ItemClass, ItemKey, SecureStoreBackend,
    StoredItem, WriteMode,
};
use crate::validate::{group_scope, require_non_empty};

/// Failure after one half of a pair was already written. Authentication
/// outcomes keep their own kind; anything else is a store failure.
fn partial_write_failure(operation: &'static str, err: BackendError) -> LockboxError {
    let code = err.status();
    match ErrorReporter::from_backend(operation, err) {
        e @ (LockboxError::AuthenticationFailed
        | LockboxError::AuthenticationCancelled
        | LockboxError::AccessDenied) => e,
        _ => LockboxError::UnderlyingStoreFailure(code),
    }
}

/// A stored key half the provider cannot parse.
fn corrupt_item(operation: &'static str, tag: &str, err: ProviderError) -> LockboxError {
    tracing::warn!(operation, tag, error = %err, "Stored key material is unreadable");
    LockboxError::UnderlyingStoreFailure(status::DECODE)
}

/// Stateless key-pair service borrowing a backend and a provider.
pub struct KeyManager<'a, B, P>
where
    B: SecureStoreBackend + ?Sized,
    P: CryptoProvider + ?Sized,
{
    backend: &'a B,
    provider: &'a P,
}

impl<'a, B, P> KeyManager<'a, B, P>
where
    B: SecureStoreBackend + ?Sized,
    P: CryptoProvider + ?Sized,
{
    pub fn new(backend: &'a B, provider: &'a P) -> Self {
        Self { backend, provider }
    }

    // ─── Create ──────────────────────────────────────────────────────────────

    /// Generate a `bits`-bit pair and store it under `tag`.
    pub fn generate_keypair(&self, bits: usize, tag: &str, options: &WritingOptions) -> Result<KeyPair> {
        require_non_empty("tag", tag)?;
        let group = self.target_group(options)?;

        if bits % 8 != 0 {
            return Err(LockboxError::invalid(format!(
                "key size must be a multiple of 8, got {}",
                bits
            )));
        }
        let supported = self.provider.supported_key_sizes();
        if !supported.contains(&bits) {
            return Err(LockboxError::invalid(format!(
                "key size {} outside supported range {}..={}",
                bits,
                supported.start(),
                supported.end()
            )));
        }

        if !options.overwrite_existing {
            self.ensure_tag_free(tag, group.as_deref())?;
        }

        let material = self
            .provider
            .generate_key_pair(bits)
            .map_err(ErrorReporter::provider("keys.generate_keypair"))?;

        self.store_pair(
            tag,
            group,
            &material.public_der,
            &material.private_der,
            bits,
            options,
        )
    }

    /// Import a PKCS#1 DER pair under `tag`. Both halves are validated
    /// before anything is written.
    pub fn insert_keypair(
        &self,
        public_der: &[u8],
        private_der: &[u8],
        tag: &str,
        options: &WritingOptions,
    ) -> Result<KeyPair> {
        require_non_empty("tag", tag)?;
        let group = self.target_group(options)?;

        let map_err = ErrorReporter::provider("keys.insert_keypair");
        let bits = self.provider.private_key_bits(private_der).map_err(&map_err)?;
        self.provider.public_key_bits(public_der).map_err(&map_err)?;
        let derived = self.provider.public_key_for(private_der).map_err(&map_err)?;
        if derived != public_der {
            return Err(LockboxError::invalid(
                "public and private key do not belong to the same pair",
            ));
        }

        if !options.overwrite_existing {
            self.ensure_tag_free(tag, group.as_deref())?;
        }

        self.store_pair(tag, group, public_der, private_der, bits, options)
    }

    // ─── Read ────────────────────────────────────────────────────────────────

    pub fn fetch_public_key(&self, tag: &str, options: &ReadingOptions) -> Result<PublicKey> {
        require_non_empty("tag", tag)?;
        let scope = group_scope(options.access_group.as_deref())?;
        let item = self.read_half(ItemClass::RsaPublicKey, tag, scope, options, "keys.fetch_public_key")?;
        self.public_from_item(tag, item)
    }

    /// Protected read: may run the authentication context.
    pub fn fetch_private_key(&self, tag: &str, options: &ReadingOptions) -> Result<PrivateKey> {
        require_non_empty("tag", tag)?;
        let scope = group_scope(options.access_group.as_deref())?;
        let item = self.read_half(ItemClass::RsaPrivateKey, tag, scope, options, "keys.fetch_private_key")?;
        self.private_from_item(tag, item).map(|(key, _)| key)
    }

    /// Both halves plus metadata. The private half is read from the group the
    /// public half was found in.
    pub fn fetch_key_pair(&self, tag: &str, options: &ReadingOptions) -> Result<KeyPair> {
        require_non_empty("tag", tag)?;
        let scope = group_scope(options.access_group.as_deref())?;

        let public_item = self.read_half(ItemClass::RsaPublicKey, tag, scope, options, "keys.fetch_key_pair")?;
        let group = public_item.access_group.clone();
        let public = self.public_from_item(tag, public_item)?;

        let private_item = self.read_half(
            ItemClass::RsaPrivateKey,
            tag,
            GroupScope::Exact(group.clone()),
            options,
            "keys.fetch_key_pair",
        )?;
        let (private, attributes) = self.private_from_item(tag, private_item)?;

        Ok(KeyPair {
            tag: tag.to_string(),
            access_group: group,
            public,
            private,
            accessibility: attributes.accessibility,
            access_control: attributes.access_control,
        })
    }

    // ─── Export ──────────────────────────────────────────────────────────────

    /// Raw PKCS#1 DER of a private key.
    ///
    /// Hardware-bound keys are refused. Store-backed keys are re-read so the
    /// policy currently on the item applies, not the one captured in the
    /// handle; a handle whose key has since been replaced yields `NotFound`.
    pub fn export_private_key_bytes(
        &self,
        private: &PrivateKey,
        options: &ReadingOptions,
    ) -> Result<Zeroizing<Vec<u8>>> {
        if !private.is_exportable() {
            tracing::info!(key = ?private.key_ref(), "Export refused for hardware-bound key");
            return Err(LockboxError::AccessDenied);
        }

        let Some(key_ref) = private.key_ref() else {
            return Ok(Zeroizing::new(private.expose_secret().to_vec()));
        };

        let item = self.read_half(
            ItemClass::RsaPrivateKey,
            &key_ref.tag,
            GroupScope::Exact(key_ref.access_group.clone()),
            options,
            "keys.export_private_key_bytes",
        )?;

        if !item.attributes.access_control.allows_export() {
            tracing::info!(key = %key_ref, "Export refused by stored policy");
            return Err(LockboxError::AccessDenied);
        }
        if item.value.as_slice() != private.expose_secret() {
            tracing::debug!(key = %key_ref, "Stored key no longer matches handle");
            return Err(LockboxError::NotFound);
        }

        tracing::info!(key = %key_ref, "Private key exported");
        Ok(item.value)
    }

    /// PKCS#1 DER of a public key. Public material is always exportable.
    pub fn export_public_key_bytes(&self, public: &PublicKey) -> Vec<u8> {
        public.as_der().to_vec()
    }

    // ─── Delete ──────────────────────────────────────────────────────────────

    /// Remove the pair under `tag`. With no access group in `options`, pairs
    /// under `tag` in every entitled group are removed. Idempotent.
    pub fn delete_keypair(&self, tag: &str, options: &WritingOptions) -> Result<()> {
        require_non_empty("tag", tag)?;
        let scope = group_scope(options.access_group.as_deref())?;
        let auth = options.reading();

        match &scope {
            GroupScope::Exact(group) => self.delete_pair_in(tag, group.clone(), &auth)?,
            GroupScope::Unspecified => {
                let public_half = ItemKey::key_half(ItemClass::RsaPublicKey, tag, GroupScope::Unspecified);
                let mut cleared = BTreeSet::new();
                loop {
                    let group = match self.backend.lookup(&public_half) {
                        Ok(meta) => meta.access_group,
                        Err(BackendError::ItemNotFound) => break,
                        Err(e) => return Err(ErrorReporter::from_backend("keys.delete_keypair", e)),
                    };
                    if !cleared.insert(group.clone()) {
                        tracing::warn!(tag, group = ?group, "Public half still listed after delete");
                        return Err(LockboxError::UnderlyingStoreFailure(status::IO));
                    }
                    self.delete_pair_in(tag, group, &auth)?;
                }
            }
        }

        // Private halves left without a public partner.
        let orphan = ItemKey::key_half(ItemClass::RsaPrivateKey, tag, scope);
        match self.backend.delete(&orphan) {
            Ok(()) | Err(BackendError::ItemNotFound) => {}
            Err(e) => return Err(ErrorReporter::from_backend("keys.delete_keypair", e)),
        }

        tracing::info!(tag, group = ?options.access_group, "Key pair deleted");
        Ok(())
    }

    // ─── Internals ───────────────────────────────────────────────────────────

    /// Group a write lands in: the requested one, else the backend default.
    fn target_group(&self, options: &WritingOptions) -> Result<Option<String>> {
        group_scope(options.access_group.as_deref())?;
        Ok(options
            .access_group
            .clone()
            .or_else(|| self.backend.default_access_group()))
    }

    fn ensure_tag_free(&self, tag: &str, group: Option<&str>) -> Result<()> {
        for class in [ItemClass::RsaPublicKey, ItemClass::RsaPrivateKey] {
            let key = ItemKey::key_half(class, tag, GroupScope::Exact(group.map(str::to_string)));
            match self.backend.lookup(&key) {
                Ok(_) => {
                    tracing::debug!(tag, group = ?group, %class, "Tag already holds a key");
                    return Err(LockboxError::DuplicateItem);
                }
                Err(BackendError::ItemNotFound) => {}
                Err(e) => return Err(ErrorReporter::from_backend("keys.ensure_tag_free", e)),
            }
        }
        Ok(())
    }

    fn store_pair(
        &self,
        tag: &str,
        group: Option<String>,
        public_der: &[u8],
        private_der: &[u8],
        bits: usize,
        options: &WritingOptions,
    ) -> Result<KeyPair> {
        let scope = GroupScope::Exact(group.clone());
        let public_key = ItemKey::key_half(ItemClass::RsaPublicKey, tag, scope.clone());
        let private_key = ItemKey::key_half(ItemClass::RsaPrivateKey, tag, scope);

        let public_attributes = ItemAttributes {
            accessibility: options.accessibility,
            access_control: AccessControl::none(),
        };
        let private_attributes = ItemAttributes {
            accessibility: options.accessibility,
            access_control: options.access_control.clone(),
        };
        let auth = options.reading();

        let (mode, snapshot) = if options.overwrite_existing {
            let snapshot = match self.backend.get(&public_key, &auth) {
                Ok(item) => Some(item),
                Err(BackendError::ItemNotFound) => None,
                Err(e) => return Err(ErrorReporter::from_backend("keys.store_pair", e)),
            };
            (WriteMode::Replace, snapshot)
        } else {
            (WriteMode::Add, None)
        };

        self.backend
            .put(&public_key, public_der, &public_attributes, mode, &auth)
            .map_err(ErrorReporter::backend("keys.store_pair"))?;

        if let Err(err) = self
            .backend
            .put(&private_key, private_der, &private_attributes, mode, &auth)
        {
            tracing::warn!(tag, group = ?group, error = %err, "Private half failed to store, rolling back");
            self.restore_public(&public_key, snapshot, &auth);
            return Err(partial_write_failure("keys.store_pair", err));
        }

        tracing::info!(
            tag,
            group = ?group,
            bits,
            accessibility = %options.accessibility,
            access_control = %options.access_control,
            overwrite = options.overwrite_existing,
            "Key pair stored"
        );

        let key_ref = KeyRef {
            tag: tag.to_string(),
            access_group: group.clone(),
        };
        Ok(KeyPair {
            tag: tag.to_string(),
            access_group: group,
            public: PublicKey::new(public_der.to_vec(), bits, Some(key_ref.clone())),
            private: PrivateKey::new(
                Zeroizing::new(private_der.to_vec()),
                bits,
                Some(key_ref),
                options.access_control.clone(),
            ),
            accessibility: options.accessibility,
            access_control: options.access_control.clone(),
        })
    }

    fn delete_pair_in(&self, tag: &str, group: Option<String>, auth: &ReadingOptions) -> Result<()> {
        let scope = GroupScope::Exact(group);
        let public_key = ItemKey::key_half(ItemClass::RsaPublicKey, tag, scope.clone());
        let private_key = ItemKey::key_half(ItemClass::RsaPrivateKey, tag, scope);

        let snapshot = match self.backend.get(&public_key, auth) {
            Ok(item) => Some(item),
            Err(BackendError::ItemNotFound) => None,
            Err(e) => return Err(ErrorReporter::from_backend("keys.delete_keypair", e)),
        };

        match self.backend.delete(&public_key) {
            Ok(()) | Err(BackendError::ItemNotFound) => {}
            Err(e) => return Err(ErrorReporter::from_backend("keys.delete_keypair", e)),
        }

        match self.backend.delete(&private_key) {
            Ok(()) | Err(BackendError::ItemNotFound) => Ok(()),
            Err(err) => {
                if snapshot.is_some() {
                    tracing::warn!(tag, error = %err, "Private half failed to delete, restoring public half");
                    self.restore_public(&public_key, snapshot, auth);
                }
                Err(ErrorReporter::from_backend("keys.delete_keypair", err))
            }
        }
    }

    /// Put the public half back to `snapshot`, or remove it if there was none.
    fn restore_public(&self, key: &ItemKey, snapshot: Option<StoredItem>, auth: &ReadingOptions) {
        let result = match snapshot {
            Some(item) => self
                .backend
                .put(key, &item.value, &item.attributes, WriteMode::Replace, auth),
            None => match self.backend.delete(key) {
                Err(BackendError::ItemNotFound) => Ok(()),
                other => other,
            },
        };

        match result {
            Ok(()) => tracing::warn!(key = %key, "Public key half rolled back"),
            Err(e) => tracing::error!(
                key = %key,
                error = %e,
                "Rollback of public key half failed, store holds an unmatched half"
            ),
        }
    }

    fn read_half(
        &self,
        class: ItemClass,
        tag: &str,
        scope: GroupScope,
        options: &ReadingOptions,
        operation: &'static str,
    ) -> Result<StoredItem> {
        let key = ItemKey::key_half(class, tag, scope);
        let item = self
            .backend
            .get(&key, options)
            .map_err(ErrorReporter::backend(operation))?;
        tracing::debug!(tag, %class, group = ?item.access_group, "Key half read");
        Ok(item)
    }

    fn public_from_item(&self, tag: &str, item: StoredItem) -> Result<PublicKey> {
        let bits = self
            .provider
            .public_key_bits(&item.value)
            .map_err(|e| corrupt_item("keys.public_from_item", tag, e))?;
        let key_ref = KeyRef {
            tag: tag.to_string(),
            access_group: item.access_group,
        };
        Ok(PublicKey::new(item.value.to_vec(), bits, Some(key_ref)))
    }

    fn private_from_item(&self, tag: &str, item: StoredItem) -> Result<(PrivateKey, ItemAttributes)> {
        let bits = self
            .provider
            .private_key_bits(&item.value)
            .map_err(|e| corrupt_item("keys.private_from_item", tag, e))?;
        let key_ref = KeyRef {
            tag: tag.to_string(),
            access_group: item.access_group,
        };
        let key = PrivateKey::new(
            item.value,
            bits,
            Some(key_ref),
            item.attributes.access_control.clone(),
        );
        Ok((key, item.attributes))
    }
}

// ─── Tests ───────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::crypto::{EncryptionEngine, Padding, RsaProvider};
    use crate::policy::{AccessControlFlag, AuthOutcome};
    use crate::store::{GroupPolicy, ItemMetadata, MemoryBackend, SqliteBackend};
    use crate::testing::FixedAuth;

    fn write() -> WritingOptions {
        WritingOptions::new()
    }

    fn read() -> ReadingOptions {
        ReadingOptions::new()
    }

    fn fault() -> BackendError {
        BackendError::Status(-4242, "simulated device failure".into())
    }

    #[test]
    fn test_generate_then_fetch_both_halves() {
        let backend = MemoryBackend::new();
        let provider = RsaProvider::new();
        let keys = KeyManager::new(&backend, &provider);

        let pair = keys.generate_keypair(512, "signing", &write()).unwrap();
        assert_eq!(pair.bits(), 512);
        assert_eq!(pair.tag, "signing");

        let public = keys.fetch_public_key("signing", &read()).unwrap();
        let private = keys.fetch_private_key("signing", &read()).unwrap();
        assert_eq!(public.as_der(), pair.public.as_der());
        assert_eq!(
            provider.public_key_for(private.expose_secret()).unwrap(),
            public.as_der()
        );
        assert_eq!(public.key_ref().unwrap().tag, "signing");
        assert_eq!(backend.len(), 2);
    }

    #[test]
    fn test_bit_size_is_validated() {
        let backend = MemoryBackend::new();
        let provider = RsaProvider::new();
        let keys = KeyManager::new(&backend, &provider);

        for bits in [1020, 256, 8192, 0] {
            let err = keys.generate_keypair(bits, "t", &write()).unwrap_err();
            assert!(matches!(err, LockboxError::InvalidParameters(_)), "{} bits", bits);
        }
        assert!(backend.is_empty());
    }

    #[test]
    fn test_duplicate_tag_without_overwrite() {
        let backend = MemoryBackend::new();
        let provider = RsaProvider::new();
        let keys = KeyManager::new(&backend, &provider);

        let first = keys.generate_keypair(512, "t", &write()).unwrap();
        let err = keys.generate_keypair(512, "t", &write()).unwrap_err();
        assert!(matches!(err, LockboxError::DuplicateItem));

        let stored = keys.fetch_public_key("t", &read()).unwrap();
        assert_eq!(stored.fingerprint(), first.public.fingerprint());
    }

    #[test]
    fn test_overwrite_replaces_pair() {
        let backend = MemoryBackend::new();
        let provider = RsaProvider::new();
        let keys = KeyManager::new(&backend, &provider);

        let first = keys.generate_keypair(512, "t", &write()).unwrap();
        let second = keys.generate_keypair(512, "t", &write().overwrite(true)).unwrap();
        assert_ne!(first.public.fingerprint(), second.public.fingerprint());

        let pair = keys.fetch_key_pair("t", &read()).unwrap();
        assert_eq!(pair.public.fingerprint(), second.public.fingerprint());
        assert_eq!(backend.len(), 2);
    }

    #[test]
    fn test_fault_after_public_half_leaves_nothing_behind() {
        let backend = MemoryBackend::new();
        let provider = RsaProvider::new();
        let keys = KeyManager::new(&backend, &provider);

        backend.fail_next_put(ItemClass::RsaPrivateKey, fault());
        let err = keys.generate_keypair(512, "t", &write()).unwrap_err();
        assert!(matches!(err, LockboxError::UnderlyingStoreFailure(-4242)));

        assert!(matches!(keys.fetch_public_key("t", &read()), Err(LockboxError::NotFound)));
        assert!(matches!(keys.fetch_private_key("t", &read()), Err(LockboxError::NotFound)));
        assert!(backend.is_empty());
    }

    #[test]
    fn test_fault_during_overwrite_restores_prior_pair() {
        let backend = MemoryBackend::new();
        let provider = RsaProvider::new();
        let keys = KeyManager::new(&backend, &provider);

        let original = keys.generate_keypair(512, "t", &write()).unwrap();
        backend.fail_next_put(ItemClass::RsaPrivateKey, fault());
        let err = keys
            .generate_keypair(512, "t", &write().overwrite(true))
            .unwrap_err();
        assert!(matches!(err, LockboxError::UnderlyingStoreFailure(-4242)));

        let pair = keys.fetch_key_pair("t", &read()).unwrap();
        assert_eq!(pair.public.fingerprint(), original.public.fingerprint());
        assert_eq!(
            provider.public_key_for(pair.private.expose_secret()).unwrap(),
            pair.public.as_der()
        );
    }

    #[test]
    fn test_failed_rollback_is_reported_with_original_error() {
        let backend = MemoryBackend::new();
        let provider = RsaProvider::new();
        let keys = KeyManager::new(&backend, &provider);

        backend.fail_next_put(ItemClass::RsaPrivateKey, fault());
        backend.fail_next_delete(ItemClass::RsaPublicKey, BackendError::Status(-1, "stuck".into()));
        let err = keys.generate_keypair(512, "t", &write()).unwrap_err();
        assert!(matches!(err, LockboxError::UnderlyingStoreFailure(-4242)));

        // The orphaned public half is cleaned up by a later delete.
        keys.delete_keypair("t", &write()).unwrap();
        assert!(backend.is_empty());
    }

    #[test]
    fn test_insert_validates_material_before_writing() {
        let backend = MemoryBackend::new();
        let provider = RsaProvider::new();
        let keys = KeyManager::new(&backend, &provider);

        let a = provider.generate_key_pair(512).unwrap();
        let b = provider.generate_key_pair(512).unwrap();

        let err = keys
            .insert_keypair(&a.public_der, &b.private_der, "t", &write())
            .unwrap_err();
        assert!(matches!(err, LockboxError::InvalidParameters(_)));

        let err = keys
            .insert_keypair(b"junk", &a.private_der, "t", &write())
            .unwrap_err();
        assert!(matches!(err, LockboxError::InvalidParameters(_)));
        assert!(backend.is_empty());

        let pair = keys
            .insert_keypair(&a.public_der, &a.private_der, "t", &write())
            .unwrap();
        assert_eq!(pair.bits(), 512);
        let exported = keys.export_private_key_bytes(&pair.private, &read()).unwrap();
        assert_eq!(exported.as_slice(), a.private_der.as_slice());
        assert_eq!(keys.export_public_key_bytes(&pair.public), a.public_der);
    }

    #[test]
    fn test_hardware_bound_key_cannot_be_exported() {
        let backend = MemoryBackend::new();
        let provider = RsaProvider::new();
        let keys = KeyManager::new(&backend, &provider);

        let options = write()
            .with_access_control(AccessControl::none().with(AccessControlFlag::PrivateKeyUsage));
        keys.generate_keypair(512, "hw", &options).unwrap();

        let private = keys.fetch_private_key("hw", &read()).unwrap();
        assert!(!private.is_exportable());
        assert!(matches!(
            keys.export_private_key_bytes(&private, &read()),
            Err(LockboxError::AccessDenied)
        ));
    }

    #[test]
    fn test_hardware_bound_key_still_decrypts_through_engine() {
        let backend = MemoryBackend::new();
        let provider = RsaProvider::new();
        let keys = KeyManager::new(&backend, &provider);
        let engine = EncryptionEngine::new(&provider);

        let options = write()
            .with_access_control(AccessControl::none().with(AccessControlFlag::PrivateKeyUsage));
        let pair = keys.generate_keypair(512, "hw", &options).unwrap();

        let ciphertext = engine.encrypt(b"sealed", &pair.public, Padding::Oaep).unwrap();
        let private = keys.fetch_private_key("hw", &read()).unwrap();
        let plaintext = engine.decrypt(&ciphertext, &private, Padding::Oaep).unwrap();
        assert_eq!(plaintext.as_slice(), b"sealed");

        assert!(matches!(
            keys.export_private_key_bytes(&private, &read()),
            Err(LockboxError::AccessDenied)
        ));
    }

    #[test]
    fn test_export_applies_current_stored_policy() {
        let backend = MemoryBackend::new();
        let provider = RsaProvider::new();
        let keys = KeyManager::new(&backend, &provider);

        let material = provider.generate_key_pair(512).unwrap();
        keys.insert_keypair(&material.public_der, &material.private_der, "t", &write())
            .unwrap();
        let handle = keys.fetch_private_key("t", &read()).unwrap();
        assert!(handle.is_exportable());

        let locked_down = write()
            .overwrite(true)
            .with_access_control(AccessControl::none().with(AccessControlFlag::PrivateKeyUsage));
        keys.insert_keypair(&material.public_der, &material.private_der, "t", &locked_down)
            .unwrap();

        assert!(matches!(
            keys.export_private_key_bytes(&handle, &read()),
            Err(LockboxError::AccessDenied)
        ));
    }

    #[test]
    fn test_protected_private_key_needs_context_public_does_not() {
        let backend = MemoryBackend::new();
        let provider = RsaProvider::new();
        let keys = KeyManager::new(&backend, &provider);

        let options = write().with_access_control(AccessControl::none().with(AccessControlFlag::UserPresence));
        keys.generate_keypair(512, "t", &options).unwrap();

        let auth = Arc::new(FixedAuth::new(AuthOutcome::Granted));
        let with_auth = read().with_auth_context(auth.clone()).with_prompt("Use signing key");

        keys.fetch_public_key("t", &with_auth).unwrap();
        assert_eq!(auth.calls(), 0);

        assert!(matches!(
            keys.fetch_private_key("t", &read()),
            Err(LockboxError::AccessDenied)
        ));
        keys.fetch_private_key("t", &with_auth).unwrap();
        assert_eq!(auth.calls(), 1);

        let cancelled = read().with_auth_context(Arc::new(FixedAuth::new(AuthOutcome::Cancelled)));
        assert!(matches!(
            keys.fetch_key_pair("t", &cancelled),
            Err(LockboxError::AuthenticationCancelled)
        ));
    }

    #[test]
    fn test_overwrite_of_protected_pair_keeps_auth_error_kind() {
        let backend = MemoryBackend::new();
        let provider = RsaProvider::new();
        let keys = KeyManager::new(&backend, &provider);

        let protected = write().with_access_control(AccessControl::none().with(AccessControlFlag::BiometryAny));
        let original = keys.generate_keypair(512, "t", &protected).unwrap();

        let cancel = Arc::new(FixedAuth::new(AuthOutcome::Cancelled));
        let err = keys
            .generate_keypair(512, "t", &write().overwrite(true).with_auth_context(cancel))
            .unwrap_err();
        assert!(matches!(err, LockboxError::AuthenticationCancelled));

        let public = keys.fetch_public_key("t", &read()).unwrap();
        assert_eq!(public.fingerprint(), original.public.fingerprint());
    }

    #[test]
    fn test_delete_is_idempotent_and_restores_on_failure() {
        let backend = MemoryBackend::new();
        let provider = RsaProvider::new();
        let keys = KeyManager::new(&backend, &provider);

        keys.delete_keypair("t", &write()).unwrap();
        let pair = keys.generate_keypair(512, "t", &write()).unwrap();

        backend.fail_next_delete(ItemClass::RsaPrivateKey, fault());
        let err = keys.delete_keypair("t", &write()).unwrap_err();
        assert!(matches!(err, LockboxError::UnderlyingStoreFailure(-4242)));
        let public = keys.fetch_public_key("t", &read()).unwrap();
        assert_eq!(public.fingerprint(), pair.public.fingerprint());

        keys.delete_keypair("t", &write()).unwrap();
        keys.delete_keypair("t", &write()).unwrap();
        assert!(backend.is_empty());
    }

    /// Backend that refuses to read public halves back and, with
    /// `stale_listing`, keeps listing one after it is gone.
    struct UnreadablePublic {
        inner: MemoryBackend,
        stale_listing: bool,
    }

    impl SecureStoreBackend for UnreadablePublic {
        fn put(
            &self,
            key: &ItemKey,
            value: &[u8],
            attributes: &ItemAttributes,
            mode: WriteMode,
            authorization: &ReadingOptions,
        ) -> std::result::Result<(), BackendError> {
            self.inner.put(key, value, attributes, mode, authorization)
        }

        fn get(&self, key: &ItemKey, options: &ReadingOptions) -> std::result::Result<StoredItem, BackendError> {
            match key.class {
                ItemClass::RsaPublicKey => Err(BackendError::ItemNotFound),
                _ => self.inner.get(key, options),
            }
        }

        fn lookup(&self, key: &ItemKey) -> std::result::Result<ItemMetadata, BackendError> {
            match key.class {
                ItemClass::RsaPublicKey if self.stale_listing => Ok(ItemMetadata {
                    access_group: Some("team.stale".to_string()),
                    attributes: ItemAttributes::default(),
                }),
                _ => self.inner.lookup(key),
            }
        }

        fn delete(&self, key: &ItemKey) -> std::result::Result<(), BackendError> {
            self.inner.delete(key)
        }

        fn delete_all(
            &self,
            class: ItemClass,
            service: &str,
            access_group: Option<&str>,
        ) -> std::result::Result<usize, BackendError> {
            self.inner.delete_all(class, service, access_group)
        }

        fn default_access_group(&self) -> Option<String> {
            self.inner.default_access_group()
        }
    }

    #[test]
    fn test_unscoped_delete_removes_listed_public_half_it_cannot_read() {
        let backend = UnreadablePublic {
            inner: MemoryBackend::new(),
            stale_listing: false,
        };
        let provider = RsaProvider::new();
        KeyManager::new(&backend.inner, &provider)
            .generate_keypair(512, "t", &write().in_access_group("team.a"))
            .unwrap();

        KeyManager::new(&backend, &provider)
            .delete_keypair("t", &write())
            .unwrap();
        assert!(backend.inner.is_empty());
    }

    #[test]
    fn test_unscoped_delete_stops_when_listing_never_clears() {
        let backend = UnreadablePublic {
            inner: MemoryBackend::new(),
            stale_listing: true,
        };
        let provider = RsaProvider::new();
        let keys = KeyManager::new(&backend, &provider);

        let err = keys.delete_keypair("t", &write()).unwrap_err();
        assert!(matches!(err, LockboxError::UnderlyingStoreFailure(status::IO)));
    }

    #[test]
    fn test_access_groups_scope_pairs() {
        let backend = MemoryBackend::new();
        let provider = RsaProvider::new();
        let keys = KeyManager::new(&backend, &provider);

        let a = keys.generate_keypair(512, "t", &write().in_access_group("team.a")).unwrap();
        let b = keys.generate_keypair(512, "t", &write().in_access_group("team.b")).unwrap();
        assert_eq!(a.access_group.as_deref(), Some("team.a"));

        let fetched = keys.fetch_public_key("t", &read().in_access_group("team.b")).unwrap();
        assert_eq!(fetched.fingerprint(), b.public.fingerprint());

        keys.delete_keypair("t", &write().in_access_group("team.a")).unwrap();
        assert!(keys.fetch_public_key("t", &read().in_access_group("team.a")).is_err());
        assert!(keys.fetch_public_key("t", &read().in_access_group("team.b")).is_ok());

        keys.generate_keypair(512, "t", &write().in_access_group("team.a")).unwrap();
        keys.delete_keypair("t", &write()).unwrap();
        assert!(backend.is_empty());
    }

    #[test]
    fn test_default_group_and_entitlements() {
        let groups = GroupPolicy::unrestricted()
            .with_default_group("team.app")
            .with_entitlements(Vec::<String>::new());
        let backend = MemoryBackend::with_group_policy(groups);
        let provider = RsaProvider::new();
        let keys = KeyManager::new(&backend, &provider);

        let pair = keys.generate_keypair(512, "t", &write()).unwrap();
        assert_eq!(pair.access_group.as_deref(), Some("team.app"));
        assert_eq!(
            pair.public.key_ref().unwrap().access_group.as_deref(),
            Some("team.app")
        );

        let err = keys
            .generate_keypair(512, "t", &write().in_access_group("other.vendor"))
            .unwrap_err();
        assert!(matches!(err, LockboxError::AccessDenied));
    }

    #[test]
    fn test_corrupt_stored_key_is_a_store_failure() {
        let backend = MemoryBackend::new();
        let provider = RsaProvider::new();
        let key = ItemKey::key_half(ItemClass::RsaPublicKey, "t", GroupScope::Exact(None));
        backend
            .put(&key, b"not der", &ItemAttributes::default(), WriteMode::Add, &read())
            .unwrap();

        let keys = KeyManager::new(&backend, &provider);
        assert!(matches!(
            keys.fetch_public_key("t", &read()),
            Err(LockboxError::UnderlyingStoreFailure(status::DECODE))
        ));
    }

    #[test]
    fn test_2048_bit_oaep_scenario() {
        let backend = MemoryBackend::new();
        let provider = RsaProvider::new();
        let keys = KeyManager::new(&backend, &provider);
        let engine = EncryptionEngine::new(&provider);

        keys.generate_keypair(2048, "t1", &write()).unwrap();
        let public = keys.fetch_public_key("t1", &read()).unwrap();
        let private = keys.fetch_private_key("t1", &read()).unwrap();
        assert_eq!(public.size_bytes(), 256);

        let payload = [0x2Au8; 32];
        let ciphertext = engine.encrypt(&payload, &public, Padding::Oaep).unwrap();
        assert_eq!(ciphertext.len(), 256);
        let recovered = engine.decrypt(&ciphertext, &private, Padding::Oaep).unwrap();
        assert_eq!(recovered.as_slice(), &payload);

        let err = keys.generate_keypair(2048, "t1", &write()).unwrap_err();
        assert!(matches!(err, LockboxError::DuplicateItem));
    }

    #[test]
    fn test_pair_survives_sqlite_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("lockbox.db");
        let provider = RsaProvider::new();
        let store_key = [3u8; 32];

        let fingerprint = {
            let backend = SqliteBackend::open(&path, &store_key, GroupPolicy::unrestricted()).unwrap();
            let keys = KeyManager::new(&backend, &provider);
            keys.generate_keypair(512, "persisted", &write()).unwrap().public.fingerprint()
        };

        let backend = SqliteBackend::open(&path, &store_key, GroupPolicy::unrestricted()).unwrap();
        let keys = KeyManager::new(&backend, &provider);
        let pair = keys.fetch_key_pair("persisted", &read()).unwrap();
        assert_eq!(pair.public.fingerprint(), fingerprint);

        let engine = EncryptionEngine::new(&provider);
        let ciphertext = engine.encrypt(b"hi", &pair.public, Padding::Pkcs1).unwrap();
        let plaintext = engine.decrypt(&ciphertext, &pair.private, Padding::Pkcs1).unwrap();
        assert_eq!(plaintext.as_slice(), b"hi");
    }
}
