// Lockbox - Master Key Source
//
// Lifecycle of the master secret that protects the SQLite backend.
//
// Flow:
//   1. `get_or_create()` at `lockbox init`, `get()` on every later open
//   2. `derive_store_key()` stretches the secret with Argon2id into a 32-byte
//      store key, salted per installation
//   3. The store key seals item values (AES-256-GCM) and, with the
//      `sqlcipher` feature, keys the database file

use argon2::{Algorithm, Argon2, Params, Version};
use rand::rngs::OsRng;
use rand::RngCore;
use sha2::{Digest, Sha256};
use zeroize::Zeroizing;

use super::EnclaveError;

// ─── Constants ───────────────────────────────────────────────────────────────

/// Default keyring service for Lockbox entries.
pub const DEFAULT_KEYRING_SERVICE: &str = "lockbox-secure-store";

/// Keyring user under which the master secret is filed.
pub const DEFAULT_KEYRING_USER: &str = "master-secret";

/// Length of the random master secret in bytes.
const MASTER_SECRET_LEN: usize = 32;

/// Length of the derived store key in bytes (AES-256).
pub const STORE_KEY_LEN: usize = 32;

// ─── KDF Parameters ──────────────────────────────────────────────────────────

/// Argon2id cost parameters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KdfParams {
    /// Memory cost in KiB.
    pub m_cost: u32,
    /// Iterations.
    pub t_cost: u32,
    /// Parallelism lanes.
    pub p_cost: u32,
}

impl KdfParams {
    /// Minimal cost, for tests and throwaway stores only.
    pub const fn fast() -> Self {
        Self {
            m_cost: 256,
            t_cost: 1,
            p_cost: 1,
        }
    }
}

impl Default for KdfParams {
    /// m=64 MiB, t=3, p=4.
    fn default() -> Self {
        Self {
            m_cost: 65536,
            t_cost: 3,
            p_cost: 4,
        }
    }
}

/// Stretch `master_secret` into a store key with Argon2id.
pub fn derive_store_key(
    master_secret: &[u8],
    salt: &[u8],
    params: &KdfParams,
) -> Result<Zeroizing<Vec<u8>>, EnclaveError> {
    let params = Params::new(params.m_cost, params.t_cost, params.p_cost, Some(STORE_KEY_LEN))
        .map_err(|e| EnclaveError::Derivation(format!("invalid Argon2 params: {}", e)))?;
    let argon2 = Argon2::new(Algorithm::Argon2id, Version::V0x13, params);

    let mut key = Zeroizing::new(vec![0u8; STORE_KEY_LEN]);
    argon2
        .hash_password_into(master_secret, salt, &mut key)
        .map_err(|e| EnclaveError::Derivation(format!("Argon2id hash failed: {}", e)))?;

    Ok(key)
}

/// Salt = SHA-256(service || "::" || user).
fn installation_salt(service: &str, user: &str) -> Vec<u8> {
    let mut hasher = Sha256::new();
    hasher.update(service.as_bytes());
    hasher.update(b"::");
    hasher.update(user.as_bytes());
    hasher.finalize().to_vec()
}

fn generate_master_secret() -> Zeroizing<Vec<u8>> {
    let mut secret = Zeroizing::new(vec![0u8; MASTER_SECRET_LEN]);
    OsRng.fill_bytes(&mut secret);
    secret
}

// ─── Trait ───────────────────────────────────────────────────────────────────

/// Where the master secret is kept.
pub trait MasterKeySource: Send + Sync {
    /// Return the master secret, generating and storing one on first use.
    fn get_or_create(&self) -> Result<Zeroizing<Vec<u8>>, EnclaveError>;

    /// Return the master secret, or `MasterSecretNotFound`.
    fn get(&self) -> Result<Zeroizing<Vec<u8>>, EnclaveError>;

    fn exists(&self) -> Result<bool, EnclaveError>;

    /// Remove the master secret. Everything sealed under it becomes unreadable.
    fn destroy(&self) -> Result<(), EnclaveError>;

    /// Per-installation KDF salt.
    fn salt(&self) -> Vec<u8>;
}

// ─── Platform Implementation ─────────────────────────────────────────────────

/// Master secret in the platform keyring via the `keyring` crate.
pub struct KeyringKeySource {
    service: String,
    user: String,
}

impl KeyringKeySource {
    pub fn new(service: &str) -> Self {
        Self::with_names(service, DEFAULT_KEYRING_USER)
    }

    pub fn with_names(service: &str, user: &str) -> Self {
        Self {
            service: service.to_string(),
            user: user.to_string(),
        }
    }

    fn entry(&self) -> Result<keyring::Entry, EnclaveError> {
        keyring::Entry::new(&self.service, &self.user)
            .map_err(|e| EnclaveError::Keyring(format!("failed to open keyring entry: {}", e)))
    }
}

impl Default for KeyringKeySource {
    fn default() -> Self {
        Self::new(DEFAULT_KEYRING_SERVICE)
    }
}

impl MasterKeySource for KeyringKeySource {
    fn get_or_create(&self) -> Result<Zeroizing<Vec<u8>>, EnclaveError> {
        match self.get() {
            Err(EnclaveError::MasterSecretNotFound) => {
                tracing::info!(service = %self.service, "No master secret found, generating one");
                let secret = generate_master_secret();
                self.entry()?.set_secret(&secret).map_err(|e| {
                    EnclaveError::Keyring(format!("failed to store master secret: {}", e))
                })?;
                tracing::info!("Master secret stored in platform keyring");
                Ok(secret)
            }
            other => other,
        }
    }

    fn get(&self) -> Result<Zeroizing<Vec<u8>>, EnclaveError> {
        match self.entry()?.get_secret() {
            Ok(secret) => {
                tracing::debug!("Retrieved master secret from keyring");
                Ok(Zeroizing::new(secret))
            }
            Err(keyring::Error::NoEntry) => Err(EnclaveError::MasterSecretNotFound),
            Err(e) => Err(EnclaveError::Keyring(format!(
                "failed to retrieve master secret: {}",
                e
            ))),
        }
    }

    fn exists(&self) -> Result<bool, EnclaveError> {
        match self.get() {
            Ok(_) => Ok(true),
            Err(EnclaveError::MasterSecretNotFound) => Ok(false),
            Err(e) => Err(e),
        }
    }

    fn destroy(&self) -> Result<(), EnclaveError> {
        match self.entry()?.delete_credential() {
            Ok(()) => {
                tracing::warn!("Master secret deleted, sealed items are now unreadable");
                Ok(())
            }
            Err(keyring::Error::NoEntry) => Ok(()),
            Err(e) => Err(EnclaveError::Keyring(format!(
                "failed to delete master secret: {}",
                e
            ))),
        }
    }

    fn salt(&self) -> Vec<u8> {
        installation_salt(&self.service, &self.user)
    }
}

// ─── In-Memory Source for Testing ────────────────────────────────────────────

/// Keeps the master secret in process memory so tests never touch the real
/// keyring.
#[cfg(test)]
pub mod mock {
    use parking_lot::Mutex;

    use super::*;

    pub struct MemoryKeySource {
        secret: Mutex<Option<Zeroizing<Vec<u8>>>>,
        label: String,
    }

    impl MemoryKeySource {
        pub fn new() -> Self {
            Self {
                secret: Mutex::new(None),
                label: "lockbox-test".to_string(),
            }
        }

        pub fn with_secret(secret: Vec<u8>) -> Self {
            Self {
                secret: Mutex::new(Some(Zeroizing::new(secret))),
                label: "lockbox-test".to_string(),
            }
        }
    }

    impl MasterKeySource for MemoryKeySource {
        fn get_or_create(&self) -> Result<Zeroizing<Vec<u8>>, EnclaveError> {
            let mut guard = self.secret.lock();
            let secret = guard.get_or_insert_with(generate_master_secret);
            Ok(secret.clone())
        }

        fn get(&self) -> Result<Zeroizing<Vec<u8>>, EnclaveError> {
            self.secret
                .lock()
                .clone()
                .ok_or(EnclaveError::MasterSecretNotFound)
        }

        fn exists(&self) -> Result<bool, EnclaveError> {
            Ok(self.secret.lock().is_some())
        }

        fn destroy(&self) -> Result<(), EnclaveError> {
            *self.secret.lock() = None;
            Ok(())
        }

        fn salt(&self) -> Vec<u8> {
            installation_salt(&self.label, DEFAULT_KEYRING_USER)
        }
    }
}

// ─── Tests ───────────────────────────────────────────────────────────────────
