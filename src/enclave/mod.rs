// Lockbox - Enclave Module
//
// Master secret custody and store-key derivation. The master secret lives in
// the OS keyring (Keychain/DPAPI/kernel keyutils); the SQLite backend only
// ever sees the Argon2id-derived store key.

mod error;
mod source;

pub use error::EnclaveError;
pub use source::{
    derive_store_key, KdfParams, KeyringKeySource, MasterKeySource, DEFAULT_KEYRING_SERVICE,
    DEFAULT_KEYRING_USER, STORE_KEY_LEN,
};

#[cfg(test)]
pub use source::mock;
