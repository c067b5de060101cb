// Lockbox - Library root
//
// Credential and RSA key-pair management over an access-controlled secure
// store, plus the RSA encryption contract.

pub mod cli;
pub mod config;
pub mod credentials;
pub mod crypto;
pub mod enclave;
pub mod error;
pub mod keys;
pub mod policy;
pub mod store;

mod validate;

#[cfg(test)]
mod testing;

pub use credentials::{CredentialId, CredentialKind, CredentialStore};
pub use crypto::{CryptoProvider, EncryptionEngine, Padding, PrivateKey, PublicKey, RsaProvider};
pub use error::{ErrorReporter, LockboxError, Result};
pub use keys::{KeyManager, KeyPair};
pub use policy::{
    AccessControl, AccessControlFlag, Accessibility, AuthOutcome, AuthenticationContext,
    ReadingOptions, WritingOptions,
};
pub use store::{MemoryBackend, SecureStoreBackend, SqliteBackend};
