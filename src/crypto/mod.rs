// Lockbox - Cryptography
//
// RSA provider abstraction, key handles, padding rules and the
// EncryptionEngine that enforces them.

mod engine;
mod error;
mod keys;
mod padding;
mod provider;

pub use engine::EncryptionEngine;
pub use error::ProviderError;
pub use keys::{KeyRef, PrivateKey, PublicKey};
pub use padding::{Padding, OAEP_HASH_LEN, PKCS1_OVERHEAD};
pub use provider::{CryptoProvider, KeyMaterial, RsaProvider, MAX_KEY_BITS, MIN_KEY_BITS};
