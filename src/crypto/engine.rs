// Lockbox - Encryption Engine
//
// Validates padding/key/length preconditions and only then calls the
// provider. A request that fails a precondition never reaches the provider.

use zeroize::Zeroizing;

use super::keys::{PrivateKey, PublicKey};
use super::padding::Padding;
use super::provider::CryptoProvider;
use crate::error::{ErrorReporter, LockboxError, Result};
use crate::policy::AccessControl;

/// Stateless RSA encrypt/decrypt front end over a `CryptoProvider`.
pub struct EncryptionEngine<'a, P: CryptoProvider + ?Sized> {
    provider: &'a P,
}

impl<'a, P: CryptoProvider + ?Sized> EncryptionEngine<'a, P> {
    pub fn new(provider: &'a P) -> Self {
        Self { provider }
    }

    /// Encrypt `payload` with `key` under an explicit `padding`.
    ///
    /// Payload bounds for a `k`-byte modulus: PKCS1 at most `k - 11`,
    /// OAEP at most `k - 42`, None exactly `k`.
    pub fn encrypt(&self, payload: &[u8], key: &PublicKey, padding: Padding) -> Result<Vec<u8>> {
        let key_bytes = key.size_bytes();

        let limit = padding.max_plaintext_len(key_bytes).ok_or_else(|| {
            LockboxError::invalid(format!(
                "{}-bit key is too small for {} padding",
                key.bits(),
                padding
            ))
        })?;

        if !padding.accepts_plaintext_len(payload.len(), key_bytes) {
            let message = match padding {
                Padding::None => format!(
                    "raw RSA payload must be exactly {} bytes, got {}",
                    limit,
                    payload.len()
                ),
                _ => format!(
                    "payload of {} bytes exceeds the {} limit of {} bytes for a {}-bit key",
                    payload.len(),
                    padding,
                    limit,
                    key.bits()
                ),
            };
            return Err(LockboxError::InvalidParameters(message));
        }

        let ciphertext = self
            .provider
            .encrypt(payload, key, padding)
            .map_err(ErrorReporter::provider("encryption.encrypt"))?;

        tracing::debug!(
            bits = key.bits(),
            padding = %padding,
            payload_len = payload.len(),
            "Payload encrypted"
        );

        Ok(ciphertext)
    }

    /// Decrypt a single RSA block. The ciphertext must be exactly one modulus long.
    pub fn decrypt(
        &self,
        ciphertext: &[u8],
        key: &PrivateKey,
        padding: Padding,
    ) -> Result<Zeroizing<Vec<u8>>> {
        let key_bytes = key.size_bytes();
        if ciphertext.len() != key_bytes {
            return Err(LockboxError::invalid(format!(
                "ciphertext must be {} bytes for a {}-bit key, got {}",
                key_bytes,
                key.bits(),
                ciphertext.len()
            )));
        }

        let plaintext = self
            .provider
            .decrypt(ciphertext, key.expose_secret(), padding)
            .map_err(ErrorReporter::provider("encryption.decrypt"))?;

        tracing::debug!(bits = key.bits(), padding = %padding, "Ciphertext decrypted");

        Ok(plaintext)
    }

    /// Wrap caller-supplied PKCS#1 DER as a public key handle.
    pub fn import_public_key(&self, der: &[u8]) -> Result<PublicKey> {
        let bits = self
            .provider
            .public_key_bits(der)
            .map_err(ErrorReporter::provider("encryption.import_public_key"))?;
        Ok(PublicKey::new(der.to_vec(), bits, None))
    }

    /// Wrap caller-supplied PKCS#1 DER as a private key handle that is not
    /// backed by the store.
    pub fn import_private_key(&self, der: &[u8]) -> Result<PrivateKey> {
        let bits = self
            .provider
            .private_key_bits(der)
            .map_err(ErrorReporter::provider("encryption.import_private_key"))?;
        Ok(PrivateKey::new(
            Zeroizing::new(der.to_vec()),
            bits,
            None,
            AccessControl::none(),
        ))
    }
}

// ─── Tests ───────────────────────────────────────────────────────────────────
