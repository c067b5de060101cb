// Lockbox - Cryptographic Provider
//
// The provider owns the actual RSA math. The core only hands it validated
// inputs: KeyManager asks it for fresh key material, EncryptionEngine asks it
// to run a transform once the length preconditions have been checked.
//
// Keys cross this boundary as PKCS#1 DER:
//   - public:  RSAPublicKey  (n, e)
//   - private: RSAPrivateKey (n, e, d, p, q, dP, dQ, qInv)

use std::fmt;
use std::ops::RangeInclusive;

use rand::rngs::OsRng;
use rsa::pkcs1::{DecodeRsaPrivateKey, DecodeRsaPublicKey, EncodeRsaPrivateKey, EncodeRsaPublicKey};
use rsa::hazmat::rsa_decrypt_and_check;
use rsa::traits::PublicKeyParts;
use rsa::{BigUint, Oaep, Pkcs1v15Encrypt, RsaPrivateKey, RsaPublicKey};
use sha1::Sha1;
use zeroize::Zeroizing;

use super::keys::PublicKey;
use super::padding::Padding;
use super::ProviderError;

// ─── Constants ───────────────────────────────────────────────────────────────

/// Smallest modulus the RustCrypto provider will generate or accept.
pub const MIN_KEY_BITS: usize = 512;

/// Largest modulus the RustCrypto provider will generate or accept.
pub const MAX_KEY_BITS: usize = 4096;

// ─── Trait ───────────────────────────────────────────────────────────────────

/// Freshly generated key pair, both halves PKCS#1 DER.
pub struct KeyMaterial {
    pub public_der: Vec<u8>,
    pub private_der: Zeroizing<Vec<u8>>,
}

impl fmt::Debug for KeyMaterial {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KeyMaterial")
            .field("public_der_len", &self.public_der.len())
            .field("private_der", &"[REDACTED]")
            .finish()
    }
}

/// Abstraction over the RSA implementation, so platform crypto or a
/// hardware token can stand in for the RustCrypto default.
pub trait CryptoProvider: Send + Sync {
    /// Modulus sizes, in bits, this provider can generate and use.
    fn supported_key_sizes(&self) -> RangeInclusive<usize>;

    /// Generate a new key pair with a `bits`-bit modulus.
    fn generate_key_pair(&self, bits: usize) -> Result<KeyMaterial, ProviderError>;

    /// Parse a public key and report its modulus size.
    fn public_key_bits(&self, der: &[u8]) -> Result<usize, ProviderError>;

    /// Parse and validate a private key and report its modulus size.
    fn private_key_bits(&self, der: &[u8]) -> Result<usize, ProviderError>;

    /// Derive the public half matching a private key.
    fn public_key_for(&self, private_der: &[u8]) -> Result<Vec<u8>, ProviderError>;

    fn encrypt(
        &self,
        payload: &[u8],
        key: &PublicKey,
        padding: Padding,
    ) -> Result<Vec<u8>, ProviderError>;

    /// `private_der` is the PKCS#1 DER held by a `PrivateKey`; only
    /// `EncryptionEngine` reaches it, so providers never see the handle.
    fn decrypt(
        &self,
        ciphertext: &[u8],
        private_der: &[u8],
        padding: Padding,
    ) -> Result<Zeroizing<Vec<u8>>, ProviderError>;
}

// ─── RustCrypto Implementation ───────────────────────────────────────────────

/// Production provider backed by the `rsa` crate and the OS random source.
#[derive(Debug, Clone, Copy, Default)]
pub struct RsaProvider;

impl RsaProvider {
    pub fn new() -> Self {
        Self
    }

    fn parse_public(der: &[u8]) -> Result<RsaPublicKey, ProviderError> {
        RsaPublicKey::from_pkcs1_der(der)
            .map_err(|e| ProviderError::InvalidKey(format!("bad PKCS#1 public key: {}", e)))
    }

    fn parse_private(der: &[u8]) -> Result<RsaPrivateKey, ProviderError> {
        let key = RsaPrivateKey::from_pkcs1_der(der)
            .map_err(|e| ProviderError::InvalidKey(format!("bad PKCS#1 private key: {}", e)))?;
        key.validate()
            .map_err(|e| ProviderError::InvalidKey(format!("inconsistent private key: {}", e)))?;
        Ok(key)
    }

    fn check_size(&self, bits: usize) -> Result<(), ProviderError> {
        if self.supported_key_sizes().contains(&bits) {
            Ok(())
        } else {
            Err(ProviderError::UnsupportedKeySize(bits))
        }
    }
}

/// Big-endian encode `value` into exactly `len` bytes.
fn to_fixed_width(value: &BigUint, len: usize) -> Vec<u8> {
    let bytes = value.to_bytes_be();
    if bytes.len() >= len {
        return bytes;
    }
    let mut out = vec![0u8; len - bytes.len()];
    out.extend_from_slice(&bytes);
    out
}

impl CryptoProvider for RsaProvider {
    fn supported_key_sizes(&self) -> RangeInclusive<usize> {
        MIN_KEY_BITS..=MAX_KEY_BITS
    }

    fn generate_key_pair(&self, bits: usize) -> Result<KeyMaterial, ProviderError> {
        self.check_size(bits)?;

        let private = RsaPrivateKey::new(&mut OsRng, bits)
            .map_err(|e| ProviderError::Generation(e.to_string()))?;
        let public = private.to_public_key();

        let private_der = private
            .to_pkcs1_der()
            .map_err(|e| ProviderError::Generation(format!("encode private key: {}", e)))?;
        let public_der = public
            .to_pkcs1_der()
            .map_err(|e| ProviderError::Generation(format!("encode public key: {}", e)))?;

        tracing::debug!(bits, "Generated RSA key pair");

        Ok(KeyMaterial {
            public_der: public_der.as_bytes().to_vec(),
            private_der: Zeroizing::new(private_der.as_bytes().to_vec()),
        })
    }

    fn public_key_bits(&self, der: &[u8]) -> Result<usize, ProviderError> {
        let key = Self::parse_public(der)?;
        let bits = key.n().bits();
        self.check_size(bits)?;
        Ok(bits)
    }

    fn private_key_bits(&self, der: &[u8]) -> Result<usize, ProviderError> {
        let key = Self::parse_private(der)?;
        let bits = key.n().bits();
        self.check_size(bits)?;
        Ok(bits)
    }

    fn public_key_for(&self, private_der: &[u8]) -> Result<Vec<u8>, ProviderError> {
        let key = Self::parse_private(private_der)?;
        let public_der = key
            .to_public_key()
            .to_pkcs1_der()
            .map_err(|e| ProviderError::InvalidKey(format!("encode public key: {}", e)))?;
        Ok(public_der.as_bytes().to_vec())
    }

    fn encrypt(
        &self,
        payload: &[u8],
        key: &PublicKey,
        padding: Padding,
    ) -> Result<Vec<u8>, ProviderError> {
        let public = Self::parse_public(key.as_der())?;

        match padding {
            Padding::Pkcs1 => public
                .encrypt(&mut OsRng, Pkcs1v15Encrypt, payload)
                .map_err(|e| ProviderError::Encryption(e.to_string())),
            Padding::Oaep => public
                .encrypt(&mut OsRng, Oaep::new::<Sha1>(), payload)
                .map_err(|e| ProviderError::Encryption(e.to_string())),
            Padding::None => {
                let m = BigUint::from_bytes_be(payload);
                if &m >= public.n() {
                    return Err(ProviderError::Encryption(
                        "message representative out of range".to_string(),
                    ));
                }
                let c = m.modpow(public.e(), public.n());
                Ok(to_fixed_width(&c, public.size()))
            }
        }
    }

    // Every private-key operation is blinded with fresh OS randomness.
    fn decrypt(
        &self,
        ciphertext: &[u8],
        private_der: &[u8],
        padding: Padding,
    ) -> Result<Zeroizing<Vec<u8>>, ProviderError> {
        let private = Self::parse_private(private_der)?;

        match padding {
            Padding::Pkcs1 => private
                .decrypt_blinded(&mut OsRng, Pkcs1v15Encrypt, ciphertext)
                .map(Zeroizing::new)
                .map_err(|e| ProviderError::Decryption(e.to_string())),
            Padding::Oaep => private
                .decrypt_blinded(&mut OsRng, Oaep::new::<Sha1>(), ciphertext)
                .map(Zeroizing::new)
                .map_err(|e| ProviderError::Decryption(e.to_string())),
            Padding::None => {
                let c = BigUint::from_bytes_be(ciphertext);
                if &c >= private.n() {
                    return Err(ProviderError::Decryption(
                        "ciphertext representative out of range".to_string(),
                    ));
                }
                let m = rsa_decrypt_and_check(&private, Some(&mut OsRng), &c)
                    .map_err(|e| ProviderError::Decryption(e.to_string()))?;
                Ok(Zeroizing::new(to_fixed_width(&m, private.size())))
            }
        }
    }
}

// ─── Tests ───────────────────────────────────────────────────────────────────
