// Lockbox - RSA key handles
//
// SECURITY: private key material lives in a zeroize-on-drop buffer and is
// never shown by Debug or Display, and the raw bytes are crate-private:
// EncryptionEngine hands them to the provider and KeyManager's export path
// gates everything else on the key's access control.

use std::fmt;

use sha2::{Digest, Sha256};
use zeroize::Zeroizing;

use crate::policy::AccessControl;

/// Location of a key half in the secure store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyRef {
    pub tag: String,
    pub access_group: Option<String>,
}

impl fmt::Display for KeyRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.access_group {
            Some(group) => write!(f, "{}@{}", self.tag, group),
            None => f.write_str(&self.tag),
        }
    }
}

fn size_in_bytes(bits: usize) -> usize {
    bits.div_ceil(8)
}

/// Handle to an RSA public key (PKCS#1 DER).
#[derive(Clone, PartialEq, Eq)]
pub struct PublicKey {
    der: Vec<u8>,
    bits: usize,
    key_ref: Option<KeyRef>,
}

impl PublicKey {
    pub(crate) fn new(der: Vec<u8>, bits: usize, key_ref: Option<KeyRef>) -> Self {
        Self { der, bits, key_ref }
    }

    /// Modulus size in bits.
    pub fn bits(&self) -> usize {
        self.bits
    }

    /// Modulus size in bytes (`k` in the padding bounds).
    pub fn size_bytes(&self) -> usize {
        size_in_bytes(self.bits)
    }

    /// PKCS#1 DER encoding. Public material is freely exportable.
    pub fn as_der(&self) -> &[u8] {
        &self.der
    }

    pub fn key_ref(&self) -> Option<&KeyRef> {
        self.key_ref.as_ref()
    }

    /// Hex SHA-256 of the DER encoding.
    pub fn fingerprint(&self) -> String {
        hex::encode(Sha256::digest(&self.der))
    }
}

impl fmt::Debug for PublicKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PublicKey")
            .field("bits", &self.bits)
            .field("key_ref", &self.key_ref)
            .field("fingerprint", &self.fingerprint())
            .finish()
    }
}

/// Handle to an RSA private key.
///
/// The key bytes are not reachable through the handle:
///
/// ```compile_fail
/// fn leak(key: &lockbox::PrivateKey) -> &[u8] {
///     key.expose_secret()
/// }
/// ```
pub struct PrivateKey {
    material: Zeroizing<Vec<u8>>,
    bits: usize,
    key_ref: Option<KeyRef>,
    access_control: AccessControl,
}

impl PrivateKey {
    pub(crate) fn new(
        material: Zeroizing<Vec<u8>>,
        bits: usize,
        key_ref: Option<KeyRef>,
        access_control: AccessControl,
    ) -> Self {
        Self {
            material,
            bits,
            key_ref,
            access_control,
        }
    }

    pub fn bits(&self) -> usize {
        self.bits
    }

    pub fn size_bytes(&self) -> usize {
        size_in_bytes(self.bits)
    }

    pub fn key_ref(&self) -> Option<&KeyRef> {
        self.key_ref.as_ref()
    }

    pub fn access_control(&self) -> &AccessControl {
        &self.access_control
    }

    /// False for hardware-bound keys (`PrivateKeyUsage`).
    pub fn is_exportable(&self) -> bool {
        self.access_control.allows_export()
    }

    /// Raw PKCS#1 DER. Callers outside the crate go through
    /// `KeyManager::export_private_key_bytes`, which refuses hardware-bound keys.
    pub(crate) fn expose_secret(&self) -> &[u8] {
        &self.material
    }
}

impl fmt::Debug for PrivateKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PrivateKey")
            .field("material", &"[REDACTED]")
            .field("bits", &self.bits)
            .field("key_ref", &self.key_ref)
            .field("access_control", &self.access_control)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::policy::AccessControlFlag;

    #[test]
    fn test_private_key_debug_redacts_material() {
        let key = PrivateKey::new(
            Zeroizing::new(vec![0xAB; 16]),
            512,
            Some(KeyRef {
                tag: "signing".to_string(),
                access_group: None,
            }),
            AccessControl::none(),
        );
        let debug = format!("{:?}", key);
        assert!(debug.contains("[REDACTED]"));
        assert!(!debug.contains("171"), "raw byte values must not leak");
        assert!(!debug.to_lowercase().contains("abab"));
    }

    #[test]
    fn test_size_bytes_rounds_up() {
        let key = PublicKey::new(vec![1, 2, 3], 1025, None);
        assert_eq!(key.size_bytes(), 129);
        let key = PublicKey::new(vec![1, 2, 3], 2048, None);
        assert_eq!(key.size_bytes(), 256);
    }

    #[test]
    fn test_hardware_bound_key_is_not_exportable() {
        let key = PrivateKey::new(
            Zeroizing::new(vec![1]),
            512,
            None,
            AccessControl::none().with(AccessControlFlag::PrivateKeyUsage),
        );
        assert!(!key.is_exportable());
    }

    #[test]
    fn test_key_ref_display() {
        let scoped = KeyRef {
            tag: "t1".to_string(),
            access_group: Some("team".to_string()),
        };
        assert_eq!(scoped.to_string(), "t1@team");
    }

    #[test]
    fn test_fingerprint_is_sha256_hex() {
        let key = PublicKey::new(b"der".to_vec(), 512, None);
        assert_eq!(key.fingerprint().len(), 64);
    }
}
