// Lockbox - RSA padding schemes

use std::fmt;
use std::str::FromStr;

/// Output size of the OAEP digest (SHA-1) in bytes.
pub const OAEP_HASH_LEN: usize = 20;

/// Overhead of RSAES-PKCS1-v1_5 in bytes.
pub const PKCS1_OVERHEAD: usize = 11;

/// Byte-structuring convention applied around the RSA transform.
///
/// There is deliberately no `Default` impl: every call names its padding.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Padding {
    /// Raw RSA. Payloads must be exactly one modulus long.
    None,
    /// RSAES-PKCS1-v1_5.
    Pkcs1,
    /// RSAES-OAEP with SHA-1 / MGF1-SHA-1.
    Oaep,
}

impl Padding {
    pub const ALL: [Padding; 3] = [Padding::None, Padding::Pkcs1, Padding::Oaep];

    pub fn as_str(&self) -> &'static str {
        match self {
            Padding::None => "none",
            Padding::Pkcs1 => "pkcs1",
            Padding::Oaep => "oaep",
        }
    }

    /// Largest plaintext this scheme accepts for a modulus of `key_bytes`.
    /// Returns `None` when the key is too small for the scheme.
    pub fn max_plaintext_len(&self, key_bytes: usize) -> Option<usize> {
        match self {
            Padding::None => Some(key_bytes),
            Padding::Pkcs1 => key_bytes.checked_sub(PKCS1_OVERHEAD),
            Padding::Oaep => key_bytes.checked_sub(2 * OAEP_HASH_LEN + 2),
        }
    }

    /// Whether a payload of `len` bytes is acceptable input for `encrypt`.
    pub fn accepts_plaintext_len(&self, len: usize, key_bytes: usize) -> bool {
        match (self, self.max_plaintext_len(key_bytes)) {
            (Padding::None, Some(exact)) => len == exact,
            (_, Some(max)) => len <= max,
            (_, None) => false,
        }
    }
}

impl fmt::Display for Padding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Padding {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Padding::ALL
            .into_iter()
            .find(|padding| padding.as_str().eq_ignore_ascii_case(s))
            .ok_or_else(|| format!("unknown padding '{}' (expected none, pkcs1 or oaep)", s))
    }
}
