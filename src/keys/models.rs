// Lockbox - Key pair model

use crate::crypto::{PrivateKey, PublicKey};
use crate::policy::{AccessControl, Accessibility};

/// A matched RSA key pair as stored under one tag and access group.
///
/// The private half only carries key material inside its zeroizing handle;
/// `Debug` never prints it.
#[derive(Debug)]
pub struct KeyPair {
    pub tag: String,
    pub access_group: Option<String>,
    pub public: PublicKey,
    pub private: PrivateKey,
    pub accessibility: Accessibility,
    pub access_control: AccessControl,
}

impl KeyPair {
    /// Modulus size in bits.
    pub fn bits(&self) -> usize {
        self.public.bits()
    }
}
