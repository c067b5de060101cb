// Lockbox - Value sealing
//
// AES-256-GCM over every value the SQLite backend persists. The item
// identity is bound in as associated data, so a sealed value copied onto
// another row fails to open.
//
// Layout: nonce (12 bytes) || ciphertext || tag (16 bytes)

use aes_gcm::aead::{Aead, KeyInit, Payload};
use aes_gcm::{Aes256Gcm, Nonce};
use rand::rngs::OsRng;
use rand::RngCore;
use zeroize::Zeroizing;

use super::BackendError;

const NONCE_SIZE: usize = 12;
const TAG_SIZE: usize = 16;

pub(crate) struct Sealer {
    cipher: Aes256Gcm,
}

impl Sealer {
    pub fn new(store_key: &[u8]) -> Result<Self, BackendError> {
        let cipher = Aes256Gcm::new_from_slice(store_key)
            .map_err(|_| BackendError::Decode(format!("store key must be 32 bytes, got {}", store_key.len())))?;
        Ok(Self { cipher })
    }

    pub fn seal(&self, aad: &[u8], plaintext: &[u8]) -> Result<Vec<u8>, BackendError> {
        let mut nonce = [0u8; NONCE_SIZE];
        OsRng.fill_bytes(&mut nonce);

        let ciphertext = self
            .cipher
            .encrypt(Nonce::from_slice(&nonce), Payload { msg: plaintext, aad })
            .map_err(|_| BackendError::Decode("sealing failed".to_string()))?;

        let mut sealed = Vec::with_capacity(NONCE_SIZE + ciphertext.len());
        sealed.extend_from_slice(&nonce);
        sealed.extend_from_slice(&ciphertext);
        Ok(sealed)
    }

    pub fn open(&self, aad: &[u8], sealed: &[u8]) -> Result<Zeroizing<Vec<u8>>, BackendError> {
        if sealed.len() < NONCE_SIZE + TAG_SIZE {
            return Err(BackendError::Decode("sealed value is truncated".to_string()));
        }
        let (nonce, ciphertext) = sealed.split_at(NONCE_SIZE);

        self.cipher
            .decrypt(Nonce::from_slice(nonce), Payload { msg: ciphertext, aad })
            .map(Zeroizing::new)
            .map_err(|_| BackendError::Decode("sealed value failed authentication".to_string()))
    }
}
