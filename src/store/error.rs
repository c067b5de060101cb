// Lockbox - Secure store backend error types
//
// Each variant carries a stable numeric status in the platform keychain's
// code space, so callers that only see `UnderlyingStoreFailure(code)` can
// still tell failures apart.

use thiserror::Error;

use crate::enclave::EnclaveError;

/// Numeric backend status values.
pub mod status {
    pub const ITEM_NOT_FOUND: i32 = -25300;
    pub const DUPLICATE_ITEM: i32 = -25299;
    pub const AUTH_FAILED: i32 = -25293;
    pub const USER_CANCELED: i32 = -128;
    pub const INTERACTION_NOT_ALLOWED: i32 = -25308;
    pub const MISSING_ENTITLEMENT: i32 = -34018;
    pub const DECODE: i32 = -26275;
    pub const NOT_AVAILABLE: i32 = -25291;
    pub const IO: i32 = -36;
}

#[derive(Debug, Error)]
pub enum BackendError {
    #[error("The specified item could not be found")]
    ItemNotFound,

    #[error("The specified item already exists")]
    DuplicateItem,

    #[error("Authentication failed")]
    AuthFailed,

    #[error("User canceled the operation")]
    UserCanceled,

    #[error("User interaction is not allowed")]
    InteractionNotAllowed,

    #[error("Not entitled to access group '{0}'")]
    MissingEntitlement(String),

    #[error("Item kept changing while the write was being authorized")]
    ItemChanged,

    #[error("Unable to decode stored item: {0}")]
    Decode(String),

    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("Master key unavailable: {0}")]
    KeySource(#[from] EnclaveError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Store failure (status {0}): {1}")]
    Status(i32, String),
}

impl BackendError {
    pub fn status(&self) -> i32 {
        match self {
            BackendError::ItemNotFound => status::ITEM_NOT_FOUND,
            BackendError::DuplicateItem => status::DUPLICATE_ITEM,
            BackendError::AuthFailed => status::AUTH_FAILED,
            BackendError::UserCanceled => status::USER_CANCELED,
            BackendError::InteractionNotAllowed => status::INTERACTION_NOT_ALLOWED,
            BackendError::MissingEntitlement(_) => status::MISSING_ENTITLEMENT,
            BackendError::Decode(_) => status::DECODE,
            BackendError::Database(_) | BackendError::Io(_) | BackendError::ItemChanged => status::IO,
            BackendError::KeySource(_) => status::NOT_AVAILABLE,
            BackendError::Status(code, _) => *code,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_codes_are_stable() {
        assert_eq!(BackendError::ItemNotFound.status(), -25300);
        assert_eq!(BackendError::DuplicateItem.status(), -25299);
        assert_eq!(BackendError::UserCanceled.status(), -128);
        assert_eq!(
            BackendError::MissingEntitlement("g".into()).status(),
            -34018
        );
        assert_eq!(BackendError::Status(-9, "x".into()).status(), -9);
        assert_eq!(
            BackendError::KeySource(EnclaveError::MasterSecretNotFound).status(),
            status::NOT_AVAILABLE
        );
    }
}
