// Lockbox - Top-level error types
//
// Every CredentialStore, KeyManager and EncryptionEngine operation returns
// exactly one of these kinds. Backend and provider failures are translated
// here by `ErrorReporter`; nothing else in the crate builds a
// `LockboxError` from a lower-layer error.

use thiserror::Error;

use crate::crypto::ProviderError;
use crate::store::BackendError;

/// Unified error taxonomy for all Lockbox operations.
#[derive(Debug, Error)]
pub enum LockboxError {
    #[error("Item not found")]
    NotFound,

    #[error("Item already exists and overwrite was not requested")]
    DuplicateItem,

    #[error("Authentication failed")]
    AuthenticationFailed,

    #[error("Authentication was cancelled")]
    AuthenticationCancelled,

    #[error("Access denied by item policy or access group")]
    AccessDenied,

    #[error("Invalid parameters: {0}")]
    InvalidParameters(String),

    #[error("Encryption failure: {0}")]
    EncryptionFailure(String),

    #[error("Underlying store failure (status {0})")]
    UnderlyingStoreFailure(i32),
}

impl LockboxError {
    pub(crate) fn invalid(message: impl Into<String>) -> Self {
        LockboxError::InvalidParameters(message.into())
    }

    /// Stable short name for the error kind, used by the CLI.
    pub fn kind(&self) -> &'static str {
        match self {
            LockboxError::NotFound => "not-found",
            LockboxError::DuplicateItem => "duplicate-item",
            LockboxError::AuthenticationFailed => "authentication-failed",
            LockboxError::AuthenticationCancelled => "authentication-cancelled",
            LockboxError::AccessDenied => "access-denied",
            LockboxError::InvalidParameters(_) => "invalid-parameters",
            LockboxError::EncryptionFailure(_) => "encryption-failure",
            LockboxError::UnderlyingStoreFailure(_) => "underlying-store-failure",
        }
    }
}

pub type Result<T> = std::result::Result<T, LockboxError>;

// ─── Error Reporter ──────────────────────────────────────────────────────────

/// Maps backend status values and provider failures onto `LockboxError`.
pub struct ErrorReporter;

impl ErrorReporter {
    pub fn from_backend(operation: &str, err: BackendError) -> LockboxError {
        match err {
            BackendError::ItemNotFound => LockboxError::NotFound,
            BackendError::DuplicateItem => LockboxError::DuplicateItem,
            BackendError::AuthFailed => {
                tracing::info!(operation, "Authentication context rejected the request");
                LockboxError::AuthenticationFailed
            }
            BackendError::UserCanceled => {
                tracing::info!(operation, "Authentication was cancelled");
                LockboxError::AuthenticationCancelled
            }
            BackendError::InteractionNotAllowed | BackendError::MissingEntitlement(_) => {
                tracing::info!(operation, reason = %err, "Access denied");
                LockboxError::AccessDenied
            }
            other => {
                let status = other.status();
                tracing::warn!(operation, status, error = %other, "Secure store failure");
                LockboxError::UnderlyingStoreFailure(status)
            }
        }
    }

    pub fn from_provider(operation: &str, err: ProviderError) -> LockboxError {
        match err {
            ProviderError::UnsupportedKeySize(bits) => {
                LockboxError::invalid(format!("unsupported key size: {} bits", bits))
            }
            ProviderError::InvalidKey(message) => LockboxError::InvalidParameters(message),
            ProviderError::Generation(message)
            | ProviderError::Encryption(message)
            | ProviderError::Decryption(message) => {
                tracing::debug!(operation, error = %message, "Cryptographic provider failure");
                LockboxError::EncryptionFailure(message)
            }
        }
    }

    /// `map_err` adapter for backend results.
    pub(crate) fn backend(operation: &'static str) -> impl Fn(BackendError) -> LockboxError {
        move |err| Self::from_backend(operation, err)
    }

    /// `map_err` adapter for provider results.
    pub(crate) fn provider(operation: &'static str) -> impl Fn(ProviderError) -> LockboxError {
        move |err| Self::from_provider(operation, err)
    }
}

// ─── Tests ───────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::status;

    #[test]
    fn test_backend_statuses_map_to_taxonomy() {
        let cases = [
            (BackendError::ItemNotFound, "not-found"),
            (BackendError::DuplicateItem, "duplicate-item"),
            (BackendError::AuthFailed, "authentication-failed"),
            (BackendError::UserCanceled, "authentication-cancelled"),
            (BackendError::InteractionNotAllowed, "access-denied"),
            (
                BackendError::MissingEntitlement("other.team".to_string()),
                "access-denied",
            ),
        ];
        for (err, kind) in cases {
            assert_eq!(ErrorReporter::from_backend("test", err).kind(), kind);
        }
    }

    #[test]
    fn test_unclassified_backend_failure_keeps_status_code() {
        let err = ErrorReporter::from_backend("test", BackendError::Status(-4242, "disk on fire".into()));
        assert!(matches!(err, LockboxError::UnderlyingStoreFailure(-4242)));

        let err = ErrorReporter::from_backend("test", BackendError::Decode("truncated".into()));
        assert!(matches!(err, LockboxError::UnderlyingStoreFailure(status::DECODE)));
    }

    #[test]
    fn test_provider_errors_split_parameters_from_transform_failures() {
        let err = ErrorReporter::from_provider("test", ProviderError::UnsupportedKeySize(100));
        assert!(matches!(err, LockboxError::InvalidParameters(_)));

        let err = ErrorReporter::from_provider("test", ProviderError::InvalidKey("bad".into()));
        assert!(matches!(err, LockboxError::InvalidParameters(_)));

        let err = ErrorReporter::from_provider("test", ProviderError::Decryption("padding".into()));
        assert!(matches!(err, LockboxError::EncryptionFailure(_)));
    }

    #[test]
    fn test_error_messages_are_human_readable() {
        let err = LockboxError::UnderlyingStoreFailure(-36);
        assert_eq!(err.to_string(), "Underlying store failure (status -36)");
    }
}
