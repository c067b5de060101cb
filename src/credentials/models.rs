// Lockbox - Credential identities

use std::fmt;

use crate::error::Result;
use crate::store::{GroupScope, ItemClass, ItemKey};
use crate::validate::require_non_empty;

/// Whether a credential is a password (text) or an opaque byte secret.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CredentialKind {
    Password,
    Secret,
}

impl CredentialKind {
    pub fn item_class(&self) -> ItemClass {
        match self {
            CredentialKind::Password => ItemClass::GenericPassword,
            CredentialKind::Secret => ItemClass::GenericSecret,
        }
    }

    /// Label of the account half of the identity.
    fn account_label(&self) -> &'static str {
        match self {
            CredentialKind::Password => "username",
            CredentialKind::Secret => "key",
        }
    }
}

/// Identity of a credential: `(username, service)` for passwords,
/// `(key, service)` for secrets. Matching is exact and case-sensitive.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CredentialId {
    kind: CredentialKind,
    service: String,
    account: String,
}

impl CredentialId {
    pub fn password(username: &str, service: &str) -> Self {
        Self {
            kind: CredentialKind::Password,
            service: service.to_string(),
            account: username.to_string(),
        }
    }

    pub fn secret(key: &str, service: &str) -> Self {
        Self {
            kind: CredentialKind::Secret,
            service: service.to_string(),
            account: key.to_string(),
        }
    }

    pub fn kind(&self) -> CredentialKind {
        self.kind
    }

    pub fn service(&self) -> &str {
        &self.service
    }

    /// Username or key, depending on the kind.
    pub fn account(&self) -> &str {
        &self.account
    }

    pub(crate) fn validate(&self) -> Result<()> {
        require_non_empty("service", &self.service)?;
        require_non_empty(self.kind.account_label(), &self.account)
    }

    pub(crate) fn item_key(&self, scope: GroupScope) -> ItemKey {
        ItemKey::new(self.kind.item_class(), &self.service, &self.account, scope)
    }
}

impl fmt::Display for CredentialId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let kind = match self.kind {
            CredentialKind::Password => "password",
            CredentialKind::Secret => "secret",
        };
        write!(
            f,
            "{} {} '{}' for service '{}'",
            kind,
            self.kind.account_label(),
            self.account,
            self.service
        )
    }
}
