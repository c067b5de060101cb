// Lockbox - Backend access gate
//
// Rules shared by every backend adapter: device lock state against an item's
// accessibility tier, the authentication context against its access-control
// flags, and access-group entitlements. Accessibility is checked first; both
// must pass.

use std::collections::BTreeSet;

use super::backend::{GroupScope, ItemAttributes};
use super::BackendError;
use crate::policy::{Accessibility, AuthOutcome, AuthRequest, ReadingOptions};

// ─── Lock state ──────────────────────────────────────────────────────────────

/// Device lock state as seen by the backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LockState {
    BeforeFirstUnlock,
    Locked,
    #[default]
    Unlocked,
}

impl LockState {
    pub fn permits(&self, accessibility: Accessibility) -> bool {
        match accessibility {
            Accessibility::WhenUnlocked | Accessibility::WhenUnlockedThisDeviceOnly => {
                *self == LockState::Unlocked
            }
            Accessibility::AfterFirstUnlock | Accessibility::AfterFirstUnlockThisDeviceOnly => {
                *self != LockState::BeforeFirstUnlock
            }
            Accessibility::Always | Accessibility::AlwaysThisDeviceOnly => true,
        }
    }
}

/// How often a replacing write re-authorizes when the item changes under it.
pub const WRITE_ATTEMPTS: usize = 3;

/// Check a protected read of an item with `attributes`.
///
/// Runs the authentication context at most once. Must be called without any
/// backend lock held, since `evaluate` may block on a prompt.
pub fn authorize(
    lock_state: LockState,
    attributes: &ItemAttributes,
    options: &ReadingOptions,
) -> Result<(), BackendError> {
    if !lock_state.permits(attributes.accessibility) {
        tracing::debug!(
            accessibility = %attributes.accessibility,
            ?lock_state,
            "Item not readable in current lock state"
        );
        return Err(BackendError::InteractionNotAllowed);
    }

    if !attributes.access_control.requires_authentication() {
        return Ok(());
    }

    let Some(context) = options.auth_context.as_ref() else {
        tracing::debug!(
            access_control = %attributes.access_control,
            "Item requires authentication but no context was supplied"
        );
        return Err(BackendError::InteractionNotAllowed);
    };

    let request = AuthRequest {
        prompt: options.prompt.as_deref(),
        requirement: &attributes.access_control,
    };
    match context.evaluate(&request) {
        AuthOutcome::Granted => Ok(()),
        AuthOutcome::Failed => Err(BackendError::AuthFailed),
        AuthOutcome::Cancelled => Err(BackendError::UserCanceled),
    }
}

// ─── Access groups ───────────────────────────────────────────────────────────

/// Default group and entitlement list of a backend.
///
/// With no entitlement list every group is reachable. Ungrouped items are
/// always reachable.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GroupPolicy {
    default_group: Option<String>,
    entitled: Option<BTreeSet<String>>,
}

impl GroupPolicy {
    pub fn unrestricted() -> Self {
        Self::default()
    }

    pub fn with_default_group(mut self, group: impl Into<String>) -> Self {
        let group = group.into();
        if let Some(entitled) = self.entitled.as_mut() {
            entitled.insert(group.clone());
        }
        self.default_group = Some(group);
        self
    }

    /// Restrict the backend to `groups` (plus the default group, if any).
    pub fn with_entitlements<I, S>(mut self, groups: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut entitled: BTreeSet<String> = groups.into_iter().map(Into::into).collect();
        if let Some(default) = &self.default_group {
            entitled.insert(default.clone());
        }
        self.entitled = Some(entitled);
        self
    }

    pub fn default_group(&self) -> Option<&str> {
        self.default_group.as_deref()
    }

    pub fn is_entitled(&self, group: Option<&str>) -> bool {
        match (group, &self.entitled) {
            (None, _) | (_, None) => true,
            (Some(group), Some(entitled)) => entitled.contains(group),
        }
    }

    /// Reject a scope that names a group this backend may not touch.
    pub fn check(&self, scope: &GroupScope) -> Result<(), BackendError> {
        match scope {
            GroupScope::Exact(Some(group)) if !self.is_entitled(Some(group)) => {
                Err(BackendError::MissingEntitlement(group.clone()))
            }
            _ => Ok(()),
        }
    }

    /// Partition a write lands in.
    pub fn resolve_write(&self, scope: &GroupScope) -> Result<Option<String>, BackendError> {
        self.check(scope)?;
        Ok(match scope {
            GroupScope::Unspecified => self.default_group.clone(),
            GroupScope::Exact(group) => group.clone(),
        })
    }

    /// Whether an item stored in `stored_group` is visible to a read or delete
    /// over `scope`.
    pub fn matches(&self, scope: &GroupScope, stored_group: Option<&str>) -> bool {
        match scope {
            GroupScope::Unspecified => self.is_entitled(stored_group),
            GroupScope::Exact(group) => group.as_deref() == stored_group,
        }
    }
}

// ─── Tests ───────────────────────────────────────────────────────────────────
