// Lockbox - Access policy values
//
// Immutable option structs passed into every store and key operation.
// Nothing in here has side effects; the authentication context is carried
// opaquely and only ever invoked by a backend.

use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

// ─── Accessibility ───────────────────────────────────────────────────────────

/// When an item may be read, relative to the device lock state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Accessibility {
    #[default]
    WhenUnlocked,
    WhenUnlockedThisDeviceOnly,
    AfterFirstUnlock,
    AfterFirstUnlockThisDeviceOnly,
    Always,
    AlwaysThisDeviceOnly,
}

impl Accessibility {
    pub const ALL: [Accessibility; 6] = [
        Accessibility::WhenUnlocked,
        Accessibility::WhenUnlockedThisDeviceOnly,
        Accessibility::AfterFirstUnlock,
        Accessibility::AfterFirstUnlockThisDeviceOnly,
        Accessibility::Always,
        Accessibility::AlwaysThisDeviceOnly,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Accessibility::WhenUnlocked => "when-unlocked",
            Accessibility::WhenUnlockedThisDeviceOnly => "when-unlocked-this-device-only",
            Accessibility::AfterFirstUnlock => "after-first-unlock",
            Accessibility::AfterFirstUnlockThisDeviceOnly => "after-first-unlock-this-device-only",
            Accessibility::Always => "always",
            Accessibility::AlwaysThisDeviceOnly => "always-this-device-only",
        }
    }

    /// True for the `*ThisDeviceOnly` tiers, which never migrate to another device.
    pub fn is_device_bound(&self) -> bool {
        matches!(
            self,
            Accessibility::WhenUnlockedThisDeviceOnly
                | Accessibility::AfterFirstUnlockThisDeviceOnly
                | Accessibility::AlwaysThisDeviceOnly
        )
    }
}

impl fmt::Display for Accessibility {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Accessibility {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Accessibility::ALL
            .into_iter()
            .find(|tier| tier.as_str() == s)
            .ok_or_else(|| format!("unknown accessibility tier '{}'", s))
    }
}

// ─── Access control ──────────────────────────────────────────────────────────

/// A single requirement on how an item may be used.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum AccessControlFlag {
    UserPresence,
    BiometryAny,
    BiometryCurrentSet,
    DevicePasscode,
    ApplicationPassword,
    /// Private key is bound to secure hardware and can be used but never exported.
    PrivateKeyUsage,
    Or,
    And,
}

impl AccessControlFlag {
    pub const ALL: [AccessControlFlag; 8] = [
        AccessControlFlag::UserPresence,
        AccessControlFlag::BiometryAny,
        AccessControlFlag::BiometryCurrentSet,
        AccessControlFlag::DevicePasscode,
        AccessControlFlag::ApplicationPassword,
        AccessControlFlag::PrivateKeyUsage,
        AccessControlFlag::Or,
        AccessControlFlag::And,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            AccessControlFlag::UserPresence => "user-presence",
            AccessControlFlag::BiometryAny => "biometry-any",
            AccessControlFlag::BiometryCurrentSet => "biometry-current-set",
            AccessControlFlag::DevicePasscode => "device-passcode",
            AccessControlFlag::ApplicationPassword => "application-password",
            AccessControlFlag::PrivateKeyUsage => "private-key-usage",
            AccessControlFlag::Or => "or",
            AccessControlFlag::And => "and",
        }
    }

    /// Whether this flag alone forces the authentication context to run.
    pub fn demands_authentication(&self) -> bool {
        matches!(
            self,
            AccessControlFlag::UserPresence
                | AccessControlFlag::BiometryAny
                | AccessControlFlag::BiometryCurrentSet
                | AccessControlFlag::DevicePasscode
                | AccessControlFlag::ApplicationPassword
        )
    }
}

impl fmt::Display for AccessControlFlag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AccessControlFlag {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        AccessControlFlag::ALL
            .into_iter()
            .find(|flag| flag.as_str() == s)
            .ok_or_else(|| format!("unknown access-control flag '{}'", s))
    }
}

/// A set of access-control flags. Empty means "no extra requirement".
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AccessControl(BTreeSet<AccessControlFlag>);

impl AccessControl {
    pub fn none() -> Self {
        Self::default()
    }

    pub fn with(mut self, flag: AccessControlFlag) -> Self {
        self.0.insert(flag);
        self
    }

    pub fn contains(&self, flag: AccessControlFlag) -> bool {
        self.0.contains(&flag)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn flags(&self) -> impl Iterator<Item = AccessControlFlag> + '_ {
        self.0.iter().copied()
    }

    /// True if reading an item under this policy must go through an
    /// authentication context.
    pub fn requires_authentication(&self) -> bool {
        self.0.iter().any(AccessControlFlag::demands_authentication)
    }

    /// True if private key material under this policy may leave the store.
    pub fn allows_export(&self) -> bool {
        !self.contains(AccessControlFlag::PrivateKeyUsage)
    }
}

impl FromIterator<AccessControlFlag> for AccessControl {
    fn from_iter<I: IntoIterator<Item = AccessControlFlag>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

impl fmt::Display for AccessControl {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.0.is_empty() {
            return f.write_str("none");
        }
        let names: Vec<&str> = self.0.iter().map(|flag| flag.as_str()).collect();
        f.write_str(&names.join(","))
    }
}

// ─── Authentication context ──────────────────────────────────────────────────

/// Result of asking the user to authenticate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthOutcome {
    Granted,
    Failed,
    Cancelled,
}

/// What a backend hands to the authentication context.
#[derive(Debug)]
pub struct AuthRequest<'a> {
    pub prompt: Option<&'a str>,
    pub requirement: &'a AccessControl,
}

/// Caller-supplied capability that resolves passcode/biometric checks.
///
/// Only backends call `evaluate`. The call may block for as long as the
/// prompt is on screen; cancelling it must return `AuthOutcome::Cancelled`.
pub trait AuthenticationContext: Send + Sync {
    fn evaluate(&self, request: &AuthRequest<'_>) -> AuthOutcome;
}

// ─── Reading / writing options ───────────────────────────────────────────────

/// Options for operations that read an item.
#[derive(Clone, Default)]
pub struct ReadingOptions {
    pub auth_context: Option<Arc<dyn AuthenticationContext>>,
    /// User-facing reason shown by the authentication prompt.
    pub prompt: Option<String>,
    /// Restrict the lookup to one access group. `None` searches every
    /// group the backend is entitled to.
    pub access_group: Option<String>,
}

impl ReadingOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_auth_context(mut self, context: Arc<dyn AuthenticationContext>) -> Self {
        self.auth_context = Some(context);
        self
    }

    pub fn with_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.prompt = Some(prompt.into());
        self
    }

    pub fn in_access_group(mut self, group: impl Into<String>) -> Self {
        self.access_group = Some(group.into());
        self
    }
}

impl fmt::Debug for ReadingOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ReadingOptions")
            .field("auth_context", &self.auth_context.as_ref().map(|_| "<opaque>"))
            .field("prompt", &self.prompt)
            .field("access_group", &self.access_group)
            .finish()
    }
}

/// Options for operations that create, replace or delete an item.
///
/// Defaults: no overwrite, `Accessibility::WhenUnlocked`, no access-control
/// flags, backend default access group.
#[derive(Clone, Default)]
pub struct WritingOptions {
    pub overwrite_existing: bool,
    pub accessibility: Accessibility,
    pub access_control: AccessControl,
    pub auth_context: Option<Arc<dyn AuthenticationContext>>,
    pub prompt: Option<String>,
    /// Group the item is written into. `None` means the backend default.
    pub access_group: Option<String>,
}

impl WritingOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn overwrite(mut self, overwrite: bool) -> Self {
        self.overwrite_existing = overwrite;
        self
    }

    pub fn with_accessibility(mut self, accessibility: Accessibility) -> Self {
        self.accessibility = accessibility;
        self
    }

    pub fn with_access_control(mut self, access_control: AccessControl) -> Self {
        self.access_control = access_control;
        self
    }

    pub fn with_auth_context(mut self, context: Arc<dyn AuthenticationContext>) -> Self {
        self.auth_context = Some(context);
        self
    }

    pub fn with_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.prompt = Some(prompt.into());
        self
    }

    pub fn in_access_group(mut self, group: impl Into<String>) -> Self {
        self.access_group = Some(group.into());
        self
    }

    /// The authentication half of these options, used when a write replaces
    /// or removes an item that is itself protected.
    pub fn reading(&self) -> ReadingOptions {
        ReadingOptions {
            auth_context: self.auth_context.clone(),
            prompt: self.prompt.clone(),
            access_group: self.access_group.clone(),
        }
    }
}

impl fmt::Debug for WritingOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WritingOptions")
            .field("overwrite_existing", &self.overwrite_existing)
            .field("accessibility", &self.accessibility)
            .field("access_control", &self.access_control)
            .field("auth_context", &self.auth_context.as_ref().map(|_| "<opaque>"))
            .field("prompt", &self.prompt)
            .field("access_group", &self.access_group)
            .finish()
    }
}

// ─── Tests ───────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    struct AlwaysGrant;

    impl AuthenticationContext for AlwaysGrant {
        fn evaluate(&self, _request: &AuthRequest<'_>) -> AuthOutcome {
            AuthOutcome::Granted
        }
    }

    #[test]
    fn test_writing_defaults_are_safe() {
        let options = WritingOptions::default();
        assert!(!options.overwrite_existing);
        assert_eq!(options.accessibility, Accessibility::WhenUnlocked);
        assert!(options.access_control.is_empty());
        assert!(options.auth_context.is_none());
        assert!(options.access_group.is_none());
    }

    #[test]
    fn test_accessibility_parses_its_own_names() {
        for tier in Accessibility::ALL {
            assert_eq!(tier.as_str().parse::<Accessibility>().unwrap(), tier);
        }
        assert!("whenever".parse::<Accessibility>().is_err());
    }

    #[test]
    fn test_device_bound_tiers() {
        assert!(Accessibility::AlwaysThisDeviceOnly.is_device_bound());
        assert!(!Accessibility::AfterFirstUnlock.is_device_bound());
    }

    #[test]
    fn test_access_control_authentication_requirement() {
        assert!(!AccessControl::none().requires_authentication());

        let combinators = AccessControl::none()
            .with(AccessControlFlag::Or)
            .with(AccessControlFlag::PrivateKeyUsage);
        assert!(!combinators.requires_authentication());
        assert!(!combinators.allows_export());

        let biometric = AccessControl::none().with(AccessControlFlag::BiometryAny);
        assert!(biometric.requires_authentication());
        assert!(biometric.allows_export());
    }

    #[test]
    fn test_access_control_serializes_as_flag_list() {
        let policy: AccessControl = [AccessControlFlag::UserPresence, AccessControlFlag::And]
            .into_iter()
            .collect();
        let json = serde_json::to_string(&policy).unwrap();
        assert_eq!(json, r#"["user-presence","and"]"#);

        let back: AccessControl = serde_json::from_str(&json).unwrap();
        assert_eq!(back, policy);
    }

    #[test]
    fn test_debug_hides_auth_context() {
        let options = ReadingOptions::new()
            .with_auth_context(Arc::new(AlwaysGrant))
            .with_prompt("Unlock");
        let debug = format!("{:?}", options);
        assert!(debug.contains("<opaque>"));
        assert!(debug.contains("Unlock"));
    }

    #[test]
    fn test_reading_view_of_writing_options() {
        let writing = WritingOptions::new()
            .with_auth_context(Arc::new(AlwaysGrant))
            .with_prompt("Replace key")
            .in_access_group("team.shared");
        let reading = writing.reading();
        assert!(reading.auth_context.is_some());
        assert_eq!(reading.prompt.as_deref(), Some("Replace key"));
        assert_eq!(reading.access_group.as_deref(), Some("team.shared"));
    }
}
