// Lockbox - Credentials Module
//
// Named passwords and opaque secrets, keyed by (account, service).

mod models;
mod store;

pub use models::{CredentialId, CredentialKind};
pub use store::CredentialStore;
