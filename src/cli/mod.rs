// Lockbox - CLI Module
//
// Command-line interface using clap derive macros.
// Subcommands: init, password, secret, purge, key.

mod commands;

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};
use thiserror::Error;

use crate::crypto::Padding;
use crate::enclave::EnclaveError;
use crate::error::LockboxError;
use crate::policy::{AccessControl, AccessControlFlag, Accessibility, WritingOptions};
use crate::store::BackendError;

pub use commands::execute;

// ─── Errors ──────────────────────────────────────────────────────────────────

#[derive(Debug, Error)]
pub enum CliError {
    #[error(transparent)]
    Lockbox(#[from] LockboxError),

    #[error("secure store error: {0}")]
    Store(#[from] BackendError),

    #[error("keyring error: {0}")]
    Enclave(#[from] EnclaveError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("invalid base64 in {field}: {source}")]
    Decode {
        field: &'static str,
        source: base64::DecodeError,
    },

    #[error("Lockbox is not initialized. Run `lockbox init` first.")]
    NotInitialized,
}

// ─── Arguments ───────────────────────────────────────────────────────────────

/// Lockbox: access-controlled credential and RSA key-pair store.
#[derive(Parser, Debug)]
#[command(name = "lockbox")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Directory holding the Lockbox database.
    #[arg(long, global = true, env = "LOCKBOX_DATA_DIR")]
    pub data_dir: Option<PathBuf>,

    /// Access group to read from or write to. Without it, writes use the
    /// configured default group and reads search every entitled group.
    #[arg(long, global = true)]
    pub access_group: Option<String>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Create the master secret and the encrypted database.
    Init,

    /// Manage passwords, identified by username and service.
    Password {
        #[command(subcommand)]
        action: PasswordCommand,
    },

    /// Manage opaque secrets, identified by key and service.
    Secret {
        #[command(subcommand)]
        action: SecretCommand,
    },

    /// Delete every password and secret stored for a service.
    Purge {
        #[arg(long)]
        service: String,
    },

    /// Manage RSA key pairs and encrypt or decrypt with them.
    Key {
        #[command(subcommand)]
        action: KeyCommand,
    },
}

/// How a new item is protected.
#[derive(Args, Debug, Clone, Default)]
pub struct Protection {
    /// Replace an existing item instead of failing.
    #[arg(long)]
    pub overwrite: bool,

    /// When the item can be read (e.g. when-unlocked, after-first-unlock).
    #[arg(long)]
    pub accessibility: Option<Accessibility>,

    /// Access-control flag; repeat for several (e.g. user-presence).
    #[arg(long = "access-control")]
    pub access_control: Vec<AccessControlFlag>,
}

impl Protection {
    pub fn writing_options(&self, access_group: Option<&str>) -> WritingOptions {
        let mut options = WritingOptions::new()
            .overwrite(self.overwrite)
            .with_access_control(self.access_control.iter().copied().collect::<AccessControl>());
        if let Some(accessibility) = self.accessibility {
            options = options.with_accessibility(accessibility);
        }
        if let Some(group) = access_group {
            options = options.in_access_group(group);
        }
        options
    }
}

#[derive(Args, Debug, Clone)]
pub struct PasswordId {
    #[arg(long)]
    pub service: String,

    #[arg(long)]
    pub username: String,
}

#[derive(Subcommand, Debug)]
pub enum PasswordCommand {
    /// Store a password.
    Set {
        #[command(flatten)]
        id: PasswordId,

        /// The password. Prefer LOCKBOX_PASSWORD to keep it out of shell history.
        #[arg(long, env = "LOCKBOX_PASSWORD", hide_env_values = true)]
        password: String,

        #[command(flatten)]
        protection: Protection,
    },
    /// Print a password to stdout.
    Get {
        #[command(flatten)]
        id: PasswordId,
    },
    /// Print whether a password is stored.
    Exists {
        #[command(flatten)]
        id: PasswordId,
    },
    /// Delete a password.
    Delete {
        #[command(flatten)]
        id: PasswordId,
    },
}

#[derive(Args, Debug, Clone)]
pub struct SecretId {
    #[arg(long)]
    pub service: String,

    #[arg(long)]
    pub key: String,
}

#[derive(Subcommand, Debug)]
pub enum SecretCommand {
    /// Store a secret given as base64.
    Set {
        #[command(flatten)]
        id: SecretId,

        /// Base64-encoded secret bytes.
        #[arg(long, env = "LOCKBOX_SECRET", hide_env_values = true)]
        value: String,

        #[command(flatten)]
        protection: Protection,
    },
    /// Print a secret to stdout as base64.
    Get {
        #[command(flatten)]
        id: SecretId,
    },
    /// Print whether a secret is stored.
    Exists {
        #[command(flatten)]
        id: SecretId,
    },
    /// Delete a secret.
    Delete {
        #[command(flatten)]
        id: SecretId,
    },
}

#[derive(Subcommand, Debug)]
pub enum KeyCommand {
    /// Generate and store a new RSA key pair.
    Generate {
        #[arg(long)]
        tag: String,

        #[arg(long, default_value_t = 2048)]
        bits: usize,

        #[command(flatten)]
        protection: Protection,
    },
    /// Store an existing PKCS#1 DER key pair.
    Import {
        #[arg(long)]
        tag: String,

        /// File holding the PKCS#1 DER public key.
        #[arg(long)]
        public: PathBuf,

        /// File holding the PKCS#1 DER private key.
        #[arg(long)]
        private: PathBuf,

        #[command(flatten)]
        protection: Protection,
    },
    /// Write the public key as DER to a file, or as base64 to stdout.
    ExportPublic {
        #[arg(long)]
        tag: String,

        #[arg(long)]
        out: Option<PathBuf>,
    },
    /// Write the private key as DER to a file, or as base64 to stdout.
    ExportPrivate {
        #[arg(long)]
        tag: String,

        #[arg(long)]
        out: Option<PathBuf>,
    },
    /// Delete a key pair.
    Delete {
        #[arg(long)]
        tag: String,
    },
    /// Encrypt base64 data with the public key; prints base64 ciphertext.
    Encrypt {
        #[arg(long)]
        tag: String,

        #[arg(long)]
        padding: Padding,

        #[arg(long)]
        data: String,
    },
    /// Decrypt base64 ciphertext with the private key; prints base64 plaintext.
    Decrypt {
        #[arg(long)]
        tag: String,

        #[arg(long)]
        padding: Padding,

        #[arg(long)]
        data: String,
    },
}

#[cfg(test)]
mod tests {
    use clap::CommandFactory;

    use super::*;

    #[test]
    fn test_command_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_password_set_with_protection() {
        let cli = Cli::try_parse_from([
            "lockbox",
            "--access-group",
            "team.app",
            "password",
            "set",
            "--service",
            "mail",
            "--username",
            "alice",
            "--password",
            "hunter2",
            "--overwrite",
            "--accessibility",
            "after-first-unlock",
            "--access-control",
            "user-presence",
        ])
        .unwrap();

        assert_eq!(cli.access_group.as_deref(), Some("team.app"));
        let Commands::Password {
            action: PasswordCommand::Set { id, protection, .. },
        } = cli.command
        else {
            panic!("expected password set");
        };
        assert_eq!(id.username, "alice");

        let options = protection.writing_options(cli.access_group.as_deref());
        assert!(options.overwrite_existing);
        assert_eq!(options.accessibility, Accessibility::AfterFirstUnlock);
        assert!(options.access_control.contains(AccessControlFlag::UserPresence));
        assert_eq!(options.access_group.as_deref(), Some("team.app"));
    }

    #[test]
    fn test_key_generate_defaults_to_2048_bits() {
        let cli = Cli::try_parse_from(["lockbox", "key", "generate", "--tag", "t1"]).unwrap();
        assert!(matches!(
            cli.command,
            Commands::Key {
                action: KeyCommand::Generate { bits: 2048, .. }
            }
        ));
    }

    #[test]
    fn test_encrypt_requires_padding() {
        assert!(Cli::try_parse_from(["lockbox", "key", "encrypt", "--tag", "t", "--data", "AA=="]).is_err());

        let cli = Cli::try_parse_from([
            "lockbox", "key", "encrypt", "--tag", "t", "--padding", "oaep", "--data", "AA==",
        ])
        .unwrap();
        assert!(matches!(
            cli.command,
            Commands::Key {
                action: KeyCommand::Encrypt {
                    padding: Padding::Oaep,
                    ..
                }
            }
        ));
    }

    #[test]
    fn test_default_protection_matches_writing_defaults() {
        let options = Protection::default().writing_options(None);
        let defaults = WritingOptions::new();
        assert_eq!(options.overwrite_existing, defaults.overwrite_existing);
        assert_eq!(options.accessibility, defaults.accessibility);
        assert!(options.access_control.is_empty());
        assert_eq!(options.access_group, None);
    }
}
