// Lockbox - CLI Command Handlers
//
// Each function handles one CLI subcommand. They open the SQLite store
// through the configured keyring source and drive CredentialStore,
// KeyManager and EncryptionEngine. No authentication context is supplied,
// so items that demand one surface as "access denied".

use std::path::Path;

use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;

use crate::config::Config;
use crate::credentials::{CredentialId, CredentialStore};
use crate::crypto::{EncryptionEngine, RsaProvider};
use crate::enclave::MasterKeySource;
use crate::keys::KeyManager;
use crate::policy::{ReadingOptions, WritingOptions};
use crate::store::SqliteBackend;

use super::{Cli, CliError, Commands, KeyCommand, PasswordCommand, SecretCommand};

/// Execute the parsed CLI command.
pub fn execute(cli: Cli) -> Result<(), CliError> {
    let mut config = Config::from_env();
    if let Some(dir) = cli.data_dir {
        config.data_dir = dir;
    }
    let group = cli.access_group.as_deref();

    match cli.command {
        Commands::Init => cmd_init(&config),
        Commands::Password { action } => cmd_password(&config, group, action),
        Commands::Secret { action } => cmd_secret(&config, group, action),
        Commands::Purge { service } => cmd_purge(&config, group, &service),
        Commands::Key { action } => cmd_key(&config, group, action),
    }
}

// ─── Init ────────────────────────────────────────────────────────────────────

fn cmd_init(config: &Config) -> Result<(), CliError> {
    std::fs::create_dir_all(&config.data_dir)?;
    config.key_source().get_or_create()?;
    config.open_backend()?;

    println!("✓ Lockbox initialized successfully");
    println!("  Database: {}", config.db_path().display());
    println!("  Master key stored in platform keyring");
    println!();
    println!("Next: store a password with `lockbox password set --service <name> --username <user> --password <value>`");
    Ok(())
}

// ─── Credentials ─────────────────────────────────────────────────────────────

fn cmd_password(config: &Config, group: Option<&str>, action: PasswordCommand) -> Result<(), CliError> {
    let backend = open_backend(config)?;
    let store = CredentialStore::new(&backend);

    match action {
        PasswordCommand::Set {
            id,
            password,
            protection,
        } => {
            let options = protection.writing_options(group);
            store.set_password(&id.username, &id.service, &password, &options)?;
            println!("✓ Password stored for {} on {}", id.username, id.service);
        }
        PasswordCommand::Get { id } => {
            let password = store.get_password(&id.username, &id.service, &reading(group))?;
            println!("{}", password.as_str());
        }
        PasswordCommand::Exists { id } => {
            let found = store.exists(&CredentialId::password(&id.username, &id.service), &reading(group))?;
            println!("{}", found);
        }
        PasswordCommand::Delete { id } => {
            store.delete(&CredentialId::password(&id.username, &id.service), &writing(group))?;
            println!("✓ Password for {} on {} deleted", id.username, id.service);
        }
    }
    Ok(())
}

fn cmd_secret(config: &Config, group: Option<&str>, action: SecretCommand) -> Result<(), CliError> {
    let backend = open_backend(config)?;
    let store = CredentialStore::new(&backend);

    match action {
        SecretCommand::Set {
            id,
            value,
            protection,
        } => {
            let secret = decode_base64("value", &value)?;
            store.set_secret(&id.key, &id.service, &secret, &protection.writing_options(group))?;
            println!("✓ Secret {} stored for {}", id.key, id.service);
        }
        SecretCommand::Get { id } => {
            let secret = store.get_secret(&id.key, &id.service, &reading(group))?;
            println!("{}", STANDARD.encode(secret.as_slice()));
        }
        SecretCommand::Exists { id } => {
            let found = store.exists(&CredentialId::secret(&id.key, &id.service), &reading(group))?;
            println!("{}", found);
        }
        SecretCommand::Delete { id } => {
            store.delete(&CredentialId::secret(&id.key, &id.service), &writing(group))?;
            println!("✓ Secret {} for {} deleted", id.key, id.service);
        }
    }
    Ok(())
}

fn cmd_purge(config: &Config, group: Option<&str>, service: &str) -> Result<(), CliError> {
    let backend = open_backend(config)?;
    let removed = CredentialStore::new(&backend).delete_all_for_service(service, &writing(group))?;
    println!("✓ Removed {} credential(s) for {}", removed, service);
    Ok(())
}

// ─── Keys ────────────────────────────────────────────────────────────────────

fn cmd_key(config: &Config, group: Option<&str>, action: KeyCommand) -> Result<(), CliError> {
    let backend = open_backend(config)?;
    let provider = RsaProvider::new();
    let keys = KeyManager::new(&backend, &provider);
    let engine = EncryptionEngine::new(&provider);

    match action {
        KeyCommand::Generate {
            tag,
            bits,
            protection,
        } => {
            let pair = keys.generate_keypair(bits, &tag, &protection.writing_options(group))?;
            println!("✓ Key pair generated");
            println!("  Tag:         {}", pair.tag);
            println!("  Bits:        {}", pair.bits());
            println!("  Fingerprint: {}", pair.public.fingerprint());
        }
        KeyCommand::Import {
            tag,
            public,
            private,
            protection,
        } => {
            let public_der = std::fs::read(&public)?;
            let private_der = zeroize::Zeroizing::new(std::fs::read(&private)?);
            let pair = keys.insert_keypair(&public_der, &private_der, &tag, &protection.writing_options(group))?;
            println!("✓ Key pair imported");
            println!("  Tag:         {}", pair.tag);
            println!("  Bits:        {}", pair.bits());
            println!("  Fingerprint: {}", pair.public.fingerprint());
        }
        KeyCommand::ExportPublic { tag, out } => {
            let public = keys.fetch_public_key(&tag, &reading(group))?;
            emit(&keys.export_public_key_bytes(&public), out.as_deref())?;
        }
        KeyCommand::ExportPrivate { tag, out } => {
            let options = reading(group);
            let private = keys.fetch_private_key(&tag, &options)?;
            let der = keys.export_private_key_bytes(&private, &options)?;
            emit(&der, out.as_deref())?;
        }
        KeyCommand::Delete { tag } => {
            keys.delete_keypair(&tag, &writing(group))?;
            println!("✓ Key pair {} deleted", tag);
        }
        KeyCommand::Encrypt { tag, padding, data } => {
            let plaintext = decode_base64("data", &data)?;
            let public = keys.fetch_public_key(&tag, &reading(group))?;
            let ciphertext = engine.encrypt(&plaintext, &public, padding)?;
            println!("{}", STANDARD.encode(ciphertext));
        }
        KeyCommand::Decrypt { tag, padding, data } => {
            let ciphertext = decode_base64("data", &data)?;
            let private = keys.fetch_private_key(&tag, &reading(group))?;
            let plaintext = engine.decrypt(&ciphertext, &private, padding)?;
            println!("{}", STANDARD.encode(plaintext.as_slice()));
        }
    }
    Ok(())
}

// ─── Helpers ─────────────────────────────────────────────────────────────────

/// Open the store, failing early with a readable message before `init`.
fn open_backend(config: &Config) -> Result<SqliteBackend, CliError> {
    if !config.key_source().exists()? || !config.db_path().exists() {
        return Err(CliError::NotInitialized);
    }
    Ok(config.open_backend()?)
}

fn reading(group: Option<&str>) -> ReadingOptions {
    match group {
        Some(group) => ReadingOptions::new().in_access_group(group),
        None => ReadingOptions::new(),
    }
}

fn writing(group: Option<&str>) -> WritingOptions {
    match group {
        Some(group) => WritingOptions::new().in_access_group(group),
        None => WritingOptions::new(),
    }
}

fn decode_base64(field: &'static str, value: &str) -> Result<Vec<u8>, CliError> {
    STANDARD
        .decode(value.trim())
        .map_err(|source| CliError::Decode { field, source })
}

/// Write DER to `out`, or base64 to stdout.
fn emit(der: &[u8], out: Option<&Path>) -> Result<(), CliError> {
    match out {
        Some(path) => {
            std::fs::write(path, der)?;
            println!("✓ Wrote {} bytes to {}", der.len(), path.display());
        }
        None => println!("{}", STANDARD.encode(der)),
    }
    Ok(())
}
