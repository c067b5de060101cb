// Lockbox - RSA key-pair lifecycle

mod manager;
mod models;

pub use manager::KeyManager;
pub use models::KeyPair;
