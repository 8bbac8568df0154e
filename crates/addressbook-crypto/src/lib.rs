//! Address Book Crypto - the security collaborator
//!
//! Record files never touch the disk in plaintext. This crate provides:
//! - The `Encrypter` / `Decrypter` capabilities the record store consumes
//! - ChaCha20-Poly1305 sealing of record text
//! - PBKDF2 key derivation from login passwords
//! - Hardware keychain integration for per-device secrets

pub mod capability;
pub mod cipher;
pub mod kdf;
pub mod keychain;
pub mod seal;

pub use capability::{Decrypter, Encrypter};
pub use keychain::KeychainProvider;
pub use seal::RecordCipher;

use cipher::KEY_SIZE;

/// Errors raised by the encryption capabilities
#[derive(Debug, thiserror::Error)]
pub enum SecurityError {
    #[error("Encryption failed")]
    EncryptionFailed,

    #[error("Decryption failed - data may be corrupted, tampered, or sealed with another key")]
    DecryptionFailed,

    #[error("Invalid key size: expected {KEY_SIZE}, got {0}")]
    InvalidKeySize(usize),

    #[error("Encoding error: {0}")]
    Encoding(String),

    #[error("Key derivation failed")]
    KeyDerivation,

    #[error("Keychain error: {0}")]
    Keychain(String),
}

pub type Result<T> = std::result::Result<T, SecurityError>;
