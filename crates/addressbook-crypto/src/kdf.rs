//! Password-based key derivation
//!
//! Login passwords are stretched with PBKDF2-HMAC-SHA256 before they
//! become record keys. The password itself is never stored.

use std::num::NonZeroU32;

use ring::pbkdf2;
use secrecy::{ExposeSecret, SecretString};
use zeroize::Zeroizing;

use crate::cipher::KEY_SIZE;
use crate::{Result, SecurityError};

pub const PBKDF2_ITERATIONS: u32 = 100_000;

/// Salt used when no device secret is available
pub fn user_salt(user_id: &str) -> Vec<u8> {
    format!("addressbook/{user_id}").into_bytes()
}

/// Derive a 256-bit record key from a passphrase
pub fn derive_key(passphrase: &SecretString, salt: &[u8]) -> Result<Zeroizing<[u8; KEY_SIZE]>> {
    let secret = passphrase.expose_secret();
    if secret.is_empty() {
        return Err(SecurityError::KeyDerivation);
    }

    let iterations = NonZeroU32::new(PBKDF2_ITERATIONS).ok_or(SecurityError::KeyDerivation)?;

    let mut key = Zeroizing::new([0u8; KEY_SIZE]);
    pbkdf2::derive(
        pbkdf2::PBKDF2_HMAC_SHA256,
        iterations,
        salt,
        secret.as_bytes(),
        key.as_mut(),
    );
    Ok(key)
}
