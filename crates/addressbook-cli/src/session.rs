//! Login session: the user being served and the key unlocked for them

use addressbook_crypto::{cipher, kdf, KeychainProvider, RecordCipher, SecurityError};
use secrecy::SecretString;
use tracing::info;

/// Keychain service under which device secrets are stored
pub const KEYCHAIN_SERVICE: &str = "addressbook";

/// Where the key-derivation salt comes from
#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum KeySource {
    /// Password alone; the salt is derived from the user id
    Passphrase,
    /// Password plus a random secret held in the OS keychain
    Keychain,
}

pub struct Session {
    user_id: String,
    cipher: RecordCipher,
}

impl Session {
    pub fn open(
        user_id: &str,
        password: &SecretString,
        source: KeySource,
    ) -> Result<Self, SecurityError> {
        let salt = match source {
            KeySource::Passphrase => kdf::user_salt(user_id),
            KeySource::Keychain => {
                device_secret(&KeychainProvider::new(KEYCHAIN_SERVICE), user_id)?
            }
        };

        Ok(Self {
            user_id: user_id.to_string(),
            cipher: RecordCipher::from_passphrase(password, &salt)?,
        })
    }

    pub fn user_id(&self) -> &str {
        &self.user_id
    }

    pub fn cipher(&self) -> &RecordCipher {
        &self.cipher
    }
}

/// Fetch the user's device secret, creating one on first login
fn device_secret(keychain: &KeychainProvider, user_id: &str) -> Result<Vec<u8>, SecurityError> {
    if let Some(secret) = keychain.retrieve_device_secret(user_id)? {
        return Ok(secret);
    }

    let secret = cipher::generate_key()?;
    keychain.store_device_secret(user_id, secret.as_slice())?;
    info!(user = user_id, "bound address book to this device");
    Ok(secret.to_vec())
}
