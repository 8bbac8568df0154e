//! Hardware keychain integration
//!
//! Each user can bind their records to this device: a random secret is
//! kept in the OS keychain and mixed into key derivation as the salt.

use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use tracing::debug;

use crate::{Result, SecurityError};

pub struct KeychainProvider {
    service_name: String,
}

impl KeychainProvider {
    pub fn new(service_name: &str) -> Self {
        Self {
            service_name: service_name.to_string(),
        }
    }

    fn entry(&self, user_id: &str) -> Result<keyring::Entry> {
        keyring::Entry::new(&self.service_name, &format!("device-secret/{user_id}"))
            .map_err(|e| SecurityError::Keychain(e.to_string()))
    }

    pub fn store_device_secret(&self, user_id: &str, secret: &[u8]) -> Result<()> {
        let entry = self.entry(user_id)?;
        entry
            .set_password(&BASE64.encode(secret))
            .map_err(|e| SecurityError::Keychain(e.to_string()))?;
        debug!(user = user_id, "stored device secret");
        Ok(())
    }

    /// `None` when the user has no secret on this device yet
    pub fn retrieve_device_secret(&self, user_id: &str) -> Result<Option<Vec<u8>>> {
        let entry = self.entry(user_id)?;
        let encoded = match entry.get_password() {
            Ok(encoded) => encoded,
            Err(keyring::Error::NoEntry) => return Ok(None),
            Err(e) => return Err(SecurityError::Keychain(e.to_string())),
        };
        BASE64
            .decode(encoded.as_bytes())
            .map(Some)
            .map_err(|e| SecurityError::Keychain(e.to_string()))
    }

    pub fn delete_device_secret(&self, user_id: &str) -> Result<()> {
        let entry = self.entry(user_id)?;
        match entry.delete_password() {
            Ok(()) | Err(keyring::Error::NoEntry) => Ok(()),
            Err(e) => Err(SecurityError::Keychain(e.to_string())),
        }
    }
}
