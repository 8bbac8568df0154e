//! Text sealing for record files
//!
//! Record files are single-byte text. Sealed output is `ab1:` followed by
//! base64 of `nonce || ciphertext || tag`, so it stays plain ASCII.

use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use secrecy::SecretString;
use zeroize::Zeroizing;

use crate::capability::{Decrypter, Encrypter};
use crate::cipher::{self, KEY_SIZE};
use crate::{kdf, Result, SecurityError};

/// Version tag on every sealed text
pub const SEAL_PREFIX: &str = "ab1:";

/// ChaCha20-Poly1305 over text, keyed per user
pub struct RecordCipher {
    key: Zeroizing<[u8; KEY_SIZE]>,
}

impl RecordCipher {
    pub fn new(key: Zeroizing<[u8; KEY_SIZE]>) -> Self {
        Self { key }
    }

    pub fn from_slice(key: &[u8]) -> Result<Self> {
        if key.len() != KEY_SIZE {
            return Err(SecurityError::InvalidKeySize(key.len()));
        }
        let mut owned = Zeroizing::new([0u8; KEY_SIZE]);
        owned.copy_from_slice(key);
        Ok(Self { key: owned })
    }

    /// Derive the cipher from a login password
    pub fn from_passphrase(passphrase: &SecretString, salt: &[u8]) -> Result<Self> {
        Ok(Self::new(kdf::derive_key(passphrase, salt)?))
    }
}

impl std::fmt::Debug for RecordCipher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RecordCipher").finish_non_exhaustive()
    }
}

impl Encrypter for RecordCipher {
    fn encrypt(&self, plain_text: &str) -> Result<String> {
        let sealed = cipher::encrypt(&*self.key, plain_text.as_bytes())?;
        Ok(format!("{SEAL_PREFIX}{}", BASE64.encode(sealed)))
    }
}

impl Decrypter for RecordCipher {
    fn decrypt(&self, cipher_text: &str) -> Result<String> {
        let armored = cipher_text
            .trim_end()
            .strip_prefix(SEAL_PREFIX)
            .ok_or_else(|| SecurityError::Encoding("missing seal prefix".to_string()))?;

        let sealed = BASE64
            .decode(armored)
            .map_err(|e| SecurityError::Encoding(e.to_string()))?;

        let plaintext = cipher::decrypt(&*self.key, &sealed)?;
        String::from_utf8(plaintext.to_vec())
            .map_err(|_| SecurityError::Encoding("plaintext is not valid UTF-8".to_string()))
    }
}
