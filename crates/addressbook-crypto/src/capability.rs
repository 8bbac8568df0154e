//! Injectable encrypt/decrypt capabilities
//!
//! The record store never picks keys or algorithms. Callers hand it
//! something that can seal and open text, either a named cipher such as
//! [`RecordCipher`](crate::RecordCipher) or a plain closure.

use crate::Result;

/// Seals plaintext into cipher text
pub trait Encrypter {
    fn encrypt(&self, plain_text: &str) -> Result<String>;
}

/// Opens cipher text produced by the matching [`Encrypter`]
pub trait Decrypter {
    fn decrypt(&self, cipher_text: &str) -> Result<String>;
}

impl<F> Encrypter for F
where
    F: Fn(&str) -> Result<String>,
{
    fn encrypt(&self, plain_text: &str) -> Result<String> {
        self(plain_text)
    }
}

impl<F> Decrypter for F
where
    F: Fn(&str) -> Result<String>,
{
    fn decrypt(&self, cipher_text: &str) -> Result<String> {
        self(cipher_text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::SecurityError;

    fn seal_with<E: Encrypter + ?Sized>(encrypter: &E, text: &str) -> Result<String> {
        encrypter.encrypt(text)
    }

    fn open_with<D: Decrypter + ?Sized>(decrypter: &D, text: &str) -> Result<String> {
        decrypter.decrypt(text)
    }

    #[test]
    fn test_closures_act_as_capabilities() {
        let reverse = |text: &str| -> Result<String> { Ok(text.chars().rev().collect()) };

        let sealed = seal_with(&reverse, "r1,GN=Bob").unwrap();
        assert_eq!(sealed, "boB=NG,1r");
        assert_eq!(open_with(&reverse, &sealed).unwrap(), "r1,GN=Bob");
    }

    #[test]
    fn test_closure_failures_propagate() {
        let broken = |_: &str| -> Result<String> { Err(SecurityError::DecryptionFailed) };

        assert!(matches!(
            open_with(&broken, "anything"),
            Err(SecurityError::DecryptionFailed)
        ));
    }

    #[test]
    fn test_trait_objects_are_supported() {
        let identity = |text: &str| -> Result<String> { Ok(text.to_string()) };
        let decrypter: &dyn Decrypter = &identity;

        assert_eq!(open_with(decrypter, "plain").unwrap(), "plain");
    }
}
