//! Signature checks on card answers and terminal linking

use std::fmt;

use k256::ecdsa::signature::{Signer, Verifier};
use k256::ecdsa::{Signature, SigningKey, VerifyingKey};

use crate::constants::CHALLENGE_LENGTH;
use crate::{Error, Result};

/// Fresh random challenge for VERIFY_CARD
pub(crate) fn random_challenge() -> [u8; CHALLENGE_LENGTH] {
    rand::random()
}

/// Verify a 64-byte `r || s` signature over SHA-256 of `message`
pub fn verify_signature(public_key: &[u8], message: &[u8], signature: &[u8]) -> Result<bool> {
    let key = VerifyingKey::from_sec1_bytes(public_key)?;
    let signature = Signature::from_slice(signature)?;
    Ok(key.verify(message, &signature).is_ok())
}

/// Key pair of a terminal linked to cards
///
/// A linked terminal signs the data it asks the card to sign. Cards configured for it skip the
/// security delay for such requests.
#[derive(Clone)]
pub struct TerminalKey {
    signing_key: SigningKey,
}

impl fmt::Debug for TerminalKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TerminalKey")
            .field("public_key", &hex::encode(self.public_key()))
            .finish()
    }
}

impl TerminalKey {
    /// Load a terminal key from its 32-byte scalar
    pub fn from_bytes(secret: &[u8]) -> Result<Self> {
        Ok(Self {
            signing_key: SigningKey::from_slice(secret)?,
        })
    }

    /// Generate a new terminal key
    pub fn random() -> Self {
        Self {
            signing_key: SigningKey::random(&mut rand_v8::thread_rng()),
        }
    }

    /// Uncompressed SEC1 public key
    pub fn public_key(&self) -> Vec<u8> {
        self.signing_key
            .verifying_key()
            .to_encoded_point(false)
            .as_bytes()
            .to_vec()
    }

    /// Sign `data`, returning `r || s`
    pub fn sign(&self, data: &[u8]) -> Vec<u8> {
        let signature: Signature = self.signing_key.sign(data);
        signature.to_bytes().to_vec()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_terminal_signature_verifies() {
        let terminal = TerminalKey::random();
        let signature = terminal.sign(b"payload");
        assert_eq!(signature.len(), 64);
        assert!(verify_signature(&terminal.public_key(), b"payload", &signature).unwrap());
        assert!(!verify_signature(&terminal.public_key(), b"other", &signature).unwrap());
    }

    #[test]
    fn test_malformed_key_is_an_error() {
        assert!(matches!(
            verify_signature(&[0x04; 10], b"x", &[0u8; 64]),
            Err(Error::Ecdsa(_))
        ));
    }

    #[test]
    fn test_challenges_differ() {
        assert_ne!(random_challenge(), random_challenge());
    }
}
