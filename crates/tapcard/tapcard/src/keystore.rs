//! Platform key store capability
//!
//! Hosts may protect cached PINs with a key held by a platform key store. The key can be
//! invalidated by the platform at any time, e.g. when biometrics change, in which case it is
//! recreated once and acquisition retried.

use tracing::warn;

/// Failure of a key store operation
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum KeyStoreError {
    /// The key exists but can no longer be used
    #[error("Signing key invalidated")]
    KeyInvalidated,
    /// The key store itself failed
    #[error("Key store unavailable: {0}")]
    Unavailable(String),
}

/// A source of the key that protects cached secrets
pub trait SigningKeyStore {
    /// Key handle
    type Key;

    /// Acquire the key
    fn acquire_signing_key(&self) -> Result<Self::Key, KeyStoreError>;

    /// Drop and regenerate the key
    fn recreate_signing_key(&self) -> Result<(), KeyStoreError>;
}

/// Acquire a key, recreating it once if the platform invalidated it
pub fn acquire_with_recreate<S: SigningKeyStore + ?Sized>(
    store: &S,
) -> Result<S::Key, KeyStoreError> {
    match store.acquire_signing_key() {
        Err(KeyStoreError::KeyInvalidated) => {
            warn!("Signing key invalidated, recreating");
            store.recreate_signing_key()?;
            store.acquire_signing_key()
        }
        other => other,
    }
}
