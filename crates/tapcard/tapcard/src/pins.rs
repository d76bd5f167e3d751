//! PIN candidates and the process-wide PIN cache

use std::fmt;

use parking_lot::RwLock;
use sha2::{Digest, Sha256};
use tracing::debug;

use crate::constants::{DEFAULT_PIN1, DEFAULT_PIN2};

/// Hash a PIN the way the card expects it on the wire
pub fn pin_hash(pin: &str) -> [u8; 32] {
    Sha256::digest(pin.as_bytes()).into()
}

/// Supplies PINs to a session
///
/// The shell owns PIN prompting. A session reads candidates at the start of each operation and
/// reports the PIN1 the card accepted back through [`PinsProvider::set_last_used_pin`].
pub trait PinsProvider: Send + Sync {
    /// PIN1 candidates, most likely first
    fn pins(&self) -> Vec<String>;

    /// PIN2 for protected operations, when the user supplied one
    fn pin2(&self) -> Option<String>;

    /// Record the PIN1 the card accepted or that was just set
    fn set_last_used_pin(&self, pin: &str);
}

#[derive(Default)]
struct CacheInner {
    last_used: Option<String>,
    saved: Vec<String>,
    pin2: Option<String>,
}

/// In-memory PIN cache shared across sessions
///
/// Writes are synchronous, so a PIN recorded after a successful PIN change is visible to the
/// next operation that reads the cache.
#[derive(Default)]
pub struct PinCache {
    inner: RwLock<CacheInner>,
}

impl fmt::Debug for PinCache {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let inner = self.inner.read();
        f.debug_struct("PinCache")
            .field("saved", &inner.saved.len())
            .field("has_last_used", &inner.last_used.is_some())
            .field("has_pin2", &inner.pin2.is_some())
            .finish()
    }
}

impl PinCache {
    /// Create an empty cache
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a saved PIN1 candidate
    pub fn with_saved_pin(self, pin: impl Into<String>) -> Self {
        self.inner.write().saved.push(pin.into());
        self
    }

    /// Set the PIN2 returned by [`PinsProvider::pin2`]
    pub fn with_pin2(self, pin2: impl Into<String>) -> Self {
        self.set_pin2(Some(pin2.into()));
        self
    }

    /// Replace the PIN2
    pub fn set_pin2(&self, pin2: Option<String>) {
        self.inner.write().pin2 = pin2;
    }

    /// Last PIN1 the card accepted
    pub fn last_used_pin(&self) -> Option<String> {
        self.inner.read().last_used.clone()
    }
}

impl PinsProvider for PinCache {
    fn pins(&self) -> Vec<String> {
        let inner = self.inner.read();
        let mut candidates: Vec<String> = inner.last_used.iter().cloned().collect();
        for pin in &inner.saved {
            if !candidates.contains(pin) {
                candidates.push(pin.clone());
            }
        }
        candidates
    }

    fn pin2(&self) -> Option<String> {
        self.inner.read().pin2.clone()
    }

    fn set_last_used_pin(&self, pin: &str) {
        debug!("Recording last used PIN1");
        self.inner.write().last_used = Some(pin.to_string());
    }
}

/// Candidate list tried by READ: provider candidates, then the factory PIN1
pub(crate) fn pin1_candidates(provider: &dyn PinsProvider) -> Vec<String> {
    let mut candidates = provider.pins();
    if !candidates.iter().any(|p| p == DEFAULT_PIN1) {
        candidates.push(DEFAULT_PIN1.to_string());
    }
    candidates
}

/// Whether a PIN2 is the factory value
pub fn is_default_pin2(pin2: &str) -> bool {
    pin2 == DEFAULT_PIN2
}

#[cfg(test)]
mod tests {
    use super::*;
    use hex_literal::hex;

    #[test]
    fn test_pin_hash() {
        assert_eq!(
            pin_hash("000000"),
            hex!("91b4d142823f7d20c5f08df69122de43f35f057a988d9619f6d3138485c9a203")
        );
    }

    #[test]
    fn test_cache_candidate_order() {
        let cache = PinCache::new().with_saved_pin("1111").with_saved_pin("2222");
        assert_eq!(cache.pins(), vec!["1111", "2222"]);

        cache.set_last_used_pin("2222");
        assert_eq!(cache.pins(), vec!["2222", "1111"]);
        assert_eq!(pin1_candidates(&cache), vec!["2222", "1111", DEFAULT_PIN1]);
    }

    #[test]
    fn test_pin2() {
        let cache = PinCache::new().with_pin2("123");
        assert_eq!(cache.pin2().as_deref(), Some("123"));
        cache.set_pin2(None);
        assert_eq!(cache.pin2(), None);
        assert!(is_default_pin2(DEFAULT_PIN2));
    }
}
