//! Issuer trust policy
//!
//! The set of trusted issuer keys is an immutable value handed to each session. There is no
//! global registry.

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::crypto::verify_signature;
use crate::types::{CardIdentity, HexBytes};
use crate::{Error, Result};

/// One trusted issuer
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrustedIssuer {
    /// Display name
    pub name: String,
    /// Issuer public key, uncompressed SEC1
    pub public_key: HexBytes,
}

/// Trusted issuer keys and the self-certification switch
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct IssuerTrust {
    issuers: Vec<TrustedIssuer>,
    #[serde(default)]
    allow_self_certified: bool,
}

impl IssuerTrust {
    /// Trust the given issuers only
    pub const fn new(issuers: Vec<TrustedIssuer>) -> Self {
        Self {
            issuers,
            allow_self_certified: false,
        }
    }

    /// Accept cards whose issuer is not in the trusted set
    pub const fn with_self_certified(mut self, allow: bool) -> Self {
        self.allow_self_certified = allow;
        self
    }

    /// Trusted issuers
    pub fn issuers(&self) -> &[TrustedIssuer] {
        &self.issuers
    }

    /// Check a card against the policy, returning the matching issuer when there is one
    ///
    /// A card carrying a manufacturer signature over `card_id || card_public_key` must verify
    /// under one of the trusted keys. Without that signature the card's issuer data key must be
    /// one of them.
    pub fn validate(&self, card: &CardIdentity) -> Result<Option<&TrustedIssuer>> {
        let matched = if let Some(signature) = &card.manufacturer_signature {
            let message = [card.card_id.as_slice(), card.card_public_key.as_slice()].concat();
            self.find_signer(&message, signature.as_ref())
        } else {
            card.issuer_data_public_key
                .as_ref()
                .and_then(|key| self.issuers.iter().find(|i| i.public_key == *key))
        };

        match matched {
            Some(issuer) => {
                debug!(issuer = %issuer.name, "Card issuer trusted");
                Ok(Some(issuer))
            }
            None if self.allow_self_certified => {
                warn!(issuer = %card.issuer, "Accepting self-certified card");
                Ok(None)
            }
            None => Err(Error::UnknownIssuer(card.issuer.clone())),
        }
    }

    fn find_signer(&self, message: &[u8], signature: &[u8]) -> Option<&TrustedIssuer> {
        self.issuers.iter().find(|issuer| {
            verify_signature(issuer.public_key.as_ref(), message, signature).unwrap_or(false)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::TerminalKey;
    use crate::types::SigningMethods;

    fn card(issuer_key: Option<Vec<u8>>) -> CardIdentity {
        CardIdentity {
            card_id: vec![0xCB, 0x01, 0x02, 0x03, 0x04, 0x05, 0x06, 0x07],
            manufacturer: "TANGEM".into(),
            firmware: "2.30".into(),
            issuer: "ACME".into(),
            batch: None,
            blockchain: None,
            curve: None,
            card_public_key: vec![0x04; 65],
            issuer_data_public_key: issuer_key.map(HexBytes),
            issuer_transaction_public_key: None,
            manufacturer_signature: None,
            signing_methods: SigningMethods::default(),
            settings_mask: None,
            pause_before_pin2_ms: None,
            max_signatures: None,
        }
    }

    #[test]
    fn test_issuer_key_match() {
        let key = TerminalKey::random();
        let trust = IssuerTrust::new(vec![TrustedIssuer {
            name: "ACME".into(),
            public_key: HexBytes(key.public_key()),
        }]);

        let issuer = trust.validate(&card(Some(key.public_key()))).unwrap();
        assert_eq!(issuer.map(|i| i.name.as_str()), Some("ACME"));

        let stranger = card(Some(TerminalKey::random().public_key()));
        assert!(matches!(trust.validate(&stranger), Err(Error::UnknownIssuer(_))));
        assert!(trust.clone().with_self_certified(true).validate(&stranger).unwrap().is_none());
    }

    #[test]
    fn test_manufacturer_signature_must_verify() {
        let manufacturer = TerminalKey::random();
        let trust = IssuerTrust::new(vec![TrustedIssuer {
            name: "Factory".into(),
            public_key: HexBytes(manufacturer.public_key()),
        }]);

        let mut signed = card(None);
        let message = [signed.card_id.clone(), signed.card_public_key.clone()].concat();
        signed.manufacturer_signature = Some(HexBytes(manufacturer.sign(&message)));
        assert!(trust.validate(&signed).unwrap().is_some());

        signed.manufacturer_signature = Some(HexBytes(manufacturer.sign(b"forged")));
        assert!(trust.validate(&signed).is_err());
    }
}
