use std::fmt;

use serde::{Deserialize, Serialize};

use super::SigningMethods;

/// Immutable identity of one physical card
///
/// Read once per scan and never changed afterwards.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CardIdentity {
    /// Card identifier as sent back in every command
    #[serde(with = "hex::serde")]
    pub card_id: Vec<u8>,
    /// Manufacturer name
    pub manufacturer: String,
    /// Firmware version string, e.g. `1.28d`
    pub firmware: String,
    /// Issuer name
    pub issuer: String,
    /// Batch identifier
    pub batch: Option<String>,
    /// Blockchain the card was personalized for
    pub blockchain: Option<String>,
    /// Curve of the wallet key
    pub curve: Option<String>,
    /// Card public key, uncompressed SEC1
    #[serde(with = "hex::serde")]
    pub card_public_key: Vec<u8>,
    /// Issuer key for issuer data
    pub issuer_data_public_key: Option<HexBytes>,
    /// Issuer key for transaction validation
    pub issuer_transaction_public_key: Option<HexBytes>,
    /// Manufacturer signature over `card_id || card_public_key`
    pub manufacturer_signature: Option<HexBytes>,
    /// Allowed signing methods
    pub signing_methods: SigningMethods,
    /// Settings mask
    pub settings_mask: Option<u32>,
    /// Security delay before PIN2 operations, in milliseconds
    pub pause_before_pin2_ms: Option<u32>,
    /// Total signatures the wallet may produce
    pub max_signatures: Option<u32>,
}

impl CardIdentity {
    /// Card identifier formatted the way it is printed on the card
    pub fn card_id_hex(&self) -> String {
        hex::encode_upper(&self.card_id)
    }
}

/// Bytes serialized as a hex string
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct HexBytes(#[serde(with = "hex::serde")] pub Vec<u8>);

impl fmt::Debug for HexBytes {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{}", hex::encode(&self.0))
    }
}

impl AsRef<[u8]> for HexBytes {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

impl From<&[u8]> for HexBytes {
    fn from(bytes: &[u8]) -> Self {
        Self(bytes.to_vec())
    }
}

/// Lifecycle status of the card's wallet slot
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CardStatus {
    /// Card has not been personalized by an issuer
    NotPersonalized,
    /// No wallet yet
    Empty,
    /// Wallet key pair present
    Loaded,
    /// Wallet erased, the card cannot hold a new one
    Purged,
}

impl CardStatus {
    /// Decode the wire byte
    pub const fn from_byte(byte: u8) -> Option<Self> {
        match byte {
            0 => Some(Self::NotPersonalized),
            1 => Some(Self::Empty),
            2 => Some(Self::Loaded),
            3 => Some(Self::Purged),
            _ => None,
        }
    }

    /// Wire byte
    pub const fn to_byte(self) -> u8 {
        self as u8
    }
}

/// Mutable card state, refreshed on every READ
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CardState {
    /// Wallet slot status
    pub status: CardStatus,
    /// Wallet public key when a wallet exists
    pub wallet_public_key: Option<HexBytes>,
    /// Signatures left on the wallet
    pub remaining_signatures: Option<u32>,
    /// Hashes signed so far
    pub signed_hashes: Option<u32>,
    /// Whether PIN2 is the factory value, when known
    pub pin2_default: Option<bool>,
}

impl CardState {
    /// Whether a wallet key pair is present
    pub const fn has_wallet(&self) -> bool {
        matches!(self.status, CardStatus::Loaded)
    }
}
