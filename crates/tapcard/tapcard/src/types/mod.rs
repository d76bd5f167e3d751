mod identity;
mod signing_method;

pub use identity::{CardIdentity, CardState, CardStatus, HexBytes};
pub use signing_method::{SigningMethod, SigningMethods};

/// One `r || s` signature as returned by the card
pub type RawSignature = [u8; crate::constants::SIGNATURE_LENGTH];

/// Hash algorithm the card applies in raw signing mode
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HashAlgorithm {
    /// SHA-256
    Sha256,
    /// SHA-256 applied twice
    DoubleSha256,
    /// SHA-512
    Sha512,
}

impl HashAlgorithm {
    /// Name the firmware expects in the hash algorithm record
    pub const fn card_name(self) -> &'static str {
        match self {
            Self::Sha256 => "sha-256",
            Self::DoubleSha256 => "sha-256x2",
            Self::Sha512 => "sha-512",
        }
    }
}
