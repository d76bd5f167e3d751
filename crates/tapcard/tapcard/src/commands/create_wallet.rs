use nexum_apdu_core::{Error, Result, TlvList};

use super::{CardCommand, protected_records};
use crate::constants::{ins, tags};
use crate::types::{CardStatus, HexBytes};

/// CREATE_WALLET command
#[derive(Debug)]
pub struct CreateWalletCommand;

impl CreateWalletCommand {
    /// Build a CREATE_WALLET
    pub fn with_pins(pin1: &str, card_id: &[u8], pin2: &str) -> Result<CardCommand> {
        CardCommand::new(
            ins::CREATE_WALLET,
            "CREATE_WALLET",
            &protected_records(pin1, card_id, pin2),
        )
    }
}

/// Decoded CREATE_WALLET answer
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CreateWalletResponse {
    /// Status after creation
    pub status: CardStatus,
    /// New wallet public key
    pub wallet_public_key: HexBytes,
}

impl TryFrom<&TlvList> for CreateWalletResponse {
    type Error = Error;

    fn try_from(records: &TlvList) -> Result<Self> {
        let status = records
            .u8(tags::STATUS)?
            .and_then(CardStatus::from_byte)
            .ok_or(Error::invalid(tags::STATUS, "is missing or unknown"))?;
        Ok(Self {
            status,
            wallet_public_key: records.require(tags::WALLET_PUBLIC_KEY)?.into(),
        })
    }
}
