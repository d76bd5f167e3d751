use nexum_apdu_core::{Error, Result, TlvList};

use super::{CardCommand, protected_records};
use crate::constants::{ins, tags};
use crate::types::CardStatus;

/// PURGE_WALLET command
#[derive(Debug)]
pub struct PurgeWalletCommand;

impl PurgeWalletCommand {
    /// Build a PURGE_WALLET
    pub fn with_pins(pin1: &str, card_id: &[u8], pin2: &str) -> Result<CardCommand> {
        CardCommand::new(
            ins::PURGE_WALLET,
            "PURGE_WALLET",
            &protected_records(pin1, card_id, pin2),
        )
    }
}

/// Decoded PURGE_WALLET answer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PurgeWalletResponse {
    /// Status after the purge, when the card reports it
    pub status: Option<CardStatus>,
}

impl TryFrom<&TlvList> for PurgeWalletResponse {
    type Error = Error;

    fn try_from(records: &TlvList) -> Result<Self> {
        Ok(Self {
            status: records.u8(tags::STATUS)?.and_then(CardStatus::from_byte),
        })
    }
}
