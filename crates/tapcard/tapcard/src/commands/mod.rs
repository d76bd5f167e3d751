//! Commands understood by the card
//!
//! Every command is a single APDU whose data field is a list of TLV records. Builders here only
//! assemble records; status handling and retries live in the session.

mod create_wallet;
mod purge_wallet;
mod read;
mod sign;
mod swap_pin;
mod verify_card;

pub use create_wallet::{CreateWalletCommand, CreateWalletResponse};
pub use purge_wallet::{PurgeWalletCommand, PurgeWalletResponse};
pub use read::{ReadCommand, ReadResponse};
pub use sign::{IssuerDataUpdate, SignCommand, SignPayload, SignResponse};
pub use swap_pin::SwapPinCommand;
pub use verify_card::{VerifyCardCommand, VerifyCardResponse};

use bytes::Bytes;
use nexum_apdu_core::{ApduCommand, Result, TlvList};

use crate::constants::{CLA, tags};
use crate::pins::pin_hash;

/// An encoded card command
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CardCommand {
    ins: u8,
    name: &'static str,
    data: Bytes,
}

impl CardCommand {
    /// Encode a command from its records
    pub fn new(ins: u8, name: &'static str, records: &TlvList) -> Result<Self> {
        Ok(Self {
            ins,
            name,
            data: records.to_bytes()?,
        })
    }

    /// Human readable command name, used in logs and errors
    pub const fn name(&self) -> &'static str {
        self.name
    }
}

impl ApduCommand for CardCommand {
    fn class(&self) -> u8 {
        CLA
    }

    fn instruction(&self) -> u8 {
        self.ins
    }

    fn p1(&self) -> u8 {
        0x00
    }

    fn p2(&self) -> u8 {
        0x00
    }

    fn data(&self) -> Option<&[u8]> {
        Some(&self.data)
    }
}

/// Records every command except READ starts with: PIN1 hash and card ID
pub(crate) fn authenticated_records(pin1: &str, card_id: &[u8]) -> TlvList {
    let mut records = TlvList::new();
    records
        .push(tags::PIN, pin_hash(pin1).to_vec())
        .push(tags::CARD_ID, card_id.to_vec());
    records
}

/// [`authenticated_records`] plus the PIN2 hash
pub(crate) fn protected_records(pin1: &str, card_id: &[u8], pin2: &str) -> TlvList {
    let mut records = authenticated_records(pin1, card_id);
    records.push(tags::PIN2, pin_hash(pin2).to_vec());
    records
}
