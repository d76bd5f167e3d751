use nexum_apdu_core::Result;

use super::{CardCommand, protected_records};
use crate::constants::{ins, tags};
use crate::pins::pin_hash;

/// SWAP_PIN command
///
/// The card answers with `90 00` when neither PIN changed, `90 01` / `90 02` when one did and
/// `90 03` when both did. Submitting unchanged PINs is a way to check them.
#[derive(Debug)]
pub struct SwapPinCommand;

impl SwapPinCommand {
    /// Build a SWAP_PIN
    pub fn with_pins(
        pin1: &str,
        card_id: &[u8],
        pin2: &str,
        new_pin1: &str,
        new_pin2: &str,
    ) -> Result<CardCommand> {
        let mut records = protected_records(pin1, card_id, pin2);
        records
            .push(tags::NEW_PIN, pin_hash(new_pin1).to_vec())
            .push(tags::NEW_PIN2, pin_hash(new_pin2).to_vec());
        CardCommand::new(ins::SWAP_PIN, "SWAP_PIN", &records)
    }
}
