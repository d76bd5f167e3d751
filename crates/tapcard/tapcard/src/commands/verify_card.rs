use nexum_apdu_core::{Error, Result, TlvList};

use super::{CardCommand, authenticated_records};
use crate::constants::{CHALLENGE_LENGTH, ins, tags};

/// VERIFY_CARD command
#[derive(Debug)]
pub struct VerifyCardCommand;

impl VerifyCardCommand {
    /// Build a VERIFY_CARD carrying a host challenge
    pub fn with_challenge(
        pin1: &str,
        card_id: &[u8],
        challenge: &[u8; CHALLENGE_LENGTH],
    ) -> Result<CardCommand> {
        let mut records = authenticated_records(pin1, card_id);
        records.push(tags::CHALLENGE, challenge.to_vec());
        CardCommand::new(ins::VERIFY_CARD, "VERIFY_CARD", &records)
    }
}

/// Decoded VERIFY_CARD answer
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VerifyCardResponse {
    /// Card chosen salt
    pub salt: Vec<u8>,
    /// Card key signature over `challenge || salt`
    pub signature: Vec<u8>,
}

impl TryFrom<&TlvList> for VerifyCardResponse {
    type Error = Error;

    fn try_from(records: &TlvList) -> Result<Self> {
        Ok(Self {
            salt: records.require(tags::SALT)?.to_vec(),
            signature: records.require(tags::CARD_SIGNATURE)?.to_vec(),
        })
    }
}
