use nexum_apdu_core::{Error, Result, TlvList};

use super::CardCommand;
use crate::constants::{ins, tags};
use crate::pins::pin_hash;
use crate::types::{CardIdentity, CardState, CardStatus, HexBytes, SigningMethods};

/// READ command
#[derive(Debug)]
pub struct ReadCommand;

impl ReadCommand {
    /// Build a READ with the given PIN1, optionally announcing a linked terminal
    pub fn with_pin(pin1: &str, terminal_public_key: Option<&[u8]>) -> Result<CardCommand> {
        let mut records = TlvList::new();
        records
            .push(tags::PIN, pin_hash(pin1).to_vec())
            .push_opt(tags::TERMINAL_PUBLIC_KEY, terminal_public_key.map(<[u8]>::to_vec));
        CardCommand::new(ins::READ, "READ", &records)
    }
}

/// Decoded READ answer
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReadResponse {
    /// Card identity
    pub identity: CardIdentity,
    /// Current card state
    pub state: CardState,
}

impl TryFrom<&TlvList> for ReadResponse {
    type Error = Error;

    fn try_from(records: &TlvList) -> Result<Self> {
        let card_id = records.require(tags::CARD_ID)?.to_vec();
        let status_byte = records.u8(tags::STATUS)?.ok_or(Error::missing(tags::STATUS))?;
        let status = CardStatus::from_byte(status_byte)
            .ok_or(Error::invalid(tags::STATUS, "is not a known card status"))?;

        let card_data = records.nested(tags::CARD_DATA)?.unwrap_or_default();
        use tags::card_data as cd;

        let identity = CardIdentity {
            card_id,
            manufacturer: records.utf8(tags::MANUFACTURER_NAME)?.unwrap_or_default(),
            firmware: records.utf8(tags::FIRMWARE)?.unwrap_or_default(),
            issuer: card_data.utf8(cd::ISSUER_NAME)?.unwrap_or_default(),
            batch: card_data.bytes(cd::BATCH).map(hex::encode_upper),
            blockchain: card_data.utf8(cd::BLOCKCHAIN_NAME)?,
            curve: records.utf8(tags::CURVE_ID)?,
            card_public_key: records
                .bytes(tags::CARD_PUBLIC_KEY)
                .map(<[u8]>::to_vec)
                .unwrap_or_default(),
            issuer_data_public_key: records.bytes(tags::ISSUER_DATA_PUBLIC_KEY).map(HexBytes::from),
            issuer_transaction_public_key: records
                .bytes(tags::ISSUER_TRANSACTION_PUBLIC_KEY)
                .map(HexBytes::from),
            manufacturer_signature: card_data
                .bytes(cd::CARD_ID_MANUFACTURER_SIGNATURE)
                .map(HexBytes::from),
            signing_methods: records
                .u8(tags::SIGNING_METHOD)?
                .map(SigningMethods::from_byte)
                .unwrap_or_default(),
            settings_mask: records.u32(tags::SETTINGS_MASK)?,
            pause_before_pin2_ms: records.u32(tags::PAUSE_BEFORE_PIN2)?.map(|p| p * 10),
            max_signatures: records.u32(tags::MAX_SIGNATURES)?,
        };

        let state = CardState {
            status,
            wallet_public_key: records.bytes(tags::WALLET_PUBLIC_KEY).map(HexBytes::from),
            remaining_signatures: records.u32(tags::WALLET_REMAINING_SIGNATURES)?,
            signed_hashes: records.u32(tags::WALLET_SIGNED_HASHES)?,
            pin2_default: None,
        };

        if state.has_wallet() && state.wallet_public_key.is_none() {
            return Err(Error::missing(tags::WALLET_PUBLIC_KEY));
        }

        Ok(Self { identity, state })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::SigningMethod;
    use hex_literal::hex;

    #[test]
    fn test_read_response_decoding() {
        let mut card_data = TlvList::new();
        card_data
            .push(tags::card_data::BATCH, hex!("0010").to_vec())
            .push_str(tags::card_data::ISSUER_NAME, "TANGEM SDK")
            .push_str(tags::card_data::BLOCKCHAIN_NAME, "BTC");

        let mut records = TlvList::new();
        records
            .push(tags::CARD_ID, hex!("CB22000000001234").to_vec())
            .push_str(tags::MANUFACTURER_NAME, "TANGEM")
            .push_u8(tags::STATUS, 2)
            .push_str(tags::FIRMWARE, "1.28d")
            .push(tags::CARD_PUBLIC_KEY, vec![0x04; 65])
            .push_u8(tags::SIGNING_METHOD, 0x80 | 0x03)
            .push_u16(tags::PAUSE_BEFORE_PIN2, 1500)
            .push(tags::WALLET_PUBLIC_KEY, vec![0x04; 65])
            .push_u32(tags::WALLET_REMAINING_SIGNATURES, 999)
            .push(0x7F, vec![0xFF])
            .push_nested(tags::CARD_DATA, &card_data)
            .unwrap();

        let response = ReadResponse::try_from(&records).unwrap();
        assert_eq!(response.identity.card_id_hex(), "CB22000000001234");
        assert_eq!(response.identity.issuer, "TANGEM SDK");
        assert_eq!(response.identity.batch.as_deref(), Some("0010"));
        assert_eq!(response.identity.pause_before_pin2_ms, Some(15_000));
        assert_eq!(
            response.identity.signing_methods.preferred(),
            Some(SigningMethod::SignHash)
        );
        assert_eq!(response.state.status, CardStatus::Loaded);
        assert_eq!(response.state.remaining_signatures, Some(999));
    }

    #[test]
    fn test_loaded_card_without_wallet_key_is_malformed() {
        let mut records = TlvList::new();
        records
            .push(tags::CARD_ID, hex!("CB22000000001234").to_vec())
            .push_u8(tags::STATUS, 2);

        assert!(matches!(
            ReadResponse::try_from(&records),
            Err(Error::MalformedResponse { tag: tags::WALLET_PUBLIC_KEY, .. })
        ));
    }

    #[test]
    fn test_read_command_has_no_card_id() {
        let command = ReadCommand::with_pin("000000", None).unwrap();
        let records = TlvList::from_bytes(nexum_apdu_core::ApduCommand::data(&command).unwrap())
            .unwrap();
        assert!(records.contains(tags::PIN));
        assert!(!records.contains(tags::CARD_ID));
    }
}
