use nexum_apdu_core::{Error, Result, TlvList};

use super::{CardCommand, protected_records};
use crate::constants::{SIGNATURE_LENGTH, ins, tags};
use crate::types::{HashAlgorithm, RawSignature};

/// Data handed to the card for signing
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SignPayload {
    /// Digests of identical length, one signature each
    Hashes(Vec<Vec<u8>>),
    /// A payload the card hashes itself, one signature
    Raw {
        /// Bytes to hash and sign
        payload: Vec<u8>,
        /// Hash the card applies
        algorithm: HashAlgorithm,
    },
}

impl SignPayload {
    /// Number of signatures the card returns
    pub fn signature_count(&self) -> usize {
        match self {
            Self::Hashes(hashes) => hashes.len(),
            Self::Raw { .. } => 1,
        }
    }

    /// Bytes an issuer or terminal signature is computed over
    pub fn signed_bytes(&self) -> Vec<u8> {
        match self {
            Self::Hashes(hashes) => hashes.concat(),
            Self::Raw { payload, .. } => payload.clone(),
        }
    }
}

/// Issuer data written together with a signature
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IssuerDataUpdate {
    /// New issuer data
    pub data: Vec<u8>,
    /// Issuer signature over `data`
    pub signature: Vec<u8>,
}

/// SIGN command builder
#[derive(Debug)]
pub struct SignCommand {
    records: TlvList,
}

impl SignCommand {
    /// Start a SIGN for the given payload
    pub fn new(pin1: &str, card_id: &[u8], pin2: &str, payload: &SignPayload) -> Self {
        let mut records = protected_records(pin1, card_id, pin2);
        match payload {
            SignPayload::Hashes(hashes) => {
                let size = hashes.first().map_or(0, Vec::len);
                records
                    .push_u8(tags::TRANSACTION_OUT_HASH_SIZE, size as u8)
                    .push(tags::TRANSACTION_OUT_HASH, hashes.concat());
            }
            SignPayload::Raw { payload, algorithm } => {
                records
                    .push(tags::TRANSACTION_OUT_RAW, payload.clone())
                    .push_str(tags::HASH_ALG_ID, algorithm.card_name());
            }
        }
        Self { records }
    }

    /// Attach the issuer signature over the signed bytes
    pub fn with_issuer_signature(mut self, signature: &[u8]) -> Self {
        self.records
            .push(tags::ISSUER_TRANSACTION_SIGNATURE, signature.to_vec());
        self
    }

    /// Attach an issuer data update
    pub fn with_issuer_data(mut self, update: &IssuerDataUpdate) -> Self {
        self.records
            .push(tags::ISSUER_DATA, update.data.clone())
            .push(tags::ISSUER_DATA_SIGNATURE, update.signature.clone());
        self
    }

    /// Attach a linked terminal's signature and public key
    pub fn with_terminal(mut self, signature: &[u8], public_key: &[u8]) -> Self {
        self.records
            .push(tags::TERMINAL_TRANSACTION_SIGNATURE, signature.to_vec())
            .push(tags::TERMINAL_PUBLIC_KEY, public_key.to_vec());
        self
    }

    /// Encode the command
    pub fn build(self) -> Result<CardCommand> {
        CardCommand::new(ins::SIGN, "SIGN", &self.records)
    }
}

/// Decoded SIGN answer
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignResponse {
    /// One signature per requested digest, in request order
    pub signatures: Vec<RawSignature>,
    /// Signatures left on the wallet
    pub remaining_signatures: Option<u32>,
    /// Hashes signed so far
    pub signed_hashes: Option<u32>,
}

impl SignResponse {
    /// Decode an answer that must hold exactly `expected` signatures
    pub fn decode(records: &TlvList, expected: usize) -> Result<Self> {
        let blob = records.require(tags::WALLET_SIGNATURE)?;
        if blob.len() != expected * SIGNATURE_LENGTH {
            return Err(Error::invalid(
                tags::WALLET_SIGNATURE,
                "does not hold one signature per digest",
            ));
        }

        let signatures = blob
            .chunks_exact(SIGNATURE_LENGTH)
            .map(|chunk| {
                let mut signature = [0u8; SIGNATURE_LENGTH];
                signature.copy_from_slice(chunk);
                signature
            })
            .collect();

        Ok(Self {
            signatures,
            remaining_signatures: records.u32(tags::WALLET_REMAINING_SIGNATURES)?,
            signed_hashes: records.u32(tags::WALLET_SIGNED_HASHES)?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use nexum_apdu_core::ApduCommand;

    #[test]
    fn test_sign_hashes_records() {
        let payload = SignPayload::Hashes(vec![vec![0x11; 32], vec![0x22; 32]]);
        let command = SignCommand::new("000000", &[0xCB; 8], "000", &payload)
            .with_issuer_signature(&[0x33; 64])
            .build()
            .unwrap();

        let records = TlvList::from_bytes(command.data().unwrap()).unwrap();
        assert_eq!(records.u8(tags::TRANSACTION_OUT_HASH_SIZE).unwrap(), Some(32));
        assert_eq!(records.require(tags::TRANSACTION_OUT_HASH).unwrap().len(), 64);
        assert!(records.contains(tags::ISSUER_TRANSACTION_SIGNATURE));
        assert!(records.contains(tags::PIN2));
    }

    #[test]
    fn test_sign_response_is_all_or_nothing() {
        let mut records = TlvList::new();
        records.push(tags::WALLET_SIGNATURE, vec![0xAA; 128]);
        let response = SignResponse::decode(&records, 2).unwrap();
        assert_eq!(response.signatures.len(), 2);

        assert!(SignResponse::decode(&records, 3).is_err());
    }

    #[test]
    fn test_raw_payload_uses_hash_name() {
        let payload = SignPayload::Raw {
            payload: vec![0x01, 0x02],
            algorithm: HashAlgorithm::DoubleSha256,
        };
        let command = SignCommand::new("000000", &[0xCB; 8], "000", &payload)
            .build()
            .unwrap();
        let records = TlvList::from_bytes(command.data().unwrap()).unwrap();
        assert_eq!(
            records.utf8(tags::HASH_ALG_ID).unwrap().as_deref(),
            Some("sha-256x2")
        );
        assert_eq!(payload.signed_bytes(), vec![0x01, 0x02]);
    }
}
