//! XRP ledger payments in canonical binary form

use k256::ecdsa::VerifyingKey;
use nexum_tapcard::RawSignature;
use sha2::{Digest, Sha512};

use super::compressed_key;
use crate::amount::to_u64;
use crate::signature::{bind, expect_count};
use crate::transaction::{UnsignedBody, UnsignedTransaction};
use crate::wallet::{ChainReference, TransferIntent, WalletState, ensure_funds};
use crate::{ChainFamily, Error, Result, SignedTransaction};

const SIGNING_PREFIX: [u8; 4] = *b"STX\0";
const TRANSACTION_ID_PREFIX: [u8; 4] = *b"TXN\0";
const TF_FULLY_CANONICAL_SIG: u32 = 0x8000_0000;
const PAYMENT: u16 = 0;
const MAX_DROPS: u64 = 1 << 62;

mod field {
    pub(super) const TRANSACTION_TYPE: &[u8] = &[0x12];
    pub(super) const FLAGS: &[u8] = &[0x22];
    pub(super) const SEQUENCE: &[u8] = &[0x24];
    pub(super) const DESTINATION_TAG: &[u8] = &[0x2E];
    pub(super) const LAST_LEDGER_SEQUENCE: &[u8] = &[0x20, 0x1B];
    pub(super) const AMOUNT: &[u8] = &[0x61];
    pub(super) const FEE: &[u8] = &[0x68];
    pub(super) const SIGNING_PUB_KEY: &[u8] = &[0x73];
    pub(super) const TXN_SIGNATURE: &[u8] = &[0x74];
    pub(super) const ACCOUNT: &[u8] = &[0x81];
    pub(super) const DESTINATION: &[u8] = &[0x83];
}

/// Unsigned Payment transaction
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Payment {
    /// Sending account id
    pub account: [u8; 20],
    /// Receiving account id
    pub destination: [u8; 20],
    /// Amount in drops
    pub amount: u64,
    /// Fee in drops
    pub fee: u64,
    /// Account sequence
    pub sequence: u32,
    /// Optional destination tag
    pub destination_tag: Option<u32>,
    /// Optional last ledger the payment may land in
    pub last_ledger_sequence: Option<u32>,
    /// Compressed wallet key
    pub signing_pub_key: Vec<u8>,
}

impl Payment {
    /// Fields in canonical order, with the signature when one is given
    pub(crate) fn encode(&self, signature: Option<&[u8]>) -> Vec<u8> {
        let mut buf = Vec::with_capacity(200);
        put(&mut buf, field::TRANSACTION_TYPE, &PAYMENT.to_be_bytes());
        put(&mut buf, field::FLAGS, &TF_FULLY_CANONICAL_SIG.to_be_bytes());
        put(&mut buf, field::SEQUENCE, &self.sequence.to_be_bytes());
        if let Some(tag) = self.destination_tag {
            put(&mut buf, field::DESTINATION_TAG, &tag.to_be_bytes());
        }
        if let Some(ledger) = self.last_ledger_sequence {
            put(&mut buf, field::LAST_LEDGER_SEQUENCE, &ledger.to_be_bytes());
        }
        put(&mut buf, field::AMOUNT, &native_amount(self.amount));
        put(&mut buf, field::FEE, &native_amount(self.fee));
        put_vl(&mut buf, field::SIGNING_PUB_KEY, &self.signing_pub_key);
        if let Some(signature) = signature {
            put_vl(&mut buf, field::TXN_SIGNATURE, signature);
        }
        put_vl(&mut buf, field::ACCOUNT, &self.account);
        put_vl(&mut buf, field::DESTINATION, &self.destination);
        buf
    }

    /// Digest the card signs
    pub(crate) fn signing_hash(&self) -> [u8; 32] {
        sha512_half(&[&SIGNING_PREFIX, self.encode(None).as_slice()].concat())
    }
}

fn put(buf: &mut Vec<u8>, header: &[u8], value: &[u8]) {
    buf.extend_from_slice(header);
    buf.extend_from_slice(value);
}

/// Field with a variable length prefix
fn put_vl(buf: &mut Vec<u8>, header: &[u8], value: &[u8]) {
    buf.extend_from_slice(header);
    match value.len() {
        len @ 0..=192 => buf.push(len as u8),
        len => {
            let rest = len - 193;
            buf.push(193 + (rest >> 8) as u8);
            buf.push(rest as u8);
        }
    }
    buf.extend_from_slice(value);
}

/// XRP amount: positive, not an issued currency
fn native_amount(drops: u64) -> [u8; 8] {
    (0x4000_0000_0000_0000 | drops).to_be_bytes()
}

pub(crate) fn sha512_half(data: &[u8]) -> [u8; 32] {
    let hash = Sha512::digest(data);
    let mut half = [0u8; 32];
    half.copy_from_slice(&hash[..32]);
    half
}

/// Account id behind a classic `r...` address
pub(crate) fn decode_address(address: &str) -> Result<[u8; 20]> {
    let decoded = bs58::decode(address)
        .with_alphabet(bs58::Alphabet::RIPPLE)
        .with_check(Some(0))
        .into_vec()
        .map_err(|_| Error::invalid_address(address, "bad base58check encoding"))?;
    decoded
        .get(1..)
        .and_then(|id| id.try_into().ok())
        .ok_or(Error::invalid_address(address, "account id is not 20 bytes"))
}

fn drops(value: alloy_primitives::U256) -> Result<u64> {
    let drops = to_u64(value)?;
    if drops >= MAX_DROPS {
        return Err(Error::AmountOverflow);
    }
    Ok(drops)
}

pub(crate) fn build(
    wallet: &WalletState,
    intent: &TransferIntent,
    key: VerifyingKey,
) -> Result<UnsignedTransaction> {
    let last_ledger_sequence = match &wallet.reference {
        ChainReference::Ripple {
            last_ledger_sequence,
        } => *last_ledger_sequence,
        _ => None,
    };

    let payment = Payment {
        account: decode_address(&wallet.address)?,
        destination: decode_address(&intent.destination)?,
        amount: drops(intent.amount)?,
        fee: drops(intent.fee)?,
        sequence: u32::try_from(wallet.nonce)
            .map_err(|_| Error::InvalidWalletState("sequence does not fit 32 bits"))?,
        destination_tag: intent.destination_tag,
        last_ledger_sequence,
        signing_pub_key: compressed_key(&key),
    };
    ensure_funds(wallet, intent)?;

    Ok(UnsignedTransaction {
        family: ChainFamily::Ripple,
        digests: vec![payment.signing_hash()],
        raw: None,
        public_key: key,
        outgoing: intent.total()?,
        body: UnsignedBody::Ripple(payment),
    })
}

pub(crate) fn assemble(
    unsigned: &UnsignedTransaction,
    payment: &Payment,
    signatures: &[RawSignature],
) -> Result<SignedTransaction> {
    expect_count(signatures, 1)?;
    let (signature, _) = bind(&unsigned.public_key, &unsigned.digests[0], &signatures[0])?;

    let blob = payment.encode(Some(signature.to_der().as_bytes()));
    let id = hex::encode_upper(sha512_half(&[&TRANSACTION_ID_PREFIX, blob.as_slice()].concat()));
    Ok(SignedTransaction {
        family: ChainFamily::Ripple,
        payload: hex::encode_upper(&blob),
        debit: unsigned.debit(&id),
        id,
        raw: blob,
    })
}
