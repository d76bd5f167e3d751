//! EOS `eosio.token::transfer` transactions

use k256::ecdsa::VerifyingKey;
use nexum_tapcard::tasks::RawSignRequest;
use nexum_tapcard::{HashAlgorithm, RawSignature};
use ripemd::{Digest as _, Ripemd160};
use serde::Serialize;
use tracing::debug;

use super::{sha256, write_uvarint};
use crate::amount::to_u64;
use crate::signature::{bind, normalized};
use crate::transaction::{UnsignedBody, UnsignedTransaction};
use crate::wallet::{ChainReference, TransferIntent, WalletState, ensure_funds};
use crate::{ChainFamily, Error, Result, SignedTransaction};

/// Copies of the digest requested from the card, so that one canonical signature is likely
pub const SIGNATURE_ATTEMPTS: usize = 10;

const TOKEN_CONTRACT: &str = "eosio.token";
const TRANSFER_ACTION: &str = "transfer";
const ACTIVE_PERMISSION: &str = "active";
const SYMBOL_CODE: &[u8] = b"EOS";
const KEY_TYPE_SUFFIX: &[u8] = b"K1";

/// Packed transfer with the chain it is bound to
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EosTransfer {
    /// 32-byte chain id
    pub chain_id: [u8; 32],
    /// Packed transaction, expiration and reference block included
    pub packed: Vec<u8>,
}

impl EosTransfer {
    fn signing_payload(&self) -> Vec<u8> {
        [&self.chain_id[..], &self.packed, &[0u8; 32]].concat()
    }
}

/// 64-bit encoding of an account or action name
pub(crate) fn encode_name(name: &str) -> Result<u64> {
    if name.is_empty() || name.len() > 13 {
        return Err(Error::invalid_address(name, "names are 1 to 13 characters"));
    }

    let mut value = 0u64;
    for (i, c) in name.bytes().enumerate() {
        let symbol = match c {
            b'a'..=b'z' => u64::from(c - b'a') + 6,
            b'1'..=b'5' => u64::from(c - b'1') + 1,
            b'.' => 0,
            _ => return Err(Error::invalid_address(name, "character outside a-z, 1-5 and '.'")),
        };
        if i < 12 {
            value |= (symbol & 0x1F) << (64 - 5 * (i + 1));
        } else if symbol > 0x0F {
            return Err(Error::invalid_address(name, "thirteenth character out of range"));
        } else {
            value |= symbol;
        }
    }
    Ok(value)
}

/// Canonical as EOS nodes require: neither `r` nor `s` needs a sign-padding byte in DER
fn is_canonical(signature: &[u8; 64]) -> bool {
    let (r, s) = signature.split_at(32);
    let half_ok = |h: &[u8]| h[0] & 0x80 == 0 && !(h[0] == 0 && h[1] & 0x80 == 0);
    half_ok(r) && half_ok(s)
}

/// `SIG_K1_` string of a compact signature with its recovery header
fn format_signature(compact: &[u8; 65]) -> String {
    let checksum = Ripemd160::digest([&compact[..], KEY_TYPE_SUFFIX].concat());
    let mut data = compact.to_vec();
    data.extend_from_slice(&checksum[..4]);
    format!("SIG_K1_{}", bs58::encode(data).into_string())
}

fn pack_transfer(
    from: u64,
    to: u64,
    amount: i64,
    memo: &str,
    reference: (u32, u16, u32),
) -> Result<Vec<u8>> {
    let (expiration, ref_block_num, ref_block_prefix) = reference;

    let mut data = Vec::with_capacity(40 + memo.len());
    data.extend_from_slice(&from.to_le_bytes());
    data.extend_from_slice(&to.to_le_bytes());
    data.extend_from_slice(&amount.to_le_bytes());
    let mut symbol = [0u8; 8];
    symbol[0] = ChainFamily::Eos.decimals();
    symbol[1..1 + SYMBOL_CODE.len()].copy_from_slice(SYMBOL_CODE);
    data.extend_from_slice(&symbol);
    write_uvarint(&mut data, memo.len() as u64);
    data.extend_from_slice(memo.as_bytes());

    let mut packed = Vec::with_capacity(64 + data.len());
    packed.extend_from_slice(&expiration.to_le_bytes());
    packed.extend_from_slice(&ref_block_num.to_le_bytes());
    packed.extend_from_slice(&ref_block_prefix.to_le_bytes());
    // max_net_usage_words, max_cpu_usage_ms, delay_sec, context free actions
    packed.extend_from_slice(&[0, 0, 0, 0]);
    // one action
    packed.push(1);
    packed.extend_from_slice(&encode_name(TOKEN_CONTRACT)?.to_le_bytes());
    packed.extend_from_slice(&encode_name(TRANSFER_ACTION)?.to_le_bytes());
    packed.push(1);
    packed.extend_from_slice(&from.to_le_bytes());
    packed.extend_from_slice(&encode_name(ACTIVE_PERMISSION)?.to_le_bytes());
    write_uvarint(&mut packed, data.len() as u64);
    packed.extend_from_slice(&data);
    // transaction extensions
    packed.push(0);
    Ok(packed)
}

pub(crate) fn build(
    wallet: &WalletState,
    intent: &TransferIntent,
    key: VerifyingKey,
) -> Result<UnsignedTransaction> {
    let ChainReference::Eos {
        chain_id,
        ref_block_num,
        ref_block_prefix,
        expiration,
    } = &wallet.reference
    else {
        return Err(Error::MissingReference("EOS chain id and reference block"));
    };
    let chain_id: [u8; 32] = chain_id
        .0
        .as_slice()
        .try_into()
        .map_err(|_| Error::InvalidWalletState("EOS chain id is not 32 bytes"))?;

    let from = encode_name(&wallet.address)?;
    let to = encode_name(&intent.destination)?;
    let amount =
        i64::try_from(to_u64(intent.amount)?).map_err(|_| Error::AmountOverflow)?;
    ensure_funds(wallet, intent)?;

    let transfer = EosTransfer {
        chain_id,
        packed: pack_transfer(
            from,
            to,
            amount,
            intent.memo.as_deref().unwrap_or_default(),
            (*expiration, *ref_block_num, *ref_block_prefix),
        )?,
    };
    let payload = transfer.signing_payload();
    let digest = sha256(&payload);

    Ok(UnsignedTransaction {
        family: ChainFamily::Eos,
        digests: vec![digest; SIGNATURE_ATTEMPTS],
        raw: Some(RawSignRequest {
            payload,
            algorithm: HashAlgorithm::Sha256,
        }),
        public_key: key,
        outgoing: intent.total()?,
        body: UnsignedBody::Eos(transfer),
    })
}

#[derive(Serialize)]
struct PackedTransaction {
    signatures: Vec<String>,
    compression: &'static str,
    packed_context_free_data: &'static str,
    packed_trx: String,
}

pub(crate) fn assemble(
    unsigned: &UnsignedTransaction,
    transfer: &EosTransfer,
    signatures: &[RawSignature],
) -> Result<SignedTransaction> {
    let digest = &unsigned.digests[0];

    let mut chosen = None;
    for (attempt, raw) in signatures.iter().enumerate() {
        let mut candidate = [0u8; 64];
        candidate.copy_from_slice(&normalized(raw)?.to_bytes());
        if is_canonical(&candidate) {
            debug!(attempt, "Found canonical signature");
            chosen = Some(raw);
            break;
        }
    }
    let Some(raw) = chosen else {
        return Err(Error::SignatureFormat("no canonical signature among the card's answers"));
    };

    let (signature, recovery_id) = bind(&unsigned.public_key, digest, raw)?;
    let mut compact = [0u8; 65];
    compact[0] = recovery_id.to_byte() + 31;
    compact[1..].copy_from_slice(&signature.to_bytes());

    let envelope = PackedTransaction {
        signatures: vec![format_signature(&compact)],
        compression: "none",
        packed_context_free_data: "",
        packed_trx: hex::encode(&transfer.packed),
    };
    let id = hex::encode(sha256(&transfer.packed));
    Ok(SignedTransaction {
        family: ChainFamily::Eos,
        payload: serde_json::to_string(&envelope)?,
        debit: unsigned.debit(&id),
        id,
        raw: transfer.packed.clone(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_name_encoding() {
        assert_eq!(encode_name("eosio").unwrap(), 0x5530_EA00_0000_0000);
        assert_eq!(encode_name("eosio.token").unwrap(), 0x5530_EA03_3482_A600);
        assert_eq!(encode_name("transfer").unwrap(), 0xCDCD_3C2D_57D4_4000);
        assert_eq!(encode_name("active").unwrap(), 0x3232_EDA8_0000_0000);
        assert!(encode_name("Alice").is_err());
        assert!(encode_name("toolongaccountname").is_err());
        assert!(encode_name("").is_err());
    }

    #[test]
    fn test_canonical_rule() {
        let mut sig = [0x11u8; 64];
        assert!(is_canonical(&sig));
        sig[0] = 0x80;
        assert!(!is_canonical(&sig));
        sig[0] = 0x00;
        sig[1] = 0x7F;
        assert!(!is_canonical(&sig));
        sig[1] = 0x80;
        assert!(is_canonical(&sig));
    }

    #[test]
    fn test_signature_string_shape() {
        let compact = [0x20u8; 65];
        let formatted = format_signature(&compact);
        assert!(formatted.starts_with("SIG_K1_"));
        let decoded = bs58::decode(&formatted[7..]).into_vec().unwrap();
        assert_eq!(decoded.len(), 69);
        assert_eq!(&decoded[..65], &compact[..]);
    }
}
