//! Bitcoin with legacy sighash

use alloy_primitives::U256;
use bech32::{FromBase32, Variant};
use k256::ecdsa::VerifyingKey;
use nexum_tapcard::HashAlgorithm;
use nexum_tapcard::tasks::RawSignRequest;

use super::sha256d;
use super::utxo::{SIGHASH_ALL, UtxoTransaction, select};
use crate::transaction::{UnsignedBody, UnsignedTransaction};
use crate::wallet::{TransferIntent, WalletState};
use crate::{ChainFamily, Error, Result};

const P2PKH_MAINNET: u8 = 0x00;
const P2SH_MAINNET: u8 = 0x05;
const P2PKH_TESTNET: u8 = 0x6F;
const P2SH_TESTNET: u8 = 0xC4;

/// `OP_DUP OP_HASH160 <hash> OP_EQUALVERIFY OP_CHECKSIG`
pub(crate) fn p2pkh_script(hash: &[u8]) -> Vec<u8> {
    let mut script = vec![0x76, 0xA9, 0x14];
    script.extend_from_slice(hash);
    script.extend_from_slice(&[0x88, 0xAC]);
    script
}

/// `OP_HASH160 <hash> OP_EQUAL`
pub(crate) fn p2sh_script(hash: &[u8]) -> Vec<u8> {
    let mut script = vec![0xA9, 0x14];
    script.extend_from_slice(hash);
    script.push(0x87);
    script
}

/// Locking script for a Base58Check P2PKH or P2SH address
pub(crate) fn base58_script(address: &str) -> Result<Vec<u8>> {
    let decoded = bs58::decode(address)
        .with_check(None)
        .into_vec()
        .map_err(|_| Error::invalid_address(address, "bad base58check encoding"))?;
    let Some((version, hash)) = decoded.split_first() else {
        return Err(Error::invalid_address(address, "empty payload"));
    };
    if hash.len() != 20 {
        return Err(Error::invalid_address(address, "hash is not 20 bytes"));
    }

    match *version {
        P2PKH_MAINNET | P2PKH_TESTNET => Ok(p2pkh_script(hash)),
        P2SH_MAINNET | P2SH_TESTNET => Ok(p2sh_script(hash)),
        _ => Err(Error::invalid_address(address, "unknown version byte")),
    }
}

/// Locking script for a version 0 segwit address
fn segwit_script(address: &str) -> Result<Vec<u8>> {
    let (hrp, data, variant) = bech32::decode(address)
        .map_err(|_| Error::invalid_address(address, "bad bech32 encoding"))?;
    if hrp != "bc" && hrp != "tb" {
        return Err(Error::invalid_address(address, "unknown network prefix"));
    }
    let Some((version, program)) = data.split_first() else {
        return Err(Error::invalid_address(address, "empty witness program"));
    };
    if version.to_u8() != 0 || variant != Variant::Bech32 {
        return Err(Error::invalid_address(address, "unsupported witness version"));
    }

    let program = Vec::<u8>::from_base32(program)
        .map_err(|_| Error::invalid_address(address, "bad witness program padding"))?;
    if program.len() != 20 && program.len() != 32 {
        return Err(Error::invalid_address(address, "bad witness program length"));
    }

    let mut script = vec![0x00, program.len() as u8];
    script.extend_from_slice(&program);
    Ok(script)
}

/// Locking script paying to a Bitcoin address
pub(crate) fn script_for_address(address: &str) -> Result<Vec<u8>> {
    let lower = address.to_ascii_lowercase();
    if lower.starts_with("bc1") || lower.starts_with("tb1") {
        segwit_script(address)
    } else {
        base58_script(address)
    }
}

/// Signing preimage of input `index`: its scriptSig replaced by the spent script, the others
/// emptied, followed by the hash type
pub(crate) fn legacy_preimage(tx: &UtxoTransaction, index: usize) -> Vec<u8> {
    let script_sigs: Vec<Vec<u8>> = tx
        .inputs
        .iter()
        .enumerate()
        .map(|(i, input)| {
            if i == index {
                input.script_pubkey.clone()
            } else {
                Vec::new()
            }
        })
        .collect();

    let mut preimage = tx.encode(&script_sigs);
    preimage.extend_from_slice(&u32::from(tx.sighash_type).to_le_bytes());
    preimage
}

pub(crate) fn build(
    wallet: &WalletState,
    intent: &TransferIntent,
    key: VerifyingKey,
) -> Result<UnsignedTransaction> {
    let destination = script_for_address(&intent.destination)?;
    let change = script_for_address(&wallet.address)?;
    let (inputs, outputs) = select(wallet, intent, destination, change)?;

    let tx = UtxoTransaction {
        version: 1,
        inputs,
        outputs,
        lock_time: 0,
        sighash_type: SIGHASH_ALL,
        public_key: wallet.public_key.0.clone(),
    };

    let preimages: Vec<Vec<u8>> = (0..tx.inputs.len())
        .map(|i| legacy_preimage(&tx, i))
        .collect();
    Ok(unsigned(ChainFamily::Bitcoin, tx, preimages, key, intent.total()?))
}

/// Common tail of the Bitcoin and Bitcoin Cash builders
pub(crate) fn unsigned(
    family: ChainFamily,
    tx: UtxoTransaction,
    preimages: Vec<Vec<u8>>,
    key: VerifyingKey,
    outgoing: U256,
) -> UnsignedTransaction {
    let digests = preimages.iter().map(|p| sha256d(p)).collect();
    let raw = match <[Vec<u8>; 1]>::try_from(preimages) {
        Ok([payload]) => Some(RawSignRequest {
            payload,
            algorithm: HashAlgorithm::DoubleSha256,
        }),
        Err(_) => None,
    };

    UnsignedTransaction {
        family,
        digests,
        raw,
        public_key: key,
        outgoing,
        body: UnsignedBody::Utxo(tx),
    }
}
