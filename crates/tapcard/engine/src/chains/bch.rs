//! Bitcoin Cash with the fork-id sighash and CashAddr addresses

use bech32::{FromBase32, ToBase32, u5};
use k256::ecdsa::VerifyingKey;

use super::btc::{base58_script, p2pkh_script, p2sh_script, unsigned};
use super::sha256d;
use super::utxo::{SIGHASH_ALL_FORKID, UtxoTransaction, select, write_script};
use crate::transaction::UnsignedTransaction;
use crate::wallet::{TransferIntent, WalletState};
use crate::{ChainFamily, Error, Result};

const CHARSET: &[u8; 32] = b"qpzry9x8gf2tvdw0s3jn54khce6mua7l";
const MAINNET_PREFIX: &str = "bitcoincash";
const KNOWN_PREFIXES: [&str; 3] = [MAINNET_PREFIX, "bchtest", "bchreg"];
const CHECKSUM_LENGTH: usize = 8;

/// What a CashAddr hash commits to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CashAddrKind {
    /// Public key hash
    P2pkh,
    /// Script hash
    P2sh,
}

impl CashAddrKind {
    const fn version_byte(self) -> u8 {
        match self {
            Self::P2pkh => 0x00,
            Self::P2sh => 0x08,
        }
    }
}

fn polymod(values: impl IntoIterator<Item = u8>) -> u64 {
    const GENERATORS: [u64; 5] = [
        0x98_f2bc_8e61,
        0x79_b76d_99e2,
        0xf3_3e5f_b3c4,
        0xae_2eab_e2a8,
        0x1e_4f43_e470,
    ];

    let mut checksum: u64 = 1;
    for value in values {
        let top = checksum >> 35;
        checksum = ((checksum & 0x07_ffff_ffff) << 5) ^ u64::from(value);
        for (bit, generator) in GENERATORS.iter().enumerate() {
            if (top >> bit) & 1 == 1 {
                checksum ^= generator;
            }
        }
    }
    checksum ^ 1
}

fn prefix_values(prefix: &str) -> impl Iterator<Item = u8> + '_ {
    prefix.bytes().map(|b| b & 0x1F).chain(std::iter::once(0))
}

/// Encode a 20-byte hash as a CashAddr address with its prefix
pub fn encode_cashaddr(prefix: &str, kind: CashAddrKind, hash: &[u8; 20]) -> String {
    let mut payload = vec![kind.version_byte()];
    payload.extend_from_slice(hash);
    let data: Vec<u8> = payload.to_base32().into_iter().map(u5::to_u8).collect();

    let checksum = polymod(
        prefix_values(prefix)
            .chain(data.iter().copied())
            .chain([0; CHECKSUM_LENGTH]),
    );

    let mut address = format!("{prefix}:");
    address.extend(data.iter().map(|v| char::from(CHARSET[usize::from(*v)])));
    address.extend(
        (0..CHECKSUM_LENGTH)
            .map(|i| ((checksum >> (5 * (CHECKSUM_LENGTH - 1 - i))) & 0x1F) as usize)
            .map(|v| char::from(CHARSET[v])),
    );
    address
}

/// Decode a CashAddr address, with or without its prefix
pub fn decode_cashaddr(address: &str) -> Result<(CashAddrKind, [u8; 20])> {
    let invalid = |reason| Error::invalid_address(address, reason);

    if address != address.to_ascii_lowercase() && address != address.to_ascii_uppercase() {
        return Err(invalid("mixed case"));
    }
    let lower = address.to_ascii_lowercase();
    let (prefix, payload) = lower.split_once(':').unwrap_or((MAINNET_PREFIX, lower.as_str()));
    if !KNOWN_PREFIXES.contains(&prefix) {
        return Err(invalid("unknown network prefix"));
    }

    let values = payload
        .bytes()
        .map(|c| CHARSET.iter().position(|x| *x == c).map(|p| p as u8))
        .collect::<Option<Vec<u8>>>()
        .ok_or(invalid("character outside the CashAddr alphabet"))?;
    if values.len() <= CHECKSUM_LENGTH {
        return Err(invalid("too short"));
    }
    if polymod(prefix_values(prefix).chain(values.iter().copied())) != 0 {
        return Err(invalid("bad checksum"));
    }

    let data = values[..values.len() - CHECKSUM_LENGTH]
        .iter()
        .map(|v| u5::try_from_u8(*v))
        .collect::<std::result::Result<Vec<_>, _>>()
        .map_err(|_| invalid("bad payload"))?;
    let payload = Vec::<u8>::from_base32(&data).map_err(|_| invalid("bad payload padding"))?;

    let Some((version, hash)) = payload.split_first() else {
        return Err(invalid("empty payload"));
    };
    let kind = match version & 0x78 {
        0x00 => CashAddrKind::P2pkh,
        0x08 => CashAddrKind::P2sh,
        _ => return Err(invalid("unknown address type")),
    };
    let hash: [u8; 20] = hash
        .try_into()
        .map_err(|_| invalid("only 160-bit hashes are supported"))?;
    if version & 0x07 != 0 {
        return Err(invalid("only 160-bit hashes are supported"));
    }
    Ok((kind, hash))
}

/// Locking script paying to a CashAddr or legacy Base58 address
pub(crate) fn script_for_address(address: &str) -> Result<Vec<u8>> {
    let lower = address.to_ascii_lowercase();
    let cashaddr = lower.contains(':') || lower.starts_with('q') || lower.starts_with('p');
    if !cashaddr {
        return base58_script(address);
    }

    let (kind, hash) = decode_cashaddr(address)?;
    Ok(match kind {
        CashAddrKind::P2pkh => p2pkh_script(&hash),
        CashAddrKind::P2sh => p2sh_script(&hash),
    })
}

/// Fork-id signing preimage of input `index`
///
/// Laid out as in BIP143: version, `hashPrevouts`, `hashSequence`, the outpoint, the spent
/// script and value, the sequence, `hashOutputs`, lock time and the hash type.
pub(crate) fn forkid_preimage(tx: &UtxoTransaction, index: usize) -> Vec<u8> {
    let mut prevouts = Vec::with_capacity(tx.inputs.len() * 36);
    let mut sequences = Vec::with_capacity(tx.inputs.len() * 4);
    for input in &tx.inputs {
        input.write_outpoint(&mut prevouts);
        sequences.extend_from_slice(&input.sequence.to_le_bytes());
    }
    let mut outputs = Vec::new();
    for output in &tx.outputs {
        output.write(&mut outputs);
    }

    let input = &tx.inputs[index];
    let mut preimage = Vec::with_capacity(156 + input.script_pubkey.len() + 9);
    preimage.extend_from_slice(&tx.version.to_le_bytes());
    preimage.extend_from_slice(&sha256d(&prevouts));
    preimage.extend_from_slice(&sha256d(&sequences));
    input.write_outpoint(&mut preimage);
    write_script(&mut preimage, &input.script_pubkey);
    preimage.extend_from_slice(&input.value.to_le_bytes());
    preimage.extend_from_slice(&input.sequence.to_le_bytes());
    preimage.extend_from_slice(&sha256d(&outputs));
    preimage.extend_from_slice(&tx.lock_time.to_le_bytes());
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
        version: 2,
        inputs,
        outputs,
        lock_time: 0,
        sighash_type: SIGHASH_ALL_FORKID,
        public_key: wallet.public_key.0.clone(),
    };

    let preimages: Vec<Vec<u8>> = (0..tx.inputs.len())
        .map(|i| forkid_preimage(&tx, i))
        .collect();
    Ok(unsigned(ChainFamily::BitcoinCash, tx, preimages, key, intent.total()?))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chains::utxo::{SEQUENCE_FINAL, SIGHASH_ALL, TxInput, TxOutput};
    use hex_literal::hex;

    const HASH: [u8; 20] = hex!("76a04053bda0a88bda5177b86a15c3b29f559873");

    #[test]
    fn test_cashaddr_vector() {
        let address = "bitcoincash:qpm2qsznhks23z7629mms6s4cwef74vcwvy22gdx6a";
        assert_eq!(encode_cashaddr("bitcoincash", CashAddrKind::P2pkh, &HASH), address);
        assert_eq!(decode_cashaddr(address).unwrap(), (CashAddrKind::P2pkh, HASH));
        assert_eq!(
            decode_cashaddr("qpm2qsznhks23z7629mms6s4cwef74vcwvy22gdx6a").unwrap(),
            (CashAddrKind::P2pkh, HASH)
        );
        assert_eq!(
            decode_cashaddr(&address.to_ascii_uppercase()).unwrap(),
            (CashAddrKind::P2pkh, HASH)
        );
    }

    #[test]
    fn test_cashaddr_rejections() {
        assert!(decode_cashaddr("bitcoincash:qpm2qsznhks23z7629mms6s4cwef74vcwvy22gdx6b").is_err());
        assert!(decode_cashaddr("bitcoincash:Qpm2qsznhks23z7629mms6s4cwef74vcwvy22gdx6a").is_err());
        assert!(decode_cashaddr("litecoin:qpm2qsznhks23z7629mms6s4cwef74vcwvy22gdx6a").is_err());

        let p2sh = encode_cashaddr("bchtest", CashAddrKind::P2sh, &HASH);
        assert!(p2sh.starts_with("bchtest:p"));
        assert_eq!(
            script_for_address(&p2sh).unwrap(),
            [&hex!("a914")[..], &HASH, &hex!("87")].concat()
        );
    }

    /// The native P2WPKH example of BIP143, second input
    fn bip143_transaction(sighash_type: u8) -> UtxoTransaction {
        UtxoTransaction {
            version: 1,
            inputs: vec![
                TxInput {
                    txid: hex!("fff7f7881a8099afa6940d42d1e7f6362bec38171ea3edf433541db4e4ad969f"),
                    vout: 0,
                    value: 625_000_000,
                    script_pubkey: hex!("2103c9f4836b9a4f77fc0d81f7bcb01b7f1b35916864b9476c241ce9fc198bd25432ac").to_vec(),
                    sequence: 0xFFFF_FFEE,
                },
                TxInput {
                    txid: hex!("ef51e1b804cc89d182d279655c3aa89e815b1b309fe287d9b2b55d57b90ec68a"),
                    vout: 1,
                    value: 600_000_000,
                    script_pubkey: hex!("76a9141d0f172a0ecb48aee1be1f2687d2963ae33f71a188ac").to_vec(),
                    sequence: SEQUENCE_FINAL,
                },
            ],
            outputs: vec![
                TxOutput {
                    value: 112_340_000,
                    script_pubkey: hex!("76a9148280b37df378db99f66f85c95a783a76ac7a6d5988ac").to_vec(),
                },
                TxOutput {
                    value: 223_450_000,
                    script_pubkey: hex!("76a9143bde42dbee7e4dbe6a21b2d50ce2f0167faa815988ac").to_vec(),
                },
            ],
            lock_time: 17,
            sighash_type,
            public_key: Vec::new(),
        }
    }

    #[test]
    fn test_bip143_p2wpkh_vector() {
        let preimage = forkid_preimage(&bip143_transaction(SIGHASH_ALL), 1);

        assert_eq!(
            &preimage[4..36],
            &hex!("96b827c8483d4e9b96712b6713a7b68d6e8003a781feba36c31143470b4efd37")
        );
        assert_eq!(
            &preimage[36..68],
            &hex!("52b0a642eea2fb7ae638c36f6252b6750293dbe574a806984b8e4d8548339a3b")
        );
        assert_eq!(
            &preimage[preimage.len() - 40..preimage.len() - 8],
            &hex!("863ef3e1a92afbfdb97f31ad0fc7683ee943e9abcf2501590ff8f6551f47e5e5")
        );
        assert_eq!(
            sha256d(&preimage),
            hex!("c37af31116d1b27caf68aae9e3ac82f1477929014d5b917657d0eb49478cb670")
        );
    }

    #[test]
    fn test_forkid_vector() {
        // BCH mainnet signs the same preimage with fork id 0 in the hash type
        let preimage = forkid_preimage(&bip143_transaction(SIGHASH_ALL_FORKID), 1);

        assert_eq!(&preimage[preimage.len() - 4..], &hex!("41000000"));
        assert_eq!(
            sha256d(&preimage),
            hex!("467f411d178762db122a6aced76370a1c8324355bf0796502bf82eeaeda86a35")
        );
    }

    #[test]
    fn test_forkid_preimage_layout_is_reproducible() {
        let tx = UtxoTransaction {
            version: 2,
            inputs: vec![
                TxInput {
                    txid: [1; 32],
                    vout: 1,
                    value: 60_000,
                    script_pubkey: p2pkh_script(&HASH),
                    sequence: SEQUENCE_FINAL,
                },
                TxInput {
                    txid: [2; 32],
                    vout: 0,
                    value: 40_000,
                    script_pubkey: p2pkh_script(&HASH),
                    sequence: SEQUENCE_FINAL,
                },
            ],
            outputs: vec![TxOutput {
                value: 99_000,
                script_pubkey: p2pkh_script(&HASH),
            }],
            lock_time: 0,
            sighash_type: SIGHASH_ALL_FORKID,
            public_key: vec![2; 33],
        };

        let preimage = forkid_preimage(&tx, 1);
        assert_eq!(preimage, forkid_preimage(&tx, 1));
        assert_eq!(preimage.len(), 4 + 32 + 32 + 36 + 26 + 8 + 4 + 32 + 4 + 4);
        assert_eq!(&preimage[preimage.len() - 4..], &hex!("41000000"));

        let mut prevouts = Vec::new();
        tx.inputs.iter().for_each(|i| i.write_outpoint(&mut prevouts));
        assert_eq!(&preimage[4..36], &sha256d(&prevouts));
        assert_eq!(&preimage[68..100], &[2u8; 32]);
        assert_eq!(&preimage[130..138], &40_000u64.to_le_bytes());

        // inputs share everything but the outpoint, script and value
        let other = forkid_preimage(&tx, 0);
        assert_eq!(&other[..68], &preimage[..68]);
        assert_ne!(other, preimage);
    }
}
