//! Binance Chain transfers: JSON sign doc, amino encoded `StdTx`

use bech32::{FromBase32, Variant};
use k256::ecdsa::VerifyingKey;
use nexum_tapcard::tasks::RawSignRequest;
use nexum_tapcard::{HashAlgorithm, RawSignature};
use serde::Serialize;

use super::{compressed_key, sha256, write_uvarint};
use crate::amount::to_u64;
use crate::signature::{bind, expect_count};
use crate::transaction::{UnsignedBody, UnsignedTransaction};
use crate::wallet::{ChainReference, TransferIntent, WalletState, ensure_funds};
use crate::{ChainFamily, Error, Result, SignedTransaction};

const STD_TX_PREFIX: [u8; 4] = [0xF0, 0x62, 0x5D, 0xEE];
const MSG_SEND_PREFIX: [u8; 4] = [0x2A, 0x2C, 0x87, 0xFA];
const PUB_KEY_SECP256K1_PREFIX: [u8; 4] = [0xEB, 0x5A, 0xE9, 0x87];
const DENOM: &str = "BNB";
const SOURCE: u64 = 0;

/// Unsigned single-coin transfer
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BinanceSend {
    /// Sender address bytes
    pub from: [u8; 20],
    /// Recipient address bytes
    pub to: [u8; 20],
    /// Amount of BNB, 8 decimals
    pub amount: i64,
    /// Memo
    pub memo: String,
    /// Account number
    pub account_number: u64,
    /// Account sequence
    pub sequence: u64,
    /// Compressed wallet key
    pub public_key: Vec<u8>,
    /// Canonical JSON the digest is taken over
    pub sign_doc: Vec<u8>,
}

// Field order below is alphabetical, which is the canonical order of the sign doc.
#[derive(Serialize)]
struct SignDoc<'a> {
    account_number: String,
    chain_id: &'a str,
    data: Option<()>,
    memo: &'a str,
    msgs: [SendDoc<'a>; 1],
    sequence: String,
    source: String,
}

#[derive(Serialize)]
struct SendDoc<'a> {
    inputs: [IoDoc<'a>; 1],
    outputs: [IoDoc<'a>; 1],
}

#[derive(Serialize)]
struct IoDoc<'a> {
    address: &'a str,
    coins: [CoinDoc; 1],
}

#[derive(Serialize)]
struct CoinDoc {
    amount: i64,
    denom: &'static str,
}

/// Address bytes and human readable prefix of a `bnb1...` or `tbnb1...` address
pub(crate) fn decode_address(address: &str) -> Result<(String, [u8; 20])> {
    let (hrp, data, variant) = bech32::decode(address)
        .map_err(|_| Error::invalid_address(address, "bad bech32 encoding"))?;
    if hrp != "bnb" && hrp != "tbnb" {
        return Err(Error::invalid_address(address, "unknown network prefix"));
    }
    if variant != Variant::Bech32 {
        return Err(Error::invalid_address(address, "bech32m is not used on this chain"));
    }
    let bytes = Vec::<u8>::from_base32(&data)
        .map_err(|_| Error::invalid_address(address, "bad payload padding"))?;
    let bytes = bytes
        .try_into()
        .map_err(|_| Error::invalid_address(address, "address is not 20 bytes"))?;
    Ok((hrp, bytes))
}

fn put_bytes(buf: &mut Vec<u8>, field: u8, value: &[u8]) {
    buf.push((field << 3) | 2);
    write_uvarint(buf, value.len() as u64);
    buf.extend_from_slice(value);
}

fn put_varint(buf: &mut Vec<u8>, field: u8, value: u64) {
    if value == 0 {
        return;
    }
    buf.push(field << 3);
    write_uvarint(buf, value);
}

fn encode_io(address: &[u8; 20], amount: i64) -> Vec<u8> {
    let mut coin = Vec::with_capacity(16);
    put_bytes(&mut coin, 1, DENOM.as_bytes());
    put_varint(&mut coin, 2, amount as u64);

    let mut io = Vec::with_capacity(48);
    put_bytes(&mut io, 1, address);
    put_bytes(&mut io, 2, &coin);
    io
}

impl BinanceSend {
    fn encode_msg(&self) -> Vec<u8> {
        let mut msg = MSG_SEND_PREFIX.to_vec();
        put_bytes(&mut msg, 1, &encode_io(&self.from, self.amount));
        put_bytes(&mut msg, 2, &encode_io(&self.to, self.amount));
        msg
    }

    /// Amino `StdTx`, without the outer length prefix
    pub(crate) fn encode_std_tx(&self, signature: &[u8; 64]) -> Vec<u8> {
        let mut pub_key = PUB_KEY_SECP256K1_PREFIX.to_vec();
        pub_key.push(self.public_key.len() as u8);
        pub_key.extend_from_slice(&self.public_key);

        let mut std_signature = Vec::with_capacity(128);
        put_bytes(&mut std_signature, 1, &pub_key);
        put_bytes(&mut std_signature, 2, signature);
        put_varint(&mut std_signature, 3, self.account_number);
        put_varint(&mut std_signature, 4, self.sequence);

        let mut tx = STD_TX_PREFIX.to_vec();
        put_bytes(&mut tx, 1, &self.encode_msg());
        put_bytes(&mut tx, 2, &std_signature);
        if !self.memo.is_empty() {
            put_bytes(&mut tx, 3, self.memo.as_bytes());
        }
        put_varint(&mut tx, 4, SOURCE);
        tx
    }
}

pub(crate) fn build(
    wallet: &WalletState,
    intent: &TransferIntent,
    key: VerifyingKey,
) -> Result<UnsignedTransaction> {
    let ChainReference::Binance { chain_id } = &wallet.reference else {
        return Err(Error::MissingReference("Binance chain id"));
    };

    let (from_hrp, from) = decode_address(&wallet.address)?;
    let (to_hrp, to) = decode_address(&intent.destination)?;
    if from_hrp != to_hrp {
        return Err(Error::invalid_address(
            &intent.destination,
            "destination is on another network",
        ));
    }
    let amount = i64::try_from(to_u64(intent.amount)?).map_err(|_| Error::AmountOverflow)?;
    ensure_funds(wallet, intent)?;

    let memo = intent.memo.clone().unwrap_or_default();
    let destination = intent.destination.to_ascii_lowercase();
    let doc = SignDoc {
        account_number: wallet.account_number.to_string(),
        chain_id,
        data: None,
        memo: &memo,
        msgs: [SendDoc {
            inputs: [IoDoc {
                address: &wallet.address,
                coins: [CoinDoc {
                    amount,
                    denom: DENOM,
                }],
            }],
            outputs: [IoDoc {
                address: &destination,
                coins: [CoinDoc {
                    amount,
                    denom: DENOM,
                }],
            }],
        }],
        sequence: wallet.nonce.to_string(),
        source: SOURCE.to_string(),
    };
    let sign_doc = serde_json::to_vec(&doc)?;

    let send = BinanceSend {
        from,
        to,
        amount,
        memo,
        account_number: wallet.account_number,
        sequence: wallet.nonce,
        public_key: compressed_key(&key),
        sign_doc: sign_doc.clone(),
    };

    Ok(UnsignedTransaction {
        family: ChainFamily::Binance,
        digests: vec![sha256(&sign_doc)],
        raw: Some(RawSignRequest {
            payload: sign_doc,
            algorithm: HashAlgorithm::Sha256,
        }),
        public_key: key,
        outgoing: intent.total()?,
        body: UnsignedBody::Binance(send),
    })
}

pub(crate) fn assemble(
    unsigned: &UnsignedTransaction,
    send: &BinanceSend,
    signatures: &[RawSignature],
) -> Result<SignedTransaction> {
    expect_count(signatures, 1)?;
    let (signature, _) = bind(&unsigned.public_key, &unsigned.digests[0], &signatures[0])?;
    let mut compact = [0u8; 64];
    compact.copy_from_slice(&signature.to_bytes());

    let std_tx = send.encode_std_tx(&compact);
    let mut raw = Vec::with_capacity(std_tx.len() + 3);
    write_uvarint(&mut raw, std_tx.len() as u64);
    raw.extend_from_slice(&std_tx);
    // the hash covers the broadcast bytes, length prefix included
    let id = hex::encode_upper(sha256(&raw));

    Ok(SignedTransaction {
        family: ChainFamily::Binance,
        payload: hex::encode(&raw),
        debit: unsigned.debit(&id),
        raw,
        id,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use bech32::ToBase32;

    fn address(hrp: &str, byte: u8) -> String {
        bech32::encode(hrp, [byte; 20].to_base32(), Variant::Bech32).unwrap()
    }

    #[test]
    fn test_decode_address() {
        let encoded = address("bnb", 7);
        assert_eq!(decode_address(&encoded).unwrap(), ("bnb".to_string(), [7; 20]));
        assert!(decode_address(&address("cosmos", 7)).is_err());

        let bech32m = bech32::encode("bnb", [7u8; 20].to_base32(), Variant::Bech32m).unwrap();
        assert!(matches!(
            decode_address(&bech32m),
            Err(Error::InvalidAddress { .. })
        ));
    }

    #[test]
    fn test_std_tx_layout() {
        let send = BinanceSend {
            from: [1; 20],
            to: [2; 20],
            amount: 100_000_000,
            memo: String::new(),
            account_number: 5,
            sequence: 0,
            public_key: vec![0x02; 33],
            sign_doc: Vec::new(),
        };
        let tx = send.encode_std_tx(&[0xAB; 64]);

        assert_eq!(&tx[..4], &STD_TX_PREFIX);
        assert_eq!(tx[4], 0x0A);
        let msg_len = tx[5] as usize;
        assert_eq!(&tx[6..10], &MSG_SEND_PREFIX);
        assert_eq!(tx[10], 0x0A);

        let signature = &tx[6 + msg_len..];
        assert_eq!(signature[0], 0x12);
        // StdSignature: pub key record, signature record, account number, no zero sequence
        assert_eq!(&signature[2..4], &[0x0A, 38]);
        assert_eq!(&signature[4..9], &[0xEB, 0x5A, 0xE9, 0x87, 0x21]);
        assert_eq!(&signature[42..44], &[0x12, 64]);
        assert_eq!(&signature[108..], &[0x18, 5]);
    }
}
