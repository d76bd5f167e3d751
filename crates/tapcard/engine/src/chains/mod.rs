//! One module per chain family

pub(crate) mod binance;
pub(crate) mod bch;
pub(crate) mod btc;
pub(crate) mod eos;
pub(crate) mod evm;
pub(crate) mod utxo;
pub(crate) mod xrp;

use k256::ecdsa::VerifyingKey;
use sha2::{Digest, Sha256};

pub(crate) fn sha256(data: &[u8]) -> [u8; 32] {
    Sha256::digest(data).into()
}

pub(crate) fn sha256d(data: &[u8]) -> [u8; 32] {
    Sha256::digest(Sha256::digest(data)).into()
}

/// 33-byte SEC1 encoding of a wallet key
pub(crate) fn compressed_key(key: &VerifyingKey) -> Vec<u8> {
    key.to_encoded_point(true).as_bytes().to_vec()
}

/// Protobuf style unsigned varint, as used by amino and EOS `varuint32`
pub(crate) fn write_uvarint(buf: &mut Vec<u8>, mut value: u64) {
    while value >= 0x80 {
        buf.push((value as u8 & 0x7F) | 0x80);
        value >>= 7;
    }
    buf.push(value as u8);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_uvarint() {
        let mut buf = Vec::new();
        write_uvarint(&mut buf, 0);
        write_uvarint(&mut buf, 127);
        write_uvarint(&mut buf, 300);
        assert_eq!(buf, [0x00, 0x7F, 0xAC, 0x02]);
    }
}
