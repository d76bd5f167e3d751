//! Transaction structure, coin selection and assembly shared by Bitcoin and Bitcoin Cash

use alloy_primitives::U256;
use nexum_tapcard::RawSignature;
use tracing::debug;

use super::sha256d;
use crate::amount::to_u64;
use crate::signature::{bind, expect_count};
use crate::transaction::UnsignedTransaction;
use crate::wallet::{Outpoint, TransferIntent, WalletState};
use crate::{Error, MAX_INPUTS, Result, SignedTransaction};

/// Sequence number of every input
pub const SEQUENCE_FINAL: u32 = 0xFFFF_FFFF;
/// `SIGHASH_ALL`
pub const SIGHASH_ALL: u8 = 0x01;
/// `SIGHASH_ALL | SIGHASH_FORKID`
pub const SIGHASH_ALL_FORKID: u8 = 0x41;

/// Spent output
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TxInput {
    /// Previous transaction id, internal byte order
    pub txid: [u8; 32],
    /// Previous output index
    pub vout: u32,
    /// Value of the previous output
    pub value: u64,
    /// Locking script of the previous output
    pub script_pubkey: Vec<u8>,
    /// Sequence number
    pub sequence: u32,
}

impl TxInput {
    /// Spent output in wallet terms, txid in display order
    pub fn outpoint(&self) -> Outpoint {
        let mut txid = self.txid;
        txid.reverse();
        Outpoint {
            txid: hex::encode(txid),
            vout: self.vout,
        }
    }

    pub(crate) fn write_outpoint(&self, buf: &mut Vec<u8>) {
        buf.extend_from_slice(&self.txid);
        buf.extend_from_slice(&self.vout.to_le_bytes());
    }
}

/// Created output
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TxOutput {
    /// Value in satoshi
    pub value: u64,
    /// Locking script
    pub script_pubkey: Vec<u8>,
}

impl TxOutput {
    pub(crate) fn write(&self, buf: &mut Vec<u8>) {
        buf.extend_from_slice(&self.value.to_le_bytes());
        write_script(buf, &self.script_pubkey);
    }
}

/// Unsigned Bitcoin style transaction
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UtxoTransaction {
    /// Transaction version
    pub version: u32,
    /// Selected inputs, in signing order
    pub inputs: Vec<TxInput>,
    /// Destination output, then change when there is any
    pub outputs: Vec<TxOutput>,
    /// Lock time
    pub lock_time: u32,
    /// Hash type appended to every signature
    pub sighash_type: u8,
    /// Wallet key pushed in every scriptSig, as the wallet address commits to it
    pub public_key: Vec<u8>,
}

impl UtxoTransaction {
    /// Serialize with the given scriptSig for each input
    pub(crate) fn encode(&self, script_sigs: &[Vec<u8>]) -> Vec<u8> {
        let mut buf = Vec::with_capacity(10 + self.inputs.len() * 180 + self.outputs.len() * 34);
        buf.extend_from_slice(&self.version.to_le_bytes());
        write_compact_size(&mut buf, self.inputs.len() as u64);
        for (input, script) in self.inputs.iter().zip(script_sigs) {
            input.write_outpoint(&mut buf);
            write_script(&mut buf, script);
            buf.extend_from_slice(&input.sequence.to_le_bytes());
        }
        write_compact_size(&mut buf, self.outputs.len() as u64);
        for output in &self.outputs {
            output.write(&mut buf);
        }
        buf.extend_from_slice(&self.lock_time.to_le_bytes());
        buf
    }

    /// Transaction id of a serialized transaction, display byte order
    pub(crate) fn txid(raw: &[u8]) -> String {
        let mut hash = sha256d(raw);
        hash.reverse();
        hex::encode(hash)
    }
}

/// Bitcoin `CompactSize` length prefix
pub(crate) fn write_compact_size(buf: &mut Vec<u8>, n: u64) {
    match n {
        0..=0xFC => buf.push(n as u8),
        0xFD..=0xFFFF => {
            buf.push(0xFD);
            buf.extend_from_slice(&(n as u16).to_le_bytes());
        }
        0x1_0000..=0xFFFF_FFFF => {
            buf.push(0xFE);
            buf.extend_from_slice(&(n as u32).to_le_bytes());
        }
        _ => {
            buf.push(0xFF);
            buf.extend_from_slice(&n.to_le_bytes());
        }
    }
}

pub(crate) fn write_script(buf: &mut Vec<u8>, script: &[u8]) {
    write_compact_size(buf, script.len() as u64);
    buf.extend_from_slice(script);
}

/// Script opcode pushing `data` onto the stack
pub(crate) fn push_data(script: &mut Vec<u8>, data: &[u8]) {
    match data.len() {
        len @ 0..=0x4B => script.push(len as u8),
        len @ 0x4C..=0xFF => {
            script.push(0x4C);
            script.push(len as u8);
        }
        len => {
            script.push(0x4D);
            script.extend_from_slice(&(len as u16).to_le_bytes());
        }
    }
    script.extend_from_slice(data);
}

/// Pick inputs largest first until they cover amount and fee, and lay out the outputs
///
/// The change output pays back to `change_script` and is left out when there is no change.
pub(crate) fn select(
    wallet: &WalletState,
    intent: &TransferIntent,
    destination_script: Vec<u8>,
    change_script: Vec<u8>,
) -> Result<(Vec<TxInput>, Vec<TxOutput>)> {
    let amount = to_u64(intent.amount)?;
    let need = to_u64(intent.total()?)?;

    let mut candidates: Vec<_> = wallet.utxos.iter().collect();
    candidates.sort_by(|a, b| b.value.cmp(&a.value));

    let mut total = 0u64;
    let mut picked = Vec::new();
    for utxo in candidates {
        if total >= need {
            break;
        }
        total = total.checked_add(utxo.value).ok_or(Error::AmountOverflow)?;
        picked.push(utxo);
    }

    if total < need {
        return Err(Error::InsufficientFunds {
            have: U256::from(total),
            need: U256::from(need),
        });
    }
    if picked.len() > MAX_INPUTS {
        return Err(Error::TooManyInputs(picked.len()));
    }

    let inputs = picked
        .into_iter()
        .map(|utxo| {
            let mut txid: [u8; 32] = hex::decode(&utxo.txid)
                .ok()
                .and_then(|bytes| bytes.try_into().ok())
                .ok_or(Error::InvalidWalletState("unspent output txid is not 32 hex bytes"))?;
            txid.reverse();
            Ok(TxInput {
                txid,
                vout: utxo.vout,
                value: utxo.value,
                script_pubkey: utxo.script_pubkey.0.clone(),
                sequence: SEQUENCE_FINAL,
            })
        })
        .collect::<Result<Vec<_>>>()?;

    let mut outputs = vec![TxOutput {
        value: amount,
        script_pubkey: destination_script,
    }];
    let change = total - need;
    if change > 0 {
        outputs.push(TxOutput {
            value: change,
            script_pubkey: change_script,
        });
    }

    debug!(
        inputs = inputs.len(),
        selected = total,
        change,
        "Selected unspent outputs"
    );
    Ok((inputs, outputs))
}

/// Attach one DER signature per input and serialize
pub(crate) fn assemble(
    unsigned: &UnsignedTransaction,
    tx: &UtxoTransaction,
    signatures: &[RawSignature],
) -> Result<SignedTransaction> {
    expect_count(signatures, tx.inputs.len())?;

    let script_sigs = unsigned
        .digests
        .iter()
        .zip(signatures)
        .map(|(digest, raw)| {
            let (signature, _) = bind(&unsigned.public_key, digest, raw)?;
            let mut der = signature.to_der().as_bytes().to_vec();
            der.push(tx.sighash_type);

            let mut script = Vec::with_capacity(der.len() + tx.public_key.len() + 2);
            push_data(&mut script, &der);
            push_data(&mut script, &tx.public_key);
            Ok(script)
        })
        .collect::<Result<Vec<_>>>()?;

    let raw = tx.encode(&script_sigs);
    let id = UtxoTransaction::txid(&raw);
    Ok(SignedTransaction {
        family: unsigned.family,
        payload: hex::encode(&raw),
        debit: unsigned.debit(&id),
        id,
        raw,
    })
}
