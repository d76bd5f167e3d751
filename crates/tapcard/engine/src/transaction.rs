//! Unsigned and signed transactions shared by all chain families

use alloy_consensus::TxLegacy;
use alloy_primitives::U256;
use k256::ecdsa::VerifyingKey;
use nexum_tapcard::HexBytes;
use nexum_tapcard::tasks::RawSignRequest;
use serde::{Deserialize, Serialize};

use crate::ChainFamily;
use crate::chains::evm::token_debit;
use crate::wallet::{Utxo, WalletDebit};
use crate::chains::{binance::BinanceSend, eos::EosTransfer, utxo::UtxoTransaction, xrp::Payment};

/// Chain specific content of an unsigned transaction
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UnsignedBody {
    /// Legacy EIP-155 transaction
    Evm(TxLegacy),
    /// Bitcoin or Bitcoin Cash transaction
    Utxo(UtxoTransaction),
    /// Ripple payment
    Ripple(Payment),
    /// Packed EOS transfer
    Eos(EosTransfer),
    /// Binance send message
    Binance(BinanceSend),
}

/// A transaction waiting for card signatures
///
/// Carries everything `assemble_signed` needs; building one reserves nothing on the wallet.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnsignedTransaction {
    pub(crate) family: ChainFamily,
    pub(crate) digests: Vec<[u8; 32]>,
    pub(crate) raw: Option<RawSignRequest>,
    pub(crate) public_key: VerifyingKey,
    /// Native value leaving the wallet, fee included
    pub(crate) outgoing: U256,
    pub(crate) body: UnsignedBody,
}

impl UnsignedTransaction {
    /// Chain family
    pub const fn family(&self) -> ChainFamily {
        self.family
    }

    /// Digests the card must sign, in order
    pub fn digests(&self) -> &[[u8; 32]] {
        &self.digests
    }

    /// Digests as owned byte vectors, ready for a signing request
    pub fn digest_payloads(&self) -> Vec<Vec<u8>> {
        self.digests.iter().map(|d| d.to_vec()).collect()
    }

    /// Raw payload for cards that hash on card, when the chain's hash is one the card knows
    pub const fn raw_request(&self) -> Option<&RawSignRequest> {
        self.raw.as_ref()
    }

    /// Wallet key the signatures must verify against
    pub const fn public_key(&self) -> &VerifyingKey {
        &self.public_key
    }

    /// Chain specific content
    pub const fn body(&self) -> &UnsignedBody {
        &self.body
    }

    /// Native value leaving the wallet once this transaction is accepted, fee included
    pub const fn outgoing(&self) -> U256 {
        self.outgoing
    }

    /// Wallet effect of this transaction, once signed under `id`
    pub(crate) fn debit(&self, id: &str) -> WalletDebit {
        let tx = match &self.body {
            UnsignedBody::Utxo(tx) => tx,
            UnsignedBody::Evm(tx) => {
                return WalletDebit {
                    token: token_debit(tx),
                    ..WalletDebit::new(self.outgoing)
                };
            }
            _ => return WalletDebit::new(self.outgoing),
        };
        // select() puts the change, when there is any, right after the destination output
        let change = tx.outputs.get(1).map(|output| Utxo {
            txid: id.to_owned(),
            vout: 1,
            value: output.value,
            script_pubkey: HexBytes(output.script_pubkey.clone()),
        });
        WalletDebit {
            value: self.outgoing,
            spent: tx.inputs.iter().map(|input| input.outpoint()).collect(),
            change,
            token: None,
        }
    }

    /// Number of signatures `assemble_signed` expects
    pub fn signatures_needed(&self) -> usize {
        if matches!(self.body, UnsignedBody::Eos(_)) {
            // Any one canonical signature out of the copies will do.
            1
        } else {
            self.digests.len()
        }
    }
}

/// A transaction ready to broadcast
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignedTransaction {
    /// Chain family
    pub family: ChainFamily,
    /// Wire encoding
    #[serde(with = "hex::serde")]
    pub raw: Vec<u8>,
    /// What a backend submits: hex for most chains, a JSON envelope for EOS
    pub payload: String,
    /// Network visible transaction id
    pub id: String,
    /// What the wallet loses once the network accepts this transaction
    #[serde(default)]
    pub debit: WalletDebit,
}
