//! Transaction engines for card signed transfers
//!
//! An [`Engine`] turns a [`WalletState`] and a [`TransferIntent`] into the digests a card signs,
//! then turns the card's raw `r || s` signatures into a transaction ready to broadcast. One
//! module per [`ChainFamily`] holds the chain specific encoding.
#![cfg_attr(not(test), warn(unused_crate_dependencies))]
#![forbid(unsafe_code)]

mod amount;
mod chain;
mod chains;
mod engine;
mod error;
mod signature;
mod transaction;
mod wallet;

pub use amount::{format_amount, parse_amount};
pub use chain::ChainFamily;
pub use chains::bch::{CashAddrKind, decode_cashaddr, encode_cashaddr};
pub use chains::binance::BinanceSend;
pub use chains::eos::{EosTransfer, SIGNATURE_ATTEMPTS};
pub use chains::evm::{TRANSFER_SELECTOR, transfer_call};
pub use chains::utxo::{TxInput, TxOutput, UtxoTransaction};
pub use chains::xrp::Payment;
pub use engine::{Engine, PendingSignature, SignatureSlot};
pub use error::{Error, Result};
pub use transaction::{SignedTransaction, UnsignedBody, UnsignedTransaction};
pub use wallet::{
    ChainReference, Outpoint, TokenDebit, TransferIntent, Utxo, WalletDebit, WalletState,
};

/// Most inputs one transaction may spend, as all digests go into one card request
pub const MAX_INPUTS: usize = 10;
