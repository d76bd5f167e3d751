//! Host-side wallet state and transfer intents

use std::collections::BTreeMap;

use alloy_primitives::U256;
use nexum_tapcard::HexBytes;
use serde::{Deserialize, Serialize};

use crate::ChainFamily;

/// Known state of one wallet on one chain
///
/// Owned by the host and refreshed after reads or broadcasts. Never shared across chains.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WalletState {
    /// Chain family of the wallet
    pub family: ChainFamily,
    /// Address derived from the wallet key
    pub address: String,
    /// Wallet public key as read from the card
    pub public_key: HexBytes,
    /// Last known confirmed balance, smallest unit
    pub balance: U256,
    /// Confirmed transaction count, used as nonce or sequence
    pub nonce: u64,
    /// Transactions seen but not yet confirmed
    pub unconfirmed: u64,
    /// Unspent outputs, UTXO chains only
    #[serde(default)]
    pub utxos: Vec<Utxo>,
    /// Account number, Binance only
    #[serde(default)]
    pub account_number: u64,
    /// Chain reference data
    #[serde(default)]
    pub reference: ChainReference,
    /// ERC-20 balances keyed by lowercase contract address, EVM only
    #[serde(default)]
    pub tokens: BTreeMap<String, U256>,
}

impl WalletState {
    /// Empty state for a freshly read wallet
    pub fn new(family: ChainFamily, address: impl Into<String>, public_key: HexBytes) -> Self {
        Self {
            family,
            address: address.into(),
            public_key,
            balance: U256::ZERO,
            nonce: 0,
            unconfirmed: 0,
            utxos: Vec::new(),
            account_number: 0,
            reference: ChainReference::None,
            tokens: BTreeMap::new(),
        }
    }

    /// Set the balance
    pub const fn with_balance(mut self, balance: U256) -> Self {
        self.balance = balance;
        self
    }

    /// Set the nonce or sequence
    pub const fn with_nonce(mut self, nonce: u64) -> Self {
        self.nonce = nonce;
        self
    }

    /// Set the unspent outputs, and the balance to their sum
    pub fn with_utxos(mut self, utxos: Vec<Utxo>) -> Self {
        self.balance = utxos
            .iter()
            .fold(U256::ZERO, |acc, u| acc.saturating_add(U256::from(u.value)));
        self.utxos = utxos;
        self
    }

    /// Set the account number
    pub const fn with_account_number(mut self, account_number: u64) -> Self {
        self.account_number = account_number;
        self
    }

    /// Set the balance held in an ERC-20 contract
    pub fn with_token_balance(mut self, contract: &str, balance: U256) -> Self {
        self.tokens.insert(contract.to_ascii_lowercase(), balance);
        self
    }

    /// Known balance in an ERC-20 contract
    pub fn token_balance(&self, contract: &str) -> U256 {
        self.tokens
            .get(&contract.to_ascii_lowercase())
            .copied()
            .unwrap_or(U256::ZERO)
    }

    /// Set the chain reference data
    pub fn with_reference(mut self, reference: ChainReference) -> Self {
        self.reference = reference;
        self
    }

    /// Record one accepted transaction
    ///
    /// Called once per broadcast the network accepted. Building a transaction never reserves
    /// a nonce.
    pub const fn advance_sequence(&mut self) {
        self.nonce += 1;
        self.unconfirmed += 1;
    }

    /// Apply a transaction the network accepted
    ///
    /// Account chains advance their sequence. UTXO chains drop the spent outputs and keep the
    /// change as an unconfirmed output, so the next transfer does not select spent inputs.
    pub fn record_broadcast(&mut self, debit: &WalletDebit) {
        if self.family.is_account_based() {
            self.advance_sequence();
        } else {
            self.unconfirmed += 1;
        }
        if self.family.is_utxo() {
            self.utxos.retain(|utxo| !debit.spends(utxo));
            self.utxos.extend(debit.change.iter().cloned());
        }
        self.balance = self.balance.saturating_sub(debit.value);
        if let Some(token) = &debit.token {
            let balance = self.token_balance(&token.contract);
            self.tokens.insert(
                token.contract.to_ascii_lowercase(),
                balance.saturating_sub(token.value),
            );
        }
    }
}

/// Reference to an output of an earlier transaction
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Outpoint {
    /// Transaction id, display byte order
    pub txid: String,
    /// Output index
    pub vout: u32,
}

/// What an accepted transaction takes from a wallet
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct WalletDebit {
    /// Native value leaving the wallet, fee included
    pub value: U256,
    /// Outputs the transaction spends
    #[serde(default)]
    pub spent: Vec<Outpoint>,
    /// Change paid back to the wallet
    #[serde(default)]
    pub change: Option<Utxo>,
    /// Tokens leaving the wallet
    #[serde(default)]
    pub token: Option<TokenDebit>,
}

/// Tokens an accepted ERC-20 transfer takes from a wallet
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenDebit {
    /// Contract address
    pub contract: String,
    /// Token amount, smallest unit
    pub value: U256,
}

impl WalletDebit {
    /// Debit of an account chain transaction
    pub fn new(value: U256) -> Self {
        Self {
            value,
            ..Self::default()
        }
    }

    /// Whether `utxo` is one of the spent outputs
    pub fn spends(&self, utxo: &Utxo) -> bool {
        self.spent
            .iter()
            .any(|o| o.vout == utxo.vout && o.txid.eq_ignore_ascii_case(&utxo.txid))
    }
}

/// Unspent output owned by the wallet
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Utxo {
    /// Transaction id, in display (reversed) byte order
    pub txid: String,
    /// Output index
    pub vout: u32,
    /// Value in satoshi
    pub value: u64,
    /// Locking script of the output
    pub script_pubkey: HexBytes,
}

/// Chain specific reference data a transaction commits to
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum ChainReference {
    /// No reference data
    #[default]
    None,
    /// EVM chain id and gas limit
    Evm {
        /// EIP-155 chain id
        chain_id: u64,
        /// Gas limit, the fee is spread over it to get the gas price
        gas_limit: u64,
    },
    /// Last ledger a Ripple transaction may be included in
    Ripple {
        /// Optional `LastLedgerSequence`
        last_ledger_sequence: Option<u32>,
    },
    /// EOS chain id and reference block
    Eos {
        /// 32-byte chain id
        chain_id: HexBytes,
        /// Low 16 bits of the reference block number
        ref_block_num: u16,
        /// Prefix of the reference block id
        ref_block_prefix: u32,
        /// Expiration, seconds since the epoch
        expiration: u32,
    },
    /// Binance chain id
    Binance {
        /// Chain id, e.g. `Binance-Chain-Tigris`
        chain_id: String,
    },
}

/// What the user wants to send
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransferIntent {
    /// Destination address or account
    pub destination: String,
    /// Amount, smallest unit
    pub amount: U256,
    /// Total fee, smallest unit
    pub fee: U256,
    /// Memo, for chains that carry one
    #[serde(default)]
    pub memo: Option<String>,
    /// Ripple destination tag
    #[serde(default)]
    pub destination_tag: Option<u32>,
    /// ERC-20 contract the amount is denominated in, native currency when absent
    #[serde(default)]
    pub token: Option<String>,
}

impl TransferIntent {
    /// Transfer of `amount` to `destination` paying `fee`
    pub fn new(destination: impl Into<String>, amount: U256, fee: U256) -> Self {
        Self {
            destination: destination.into(),
            amount,
            fee,
            memo: None,
            destination_tag: None,
            token: None,
        }
    }

    /// Send `amount` of an ERC-20 token instead of the native currency
    pub fn with_token(mut self, contract: impl Into<String>) -> Self {
        self.token = Some(contract.into());
        self
    }

    /// Attach a memo
    pub fn with_memo(mut self, memo: impl Into<String>) -> Self {
        self.memo = Some(memo.into());
        self
    }

    /// Attach a Ripple destination tag
    pub const fn with_destination_tag(mut self, tag: u32) -> Self {
        self.destination_tag = Some(tag);
        self
    }

    /// Amount plus fee
    pub fn total(&self) -> crate::Result<U256> {
        self.amount
            .checked_add(self.fee)
            .ok_or(crate::Error::AmountOverflow)
    }
}

fn ensure_covers(have: U256, need: U256) -> crate::Result<()> {
    if have < need {
        return Err(crate::Error::InsufficientFunds { have, need });
    }
    Ok(())
}

/// Fail with `InsufficientFunds` unless the balance covers amount and fee
///
/// For a token transfer the native balance only pays the fee, the token balance the amount.
pub(crate) fn ensure_funds(wallet: &WalletState, intent: &TransferIntent) -> crate::Result<()> {
    match &intent.token {
        Some(contract) => {
            ensure_covers(wallet.token_balance(contract), intent.amount)?;
            ensure_covers(wallet.balance, intent.fee)
        }
        None => ensure_covers(wallet.balance, intent.total()?),
    }
}
