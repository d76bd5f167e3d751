use std::str::FromStr;

use derive_more::Display;
use serde::{Deserialize, Serialize};

/// Chain family a wallet belongs to
///
/// Each variant is implemented by one module under `chains`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChainFamily {
    /// Ethereum and EVM compatible chains, legacy EIP-155 transactions
    #[display("evm")]
    Evm,
    /// Bitcoin with legacy sighash
    #[display("bitcoin")]
    Bitcoin,
    /// Bitcoin Cash with fork-id sighash
    #[display("bitcoincash")]
    BitcoinCash,
    /// XRP ledger
    #[display("ripple")]
    Ripple,
    /// EOS
    #[display("eos")]
    Eos,
    /// Binance Chain
    #[display("binance")]
    Binance,
}

impl ChainFamily {
    /// All families
    pub const ALL: [Self; 6] = [
        Self::Evm,
        Self::Bitcoin,
        Self::BitcoinCash,
        Self::Ripple,
        Self::Eos,
        Self::Binance,
    ];

    /// Decimal places of the native unit
    pub const fn decimals(self) -> u8 {
        match self {
            Self::Evm => 18,
            Self::Bitcoin | Self::BitcoinCash | Self::Binance => 8,
            Self::Ripple => 6,
            Self::Eos => 4,
        }
    }

    /// Ticker of the native currency
    pub const fn symbol(self) -> &'static str {
        match self {
            Self::Evm => "ETH",
            Self::Bitcoin => "BTC",
            Self::BitcoinCash => "BCH",
            Self::Ripple => "XRP",
            Self::Eos => "EOS",
            Self::Binance => "BNB",
        }
    }

    /// Whether the chain orders transactions by an account nonce or sequence
    pub const fn is_account_based(self) -> bool {
        matches!(self, Self::Evm | Self::Ripple | Self::Binance)
    }

    /// Whether the chain spends unspent outputs
    pub const fn is_utxo(self) -> bool {
        matches!(self, Self::Bitcoin | Self::BitcoinCash)
    }
}

impl FromStr for ChainFamily {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "evm" | "eth" | "ethereum" => Ok(Self::Evm),
            "bitcoin" | "btc" => Ok(Self::Bitcoin),
            "bitcoincash" | "bch" => Ok(Self::BitcoinCash),
            "ripple" | "xrp" => Ok(Self::Ripple),
            "eos" => Ok(Self::Eos),
            "binance" | "bnb" => Ok(Self::Binance),
            other => Err(format!("unknown chain family: {other}")),
        }
    }
}
