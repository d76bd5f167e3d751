//! Errors raised while building or assembling transactions

use alloy_primitives::U256;
use nexum_tapcard::{Classify, ErrorClass};

use crate::ChainFamily;

/// Result type for engine operations
pub type Result<T> = std::result::Result<T, Error>;

/// Error type for transaction building and assembly
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Wallet cannot cover amount and fee
    #[error("Insufficient funds: have {have}, need {need}")]
    InsufficientFunds {
        /// Spendable balance
        have: U256,
        /// Amount plus fee
        need: U256,
    },

    /// Address could not be decoded for this chain
    #[error("Invalid address {address}: {reason}")]
    InvalidAddress {
        /// Offending address
        address: String,
        /// What is wrong with it
        reason: &'static str,
    },

    /// Decimal string is not a valid amount
    #[error("Invalid amount: {0}")]
    InvalidAmount(String),

    /// Value does not fit the integer the chain encodes it as
    #[error("Amount does not fit the chain's integer type")]
    AmountOverflow,

    /// Coin selection needs more inputs than one card request can sign
    #[error("Transaction needs {0} inputs, at most {max} fit one signing request", max = crate::MAX_INPUTS)]
    TooManyInputs(usize),

    /// Signatures do not fit the transaction they should bind to
    #[error("Signature format error: {0}")]
    SignatureFormat(&'static str),

    /// Wallet state or transaction belongs to another chain family
    #[error("Expected a {expected} transaction, got {found}")]
    WrongChain {
        /// Family of the engine
        expected: ChainFamily,
        /// Family of the input
        found: ChainFamily,
    },

    /// Token transfers are only built for EVM chains
    #[error("{0} has no token transfers")]
    TokensUnsupported(ChainFamily),

    /// Chain reference data needed to build the transaction is missing
    #[error("Missing chain reference data: {0}")]
    MissingReference(&'static str),

    /// Wallet state holds a value the chain cannot encode
    #[error("Invalid wallet state: {0}")]
    InvalidWalletState(&'static str),

    /// Wallet public key is malformed
    #[error(transparent)]
    Ecdsa(#[from] k256::ecdsa::Error),

    /// JSON encoding failed
    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

impl Error {
    /// Create an invalid address error
    pub fn invalid_address(address: impl Into<String>, reason: &'static str) -> Self {
        Self::InvalidAddress {
            address: address.into(),
            reason,
        }
    }

    /// Recovery class of this error
    pub const fn class(&self) -> ErrorClass {
        match self {
            Self::InsufficientFunds { .. } => ErrorClass::InsufficientFunds,
            Self::InvalidAddress { .. } => ErrorClass::InvalidAddress,
            Self::AmountOverflow => ErrorClass::AmountOverflow,
            Self::SignatureFormat(_) | Self::Ecdsa(_) => ErrorClass::SignatureFormat,
            Self::InvalidAmount(_)
            | Self::TooManyInputs(_)
            | Self::WrongChain { .. }
            | Self::TokensUnsupported(_)
            | Self::MissingReference(_)
            | Self::InvalidWalletState(_)
            | Self::Json(_) => ErrorClass::InvalidRequest,
        }
    }
}

impl Classify for Error {
    fn class(&self) -> ErrorClass {
        Self::class(self)
    }
}
