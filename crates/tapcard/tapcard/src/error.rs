//! Error taxonomy for card sessions

use nexum_apdu_core::StatusWord;

use crate::types::SigningMethod;

/// Result type for card operations
pub type Result<T> = std::result::Result<T, Error>;

/// Recovery class of a failure
///
/// Callers branch on the class to pick a recovery action; the message of the error itself is
/// for humans.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorClass {
    /// Link to the card or the network failed, retry
    Transport,
    /// Wrong PIN, prompt again
    Authentication,
    /// Card asked for a security delay that was not waited out, retry later
    CardBusy,
    /// Card reported a protocol violation, fatal for the session
    Card,
    /// Issuer signature is required and missing
    IssuerValidationRequired,
    /// Card issuer is not trusted
    UnknownIssuer,
    /// Not enough funds to build the transaction
    InsufficientFunds,
    /// Destination address could not be decoded
    InvalidAddress,
    /// Amount does not fit the chain's integer type
    AmountOverflow,
    /// Signature does not fit the transaction it should bind to
    SignatureFormat,
    /// Network rejected the transaction
    BroadcastRejected,
    /// A task was started while another one runs on the same session
    SessionBusy,
    /// Request violates a precondition checked before talking to the card
    InvalidRequest,
    /// Operation was cancelled
    Cancelled,
}

impl ErrorClass {
    /// Whether retrying the same operation may succeed
    pub const fn is_retryable(self) -> bool {
        matches!(self, Self::Transport | Self::CardBusy)
    }
}

/// An error that knows its recovery class
pub trait Classify: std::error::Error + Send + Sync + 'static {
    /// Recovery class of this error
    fn class(&self) -> ErrorClass;
}

/// Error type for card session operations
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Command channel failure, either the transport or an undecodable answer
    #[error(transparent)]
    Channel(#[from] nexum_apdu_core::Error),

    /// Card rejected PIN1 or PIN2
    #[error("PIN rejected by card")]
    InvalidPin,

    /// Card requires a security delay that was not waited out
    #[error("Card busy, {remaining_ms} ms of security delay left")]
    CardBusy {
        /// Remaining delay last reported by the card
        remaining_ms: u32,
    },

    /// Card answered with an unexpected status word
    #[error("{command} failed with status {status} ({})", status.description())]
    Card {
        /// Command that failed
        command: &'static str,
        /// Status word returned
        status: StatusWord,
    },

    /// Card is not personalized
    #[error("Card is not personalized")]
    NotPersonalized,

    /// A wallet is present and overwrite was not requested
    #[error("Wallet already exists")]
    WalletAlreadyExists,

    /// The operation needs a wallet and the card has none
    #[error("Card has no wallet")]
    NoWallet,

    /// Wallet slot was purged and cannot be used again
    #[error("Wallet was purged")]
    WalletPurged,

    /// A different card answered than the one this session was bound to
    #[error("Card mismatch: expected {expected}, found {found}")]
    CardMismatch {
        /// Card the session is bound to
        expected: String,
        /// Card that answered
        found: String,
    },

    /// Card failed to prove possession of its key
    #[error("Card signature verification failed")]
    VerificationFailed,

    /// Issuer of the card is not in the trusted set
    #[error("Unknown card issuer: {0}")]
    UnknownIssuer(String),

    /// Signing method requires an issuer signature that was not supplied
    #[error("{0} requires an issuer signature")]
    MissingIssuerValidation(SigningMethod),

    /// Card does not allow the requested signing mode
    #[error("Signing mode not supported by card: {0}")]
    UnsupportedSigningMethod(&'static str),

    /// Digests in one request differ in length
    #[error("Inconsistent digest length: expected {expected}, found {found}")]
    InconsistentDigestLength {
        /// Length of the first digest
        expected: usize,
        /// Offending length
        found: usize,
    },

    /// Digest longer than the card's one byte size record allows
    #[error("Digest too long: {0} bytes")]
    DigestTooLong(usize),

    /// More digests than fit into one SIGN command
    #[error("Too many digests in one request: {0}")]
    TooManyDigests(usize),

    /// Nothing to sign
    #[error("Empty signing request")]
    EmptySigningRequest,

    /// Raw payload is larger than the card accepts
    #[error("Raw payload too large: {0} bytes")]
    PayloadTooLarge(usize),

    /// Operation was cancelled between two exchanges
    #[error("Operation cancelled")]
    Cancelled,

    /// Key material from the card or terminal is malformed
    #[error(transparent)]
    Ecdsa(#[from] k256::ecdsa::Error),
}

impl Error {
    /// Create an error for an unexpected status word
    pub const fn card(command: &'static str, status: StatusWord) -> Self {
        Self::Card { command, status }
    }

    /// Recovery class of this error
    pub const fn class(&self) -> ErrorClass {
        match self {
            Self::Channel(e) if e.is_transport() => ErrorClass::Transport,
            Self::Channel(_) => ErrorClass::Card,
            Self::InvalidPin => ErrorClass::Authentication,
            Self::CardBusy { .. } => ErrorClass::CardBusy,
            Self::Card { .. }
            | Self::NotPersonalized
            | Self::WalletAlreadyExists
            | Self::NoWallet
            | Self::WalletPurged
            | Self::CardMismatch { .. }
            | Self::VerificationFailed
            | Self::Ecdsa(_) => ErrorClass::Card,
            Self::UnknownIssuer(_) => ErrorClass::UnknownIssuer,
            Self::MissingIssuerValidation(_) => ErrorClass::IssuerValidationRequired,
            Self::UnsupportedSigningMethod(_)
            | Self::InconsistentDigestLength { .. }
            | Self::TooManyDigests(_)
            | Self::DigestTooLong(_)
            | Self::EmptySigningRequest
            | Self::PayloadTooLarge(_) => ErrorClass::InvalidRequest,
            Self::Cancelled => ErrorClass::Cancelled,
        }
    }
}

impl Classify for Error {
    fn class(&self) -> ErrorClass {
        Self::class(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use nexum_apdu_core::TransportError;

    #[test]
    fn test_classes() {
        let transport = Error::from(nexum_apdu_core::Error::from(TransportError::CardRemoved));
        assert_eq!(transport.class(), ErrorClass::Transport);
        assert!(transport.class().is_retryable());

        let malformed = Error::from(nexum_apdu_core::Error::missing(0x61));
        assert_eq!(malformed.class(), ErrorClass::Card);

        assert_eq!(Error::InvalidPin.class(), ErrorClass::Authentication);
        assert!(Error::CardBusy { remaining_ms: 10 }.class().is_retryable());
        assert_eq!(
            Error::MissingIssuerValidation(SigningMethod::SignHashValidatedByIssuer).class(),
            ErrorClass::IssuerValidationRequired
        );
        assert_eq!(Error::Cancelled.class(), ErrorClass::Cancelled);
    }
}
