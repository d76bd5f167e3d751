//! Core error type for all command channel operations

use crate::response::error::ResponseError;
use crate::transport::TransportError;

/// Result type for command channel operations
pub type Result<T> = std::result::Result<T, Error>;

/// Core error type that encompasses all possible errors in the crate
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// The transport failed to deliver the command or the response
    #[error(transparent)]
    Transport(#[from] TransportError),

    /// The response bytes could not be split into payload and status word
    #[error(transparent)]
    Response(#[from] ResponseError),

    /// Invalid command length
    #[error("Invalid command length: {0}")]
    InvalidCommandLength(usize),

    /// The response payload is not a well-formed sequence of TLV records
    #[error("Malformed TLV payload: {0}")]
    Tlv(String),

    /// A record the caller requires is absent or has an unusable value
    #[error("Malformed response: tag {tag:#04x} {reason}")]
    MalformedResponse {
        /// Tag of the offending record
        tag: u8,
        /// What is wrong with it
        reason: &'static str,
    },
}

impl Error {
    /// Create a new error for a missing mandatory record
    pub const fn missing(tag: u8) -> Self {
        Self::MalformedResponse {
            tag,
            reason: "is missing",
        }
    }

    /// Create a new error for a record whose value cannot be decoded
    pub const fn invalid(tag: u8, reason: &'static str) -> Self {
        Self::MalformedResponse { tag, reason }
    }

    /// Whether the error originates from the transport rather than from the card's answer
    pub const fn is_transport(&self) -> bool {
        matches!(self, Self::Transport(_))
    }
}

impl From<iso7816_tlv::TlvError> for Error {
    fn from(error: iso7816_tlv::TlvError) -> Self {
        Self::Tlv(format!("{error:?}"))
    }
}
