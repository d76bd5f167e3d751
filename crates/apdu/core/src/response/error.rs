//! Error types specific to APDU responses

use super::status::StatusWord;

/// Error for APDU response processing
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ResponseError {
    /// Incomplete response (less than 2 bytes)
    #[error("Incomplete response")]
    Incomplete,

    /// The card answered with a status word the caller did not expect
    #[error("Unexpected status {status} ({})", status.description())]
    Status {
        /// Status word that caused the error
        status: StatusWord,
    },
}

impl ResponseError {
    /// Create a new status error
    pub const fn status(sw1: u8, sw2: u8) -> Self {
        Self::Status {
            status: StatusWord::new(sw1, sw2),
        }
    }

    /// Check if this error has the given status word
    pub const fn has_status(&self, sw: u16) -> bool {
        match self {
            Self::Status { status } => status.to_u16() == sw,
            Self::Incomplete => false,
        }
    }
}
