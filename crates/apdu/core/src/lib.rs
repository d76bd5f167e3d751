//! Core traits and types for APDU (Application Protocol Data Unit) operations
//!
//! This crate is the command channel to a smart card: it frames commands according to
//! ISO/IEC 7816-4, carries them over a [`CardTransport`], and decodes the response into a
//! payload plus [`StatusWord`]. Payloads are sequences of simple-TLV records, see [`TlvList`].
//!
//! The crate has no knowledge of what a command means and never retries. Retry policy
//! belongs to the layers above.
#![cfg_attr(not(test), warn(unused_crate_dependencies))]
#![forbid(unsafe_code)]
#![warn(missing_docs, rustdoc::missing_crate_level_docs)]

// Re-export bytes for convenience
pub use bytes::{Bytes, BytesMut};

pub mod command;
pub mod executor;
pub mod response;
pub mod tlv;
pub mod transport;

mod error;
pub use error::{Error, Result};

pub use command::{ApduCommand, Command, LengthForm};
pub use executor::{CardExecutor, Executor};
pub use response::status::StatusWord;
pub use response::{Response, utils};
pub use tlv::{TlvList, TlvRecord};
pub use transport::{CardTransport, TransportError};

#[cfg(any(test, feature = "mock"))]
pub use transport::mock::MockTransport;

/// Prelude module containing commonly used traits and types
pub mod prelude {
    pub use crate::{
        Bytes, BytesMut, CardExecutor, Command, Error, Executor, Response, Result, TlvList,
        TlvRecord, command::ApduCommand, response::status::StatusWord,
        transport::{CardTransport, TransportError},
    };
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reexports() {
        let cmd = Command::new(0x00, 0xF2, 0x00, 0x00);
        assert_eq!(cmd.class(), 0x00);
        assert_eq!(cmd.instruction(), 0xF2);

        let resp = Response::success(Bytes::from_static(&[0x01, 0x01, 0xAA]));
        assert!(resp.is_success());
        assert_eq!(resp.status(), StatusWord::new(0x90, 0x00));
        assert_eq!(resp.records().unwrap().bytes(0x01), Some(&[0xAA][..]));
    }
}
