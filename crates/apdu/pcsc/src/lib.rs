//! PC/SC transport implementation for APDU operations
//!
//! Implements [`CardTransport`](nexum_apdu_core::CardTransport) over the system PC/SC stack,
//! which is how desktop hosts reach NFC readers.
//!
//! ```no_run
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! use nexum_apdu_core::prelude::*;
//! use nexum_apdu_transport_pcsc::PcscDeviceManager;
//!
//! let manager = PcscDeviceManager::new()?;
//! let reader = manager.find_reader_with_card()?;
//! let transport = manager.open_reader(reader.name())?;
//! let mut executor = CardExecutor::new(transport);
//!
//! let response = executor.send(&Command::new(0x00, 0xF2, 0x00, 0x00))?;
//! println!("{}", response.status());
//! # Ok(())
//! # }
//! ```
#![cfg_attr(not(test), warn(unused_crate_dependencies))]
#![warn(missing_docs)]

mod config;
mod error;
mod manager;
mod reader;
mod transport;

pub use config::{PcscConfig, ShareMode};
pub use error::PcscError;
pub use manager::PcscDeviceManager;
pub use reader::PcscReader;
pub use transport::PcscTransport;

pub use pcsc::{Protocol, Protocols};
