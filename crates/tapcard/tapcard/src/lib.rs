//! Session protocol and task orchestration for contactless signing cards
//!
//! A [`CardSession`] drives one card over the command channel of `nexum-apdu-core`: PIN
//! resolution, security delays, signing and wallet management. A [`TaskOrchestrator`] chains
//! session operations into tasks with progress reporting and cooperative cancellation.
#![cfg_attr(not(test), warn(unused_crate_dependencies))]
#![forbid(unsafe_code)]

pub mod commands;
pub mod constants;
mod crypto;
mod delay;
mod error;
mod keystore;
mod pins;
mod session;
pub mod tasks;
mod trust;
mod types;

pub use crypto::{TerminalKey, verify_signature};
pub use delay::{DELAY_DISPLAY_FLOOR_MS, DelayCountdown, DelayDisplay};
pub use error::{Classify, Error, ErrorClass, Result};
pub use keystore::{KeyStoreError, SigningKeyStore, acquire_with_recreate};
pub use pins::{PinCache, PinsProvider, is_default_pin2, pin_hash};
pub use session::{
    CancelToken, CardSession, IssuerAuthorization, SessionConfig, SessionObserver, SessionState,
};
pub use tasks::{
    SignCollaborator, TaskError, TaskHandle, TaskListener, TaskOrchestrator, TaskOutcome,
    TaskReport, TaskRequest,
};
pub use trust::{IssuerTrust, TrustedIssuer};
pub use types::{
    CardIdentity, CardState, CardStatus, HashAlgorithm, HexBytes, RawSignature, SigningMethod,
    SigningMethods,
};
