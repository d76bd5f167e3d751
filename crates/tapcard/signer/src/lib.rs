//! alloy [`Signer`](alloy_signer::Signer) backed by a contactless signing card
#![cfg_attr(not(test), warn(unused_crate_dependencies))]

mod signer;

pub use signer::{CardSigner, Error};
