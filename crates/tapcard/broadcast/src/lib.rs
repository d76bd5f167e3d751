//! Broadcast of card signed transactions
//!
//! A [`Coordinator`] submits a [`SignedTransaction`](nexum_tapcard_engine::SignedTransaction)
//! through one of several [`Backend`]s, failing over to the next endpoint on transport errors
//! within a fixed retry budget. A node rejecting the transaction is final.
#![cfg_attr(not(test), warn(unused_crate_dependencies))]
#![forbid(unsafe_code)]

mod backend;
mod coordinator;
mod error;
pub mod response;

pub use backend::{Backend, JsonRpcBackend, RawTxBackend, RpcMethod, backend_for};
pub use coordinator::{
    BroadcastAttempt, Coordinator, CoordinatorConfig, Receipt, backoff, broadcast_fanout,
    canonical_id,
};
pub use error::{Error, Result};
