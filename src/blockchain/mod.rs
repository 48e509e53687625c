// src/blockchain/mod.rs
//! Chain access: block telemetry, the authoritative used-flag and
//! reimbursement submission.

pub mod block_window;
pub mod chain_client;
pub mod rpc_client;

pub use block_window::{days_to_secs, expiry_block};
pub use chain_client::{ChainClient, ReimburseCall, TxEvent, TxEventStream};
pub use rpc_client::RpcChainClient;

use thiserror::Error;

/// Failures talking to the chain.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ChainError {
    #[error("rpc request failed: {0}")]
    Rpc(String),

    /// The transaction could not be built, signed or sent
    #[error("submission failed: {0}")]
    Submission(String),

    /// The runtime rejected the call, e.g. the letter was already reimbursed
    #[error("module error: {0}")]
    Module(String),

    /// The event stream ended before the call reached a block
    #[error("transaction dropped before inclusion")]
    Dropped,

    #[error("chain client misconfigured: {0}")]
    Config(String),
}
