// src/blockchain/chain_client.rs
//! The chain capability the diploma core consumes.

use crate::blockchain::ChainError;
use crate::models::insurance::Insurance;
use crate::models::keys::{Amount, GenesisHash, PublicKeyBytes, SignatureBytes};
use async_trait::async_trait;
use futures::stream::BoxStream;

/// Progress of a submitted reimbursement.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TxEvent {
    /// Accepted by the node; carries the transaction hash
    Submitted(String),
    InBlock,
    Finalized,
    /// Rejected by the runtime; carries the decoded module error
    Failed(String),
}

impl TxEvent {
    /// True once the call is included, which is when the local used-flag may
    /// be set.
    pub fn is_included(&self) -> bool {
        matches!(self, Self::InBlock | Self::Finalized)
    }
}

pub type TxEventStream = BoxStream<'static, TxEvent>;

/// Arguments of the registry's `reimburse` call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReimburseCall {
    pub letter_number: u32,
    /// Genesis hash the diploma is bound to ("block" in the dapp)
    pub genesis: GenesisHash,
    /// Expiry bound the registry enforces
    pub block_allowed: u64,
    pub referee: PublicKeyBytes,
    pub worker: PublicKeyBytes,
    pub employer: PublicKeyBytes,
    pub amount: Amount,
    pub sign_over_receipt: SignatureBytes,
    pub worker_sign: SignatureBytes,
}

impl From<&Insurance> for ReimburseCall {
    fn from(insurance: &Insurance) -> Self {
        Self {
            letter_number: insurance.receipt.letter_number,
            genesis: insurance.receipt.genesis,
            block_allowed: insurance.block_allowed,
            referee: insurance.receipt.referee,
            worker: insurance.receipt.worker,
            employer: insurance.employer,
            amount: insurance.receipt.amount.clone(),
            sign_over_receipt: insurance.sign_over_receipt,
            worker_sign: insurance.worker_sign,
        }
    }
}

#[async_trait]
pub trait ChainClient: Send + Sync {
    async fn current_block(&self) -> Result<u64, ChainError>;

    /// Average block time in milliseconds, or `None` when the chain does not
    /// report one.
    async fn block_time_ms(&self) -> Result<Option<u64>, ChainError>;

    async fn genesis_hash(&self) -> Result<GenesisHash, ChainError>;

    /// The chain's own double-spend record for a diploma.
    async fn is_reimbursed(&self, referee: &PublicKeyBytes, letter_number: u32) -> Result<bool, ChainError>;

    /// Submits `call` paid by `signer` and streams its progress.
    async fn submit(&self, call: ReimburseCall, signer: &PublicKeyBytes) -> Result<TxEventStream, ChainError>;
}
