// src/error.rs
//! Error taxonomy of the diploma protocol.
//!
//! Every fallible core operation returns [`ProtocolError`]. Encoding and
//! verification failures are never retried automatically; signer failures may
//! be retried only after an explicit user action (unlock, re-approve).

use crate::blockchain::ChainError;
use crate::storage::StorageError;
use std::fmt;
use thiserror::Error;

/// Which link of the signature chain failed to verify.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SignatureRole {
    /// Referee signature over the private grant data (includes the skill digest)
    RefereeOverPrivateData,
    /// Referee signature over the public receipt
    RefereeOverReceipt,
    /// Worker signature delegating usage rights to an employer
    WorkerOverInsurance,
}

impl fmt::Display for SignatureRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::RefereeOverPrivateData => write!(f, "referee signature over private data"),
            Self::RefereeOverReceipt => write!(f, "referee signature over receipt"),
            Self::WorkerOverInsurance => write!(f, "worker signature over insurance"),
        }
    }
}

/// Why a presented chain was rejected as `Invalid`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InvalidReason {
    /// A signature does not match its recomputed payload and embedded key
    SignatureMismatch(SignatureRole),
    /// The diploma is bound to a different chain instance
    WrongGenesis,
    /// The delegation names a different employer than the presenter
    WrongEmployer,
    /// The chain could not be re-encoded (e.g. amount out of range)
    Malformed(String),
}

impl fmt::Display for InvalidReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::SignatureMismatch(role) => write!(f, "{} does not verify", role),
            Self::WrongGenesis => write!(f, "diploma was issued for another chain"),
            Self::WrongEmployer => write!(f, "usage right was delegated to another employer"),
            Self::Malformed(msg) => write!(f, "malformed chain: {}", msg),
        }
    }
}

/// Errors surfaced by the diploma core.
#[derive(Debug, Error)]
pub enum ProtocolError {
    /// Bad field shape or type before encoding
    #[error("malformed input: {0}")]
    MalformedInput(String),

    /// Signing capability not ready, locked, or rejected the request
    #[error("signer unavailable: {0}")]
    SignerUnavailable(String),

    /// Block-time telemetry is missing, so no expiry bound can be derived
    #[error("block time unknown")]
    BlockTimeUnknown,

    /// Signature or structure verification failure
    #[error("invalid presentation: {0}")]
    Invalid(InvalidReason),

    /// Block bound exceeded
    #[error("diploma expired at block {expiry_block} (current block {current_block})")]
    Expired { expiry_block: u64, current_block: u64 },

    /// Replay or double-spend detected
    #[error("diploma was already used for a reimbursement")]
    AlreadyUsed,

    #[error("chain error: {0}")]
    Chain(#[from] ChainError),

    #[error("content store error: {0}")]
    Storage(#[from] StorageError),
}

impl ProtocolError {
    pub(crate) fn malformed(msg: impl Into<String>) -> Self {
        Self::MalformedInput(msg.into())
    }
}

pub type Result<T> = std::result::Result<T, ProtocolError>;
