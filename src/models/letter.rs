// src/models/letter.rs
//! Diploma ("letter") data model.
//!
//! A letter is issued by a referee (tutor) to a worker (student). It carries
//! two referee signatures: one over the private grant data, which commits to
//! the skill content id and stays between referee and worker, and one over the
//! public receipt, which is safe to show to employers.
//!
//! Field names serialize in camelCase to stay compatible with existing
//! database exports of the dapp (`letterNumber`, `signOverReceipt`, ...).

use crate::models::chain::SignatureChain;
use crate::models::keys::{Amount, ContentId, GenesisHash, PublicKeyBytes, SignatureBytes};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Fields shared by the private grant payload and the public receipt.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Receipt {
    /// Chain instance the diploma is bound to
    pub genesis: GenesisHash,
    /// Per-referee sequence number
    pub letter_number: u32,
    /// Last block at which the diploma can be claimed ("blockAllowed")
    #[serde(rename = "block")]
    pub expiry_block: u64,
    /// Issuer key
    pub referee: PublicKeyBytes,
    /// Recipient key
    pub worker: PublicKeyBytes,
    /// Stake the referee puts behind the diploma
    pub amount: Amount,
}

/// An issued diploma. Immutable after creation.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Letter {
    pub created: DateTime<Utc>,
    /// Content id of the skill description
    pub cid: ContentId,
    /// Opaque learner identity, possibly a pseudonym
    pub worker_id: String,
    #[serde(flatten)]
    pub receipt: Receipt,
    pub sign_over_private_data: SignatureBytes,
    pub sign_over_receipt: SignatureBytes,
}

impl Letter {
    /// The signature chain this letter presents on its own (no delegation).
    pub fn chain(&self) -> SignatureChain {
        SignatureChain {
            cid: self.cid.clone(),
            receipt: self.receipt.clone(),
            sign_over_private_data: self.sign_over_private_data,
            sign_over_receipt: self.sign_over_receipt,
            delegation: None,
        }
    }
}

/// Where a letter is in its one-directional lifecycle.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum LetterStatus {
    Issued,
    Delegated,
    Used,
}

/// Per-signer letter counter ("signers" table).
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct SignerRecord {
    pub public_key: PublicKeyBytes,
    pub last_letter_number: u32,
}
