// src/models/insurance.rs
//! Usage-right delegations and reimbursement claims ("insurances").

use crate::models::chain::{Delegation, SignatureChain};
use crate::models::keys::{ContentId, PublicKeyBytes, SignatureBytes};
use crate::models::letter::{Letter, Receipt};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Worker-side record of a usage right granted to an employer.
///
/// Deduplicated by `sign`: signatures are unforgeable and content-unique, so
/// two records with the same signature are the same delegation.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct UsageRight {
    pub created: DateTime<Utc>,
    /// Anchor: the referee's receipt signature of the delegated letter
    pub sign_over_receipt: SignatureBytes,
    pub employer: PublicKeyBytes,
    /// Worker signature over the insurance payload
    pub sign: SignatureBytes,
}

/// Employer-side reimbursement claim carrying the full signature chain.
///
/// `block_allowed` is the expiry bound captured when the letter was
/// delegated; the registry checks it, and it must equal the signed
/// `receipt.expiry_block`. `was_used` only ever moves from `false` to `true`.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Insurance {
    pub created: DateTime<Utc>,
    pub cid: ContentId,
    #[serde(flatten)]
    pub receipt: Receipt,
    pub sign_over_private_data: SignatureBytes,
    pub sign_over_receipt: SignatureBytes,
    pub block_allowed: u64,
    pub employer: PublicKeyBytes,
    pub worker_sign: SignatureBytes,
    #[serde(default)]
    pub was_used: bool,
}

impl Insurance {
    /// Builds the claim an employer holds after a worker delegated `letter`.
    pub fn from_letter(letter: &Letter, employer: PublicKeyBytes, worker_sign: SignatureBytes) -> Self {
        Self {
            created: Utc::now(),
            cid: letter.cid.clone(),
            receipt: letter.receipt.clone(),
            sign_over_private_data: letter.sign_over_private_data,
            sign_over_receipt: letter.sign_over_receipt,
            block_allowed: letter.receipt.expiry_block,
            employer,
            worker_sign,
            was_used: false,
        }
    }

    /// The signature chain the claim presents, delegated to `employer`.
    pub fn chain(&self) -> SignatureChain {
        SignatureChain {
            cid: self.cid.clone(),
            receipt: self.receipt.clone(),
            sign_over_private_data: self.sign_over_private_data,
            sign_over_receipt: self.sign_over_receipt,
            delegation: Some(Delegation {
                employer: self.employer,
                worker_sign: self.worker_sign,
            }),
        }
    }
}
