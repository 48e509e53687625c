// src/models/chain.rs
//! The ordered chain of signatures a holder presents.

use crate::models::keys::{ContentId, PublicKeyBytes, SignatureBytes};
use crate::models::letter::Receipt;

/// Worker → employer link of a chain.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Delegation {
    pub employer: PublicKeyBytes,
    pub worker_sign: SignatureBytes,
}

/// Referee → worker (→ employer) signatures plus the fields they cover.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignatureChain {
    pub cid: ContentId,
    pub receipt: Receipt,
    pub sign_over_private_data: SignatureBytes,
    pub sign_over_receipt: SignatureBytes,
    pub delegation: Option<Delegation>,
}

impl SignatureChain {
    /// Diploma identity used for on-chain double-spend protection.
    pub fn letter_id(&self) -> (PublicKeyBytes, u32) {
        (self.receipt.referee, self.receipt.letter_number)
    }
}
