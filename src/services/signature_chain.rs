// src/services/signature_chain.rs
//! Signature Chain Builder.
//!
//! Produces the referee's grant signatures and the worker's usage-right
//! signature. Every payload is wrapped in the `<Bytes>` envelope before it is
//! handed to the signer, so a protocol signature can never double as a
//! signature over a raw transaction.

use crate::encoding::payload::{encode_insurance, encode_private_data, encode_receipt};
use crate::error::Result;
use crate::models::keys::{ContentId, PublicKeyBytes, SignatureBytes};
use crate::models::letter::Receipt;
use crate::utils::crypto::wrap_bytes;
use crate::wallet::signer::Signer;
use log::{debug, warn};
use std::sync::Arc;

/// Both referee signatures of a freshly issued letter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GrantSignatures {
    pub sign_over_private_data: SignatureBytes,
    pub sign_over_receipt: SignatureBytes,
}

#[derive(Clone)]
pub struct SignatureChainBuilder {
    signer: Arc<dyn Signer>,
}

impl SignatureChainBuilder {
    /// Creates a builder that signs every link through `signer`.
    pub fn new(signer: Arc<dyn Signer>) -> Self {
        Self { signer }
    }

    /// Wraps `payload` and signs it with `key`.
    pub async fn sign_payload(&self, key: &PublicKeyBytes, payload: &[u8]) -> Result<SignatureBytes> {
        let wrapped = wrap_bytes(payload);
        self.signer.sign(key, &wrapped).await.map_err(|e| {
            warn!("signer refused to sign for {}: {}", key, e);
            e
        })
    }

    /// Referee signs the private grant data, then the public receipt.
    ///
    /// Both payloads are encoded before anything is signed, so a malformed
    /// amount never reaches the signer.
    pub async fn sign_grant(&self, cid: &ContentId, receipt: &Receipt) -> Result<GrantSignatures> {
        let private_data = encode_private_data(cid, receipt)?;
        let receipt_bytes = encode_receipt(receipt)?;

        let sign_over_private_data = self.sign_payload(&receipt.referee, &private_data).await?;
        let sign_over_receipt = self.sign_payload(&receipt.referee, &receipt_bytes).await?;
        debug!(
            "signed grant {} of {} for {}",
            receipt.letter_number, receipt.referee, receipt.worker
        );
        Ok(GrantSignatures {
            sign_over_private_data,
            sign_over_receipt,
        })
    }

    /// Worker delegates the right to claim the stake to `employer`.
    pub async fn sign_usage_right(
        &self,
        receipt: &Receipt,
        sign_over_receipt: &SignatureBytes,
        employer: &PublicKeyBytes,
    ) -> Result<SignatureBytes> {
        let insurance = encode_insurance(receipt, sign_over_receipt, employer)?;
        self.sign_payload(&receipt.worker, &insurance).await
    }
}
