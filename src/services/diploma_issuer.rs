// src/services/diploma_issuer.rs
//! Diploma Issuer Service
//!
//! Issues letters on behalf of a referee and lets workers delegate usage
//! rights of their letters to employers.
//!
//! Issuance reads the chain once (genesis, current block, block time),
//! reserves a letter number, signs and stores. A number whose signing failed
//! is handed back so the referee's sequence stays gap-free.

use crate::blockchain::block_window::{days_to_secs, expiry_block};
use crate::blockchain::ChainClient;
use crate::encoding::qr::QrPayload;
use crate::error::{ProtocolError, Result};
use crate::models::insurance::{Insurance, UsageRight};
use crate::models::keys::{Amount, ContentId, PublicKeyBytes};
use crate::models::letter::{Letter, Receipt};
use crate::services::signature_chain::SignatureChainBuilder;
use crate::wallet::credential_storage::RecordStore;
use chrono::Utc;
use log::{debug, info, warn};
use std::sync::Arc;

/// Fallbacks for fields an issue request leaves out.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiplomaDefaults {
    pub days_valid: u64,
    pub stake: Amount,
}

impl Default for DiplomaDefaults {
    fn default() -> Self {
        Self {
            days_valid: 730,
            stake: Amount::from_u128(572_000_000_000_000),
        }
    }
}

#[derive(Debug, Clone)]
pub struct IssueRequest {
    pub referee: PublicKeyBytes,
    pub worker: PublicKeyBytes,
    pub worker_id: String,
    pub cid: ContentId,
    pub amount: Option<Amount>,
    /// Validity in seconds; overrides `days_valid` when set
    pub valid_for_secs: Option<u64>,
    pub days_valid: Option<u64>,
}

/// What a worker hands over when delegating one letter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Delegated {
    /// Worker-side record
    pub usage_right: UsageRight,
    /// Claim the employer presents for reimbursement
    pub insurance: Insurance,
}

/// Issues and delegates letters against live chain state.
pub struct DiplomaIssuer {
    chain: Arc<dyn ChainClient>,
    store: Arc<dyn RecordStore>,
    builder: SignatureChainBuilder,
    defaults: DiplomaDefaults,
}

impl DiplomaIssuer {
    /// # Arguments
    /// * `chain` - Source of genesis, current block and block time
    /// * `store` - Where letters, counters and usage rights are kept
    /// * `builder` - Signs on behalf of referees and workers
    /// * `defaults` - Validity and stake used when a request omits them
    pub fn new(
        chain: Arc<dyn ChainClient>,
        store: Arc<dyn RecordStore>,
        builder: SignatureChainBuilder,
        defaults: DiplomaDefaults,
    ) -> Self {
        Self {
            chain,
            store,
            builder,
            defaults,
        }
    }

    /// Issues a letter from `request.referee` to `request.worker`.
    ///
    /// # Errors
    /// - `BlockTimeUnknown` if the chain reports no block time
    /// - `SignerUnavailable` if the referee cannot sign; the reserved letter
    ///   number is released
    /// - `MalformedInput` for an amount that does not fit the wire format
    pub async fn issue(&self, request: IssueRequest) -> Result<Letter> {
        // The worker id travels as a token of the diploma text line.
        if request.worker_id.trim().is_empty() || request.worker_id.contains(',') {
            return Err(ProtocolError::malformed(format!(
                "worker id '{}' must be non-empty and free of commas",
                request.worker_id
            )));
        }
        let valid_for_secs = match request.valid_for_secs {
            Some(secs) => secs,
            None => days_to_secs(request.days_valid.unwrap_or(self.defaults.days_valid))?,
        };
        let genesis = self.chain.genesis_hash().await?;
        let current_block = self.chain.current_block().await?;
        let block_time_ms = self.chain.block_time_ms().await?;
        let expiry = expiry_block(current_block, block_time_ms, valid_for_secs)?;

        let amount = request.amount.unwrap_or_else(|| self.defaults.stake.clone());
        amount.to_wire_bytes()?;

        let letter_number = self.store.allocate_letter_number(&request.referee)?;
        let receipt = Receipt {
            genesis,
            letter_number,
            expiry_block: expiry,
            referee: request.referee,
            worker: request.worker,
            amount,
        };

        let grant = match self.builder.sign_grant(&request.cid, &receipt).await {
            Ok(grant) => grant,
            Err(e) => {
                if self.store.release_letter_number(&request.referee, letter_number) {
                    warn!("issue: released letter number {} after: {}", letter_number, e);
                }
                return Err(e);
            }
        };

        let letter = Letter {
            created: Utc::now(),
            cid: request.cid,
            worker_id: request.worker_id,
            receipt,
            sign_over_private_data: grant.sign_over_private_data,
            sign_over_receipt: grant.sign_over_receipt,
        };
        if !self.store.store_letter(letter.clone()) {
            debug!(
                "issue: letter {} of {} was already stored under the same receipt signature",
                letter_number, letter.receipt.referee
            );
        }
        info!(
            "issue: letter {} from {} to {} valid until block {}",
            letter_number, letter.receipt.referee, letter.receipt.worker, expiry
        );
        Ok(letter)
    }

    /// Worker delegates `letter` to `employer` and records the usage right.
    ///
    /// # Errors
    /// `SignerUnavailable` if the worker cannot sign.
    pub async fn delegate(&self, letter: &Letter, employer: PublicKeyBytes) -> Result<Delegated> {
        let worker_sign = self
            .builder
            .sign_usage_right(&letter.receipt, &letter.sign_over_receipt, &employer)
            .await?;
        let usage_right = UsageRight {
            created: Utc::now(),
            sign_over_receipt: letter.sign_over_receipt,
            employer,
            sign: worker_sign,
        };
        if !self.store.store_usage_right(usage_right.clone()) {
            debug!(
                "delegate: usage right of letter {} for {} was already stored",
                letter.receipt.letter_number, employer
            );
        }
        info!(
            "delegate: letter {} of {} delegated to {}",
            letter.receipt.letter_number, letter.receipt.referee, employer
        );
        Ok(Delegated {
            usage_right,
            insurance: Insurance::from_letter(letter, employer, worker_sign),
        })
    }

    /// Delegates every letter to `employer` in one step and renders the
    /// SELL_DIPLOMAS QR text for the employer to scan.
    ///
    /// All letters must belong to `worker`; nothing is signed otherwise.
    pub async fn sell_diplomas(
        &self,
        worker: PublicKeyBytes,
        name: Option<String>,
        employer: PublicKeyBytes,
        letters: &[Letter],
    ) -> Result<String> {
        if let Some(foreign) = letters.iter().find(|l| l.receipt.worker != worker) {
            return Err(ProtocolError::malformed(format!(
                "letter {} of {} was not issued to {}",
                foreign.receipt.letter_number, foreign.receipt.referee, worker
            )));
        }
        let mut insurances = Vec::with_capacity(letters.len());
        for letter in letters {
            insurances.push(self.delegate(letter, employer).await?.insurance);
        }
        Ok(QrPayload::SellDiplomas {
            worker,
            name,
            employer,
            insurances,
        }
        .encode())
    }
}
