// src/services/verifier.rs
//! Verification & replay guard.
//!
//! [`verify_chain`] is the pure check: it recomputes every payload, verifies
//! each signature against its embedded key, then applies the expiry bound and
//! the replay flag. [`Verifier`] feeds it live chain state and drives
//! reimbursement submission.
//!
//! Checks run in a fixed order: structure and genesis, signatures, expiry,
//! replay. A claim that is both expired and used reports `Expired`.

use crate::blockchain::{ChainClient, ChainError, ReimburseCall, TxEvent};
use crate::encoding::payload::{encode_insurance, encode_private_data, encode_receipt};
use crate::error::{InvalidReason, ProtocolError, Result, SignatureRole};
use crate::models::chain::SignatureChain;
use crate::models::insurance::Insurance;
use crate::models::keys::{GenesisHash, PublicKeyBytes, SignatureBytes};
use crate::models::letter::Letter;
use crate::utils::crypto::{verify_signature, wrap_bytes};
use crate::wallet::credential_storage::RecordStore;
use futures::StreamExt;
use log::{error, info, warn};
use serde::Serialize;
use std::fmt;
use std::sync::Arc;

/// Outcome of verifying a presented chain.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Verdict {
    /// Signatures verify, unexpired and unused: eligible for reimbursement
    Valid,
    Expired { expiry_block: u64, current_block: u64 },
    AlreadyUsed,
    Invalid(InvalidReason),
}

impl Verdict {
    /// True only for [`Verdict::Valid`].
    pub fn is_valid(&self) -> bool {
        matches!(self, Self::Valid)
    }

    /// Maps every non-valid verdict onto the error taxonomy.
    pub fn into_result(self) -> Result<()> {
        match self {
            Self::Valid => Ok(()),
            Self::Expired { expiry_block, current_block } => Err(ProtocolError::Expired {
                expiry_block,
                current_block,
            }),
            Self::AlreadyUsed => Err(ProtocolError::AlreadyUsed),
            Self::Invalid(reason) => Err(ProtocolError::Invalid(reason)),
        }
    }
}

impl fmt::Display for Verdict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Valid => write!(f, "valid"),
            Self::Expired { expiry_block, .. } => write!(f, "expired at block {}", expiry_block),
            Self::AlreadyUsed => write!(f, "already used"),
            Self::Invalid(reason) => write!(f, "invalid: {}", reason),
        }
    }
}

fn check_signature(
    key: &PublicKeyBytes,
    payload: Result<Vec<u8>>,
    signature: &SignatureBytes,
    role: SignatureRole,
) -> std::result::Result<(), InvalidReason> {
    let payload = payload.map_err(|e| InvalidReason::Malformed(e.to_string()))?;
    if verify_signature(key, &wrap_bytes(&payload), signature) {
        Ok(())
    } else {
        Err(InvalidReason::SignatureMismatch(role))
    }
}

fn check_structure(
    chain: &SignatureChain,
    expected_genesis: &GenesisHash,
    expected_employer: Option<&PublicKeyBytes>,
) -> std::result::Result<(), InvalidReason> {
    if chain.receipt.genesis != *expected_genesis {
        return Err(InvalidReason::WrongGenesis);
    }
    if let Some(employer) = expected_employer {
        match &chain.delegation {
            Some(delegation) if delegation.employer == *employer => {}
            Some(_) => return Err(InvalidReason::WrongEmployer),
            None => return Err(InvalidReason::Malformed("claim carries no delegation".into())),
        }
    }

    let receipt = &chain.receipt;
    check_signature(
        &receipt.referee,
        encode_private_data(&chain.cid, receipt),
        &chain.sign_over_private_data,
        SignatureRole::RefereeOverPrivateData,
    )?;
    check_signature(
        &receipt.referee,
        encode_receipt(receipt),
        &chain.sign_over_receipt,
        SignatureRole::RefereeOverReceipt,
    )?;
    if let Some(delegation) = &chain.delegation {
        check_signature(
            &receipt.worker,
            encode_insurance(receipt, &chain.sign_over_receipt, &delegation.employer),
            &delegation.worker_sign,
            SignatureRole::WorkerOverInsurance,
        )?;
    }
    Ok(())
}

/// Verifies a chain against the given chain state.
///
/// `expected_employer` is the presenter of a claim; when set, the chain must
/// carry a delegation to exactly that key. `consumed` is the replay flag for
/// the chain's dedup key.
pub fn verify_chain(
    chain: &SignatureChain,
    expected_genesis: &GenesisHash,
    expected_employer: Option<&PublicKeyBytes>,
    current_block: u64,
    consumed: bool,
) -> Verdict {
    if let Err(reason) = check_structure(chain, expected_genesis, expected_employer) {
        return Verdict::Invalid(reason);
    }
    if current_block > chain.receipt.expiry_block {
        return Verdict::Expired {
            expiry_block: chain.receipt.expiry_block,
            current_block,
        };
    }
    if consumed {
        return Verdict::AlreadyUsed;
    }
    Verdict::Valid
}

/// A reimbursement that made it into a block.
#[derive(Serialize, Debug, Clone, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Reimbursement {
    pub tx_hash: Option<String>,
    pub finalized: bool,
}

/// Verification and reimbursement against live chain state.
pub struct Verifier {
    chain: Arc<dyn ChainClient>,
    store: Arc<dyn RecordStore>,
}

impl Verifier {
    /// Creates a verifier reading live state from `chain` and the replay
    /// mirror from `store`.
    pub fn new(chain: Arc<dyn ChainClient>, store: Arc<dyn RecordStore>) -> Self {
        Self { chain, store }
    }

    /// Verifies `chain` at the current block against the local replay mirror.
    ///
    /// # Arguments
    /// * `chain` - The presented signature chain
    /// * `expected_employer` - Presenter of a claim, if any
    /// * `already_used` - Used-flag carried by the presented record itself;
    ///   combined with the store's consumed set
    ///
    /// # Errors
    /// Chain errors while reading genesis or the current block. A bad chain is
    /// a [`Verdict`], not an error.
    pub async fn verify(
        &self,
        chain: &SignatureChain,
        expected_employer: Option<&PublicKeyBytes>,
        already_used: bool,
    ) -> Result<Verdict> {
        let genesis = self.chain.genesis_hash().await?;
        let current_block = self.chain.current_block().await?;
        let consumed = already_used || self.store.is_consumed(chain);
        let verdict = verify_chain(chain, &genesis, expected_employer, current_block, consumed);
        if !verdict.is_valid() {
            info!(
                "verify: letter {} of {} is {}",
                chain.receipt.letter_number, chain.receipt.referee, verdict
            );
        }
        Ok(verdict)
    }

    /// Verifies a diploma presented on its own (no delegation).
    pub async fn verify_letter(&self, letter: &Letter) -> Result<Verdict> {
        self.verify(&letter.chain(), None, false).await
    }

    /// Verifies a claim as presented by its employer.
    ///
    /// A claim whose own `was_used` is set is `AlreadyUsed` whether or not it
    /// was ever stored locally.
    pub async fn verify_insurance(&self, insurance: &Insurance) -> Result<Verdict> {
        if insurance.block_allowed != insurance.receipt.expiry_block {
            let reason = InvalidReason::Malformed(format!(
                "blockAllowed {} differs from signed expiry {}",
                insurance.block_allowed, insurance.receipt.expiry_block
            ));
            info!(
                "verify: letter {} of {} is invalid: {}",
                insurance.receipt.letter_number, insurance.receipt.referee, reason
            );
            return Ok(Verdict::Invalid(reason));
        }
        self.verify(&insurance.chain(), Some(&insurance.employer), insurance.was_used)
            .await
    }

    /// Verifies and submits a claim, then waits for inclusion.
    ///
    /// The local used-flag is set only once the call is in a block. If the
    /// chain already paid out this diploma the local mirror is brought up to
    /// date and `AlreadyUsed` is returned without submitting.
    ///
    /// # Errors
    /// - Any non-valid verdict, mapped by [`Verdict::into_result`]
    /// - `Chain(Module(_))` when the runtime rejected the call
    /// - `Chain(Dropped)` when the event stream ended without inclusion
    pub async fn reimburse(&self, insurance: &Insurance) -> Result<Reimbursement> {
        self.verify_insurance(insurance).await?.into_result()?;
        let chain = insurance.chain();

        let receipt = &insurance.receipt;
        if self
            .chain
            .is_reimbursed(&receipt.referee, receipt.letter_number)
            .await?
        {
            warn!(
                "reimburse: chain reports letter {} of {} as used",
                receipt.letter_number, receipt.referee
            );
            self.store.mark_consumed(&chain);
            return Err(ProtocolError::AlreadyUsed);
        }

        let mut events = self
            .chain
            .submit(ReimburseCall::from(insurance), &insurance.employer)
            .await?;

        let mut tx_hash = None;
        while let Some(event) = events.next().await {
            match event {
                TxEvent::Submitted(hash) => {
                    info!("reimburse: letter {} submitted as {}", receipt.letter_number, hash);
                    tx_hash = Some(hash);
                }
                TxEvent::InBlock | TxEvent::Finalized => {
                    let finalized = event == TxEvent::Finalized;
                    self.store.mark_consumed(&chain);
                    info!(
                        "reimburse: letter {} of {} paid to {}",
                        receipt.letter_number, receipt.referee, insurance.employer
                    );
                    return Ok(Reimbursement { tx_hash, finalized });
                }
                TxEvent::Failed(reason) => {
                    error!("reimburse: letter {} rejected: {}", receipt.letter_number, reason);
                    return Err(ChainError::Module(reason).into());
                }
            }
        }
        error!("reimburse: letter {} dropped before inclusion", receipt.letter_number);
        Err(ChainError::Dropped.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::chain::Delegation;
    use crate::models::keys::{Amount, ContentId};
    use crate::models::letter::Receipt;
    use crate::services::signature_chain::SignatureChainBuilder;
    use crate::wallet::key_management::KeyManager;

    const GENESIS: GenesisHash = GenesisHash([7u8; 32]);

    struct Fixture {
        keys: KeyManager,
        builder: SignatureChainBuilder,
        chain: SignatureChain,
        employer: PublicKeyBytes,
    }

    fn fixture() -> Fixture {
        let keys = KeyManager::new();
        let referee = keys.generate_account("referee");
        let worker = keys.generate_account("worker");
        let employer = keys.generate_account("employer");
        let builder = SignatureChainBuilder::new(Arc::new(keys.clone()));
        let receipt = Receipt {
            genesis: GENESIS,
            letter_number: 0,
            expiry_block: 100,
            referee,
            worker,
            amount: Amount::from_u128(572_000_000_000_000),
        };
        let cid = ContentId::new("bafkreiskill").unwrap();
        let grant = tokio_test::block_on(builder.sign_grant(&cid, &receipt)).unwrap();
        let chain = SignatureChain {
            cid,
            receipt,
            sign_over_private_data: grant.sign_over_private_data,
            sign_over_receipt: grant.sign_over_receipt,
            delegation: None,
        };
        Fixture { keys, builder, chain, employer }
    }

    fn delegate(f: &Fixture) -> SignatureChain {
        let worker_sign = tokio_test::block_on(f.builder.sign_usage_right(
            &f.chain.receipt,
            &f.chain.sign_over_receipt,
            &f.employer,
        ))
        .unwrap();
        SignatureChain {
            delegation: Some(Delegation { employer: f.employer, worker_sign }),
            ..f.chain.clone()
        }
    }

    #[test]
    fn test_grant_valid_until_expiry() {
        let f = fixture();
        assert_eq!(verify_chain(&f.chain, &GENESIS, None, 50, false), Verdict::Valid);
        assert_eq!(verify_chain(&f.chain, &GENESIS, None, 100, false), Verdict::Valid);
        assert_eq!(
            verify_chain(&f.chain, &GENESIS, None, 150, false),
            Verdict::Expired { expiry_block: 100, current_block: 150 }
        );
    }

    #[test]
    fn test_delegated_chain_and_replay() {
        let f = fixture();
        let chain = delegate(&f);
        assert_eq!(verify_chain(&chain, &GENESIS, Some(&f.employer), 50, false), Verdict::Valid);
        assert_eq!(
            verify_chain(&chain, &GENESIS, Some(&f.employer), 50, true),
            Verdict::AlreadyUsed
        );
        // expiry takes precedence over replay
        assert!(matches!(
            verify_chain(&chain, &GENESIS, Some(&f.employer), 150, true),
            Verdict::Expired { .. }
        ));
    }

    #[test]
    fn test_tampered_amount_is_invalid() {
        let f = fixture();
        let mut chain = f.chain.clone();
        chain.receipt.amount = Amount::from_u128(572_000_000_000_001);
        assert_eq!(
            verify_chain(&chain, &GENESIS, None, 50, false),
            Verdict::Invalid(InvalidReason::SignatureMismatch(SignatureRole::RefereeOverPrivateData))
        );
    }

    #[test]
    fn test_swapped_content_id_breaks_private_signature_only() {
        let f = fixture();
        let mut chain = f.chain.clone();
        chain.cid = ContentId::new("bafkreiother").unwrap();
        assert_eq!(
            verify_chain(&chain, &GENESIS, None, 50, false),
            Verdict::Invalid(InvalidReason::SignatureMismatch(SignatureRole::RefereeOverPrivateData))
        );
    }

    #[test]
    fn test_wrong_genesis_is_invalid() {
        let f = fixture();
        assert_eq!(
            verify_chain(&f.chain, &GenesisHash([8u8; 32]), None, 50, false),
            Verdict::Invalid(InvalidReason::WrongGenesis)
        );
    }

    #[test]
    fn test_delegation_bound_to_employer() {
        let f = fixture();
        let chain = delegate(&f);
        let stranger = f.keys.generate_account("stranger");
        assert_eq!(
            verify_chain(&chain, &GENESIS, Some(&stranger), 50, false),
            Verdict::Invalid(InvalidReason::WrongEmployer)
        );

        // relabelling the employer breaks the worker signature
        let mut relabelled = chain.clone();
        if let Some(d) = relabelled.delegation.as_mut() {
            d.employer = stranger;
        }
        assert_eq!(
            verify_chain(&relabelled, &GENESIS, Some(&stranger), 50, false),
            Verdict::Invalid(InvalidReason::SignatureMismatch(SignatureRole::WorkerOverInsurance))
        );

        assert!(matches!(
            verify_chain(&f.chain, &GENESIS, Some(&f.employer), 50, false),
            Verdict::Invalid(InvalidReason::Malformed(_))
        ));
    }

    #[test]
    fn test_forged_worker_signature() {
        let f = fixture();
        let mut chain = delegate(&f);
        if let Some(d) = chain.delegation.as_mut() {
            d.worker_sign = SignatureBytes([1u8; 64]);
        }
        assert_eq!(
            verify_chain(&chain, &GENESIS, Some(&f.employer), 50, false),
            Verdict::Invalid(InvalidReason::SignatureMismatch(SignatureRole::WorkerOverInsurance))
        );
    }

    #[test]
    fn test_verdict_into_result() {
        assert!(Verdict::Valid.into_result().is_ok());
        assert!(matches!(Verdict::AlreadyUsed.into_result(), Err(ProtocolError::AlreadyUsed)));
        assert!(matches!(
            Verdict::Expired { expiry_block: 1, current_block: 2 }.into_result(),
            Err(ProtocolError::Expired { expiry_block: 1, current_block: 2 })
        ));
    }
}
