// src/wallet/credential_storage.rs
//! Record storage for letters, usage rights, insurances and signer counters.
//!
//! [`RecordStore`] is the persistence contract the protocol core relies on:
//! get-by-key, add-if-absent and modify operations keyed by the dedup fields
//! of each record kind. [`MemoryStore`] is the in-process implementation used
//! by the service and the tests.
//!
//! # Letter numbers
//! `allocate_letter_number` is an atomic read-modify-write and is what
//! issuance uses. `next_letter_number` + `set_last_used_letter_number` is the
//! split read-then-write pair kept for backup merging; two issuers that both
//! read before either writes will mint the same number.

use crate::error::{ProtocolError, Result};
use crate::models::chain::SignatureChain;
use crate::models::insurance::{Insurance, UsageRight};
use crate::models::keys::{PublicKeyBytes, SignatureBytes};
use crate::models::letter::{Letter, LetterStatus, SignerRecord};
use log::{debug, warn};
use std::collections::{HashMap, HashSet};
use std::sync::{Mutex, MutexGuard, PoisonError};

/// Persistence contract of the diploma core.
pub trait RecordStore: Send + Sync {
    /// Atomically reserves the next letter number for `referee`.
    ///
    /// The first number for a key is 0; afterwards `last + 1`.
    fn allocate_letter_number(&self, referee: &PublicKeyBytes) -> Result<u32>;

    /// Rolls back an allocation if it is still the latest one for `referee`.
    ///
    /// # Returns
    /// `true` if the counter was rolled back, `false` if a later number was
    /// allocated in the meantime
    fn release_letter_number(&self, referee: &PublicKeyBytes, number: u32) -> bool;

    /// Reads the number the next letter would get, without reserving it.
    fn next_letter_number(&self, referee: &PublicKeyBytes) -> u32;

    /// Records `number` as used. Counters never move backwards.
    fn set_last_used_letter_number(&self, referee: &PublicKeyBytes, number: u32);

    /// Every signer counter, sorted by key.
    fn signers(&self) -> Vec<SignerRecord>;

    /// Adds a letter unless one with the same receipt signature exists.
    ///
    /// # Returns
    /// `true` if the letter was added
    fn store_letter(&self, letter: Letter) -> bool;

    /// Looks up a letter by its receipt signature.
    fn letter(&self, sign_over_receipt: &SignatureBytes) -> Option<Letter>;

    /// All letters, oldest first.
    fn letters(&self) -> Vec<Letter>;

    /// Letters issued to `worker`, in the order of [`RecordStore::letters`].
    fn letters_for_worker(&self, worker: &PublicKeyBytes) -> Vec<Letter>;

    /// Adds a usage right unless one with the same worker signature exists.
    ///
    /// # Returns
    /// `true` if the usage right was added
    fn store_usage_right(&self, usage_right: UsageRight) -> bool;

    /// All usage rights a worker has granted, oldest first.
    fn usage_rights(&self) -> Vec<UsageRight>;

    /// Adds an insurance unless one with the same worker signature exists.
    /// An existing unused record is upgraded when the incoming one is used.
    ///
    /// # Returns
    /// `true` only if the insurance was added
    fn store_insurance(&self, insurance: Insurance) -> bool;

    /// Looks up a claim by the worker's delegation signature.
    fn insurance(&self, worker_sign: &SignatureBytes) -> Option<Insurance>;

    /// All claims held by employers, oldest first.
    fn insurances(&self) -> Vec<Insurance>;

    /// True if the stored insurance of the claim is marked used or its
    /// diploma was consumed by any claim. A claim that was never stored is
    /// judged by its diploma alone.
    fn is_consumed(&self, chain: &SignatureChain) -> bool;

    /// Flips the used flag for the claim and its diploma. Returns `true` only
    /// for the first caller.
    fn mark_consumed(&self, chain: &SignatureChain) -> bool;

    /// Lifecycle position of a stored letter, `None` if it is unknown.
    fn letter_status(&self, sign_over_receipt: &SignatureBytes) -> Option<LetterStatus>;
}

#[derive(Default)]
struct Tables {
    letters: HashMap<SignatureBytes, Letter>,
    usage_rights: HashMap<SignatureBytes, UsageRight>,
    insurances: HashMap<SignatureBytes, Insurance>,
    signers: HashMap<PublicKeyBytes, u32>,
    consumed: HashSet<(PublicKeyBytes, u32)>,
}

/// In-memory [`RecordStore`]; every operation runs under one lock.
#[derive(Default)]
pub struct MemoryStore {
    tables: Mutex<Tables>,
}

impl MemoryStore {
    /// Creates an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    fn tables(&self) -> MutexGuard<'_, Tables> {
        self.tables.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl RecordStore for MemoryStore {
    fn allocate_letter_number(&self, referee: &PublicKeyBytes) -> Result<u32> {
        let mut tables = self.tables();
        let next = match tables.signers.get(referee) {
            None => 0,
            Some(last) => last.checked_add(1).ok_or_else(|| {
                ProtocolError::malformed(format!("letter numbers exhausted for {}", referee))
            })?,
        };
        tables.signers.insert(*referee, next);
        debug!("store: allocated letter number {} for {}", next, referee);
        Ok(next)
    }

    fn release_letter_number(&self, referee: &PublicKeyBytes, number: u32) -> bool {
        let mut tables = self.tables();
        if tables.signers.get(referee) != Some(&number) {
            return false;
        }
        match number.checked_sub(1) {
            Some(previous) => tables.signers.insert(*referee, previous),
            None => tables.signers.remove(referee),
        };
        debug!("store: released letter number {} for {}", number, referee);
        true
    }

    fn next_letter_number(&self, referee: &PublicKeyBytes) -> u32 {
        self.tables()
            .signers
            .get(referee)
            .map_or(0, |last| last.saturating_add(1))
    }

    fn set_last_used_letter_number(&self, referee: &PublicKeyBytes, number: u32) {
        let mut tables = self.tables();
        let last = tables.signers.entry(*referee).or_insert(number);
        if number > *last {
            *last = number;
        }
    }

    fn signers(&self) -> Vec<SignerRecord> {
        let mut signers: Vec<SignerRecord> = self
            .tables()
            .signers
            .iter()
            .map(|(public_key, last)| SignerRecord {
                public_key: *public_key,
                last_letter_number: *last,
            })
            .collect();
        signers.sort_by(|a, b| a.public_key.cmp(&b.public_key));
        signers
    }

    fn store_letter(&self, letter: Letter) -> bool {
        let mut tables = self.tables();
        if tables.letters.contains_key(&letter.sign_over_receipt) {
            return false;
        }
        tables.letters.insert(letter.sign_over_receipt, letter);
        true
    }

    fn letter(&self, sign_over_receipt: &SignatureBytes) -> Option<Letter> {
        self.tables().letters.get(sign_over_receipt).cloned()
    }

    fn letters(&self) -> Vec<Letter> {
        let mut letters: Vec<Letter> = self.tables().letters.values().cloned().collect();
        letters.sort_by(|a, b| {
            a.created
                .cmp(&b.created)
                .then(a.receipt.letter_number.cmp(&b.receipt.letter_number))
        });
        letters
    }

    fn letters_for_worker(&self, worker: &PublicKeyBytes) -> Vec<Letter> {
        self.letters()
            .into_iter()
            .filter(|letter| letter.receipt.worker == *worker)
            .collect()
    }

    fn store_usage_right(&self, usage_right: UsageRight) -> bool {
        let mut tables = self.tables();
        if tables.usage_rights.contains_key(&usage_right.sign) {
            return false;
        }
        tables.usage_rights.insert(usage_right.sign, usage_right);
        true
    }

    fn usage_rights(&self) -> Vec<UsageRight> {
        let mut rights: Vec<UsageRight> = self.tables().usage_rights.values().cloned().collect();
        rights.sort_by(|a, b| a.created.cmp(&b.created));
        rights
    }

    fn store_insurance(&self, insurance: Insurance) -> bool {
        let mut tables = self.tables();
        if insurance.was_used {
            let chain = insurance.chain();
            tables.consumed.insert(chain.letter_id());
        }
        match tables.insurances.get_mut(&insurance.worker_sign) {
            None => {
                tables.insurances.insert(insurance.worker_sign, insurance);
                true
            }
            Some(existing) => {
                if !existing.was_used && insurance.was_used {
                    existing.was_used = true;
                }
                false
            }
        }
    }

    fn insurance(&self, worker_sign: &SignatureBytes) -> Option<Insurance> {
        self.tables().insurances.get(worker_sign).cloned()
    }

    fn insurances(&self) -> Vec<Insurance> {
        let mut insurances: Vec<Insurance> = self.tables().insurances.values().cloned().collect();
        insurances.sort_by(|a, b| a.created.cmp(&b.created));
        insurances
    }

    fn is_consumed(&self, chain: &SignatureChain) -> bool {
        let tables = self.tables();
        if tables.consumed.contains(&chain.letter_id()) {
            return true;
        }
        chain
            .delegation
            .as_ref()
            .and_then(|d| tables.insurances.get(&d.worker_sign))
            .map_or(false, |insurance| insurance.was_used)
    }

    fn mark_consumed(&self, chain: &SignatureChain) -> bool {
        let mut tables = self.tables();
        let first = tables.consumed.insert(chain.letter_id());
        if let Some(delegation) = &chain.delegation {
            if let Some(insurance) = tables.insurances.get_mut(&delegation.worker_sign) {
                insurance.was_used = true;
            }
        }
        if !first {
            warn!(
                "store: letter {} of {} was already consumed",
                chain.receipt.letter_number, chain.receipt.referee
            );
        }
        first
    }

    fn letter_status(&self, sign_over_receipt: &SignatureBytes) -> Option<LetterStatus> {
        let tables = self.tables();
        let letter = tables.letters.get(sign_over_receipt)?;
        if tables
            .consumed
            .contains(&(letter.receipt.referee, letter.receipt.letter_number))
        {
            return Some(LetterStatus::Used);
        }
        let delegated = tables
            .usage_rights
            .values()
            .any(|right| right.sign_over_receipt == *sign_over_receipt);
        Some(if delegated {
            LetterStatus::Delegated
        } else {
            LetterStatus::Issued
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::keys::{Amount, ContentId, GenesisHash};
    use crate::models::letter::Receipt;
    use chrono::Utc;
    use std::sync::Arc;

    fn referee() -> PublicKeyBytes {
        PublicKeyBytes([2u8; 33])
    }

    fn create_test_letter(number: u32, receipt_sig: u8) -> Letter {
        Letter {
            created: Utc::now(),
            cid: ContentId::new("bafkreiskill").unwrap(),
            worker_id: "worker".into(),
            receipt: Receipt {
                genesis: GenesisHash([1u8; 32]),
                letter_number: number,
                expiry_block: 100,
                referee: referee(),
                worker: PublicKeyBytes([3u8; 33]),
                amount: Amount::from_u128(10),
            },
            sign_over_private_data: SignatureBytes([4u8; 64]),
            sign_over_receipt: SignatureBytes([receipt_sig; 64]),
        }
    }

    fn create_test_insurance(worker_sign: u8) -> Insurance {
        Insurance::from_letter(
            &create_test_letter(0, 5),
            PublicKeyBytes([9u8; 33]),
            SignatureBytes([worker_sign; 64]),
        )
    }

    #[test]
    fn test_letter_numbers_start_at_zero_and_increase() {
        let store = MemoryStore::new();
        let numbers: Vec<u32> = (0..5)
            .map(|_| store.allocate_letter_number(&referee()).unwrap())
            .collect();
        assert_eq!(numbers, vec![0, 1, 2, 3, 4]);
        assert_eq!(store.next_letter_number(&referee()), 5);
        // counters are per signer
        assert_eq!(store.allocate_letter_number(&PublicKeyBytes([7u8; 33])).unwrap(), 0);
    }

    #[test]
    fn test_release_only_rolls_back_latest() {
        let store = MemoryStore::new();
        let first = store.allocate_letter_number(&referee()).unwrap();
        let second = store.allocate_letter_number(&referee()).unwrap();
        assert!(!store.release_letter_number(&referee(), first));
        assert!(store.release_letter_number(&referee(), second));
        assert_eq!(store.allocate_letter_number(&referee()).unwrap(), second);
        // releasing the very first number forgets the signer
        let other = PublicKeyBytes([8u8; 33]);
        let n = store.allocate_letter_number(&other).unwrap();
        assert!(store.release_letter_number(&other, n));
        assert_eq!(store.next_letter_number(&other), 0);
    }

    #[test]
    fn test_read_then_write_collides() {
        // Two issuers read the counter before either records its letter:
        // both mint the same number. This is why issuance allocates atomically.
        let store = MemoryStore::new();
        let first_tab = store.next_letter_number(&referee());
        let second_tab = store.next_letter_number(&referee());
        store.set_last_used_letter_number(&referee(), first_tab);
        store.set_last_used_letter_number(&referee(), second_tab);
        assert_eq!(first_tab, second_tab);
        assert_eq!(store.signers()[0].last_letter_number, 0);
    }

    #[test]
    fn test_concurrent_allocation_is_unique() {
        let store = Arc::new(MemoryStore::new());
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let store = store.clone();
                std::thread::spawn(move || {
                    (0..50)
                        .map(|_| store.allocate_letter_number(&referee()).unwrap())
                        .collect::<Vec<_>>()
                })
            })
            .collect();
        let mut all: Vec<u32> = handles
            .into_iter()
            .flat_map(|h| h.join().unwrap())
            .collect();
        all.sort_unstable();
        assert_eq!(all, (0..400).collect::<Vec<u32>>());
    }

    #[test]
    fn test_counter_never_moves_backwards() {
        let store = MemoryStore::new();
        store.set_last_used_letter_number(&referee(), 10);
        store.set_last_used_letter_number(&referee(), 3);
        assert_eq!(store.next_letter_number(&referee()), 11);
    }

    #[test]
    fn test_letters_dedup_by_receipt_signature() {
        let store = MemoryStore::new();
        assert!(store.store_letter(create_test_letter(0, 5)));
        assert!(!store.store_letter(create_test_letter(1, 5)));
        assert!(store.store_letter(create_test_letter(1, 6)));
        assert_eq!(store.letters().len(), 2);
        assert_eq!(store.letters_for_worker(&PublicKeyBytes([3u8; 33])).len(), 2);
        assert!(store.letters_for_worker(&referee()).is_empty());
    }

    #[test]
    fn test_usage_right_stored_once() {
        let store = MemoryStore::new();
        let right = UsageRight {
            created: Utc::now(),
            sign_over_receipt: SignatureBytes([5u8; 64]),
            employer: PublicKeyBytes([9u8; 33]),
            sign: SignatureBytes([6u8; 64]),
        };
        assert!(store.store_usage_right(right.clone()));
        assert!(!store.store_usage_right(right));
        assert_eq!(store.usage_rights().len(), 1);
    }

    #[test]
    fn test_insurance_used_flag_is_upgrade_only() {
        let store = MemoryStore::new();
        let insurance = create_test_insurance(6);
        assert!(store.store_insurance(insurance.clone()));

        let mut used = insurance.clone();
        used.was_used = true;
        assert!(!store.store_insurance(used));
        assert!(store.insurance(&insurance.worker_sign).unwrap().was_used);

        // a stale unused copy cannot reset the flag
        assert!(!store.store_insurance(insurance.clone()));
        assert!(store.insurance(&insurance.worker_sign).unwrap().was_used);
        assert!(store.is_consumed(&insurance.chain()));
    }

    #[test]
    fn test_mark_consumed_first_write_wins() {
        let store = MemoryStore::new();
        let insurance = create_test_insurance(6);
        store.store_insurance(insurance.clone());
        let chain = insurance.chain();
        assert!(!store.is_consumed(&chain));
        assert!(store.mark_consumed(&chain));
        assert!(!store.mark_consumed(&chain));
        assert!(store.is_consumed(&chain));
        assert!(store.insurance(&insurance.worker_sign).unwrap().was_used);

        // another employer's claim on the same diploma is consumed too
        let sibling = Insurance::from_letter(
            &create_test_letter(0, 5),
            PublicKeyBytes([10u8; 33]),
            SignatureBytes([7u8; 64]),
        );
        assert!(store.is_consumed(&sibling.chain()));
    }

    #[test]
    fn test_letter_status_transitions() {
        let store = MemoryStore::new();
        let letter = create_test_letter(0, 5);
        store.store_letter(letter.clone());
        assert_eq!(store.letter_status(&letter.sign_over_receipt), Some(LetterStatus::Issued));

        store.store_usage_right(UsageRight {
            created: Utc::now(),
            sign_over_receipt: letter.sign_over_receipt,
            employer: PublicKeyBytes([9u8; 33]),
            sign: SignatureBytes([6u8; 64]),
        });
        assert_eq!(store.letter_status(&letter.sign_over_receipt), Some(LetterStatus::Delegated));

        store.mark_consumed(&letter.chain());
        assert_eq!(store.letter_status(&letter.sign_over_receipt), Some(LetterStatus::Used));
        assert_eq!(store.letter_status(&SignatureBytes([0u8; 64])), None);
    }
}
