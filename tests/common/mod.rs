//! In-process fakes of the chain and the content store.

#![allow(dead_code)]

use async_trait::async_trait;
use diploma_system::blockchain::{ChainClient, ChainError, ReimburseCall, TxEvent, TxEventStream};
use diploma_system::models::{ContentId, GenesisHash, PublicKeyBytes};
use diploma_system::services::{
    DiplomaDefaults, DiplomaIssuer, SignatureChainBuilder, Verifier,
};
use diploma_system::storage::{ContentStore, StorageError};
use diploma_system::utils::crypto::hash_data;
use diploma_system::utils::serialization::to_hex;
use diploma_system::wallet::{KeyManager, MemoryStore, RecordStore};
use futures::stream::{self, StreamExt};
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};

pub const GENESIS: GenesisHash = GenesisHash([0x42; 32]);

pub struct MockChain {
    pub current_block: Mutex<u64>,
    pub block_time_ms: Mutex<Option<u64>>,
    pub reimbursed: Mutex<HashSet<(PublicKeyBytes, u32)>>,
    /// Events replayed by the next `submit`
    pub script: Mutex<Vec<TxEvent>>,
    pub submitted: Mutex<Vec<(ReimburseCall, PublicKeyBytes)>>,
}

impl MockChain {
    pub fn new(current_block: u64, block_time_ms: Option<u64>) -> Self {
        Self {
            current_block: Mutex::new(current_block),
            block_time_ms: Mutex::new(block_time_ms),
            reimbursed: Mutex::new(HashSet::new()),
            script: Mutex::new(vec![
                TxEvent::Submitted("0xfeed".into()),
                TxEvent::InBlock,
                TxEvent::Finalized,
            ]),
            submitted: Mutex::new(Vec::new()),
        }
    }

    pub fn set_block(&self, block: u64) {
        *self.current_block.lock().unwrap() = block;
    }

    pub fn script(&self, events: Vec<TxEvent>) {
        *self.script.lock().unwrap() = events;
    }

    pub fn submissions(&self) -> usize {
        self.submitted.lock().unwrap().len()
    }
}

#[async_trait]
impl ChainClient for MockChain {
    async fn current_block(&self) -> Result<u64, ChainError> {
        Ok(*self.current_block.lock().unwrap())
    }

    async fn block_time_ms(&self) -> Result<Option<u64>, ChainError> {
        Ok(*self.block_time_ms.lock().unwrap())
    }

    async fn genesis_hash(&self) -> Result<GenesisHash, ChainError> {
        Ok(GENESIS)
    }

    async fn is_reimbursed(&self, referee: &PublicKeyBytes, letter_number: u32) -> Result<bool, ChainError> {
        Ok(self.reimbursed.lock().unwrap().contains(&(*referee, letter_number)))
    }

    async fn submit(&self, call: ReimburseCall, signer: &PublicKeyBytes) -> Result<TxEventStream, ChainError> {
        let events = self.script.lock().unwrap().clone();
        if events.iter().any(|e| e.is_included()) {
            self.reimbursed
                .lock()
                .unwrap()
                .insert((call.referee, call.letter_number));
        }
        self.submitted.lock().unwrap().push((call, *signer));
        Ok(stream::iter(events).boxed())
    }
}

/// Content store keyed by the hex digest of the document.
#[derive(Default)]
pub struct MemoryContentStore {
    docs: Mutex<HashMap<String, Vec<u8>>>,
}

#[async_trait]
impl ContentStore for MemoryContentStore {
    async fn put(&self, data: &[u8]) -> Result<ContentId, StorageError> {
        let id = format!("mem{}", &to_hex(&hash_data(data))[2..]);
        self.docs.lock().unwrap().insert(id.clone(), data.to_vec());
        ContentId::new(id.clone()).map_err(|_| StorageError::InvalidId(id))
    }

    async fn fetch(&self, cid: &ContentId) -> Result<Vec<u8>, StorageError> {
        self.docs
            .lock()
            .unwrap()
            .get(cid.as_str())
            .cloned()
            .ok_or_else(|| StorageError::NotFound(cid.to_string()))
    }
}

/// Referee, worker and employer accounts with services wired to fakes.
pub struct World {
    pub keys: KeyManager,
    pub chain: Arc<MockChain>,
    pub store: Arc<MemoryStore>,
    pub issuer: DiplomaIssuer,
    pub verifier: Verifier,
    pub referee: PublicKeyBytes,
    pub worker: PublicKeyBytes,
    pub employer: PublicKeyBytes,
}

impl World {
    pub fn new(current_block: u64, block_time_ms: Option<u64>) -> Self {
        let keys = KeyManager::new();
        let referee = keys.generate_account("referee");
        let worker = keys.generate_account("worker");
        let employer = keys.generate_account("employer");
        let chain = Arc::new(MockChain::new(current_block, block_time_ms));
        let store = Arc::new(MemoryStore::new());
        let builder = SignatureChainBuilder::new(Arc::new(keys.clone()));
        let issuer = DiplomaIssuer::new(
            chain.clone(),
            store.clone() as Arc<dyn RecordStore>,
            builder,
            DiplomaDefaults::default(),
        );
        let verifier = Verifier::new(chain.clone(), store.clone());
        Self {
            keys,
            chain,
            store,
            issuer,
            verifier,
            referee,
            worker,
            employer,
        }
    }
}
