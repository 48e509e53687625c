// src/blockchain/rpc_client.rs
//! JSON-RPC chain client implementation.
//!
//! Talks to an EVM node through `ethers`: block telemetry from the provider,
//! the used-flag and reimbursement through the letters registry contract.

use crate::blockchain::{ChainClient, ChainError, ReimburseCall, TxEvent, TxEventStream};
use crate::contracts::letters_registry::LettersRegistry;
use crate::models::keys::{GenesisHash, PublicKeyBytes};
use crate::utils::serialization::from_hex_fixed;
use crate::wallet::key_management::{public_key_of, KeyManager};
use async_trait::async_trait;
use ethers::middleware::SignerMiddleware;
use ethers::providers::{Http, Middleware, Provider};
use ethers::signers::{LocalWallet, Signer as _};
use ethers::types::{Address, BlockId, BlockNumber, U64};
use futures::channel::mpsc;
use futures::StreamExt;
use k256::ecdsa::SigningKey;
use k256::SecretKey;
use log::{debug, error, info};
use std::sync::Arc;

type SignedProvider = SignerMiddleware<Provider<Http>, LocalWallet>;

/// Chain client backed by an HTTP JSON-RPC endpoint.
///
/// Reimbursements are sent from the employer's own account when a keyring is
/// attached and holds it unlocked. The wallet built from the configured
/// private key pays for claims presented under its own key.
#[derive(Clone)]
pub struct RpcChainClient {
    provider: Arc<Provider<Http>>,
    registry: LettersRegistry<SignedProvider>,
    payer: PublicKeyBytes,
    chain_id: u64,
    keyring: Option<KeyManager>,
    block_time_sample: u64,
}

impl RpcChainClient {
    /// Creates a new client.
    ///
    /// # Arguments
    /// * `rpc_url` - RPC endpoint URL
    /// * `letters_contract` - Address of the letters registry
    /// * `private_key` - Hex-encoded key of the paying account (with or without 0x)
    /// * `block_time_sample` - How many recent blocks to average block time over
    ///
    /// # Errors
    /// `ChainError::Config` for bad arguments, `ChainError::Rpc` if the chain
    /// id cannot be retrieved.
    pub async fn new(
        rpc_url: &str,
        letters_contract: &str,
        private_key: &str,
        block_time_sample: u64,
    ) -> Result<Self, ChainError> {
        let provider = Provider::<Http>::try_from(rpc_url)
            .map_err(|e| ChainError::Config(format!("invalid rpc url: {}", e)))?;
        let address: Address = letters_contract
            .parse()
            .map_err(|e| ChainError::Config(format!("invalid contract address: {}", e)))?;
        let secret_bytes = from_hex_fixed::<32>(private_key).map_err(ChainError::Config)?;
        let secret_key = SecretKey::from_slice(&secret_bytes)
            .map_err(|_| ChainError::Config("private key is not a valid secp256k1 scalar".into()))?;

        let chain_id = provider
            .get_chainid()
            .await
            .map_err(|e| ChainError::Rpc(e.to_string()))?
            .as_u64();
        let client = Self::from_parts(provider, address, &secret_key, chain_id, block_time_sample)?;

        info!("chain: connected to {} (chain id {}), registry {:?}", rpc_url, chain_id, address);
        Ok(client)
    }

    fn from_parts(
        provider: Provider<Http>,
        address: Address,
        secret_key: &SecretKey,
        chain_id: u64,
        block_time_sample: u64,
    ) -> Result<Self, ChainError> {
        let registry = Self::signed_registry(&provider, address, SigningKey::from(secret_key), chain_id)?;
        Ok(Self {
            provider: Arc::new(provider),
            registry,
            payer: public_key_of(secret_key),
            chain_id,
            keyring: None,
            block_time_sample: block_time_sample.max(1),
        })
    }

    fn signed_registry(
        provider: &Provider<Http>,
        address: Address,
        signing_key: SigningKey,
        chain_id: u64,
    ) -> Result<LettersRegistry<SignedProvider>, ChainError> {
        let wallet = LocalWallet::from(signing_key).with_chain_id(chain_id);
        let signed = Arc::new(SignerMiddleware::new(provider.clone(), wallet));
        LettersRegistry::new(signed, address)
    }

    /// Lets `submit` send transactions from accounts held in `keyring`.
    pub fn with_keyring(mut self, keyring: KeyManager) -> Self {
        self.keyring = Some(keyring);
        self
    }

    /// Public key of the configured paying account.
    pub fn payer(&self) -> PublicKeyBytes {
        self.payer
    }

    /// Registry bound to a wallet for `signer`.
    ///
    /// # Errors
    /// `ChainError::Submission` if `signer` is neither the payer nor an
    /// unlocked keyring account.
    fn registry_for(&self, signer: &PublicKeyBytes) -> Result<LettersRegistry<SignedProvider>, ChainError> {
        if *signer == self.payer {
            return Ok(self.registry.clone());
        }
        let keyring = self.keyring.as_ref().ok_or_else(|| {
            ChainError::Submission(format!(
                "{} is not the paying account and no keyring is attached",
                signer
            ))
        })?;
        let signing_key = keyring
            .signing_key(signer)
            .map_err(|e| ChainError::Submission(e.to_string()))?;
        debug!("chain: sending from keyring account {}", signer);
        Self::signed_registry(&self.provider, self.registry.address(), signing_key, self.chain_id)
    }

    async fn block_timestamp(&self, number: u64) -> Result<Option<u64>, ChainError> {
        let block = self
            .provider
            .get_block(BlockId::Number(BlockNumber::Number(U64::from(number))))
            .await
            .map_err(|e| ChainError::Rpc(e.to_string()))?;
        Ok(block.map(|b| b.timestamp.low_u64()))
    }
}

#[async_trait]
impl ChainClient for RpcChainClient {
    async fn current_block(&self) -> Result<u64, ChainError> {
        self.provider
            .get_block_number()
            .await
            .map(|n| n.as_u64())
            .map_err(|e| ChainError::Rpc(e.to_string()))
    }

    async fn block_time_ms(&self) -> Result<Option<u64>, ChainError> {
        let latest = self.current_block().await?;
        let span = self.block_time_sample.min(latest);
        if span == 0 {
            return Ok(None);
        }
        let newest = self.block_timestamp(latest).await?;
        let oldest = self.block_timestamp(latest - span).await?;
        let average = match (newest, oldest) {
            (Some(newest), Some(oldest)) if newest > oldest => {
                Some(newest.saturating_sub(oldest).saturating_mul(1000) / span)
            }
            _ => None,
        };
        debug!("chain: average block time over {} blocks: {:?} ms", span, average);
        Ok(average)
    }

    async fn genesis_hash(&self) -> Result<GenesisHash, ChainError> {
        let block = self
            .provider
            .get_block(BlockId::Number(BlockNumber::Earliest))
            .await
            .map_err(|e| ChainError::Rpc(e.to_string()))?
            .ok_or_else(|| ChainError::Rpc("genesis block not found".into()))?;
        let hash = block
            .hash
            .ok_or_else(|| ChainError::Rpc("genesis block has no hash".into()))?;
        Ok(GenesisHash(hash.0))
    }

    async fn is_reimbursed(&self, referee: &PublicKeyBytes, letter_number: u32) -> Result<bool, ChainError> {
        self.registry.was_used(referee, letter_number).await
    }

    async fn submit(&self, call: ReimburseCall, signer: &PublicKeyBytes) -> Result<TxEventStream, ChainError> {
        let registry = self.registry_for(signer)?;

        let (tx, rx) = mpsc::unbounded();
        tokio::spawn(async move {
            let sent = tx.clone();
            let result = registry
                .reimburse(&call, move |hash| {
                    let _ = sent.unbounded_send(TxEvent::Submitted(format!("{:?}", hash)));
                })
                .await;
            let event = match result {
                Ok(Some(receipt)) if receipt.status == Some(U64::from(1)) => TxEvent::InBlock,
                Ok(Some(receipt)) => TxEvent::Failed(format!(
                    "transaction {:?} reverted",
                    receipt.transaction_hash
                )),
                // Dropped from the pool: close the stream without a verdict.
                Ok(None) => return,
                Err(ChainError::Module(reason)) => TxEvent::Failed(reason),
                Err(e) => {
                    error!("chain: reimbursement of letter {} failed: {}", call.letter_number, e);
                    return;
                }
            };
            let _ = tx.unbounded_send(event);
        });

        Ok(rx.boxed())
    }
}
