// src/contracts/letters_registry.rs
//! Letters registry smart contract interface.
//!
//! The registry pays out reimbursements and keeps the authoritative record of
//! which diplomas, identified by (referee, letter number), were already used.

use crate::blockchain::{ChainError, ReimburseCall};
use crate::models::keys::PublicKeyBytes;
use ethers::abi::parse_abi;
use ethers::contract::{Contract, ContractError};
use ethers::providers::Middleware;
use ethers::types::{Address, Bytes, TransactionReceipt, H256, U256};
use std::sync::Arc;

const LETTERS_REGISTRY_ABI: &[&str] = &[
    "function reimburse(uint32 letterNumber, bytes32 genesis, uint64 blockAllowed, bytes referee, bytes worker, bytes employer, uint256 amount, bytes signOverReceipt, bytes workerSign)",
    "function wasUsed(bytes referee, uint32 letterNumber) view returns (bool)",
];

/// Fixed gas limit for `reimburse`; two signature checks plus a transfer.
const REIMBURSE_GAS: u64 = 3_000_000;

/// Letters registry contract wrapper.
///
/// # Type Parameters
/// * `M` - middleware used for calls; must carry a signer for `reimburse`
pub struct LettersRegistry<M> {
    contract: Contract<M>,
}

impl<M> Clone for LettersRegistry<M> {
    fn clone(&self) -> Self {
        Self {
            contract: self.contract.clone(),
        }
    }
}

fn key_bytes(key: &PublicKeyBytes) -> Bytes {
    Bytes::from(key.0.to_vec())
}

/// Splits send failures into runtime rejections and everything else.
///
/// A revert (with or without revert data, during estimation or send) is the
/// registry refusing the call; transport, nonce and signer failures are not.
fn send_error<M: Middleware>(err: ContractError<M>) -> ChainError {
    let message = err.to_string();
    if err.is_revert() || message.contains("revert") {
        ChainError::Module(message)
    } else {
        ChainError::Rpc(message)
    }
}

impl<M> LettersRegistry<M>
where
    M: Middleware + 'static,
{
    /// Binds the registry at `contract_address` through `client`.
    ///
    /// # Errors
    /// `ChainError::Config` if the embedded ABI does not parse.
    pub fn new(client: Arc<M>, contract_address: Address) -> Result<Self, ChainError> {
        let abi = parse_abi(LETTERS_REGISTRY_ABI)
            .map_err(|e| ChainError::Config(format!("letters registry abi: {}", e)))?;
        Ok(Self {
            contract: Contract::new(contract_address, abi, client),
        })
    }

    /// Address the registry is bound to.
    pub fn address(&self) -> Address {
        self.contract.address()
    }

    /// Sends `reimburse` and waits for its receipt.
    ///
    /// `on_sent` is called with the transaction hash as soon as the node has
    /// accepted the transaction.
    ///
    /// # Returns
    /// The receipt, or `None` if the transaction was dropped from the pool
    ///
    /// # Errors
    /// - `ChainError::Module` when the registry reverts the call
    /// - `ChainError::Rpc` for transport, nonce or signer failures
    pub async fn reimburse(
        &self,
        call: &ReimburseCall,
        on_sent: impl FnOnce(H256),
    ) -> Result<Option<TransactionReceipt>, ChainError> {
        let amount_bytes = call
            .amount
            .to_wire_bytes()
            .map_err(|e| ChainError::Submission(e.to_string()))?;
        let args = (
            call.letter_number,
            H256::from(call.genesis.0),
            call.block_allowed,
            key_bytes(&call.referee),
            key_bytes(&call.worker),
            key_bytes(&call.employer),
            U256::from_little_endian(&amount_bytes),
            Bytes::from(call.sign_over_receipt.0.to_vec()),
            Bytes::from(call.worker_sign.0.to_vec()),
        );

        let method = self
            .contract
            .method::<_, ()>("reimburse", args)
            .map_err(|e| ChainError::Submission(e.to_string()))?
            .gas(REIMBURSE_GAS);

        // Reverts surface here, during gas estimation or send.
        let pending = method.send().await.map_err(send_error)?;
        on_sent(pending.tx_hash());

        pending.await.map_err(|e| ChainError::Rpc(e.to_string()))
    }

    /// Whether the registry already paid out this diploma.
    pub async fn was_used(&self, referee: &PublicKeyBytes, letter_number: u32) -> Result<bool, ChainError> {
        self.contract
            .method::<_, bool>("wasUsed", (key_bytes(referee), letter_number))
            .map_err(|e| ChainError::Rpc(e.to_string()))?
            .call()
            .await
            .map_err(|e| ChainError::Rpc(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ethers::providers::{Http, Provider};

    #[test]
    fn test_abi_parses() {
        let abi = parse_abi(LETTERS_REGISTRY_ABI).unwrap();
        assert!(abi.function("reimburse").is_ok());
        assert!(abi.function("wasUsed").is_ok());
    }

    #[test]
    fn test_registry_binds_address() {
        let provider = Provider::<Http>::try_from("http://localhost:8545").unwrap();
        let address = Address::repeat_byte(0x11);
        let registry = LettersRegistry::new(Arc::new(provider), address).unwrap();
        assert_eq!(registry.address(), address);
    }

    #[test]
    fn test_only_reverts_are_module_errors() {
        let revert = ContractError::<Provider<Http>>::Revert(Bytes::from(vec![0x08, 0xc3, 0x79, 0xa0]));
        assert!(matches!(send_error(revert), ChainError::Module(_)));

        let not_deployed = ContractError::<Provider<Http>>::ContractNotDeployed;
        assert!(matches!(send_error(not_deployed), ChainError::Rpc(_)));
    }
}
