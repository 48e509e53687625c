// src/wallet/key_management.rs
//! Local keystore implementing the [`Signer`] capability.
//!
//! Holds a keyring of named secp256k1 accounts. Each account can be locked;
//! a locked account refuses to sign with `SignerUnavailable` and the caller
//! decides whether to prompt for unlock.
//!
//! Uses the following cryptographic primitives:
//! - secp256k1 curve (via `k256` crate)
//! - Keccak-256 prehashing (via `ethers` crate)
//! - Cryptographically secure random number generation

use crate::error::{ProtocolError, Result};
use crate::models::keys::{PublicKeyBytes, SignatureBytes};
use crate::utils::crypto::hash_data;
use crate::utils::serialization::from_hex_fixed;
use crate::wallet::signer::Signer;
use async_trait::async_trait;
use k256::ecdsa::signature::hazmat::PrehashSigner;
use k256::ecdsa::{Signature, SigningKey};
use k256::elliptic_curve::sec1::ToEncodedPoint;
use k256::SecretKey;
use log::{debug, info};
use serde::Serialize;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

struct Account {
    name: String,
    secret_key: SecretKey,
    locked: bool,
}

/// Public view of a keyring entry.
#[derive(Serialize, Debug, Clone, PartialEq, Eq)]
pub struct AccountInfo {
    pub public_key: PublicKeyBytes,
    pub name: String,
    pub locked: bool,
}

/// Keyring of signing accounts, cheap to clone and share between services.
#[derive(Clone, Default)]
pub struct KeyManager {
    accounts: Arc<Mutex<HashMap<PublicKeyBytes, Account>>>,
}

/// Compressed SEC1 encoding of the public key belonging to `secret_key`.
pub fn public_key_of(secret_key: &SecretKey) -> PublicKeyBytes {
    let point = secret_key.public_key().to_encoded_point(true);
    let mut out = [0u8; PublicKeyBytes::LEN];
    out.copy_from_slice(point.as_bytes());
    PublicKeyBytes(out)
}

impl KeyManager {
    pub fn new() -> Self {
        Self::default()
    }

    fn keyring(&self) -> MutexGuard<'_, HashMap<PublicKeyBytes, Account>> {
        self.accounts.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn insert(&self, name: &str, secret_key: SecretKey) -> PublicKeyBytes {
        let public_key = public_key_of(&secret_key);
        self.keyring().insert(
            public_key,
            Account {
                name: name.to_string(),
                secret_key,
                locked: false,
            },
        );
        info!("keyring: added account '{}' {}", name, public_key);
        public_key
    }

    /// Creates a fresh account from the system RNG.
    pub fn generate_account(&self, name: &str) -> PublicKeyBytes {
        let secret_key = SecretKey::random(&mut rand::thread_rng());
        self.insert(name, secret_key)
    }

    /// Imports an account from a 32-byte hex-encoded secret.
    ///
    /// # Errors
    /// `MalformedInput` if the secret is not a valid scalar.
    pub fn import_secret(&self, name: &str, secret_hex: &str) -> Result<PublicKeyBytes> {
        let bytes = from_hex_fixed::<32>(secret_hex).map_err(ProtocolError::MalformedInput)?;
        let secret_key = SecretKey::from_slice(&bytes)
            .map_err(|_| ProtocolError::malformed("secret key is not a valid secp256k1 scalar"))?;
        Ok(self.insert(name, secret_key))
    }

    /// Locks an account. Returns `false` if it does not exist.
    pub fn lock(&self, public_key: &PublicKeyBytes) -> bool {
        match self.keyring().get_mut(public_key) {
            Some(account) => {
                account.locked = true;
                true
            }
            None => false,
        }
    }

    /// Unlocks an account. Returns `false` if it does not exist.
    pub fn unlock(&self, public_key: &PublicKeyBytes) -> bool {
        match self.keyring().get_mut(public_key) {
            Some(account) => {
                account.locked = false;
                true
            }
            None => false,
        }
    }

    /// Lists every account, sorted by name then key.
    pub fn accounts(&self) -> Vec<AccountInfo> {
        let mut accounts: Vec<AccountInfo> = self
            .keyring()
            .iter()
            .map(|(public_key, account)| AccountInfo {
                public_key: *public_key,
                name: account.name.clone(),
                locked: account.locked,
            })
            .collect();
        accounts.sort_by(|a, b| a.name.cmp(&b.name).then(a.public_key.cmp(&b.public_key)));
        accounts
    }

    /// Signing key of an unlocked account.
    ///
    /// Used for payload signatures and by the chain client when an employer
    /// pays for its own reimbursement.
    ///
    /// # Errors
    /// `SignerUnavailable` if the account is unknown or locked.
    pub fn signing_key(&self, public_key: &PublicKeyBytes) -> Result<SigningKey> {
        let keyring = self.keyring();
        let account = keyring.get(public_key).ok_or_else(|| {
            ProtocolError::SignerUnavailable(format!("no account for {}", public_key))
        })?;
        if account.locked {
            debug!("keyring: refusing to use locked account {}", public_key);
            return Err(ProtocolError::SignerUnavailable(format!(
                "account '{}' is locked",
                account.name
            )));
        }
        Ok(SigningKey::from(&account.secret_key))
    }

    /// Signs a message using ECDSA (secp256k1) with Keccak-256 prehashing.
    ///
    /// Returns the 64-byte compact signature (`r || s`, low-S normalized).
    pub fn sign_message(&self, public_key: &PublicKeyBytes, message: &[u8]) -> Result<SignatureBytes> {
        let signing_key = self.signing_key(public_key)?;

        let hash = hash_data(message);
        let signature: Signature = signing_key
            .sign_prehash(&hash)
            .map_err(|e| ProtocolError::SignerUnavailable(format!("signing failed: {}", e)))?;

        let mut out = [0u8; SignatureBytes::LEN];
        out.copy_from_slice(&signature.to_bytes());
        Ok(SignatureBytes(out))
    }
}

#[async_trait]
impl Signer for KeyManager {
    async fn sign(&self, public_key: &PublicKeyBytes, message: &[u8]) -> Result<SignatureBytes> {
        self.sign_message(public_key, message)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::utils::crypto::verify_signature;

    const SECRET: &str = "0123456789abcdef0123456789abcdef0123456789abcdef0123456789abcdef";

    #[test]
    fn test_sign_and_verify() {
        let keys = KeyManager::new();
        let public_key = keys.import_secret("referee", SECRET).unwrap();
        let sig = keys.sign_message(&public_key, b"test message").unwrap();
        assert!(verify_signature(&public_key, b"test message", &sig));
        assert!(!verify_signature(&public_key, b"wrong message", &sig));
    }

    #[test]
    fn test_import_is_deterministic() {
        let a = KeyManager::new().import_secret("a", SECRET).unwrap();
        let b = KeyManager::new().import_secret("b", &format!("0x{}", SECRET)).unwrap();
        assert_eq!(a, b);
        assert!(a.0[0] == 0x02 || a.0[0] == 0x03);
    }

    #[test]
    fn test_locked_account_is_unavailable() {
        let keys = KeyManager::new();
        let public_key = keys.generate_account("worker");
        assert!(keys.lock(&public_key));
        assert!(matches!(
            keys.sign_message(&public_key, b"m"),
            Err(ProtocolError::SignerUnavailable(_))
        ));
        assert!(keys.unlock(&public_key));
        assert!(keys.sign_message(&public_key, b"m").is_ok());
    }

    #[test]
    fn test_unknown_account_is_unavailable() {
        let keys = KeyManager::new();
        keys.generate_account("someone");
        let stranger = PublicKeyBytes([2u8; 33]);
        assert!(matches!(
            keys.sign_message(&stranger, b"m"),
            Err(ProtocolError::SignerUnavailable(_))
        ));
        assert!(!keys.lock(&stranger));
    }

    #[test]
    fn test_invalid_secret_is_malformed() {
        let keys = KeyManager::new();
        assert!(matches!(
            keys.import_secret("zero", &"00".repeat(32)),
            Err(ProtocolError::MalformedInput(_))
        ));
        assert!(keys.import_secret("short", "0x0102").is_err());
        assert!(keys.accounts().is_empty());
    }

    #[test]
    fn test_signer_trait_is_async() {
        let keys = KeyManager::new();
        let public_key = keys.generate_account("async");
        let sig = tokio_test::block_on(keys.sign(&public_key, b"payload")).unwrap();
        assert!(verify_signature(&public_key, b"payload", &sig));
    }
}
