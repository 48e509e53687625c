// src/wallet/signer.rs
//! The signing capability consumed by the protocol core.
//!
//! The core never reaches for a global keyring. Whatever owns the accounts
//! (a local [`KeyManager`](crate::wallet::key_management::KeyManager), a
//! browser extension bridge, a hardware device) is passed in explicitly as an
//! `Arc<dyn Signer>` and keeps its own lock/unlock lifecycle.

use crate::error::Result;
use crate::models::keys::{PublicKeyBytes, SignatureBytes};
use async_trait::async_trait;

#[async_trait]
pub trait Signer: Send + Sync {
    /// Signs `message` with the account identified by `public_key`.
    ///
    /// The message is signed as given; callers wrap protocol payloads before
    /// calling this.
    ///
    /// # Errors
    /// `SignerUnavailable` if the account is unknown, locked, or the signer
    /// refused. Implementations must not fall back to another key.
    async fn sign(&self, public_key: &PublicKeyBytes, message: &[u8]) -> Result<SignatureBytes>;
}
