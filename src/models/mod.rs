// src/models/mod.rs
//! Data structures of the diploma protocol.

pub mod chain;
pub mod insurance;
pub mod keys;
pub mod letter;

pub use chain::{Delegation, SignatureChain};
pub use insurance::{Insurance, UsageRight};
pub use keys::{Amount, ContentId, GenesisHash, PublicKeyBytes, SignatureBytes};
pub use letter::{Letter, LetterStatus, Receipt, SignerRecord};
