// src/wallet/mod.rs
//! Signing accounts and local record storage.

pub mod backup;
pub mod credential_storage;
pub mod key_management;
pub mod signer;

pub use backup::{Backup, ImportSummary};
pub use credential_storage::{MemoryStore, RecordStore};
pub use key_management::{AccountInfo, KeyManager};
pub use signer::Signer;
