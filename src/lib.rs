// src/lib.rs
//! # Diploma System
//!
//! Issuance, delegation and reimbursement of signed skill diplomas.
//!
//! A referee (tutor) issues a diploma ("letter") to a worker (student), staking
//! an amount behind it. The worker may delegate the right to claim that stake
//! to an employer, who later presents the accumulated signature chain on chain
//! before the diploma's expiry block.
//!
//! ## Layout
//! 1. **Models**: letters, usage rights, insurances, key newtypes
//! 2. **Encoding**: canonical signed payloads and the QR text format
//! 3. **Wallet**: keyring, record store, backups
//! 4. **Blockchain / Contracts**: chain client and the letters registry
//! 5. **Storage**: IPFS content store for skill documents
//! 6. **Services**: issuer, verifier, HTTP API

pub mod blockchain;
pub mod config;
pub mod contracts;
pub mod encoding;
pub mod error;
pub mod models;
pub mod services;
pub mod storage;
pub mod utils;
pub mod wallet;

pub use error::{ProtocolError, Result};
