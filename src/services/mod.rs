// src/services/mod.rs
//! Protocol services and the HTTP API on top of them.

pub mod api_server;
pub mod diploma_issuer;
pub mod signature_chain;
pub mod verifier;

pub use api_server::ApiServer;
pub use diploma_issuer::{Delegated, DiplomaDefaults, DiplomaIssuer, IssueRequest};
pub use signature_chain::{GrantSignatures, SignatureChainBuilder};
pub use verifier::{verify_chain, Reimbursement, Verdict, Verifier};
