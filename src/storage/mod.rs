// src/storage/mod.rs
//! Content-addressed storage of skill documents.

pub mod ipfs_client;

pub use ipfs_client::IpfsStorage;

use crate::models::keys::ContentId;
use async_trait::async_trait;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("content {0} not found")]
    NotFound(String),

    #[error("content store unreachable: {0}")]
    Unavailable(String),

    #[error("content store returned an invalid id: {0}")]
    InvalidId(String),
}

/// Resolves skill content ids to documents and stores new ones.
#[async_trait]
pub trait ContentStore: Send + Sync {
    async fn put(&self, data: &[u8]) -> Result<ContentId, StorageError>;

    async fn fetch(&self, cid: &ContentId) -> Result<Vec<u8>, StorageError>;
}
