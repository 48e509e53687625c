// src/storage/ipfs_client.rs
//! IPFS storage client for skill documents.
//!
//! Skill descriptions live on IPFS; a diploma commits to the content id of
//! the skill it certifies. All stored data is public, so nothing private goes
//! through here.

use crate::models::keys::ContentId;
use crate::storage::{ContentStore, StorageError};
use async_trait::async_trait;
use bytes::BytesMut;
use futures::TryStreamExt;
use ipfs_api_backend_hyper::{IpfsApi, IpfsClient, TryFromUri};
use log::debug;
use std::io::Cursor;
use std::sync::Arc;
use tokio::task;

/// Thread-safe IPFS client wrapper.
#[derive(Clone)]
pub struct IpfsStorage {
    /// Shared IPFS client instance (thread-safe via Arc)
    client: Arc<IpfsClient>,
}

impl Default for IpfsStorage {
    fn default() -> Self {
        Self {
            client: Arc::new(IpfsClient::default()),
        }
    }
}

impl IpfsStorage {
    /// Connects to the IPFS API at `url`, e.g. `http://localhost:5001`.
    pub fn new(url: &str) -> Result<Self, StorageError> {
        let client = <IpfsClient as TryFromUri>::from_str(url)
            .map_err(|e| StorageError::Unavailable(format!("invalid ipfs url {}: {}", url, e)))?;
        Ok(Self {
            client: Arc::new(client),
        })
    }

    /// Stores raw binary data and returns its content id.
    ///
    /// The hyper backend futures are not `Send`, so each call runs on its own
    /// runtime inside a blocking task.
    pub async fn store_data(&self, data: &[u8]) -> Result<ContentId, StorageError> {
        let client = self.client.clone();
        let data_owned = data.to_vec();

        let hash = task::spawn_blocking(move || -> Result<String, StorageError> {
            let rt = tokio::runtime::Runtime::new()
                .map_err(|e| StorageError::Unavailable(e.to_string()))?;
            rt.block_on(async {
                let res = client
                    .add(Cursor::new(data_owned))
                    .await
                    .map_err(|e| StorageError::Unavailable(e.to_string()))?;
                Ok(res.hash)
            })
        })
        .await
        .map_err(|e| StorageError::Unavailable(e.to_string()))??;

        debug!("ipfs: stored {} bytes as {}", data.len(), hash);
        ContentId::new(hash.clone()).map_err(|_| StorageError::InvalidId(hash))
    }

    /// Retrieves binary data by content id.
    pub async fn retrieve_data(&self, cid: &ContentId) -> Result<Vec<u8>, StorageError> {
        let client = self.client.clone();
        let hash = cid.as_str().to_string();

        let data = task::spawn_blocking(move || -> Result<BytesMut, StorageError> {
            let rt = tokio::runtime::Runtime::new()
                .map_err(|e| StorageError::Unavailable(e.to_string()))?;
            rt.block_on(async {
                client
                    .cat(&hash)
                    .try_fold(BytesMut::new(), |mut acc, chunk| async move {
                        acc.extend_from_slice(&chunk);
                        Ok(acc)
                    })
                    .await
                    .map_err(|e| StorageError::NotFound(format!("{}: {}", hash, e)))
            })
        })
        .await
        .map_err(|e| StorageError::Unavailable(e.to_string()))??;

        Ok(data.to_vec())
    }
}

#[async_trait]
impl ContentStore for IpfsStorage {
    async fn put(&self, data: &[u8]) -> Result<ContentId, StorageError> {
        self.store_data(data).await
    }

    async fn fetch(&self, cid: &ContentId) -> Result<Vec<u8>, StorageError> {
        self.retrieve_data(cid).await
    }
}
