// src/main.rs

//! # Diploma System - Main Entry Point
//!
//! Loads settings, connects to the chain and IPFS, wires the protocol services
//! together and starts the API server.
//!
//! ## Settings
//! Read from `.env`, an optional `diploma.toml` and `DIPLOMA__*` variables:
//! - `DIPLOMA__CHAIN__RPC_URL`: JSON-RPC endpoint
//! - `DIPLOMA__CHAIN__LETTERS_CONTRACT`: letters registry address
//! - `DIPLOMA__CHAIN__PRIVATE_KEY`: paying account, also listed as the `payer` keyring account
//! - `DIPLOMA__IPFS__URL`: (Optional) IPFS API URL (default: http://localhost:5001)
//! - `DIPLOMA__KEYSTORE__REFEREE_SECRET`: (Optional) referee key imported at start-up

use anyhow::Context;
use diploma_system::blockchain::RpcChainClient;
use diploma_system::config::Settings;
use diploma_system::services::{
    ApiServer, DiplomaDefaults, DiplomaIssuer, SignatureChainBuilder, Verifier,
};
use diploma_system::storage::IpfsStorage;
use diploma_system::wallet::{KeyManager, MemoryStore};
use dotenv::dotenv;
use log::info;
use std::net::SocketAddr;
use std::sync::Arc;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv().ok();
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let settings = Settings::load().context("failed to load settings")?;

    let key_manager = KeyManager::new();
    if let Some(secret) = &settings.keystore.referee_secret {
        let referee = key_manager
            .import_secret("referee", secret)
            .context("invalid keystore.referee_secret")?;
        info!("referee account {} ready", referee);
    }

    let chain = RpcChainClient::new(
        &settings.chain.rpc_url,
        &settings.chain.letters_contract,
        &settings.chain.private_key,
        settings.chain.block_time_sample,
    )
    .await
    .context("failed to initialize chain client - check rpc url, contract and private key")?
    .with_keyring(key_manager.clone());
    // The payer shows up in /accounts so an employer can present claims under it.
    key_manager
        .import_secret("payer", &settings.chain.private_key)
        .context("invalid chain.private_key")?;
    info!("payer account {} ready", chain.payer());
    let chain = Arc::new(chain);

    let ipfs = IpfsStorage::new(&settings.ipfs.url).context("failed to initialize IPFS client")?;
    let store = Arc::new(MemoryStore::new());

    let defaults = DiplomaDefaults {
        days_valid: settings.diploma.default_days_valid,
        stake: settings
            .diploma
            .default_stake
            .parse()
            .context("invalid diploma.default_stake")?,
    };
    let builder = SignatureChainBuilder::new(Arc::new(key_manager.clone()));
    let issuer = DiplomaIssuer::new(chain.clone(), store.clone(), builder, defaults);
    let verifier = Verifier::new(chain, store.clone());

    let api_server = ApiServer::new(issuer, verifier, key_manager, store, Arc::new(ipfs));

    let addr: SocketAddr = format!("{}:{}", settings.api.host, settings.api.port)
        .parse()
        .context("invalid api.host/api.port")?;
    api_server.run(addr).await.context("API server stopped")?;
    Ok(())
}
