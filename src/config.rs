// src/config.rs
//! Service settings.
//!
//! Layered from built-in defaults, an optional `diploma.toml` next to the
//! binary and `DIPLOMA__*` environment variables (`DIPLOMA__CHAIN__RPC_URL`,
//! `DIPLOMA__API__PORT`, ...). A `.env` file is loaded by `main` first.

use config::{Config, ConfigError, Environment, File};
use serde::Deserialize;

#[derive(Debug, Clone, Deserialize)]
pub struct ApiSettings {
    pub host: String,
    pub port: u16,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ChainSettings {
    pub rpc_url: String,
    pub letters_contract: String,
    pub private_key: String,
    /// Number of recent blocks averaged for the block time
    pub block_time_sample: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct IpfsSettings {
    pub url: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DiplomaSettings {
    pub default_days_valid: u64,
    /// Decimal string, arbitrary precision
    pub default_stake: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct KeystoreSettings {
    pub referee_secret: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Settings {
    pub api: ApiSettings,
    pub chain: ChainSettings,
    pub ipfs: IpfsSettings,
    pub diploma: DiplomaSettings,
    #[serde(default)]
    pub keystore: KeystoreSettings,
}

impl Settings {
    pub fn load() -> Result<Self, ConfigError> {
        Self::builder()?
            .add_source(File::with_name("diploma").required(false))
            .add_source(Environment::with_prefix("DIPLOMA").separator("__"))
            .build()?
            .try_deserialize()
    }

    fn builder() -> Result<config::ConfigBuilder<config::builder::DefaultState>, ConfigError> {
        Config::builder()
            .set_default("api.host", "127.0.0.1")?
            .set_default("api.port", 3000)?
            .set_default("chain.rpc_url", "http://localhost:8545")?
            .set_default("chain.letters_contract", "")?
            .set_default("chain.private_key", "")?
            .set_default("chain.block_time_sample", 100)?
            .set_default("ipfs.url", "http://localhost:5001")?
            .set_default("diploma.default_days_valid", 730)?
            .set_default("diploma.default_stake", "572000000000000")
    }
}
