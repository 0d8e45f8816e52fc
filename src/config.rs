//! Configuration loading from TOML with environment variable resolution.
//!
//! Reads `config.toml` and deserializes into strongly-typed structs.
//! The signing key is referenced by env-var name in the config and
//! resolved at runtime via `std::env::var`; intermediary keys and the
//! middle-mint candidate file path live inline in the TOML.

use anyhow::{Context, Result};
use serde::Deserialize;
use solana_sdk::signature::Keypair;
use std::fs;

/// Top-level application configuration.
///
/// Read once at bootstrap and cloned into each worker — workers never
/// share a live reference to it.
#[derive(Debug, Deserialize, Clone)]
pub struct Settings {
    pub rpc: RpcSettings,
    pub quote: QuoteSettings,
    pub wallet: WalletSettings,
    pub trade: TradeSettings,
    pub relay: RelaySettings,
    pub engine: EngineSettings,
}

#[derive(Debug, Deserialize, Clone)]
pub struct RpcSettings {
    pub url: String,
}

#[derive(Debug, Deserialize, Clone)]
pub struct QuoteSettings {
    /// Base URL of the Jupiter-compatible aggregator, e.g.
    /// `http://127.0.0.1:18080`.
    pub base_url: String,
    #[serde(default)]
    pub only_direct_routes: bool,
}

#[derive(Debug, Deserialize, Clone)]
pub struct WalletSettings {
    /// Name of the env var holding the base58-encoded signing key.
    pub keypair_env: String,
    /// Base58-encoded secret keys of the intermediary (tip-paying) wallets.
    pub intermediary_keys: Vec<String>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct TradeSettings {
    /// Base asset of every round trip (wSOL on mainnet).
    pub base_mint: String,
    pub amount_in_min: u64,
    pub amount_in_max: u64,
    /// Minimum net profit (lamports) for an opportunity to be pursued.
    pub min_gain_lamports: u64,
    /// Path to a JSON file holding the candidate middle-mint list.
    pub middle_mints_file: String,
}

#[derive(Debug, Deserialize, Clone)]
pub struct RelaySettings {
    /// Jito block-engine endpoints. Only the first is used unless
    /// `race_all_endpoints` is set — see the submission router.
    pub urls: Vec<String>,
    /// Tip accounts published by the relay; one is picked at random
    /// per bundle.
    pub tip_accounts: Vec<String>,
    /// Static tip in lamports. A dynamic percentage-of-profit tip was
    /// tried and deliberately abandoned; keep this as the single knob.
    pub static_tip_lamports: u64,
    /// Local source addresses to bind outbound relay connections to.
    /// Empty means the OS default egress path.
    #[serde(default)]
    pub egress_ips: Vec<String>,
    /// Extend primary-endpoint-only routing to concurrent submission
    /// across every configured endpoint.
    #[serde(default)]
    pub race_all_endpoints: bool,
}

#[derive(Debug, Deserialize, Clone)]
pub struct EngineSettings {
    pub worker_count: usize,
    /// Restart a worker that exits or crashes (with backoff). Set to
    /// false for the legacy observe-only behavior.
    #[serde(default = "default_restart_on_exit")]
    pub restart_on_exit: bool,
}

fn default_restart_on_exit() -> bool {
    true
}

impl Settings {
    /// Load configuration from a TOML file.
    pub fn load(path: &str) -> Result<Self> {
        let contents = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {path}"))?;
        Self::from_toml(&contents)
            .with_context(|| format!("Failed to parse config file: {path}"))
    }

    /// Parse configuration from a TOML string.
    pub fn from_toml(contents: &str) -> Result<Self> {
        let settings: Settings = toml::from_str(contents)?;
        Ok(settings)
    }

    /// Load the middle-mint candidate list from the JSON file named in
    /// `[trade] middle_mints_file`.
    pub fn load_middle_mints(&self) -> Result<Vec<String>> {
        let path = &self.trade.middle_mints_file;
        let contents = fs::read_to_string(path)
            .with_context(|| format!("Failed to read middle-mints file: {path}"))?;
        let mints: Vec<String> = serde_json::from_str(&contents)
            .with_context(|| format!("Failed to parse middle-mints file: {path}"))?;
        anyhow::ensure!(!mints.is_empty(), "Middle-mints file {path} is empty");
        Ok(mints)
    }
}

impl WalletSettings {
    /// Resolve the signing keypair from the env var named in the config.
    pub fn signer(&self) -> Result<Keypair> {
        let encoded = std::env::var(&self.keypair_env)
            .with_context(|| format!("Environment variable not set: {}", self.keypair_env))?;
        parse_keypair(&encoded).context("Invalid signing keypair")
    }

    /// Parse the intermediary wallet pool.
    pub fn intermediaries(&self) -> Result<Vec<Keypair>> {
        anyhow::ensure!(
            !self.intermediary_keys.is_empty(),
            "At least one intermediary key is required"
        );
        self.intermediary_keys
            .iter()
            .enumerate()
            .map(|(i, key)| {
                parse_keypair(key).with_context(|| format!("Invalid intermediary key #{i}"))
            })
            .collect()
    }
}

/// Decode a base58-encoded 64-byte secret key into a `Keypair`.
pub fn parse_keypair(encoded: &str) -> Result<Keypair> {
    let bytes = bs58::decode(encoded)
        .into_vec()
        .context("Keypair is not valid base58")?;
    Keypair::from_bytes(&bytes).context("Keypair bytes are not a valid ed25519 secret key")
}
