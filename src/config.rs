use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

#[derive(Debug, Default, Deserialize, Serialize, Clone)]
pub struct Config {
    pub networks: Option<BTreeMap<String, NetworkConfig>>,
    pub signer: Option<SignerConfig>,
    pub poll: Option<PollConfig>,
    pub fees: Option<FeeConfig>,
    #[serde(skip)]
    pub path: PathBuf,
}

/// Per-network overrides layered on top of the built-in registry.
#[derive(Debug, Default, Deserialize, Serialize, Clone)]
pub struct NetworkConfig {
    pub l1_rpc: Option<String>,
    pub l2_rpc: Option<String>,
    pub l1_core_contract: Option<String>,
    pub tokens: Option<Vec<TokenConfig>>,
}

#[derive(Debug, Default, Deserialize, Serialize, Clone)]
pub struct TokenConfig {
    pub name: Option<String>,
    pub symbol: String,
    pub decimals: u8,
    pub l1_token: String,
    pub l2_token: String,
    pub l1_bridge: String,
    pub l2_bridge: String,
}

#[derive(Debug, Default, Deserialize, Serialize, Clone)]
pub struct SignerConfig {
    pub l1_private_key_env: Option<String>,
    pub l2_public_key_env: Option<String>,
    pub l2_private_key_env: Option<String>,
    pub l2_account_env: Option<String>,
    pub account_contract_version: Option<u8>,
}

#[derive(Debug, Default, Deserialize, Serialize, Clone)]
pub struct PollConfig {
    pub interval_ms: Option<u64>,
    pub timeout_ms: Option<u64>,
    pub message_timeout_ms: Option<u64>,
    pub max_rpc_errors: Option<u32>,
}

#[derive(Debug, Default, Deserialize, Serialize, Clone)]
pub struct FeeConfig {
    /// Max fee for L2 invoke transactions, hex or decimal wei.
    pub l2_max_fee: Option<String>,
    /// Fixed L1->L2 message fee; estimated through the L2 RPC when unset.
    pub deposit_message_fee: Option<String>,
}

pub const DEFAULT_L2_MAX_FEE: &str = "0x9184e72a000";

impl Config {
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let path = match path {
            Some(path) => path.to_path_buf(),
            None => default_config_path(),
        };

        if !path.exists() {
            return Ok(Self {
                path,
                ..Self::default()
            });
        }

        let contents = fs::read_to_string(&path)
            .with_context(|| format!("failed to read config {}", path.display()))?;
        let mut config: Config = toml::from_str(&contents)
            .with_context(|| format!("failed to parse config {}", path.display()))?;
        config.path = path;
        Ok(config)
    }

    /// Load `.env.<network>` from the working directory if present. Values
    /// already set in the process environment win.
    pub fn load_network_env(network: &str) {
        let file = format!(".env.{}", network.to_lowercase());
        match dotenvy::from_filename(&file) {
            Ok(path) => tracing::debug!(path = %path.display(), "loaded environment file"),
            Err(err) if err.not_found() => {}
            Err(err) => tracing::warn!(%file, %err, "failed to load environment file"),
        }
    }

    pub fn network(&self, name: &str) -> Option<&NetworkConfig> {
        self.networks.as_ref()?.get(&name.to_lowercase())
    }

    pub fn signer(&self) -> SignerConfig {
        self.signer.clone().unwrap_or_default()
    }

    pub fn poll_interval(&self) -> Duration {
        let ms = self.poll.as_ref().and_then(|poll| poll.interval_ms);
        Duration::from_millis(ms.unwrap_or(1_000))
    }

    pub fn poll_timeout(&self) -> Duration {
        let ms = self.poll.as_ref().and_then(|poll| poll.timeout_ms);
        Duration::from_millis(ms.unwrap_or(600_000))
    }

    /// L2->L1 messages only become consumable once the L2 state update lands
    /// on L1, which takes hours.
    pub fn message_timeout(&self) -> Duration {
        let ms = self.poll.as_ref().and_then(|poll| poll.message_timeout_ms);
        Duration::from_millis(ms.unwrap_or(12 * 60 * 60 * 1_000))
    }

    pub fn max_rpc_errors(&self) -> u32 {
        self.poll
            .as_ref()
            .and_then(|poll| poll.max_rpc_errors)
            .unwrap_or(5)
    }

    pub fn l2_max_fee(&self) -> String {
        self.fees
            .as_ref()
            .and_then(|fees| fees.l2_max_fee.clone())
            .unwrap_or_else(|| DEFAULT_L2_MAX_FEE.to_string())
    }

    pub fn deposit_message_fee(&self) -> Option<String> {
        self.fees.as_ref()?.deposit_message_fee.clone()
    }
}

impl SignerConfig {
    pub fn l1_private_key_env(&self) -> &str {
        self.l1_private_key_env.as_deref().unwrap_or("L1_PRIV_KEY")
    }

    pub fn l2_public_key_env(&self) -> &str {
        self.l2_public_key_env.as_deref().unwrap_or("L2_PUB_KEY")
    }

    pub fn l2_private_key_env(&self) -> &str {
        self.l2_private_key_env.as_deref().unwrap_or("L2_PRIV_KEY")
    }

    pub fn l2_account_env(&self) -> &str {
        self.l2_account_env.as_deref().unwrap_or("L2_ACCOUNT_ADDR")
    }

    pub fn account_contract_version(&self) -> u8 {
        self.account_contract_version.unwrap_or(0)
    }
}

fn default_config_path() -> PathBuf {
    if let Some(dir) = dirs::config_dir() {
        return dir.join("starkbridge").join("config.toml");
    }
    PathBuf::from("./config.toml")
}
