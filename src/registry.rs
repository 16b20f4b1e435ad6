//! Network and token tables for the StarkGate bridge.
//!
//! Built-in data comes from the published starknet-addresses lists and can be
//! extended or overridden from the config file. The registry is immutable
//! once built and is shared between flows behind an `Arc`.

use crate::config::{Config, NetworkConfig, TokenConfig};
use crate::error::{BridgeError, Result};
use crate::types::{parse_address, parse_felt, serialize_felt};
use alloy_primitives::{address, Address};
use serde::Serialize;
use starknet_crypto::Felt;
use std::collections::BTreeMap;

/// StarkGate 2.0 uses this marker instead of the zero address for ETH.
pub const ETH_L1_MARKER: Address = address!("0000000000000000000000000000000000455448");

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TokenDescriptor {
    pub name: String,
    pub symbol: String,
    pub decimals: u8,
    pub l1_token: Address,
    #[serde(serialize_with = "serialize_felt")]
    pub l2_token: Felt,
    pub l1_bridge: Address,
    #[serde(serialize_with = "serialize_felt")]
    pub l2_bridge: Felt,
}

impl TokenDescriptor {
    /// Native ether on L1, moved as `msg.value` rather than through ERC20.
    pub fn is_native(&self) -> bool {
        self.l1_token == Address::ZERO || self.l1_token == ETH_L1_MARKER
    }

    fn from_config(token: &TokenConfig) -> Result<Self> {
        Ok(Self {
            name: token.name.clone().unwrap_or_else(|| token.symbol.clone()),
            symbol: token.symbol.clone(),
            decimals: token.decimals,
            l1_token: parse_address(&token.l1_token)?,
            l2_token: parse_felt(&token.l2_token)?,
            l1_bridge: parse_address(&token.l1_bridge)?,
            l2_bridge: parse_felt(&token.l2_bridge)?,
        })
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Network {
    pub name: String,
    pub l1_rpc: Option<String>,
    pub l2_rpc: Option<String>,
    /// StarknetCore contract, where L2->L1 messages are registered.
    pub l1_core_contract: Address,
    pub tokens: Vec<TokenDescriptor>,
}

impl Network {
    pub fn l1_rpc(&self) -> Result<&str> {
        self.l1_rpc.as_deref().filter(|url| !url.is_empty()).ok_or_else(|| {
            BridgeError::config(format!(
                "no L1 RPC endpoint for {} (set L1_RPC_URL or networks.{}.l1_rpc)",
                self.name,
                self.name.to_lowercase()
            ))
        })
    }

    pub fn l2_rpc(&self) -> Result<&str> {
        self.l2_rpc.as_deref().filter(|url| !url.is_empty()).ok_or_else(|| {
            BridgeError::config(format!(
                "no L2 RPC endpoint for {} (set L2_RPC_URL or networks.{}.l2_rpc)",
                self.name,
                self.name.to_lowercase()
            ))
        })
    }

    /// Find a token by symbol (case-insensitive) or by its index in the list.
    pub fn token(&self, symbol_or_index: &str) -> Result<&TokenDescriptor> {
        let by_symbol = self
            .tokens
            .iter()
            .find(|token| token.symbol.eq_ignore_ascii_case(symbol_or_index));
        let found = by_symbol.or_else(|| {
            symbol_or_index
                .parse::<usize>()
                .ok()
                .and_then(|index| self.tokens.get(index))
        });
        found.ok_or_else(|| BridgeError::UnknownToken {
            network: self.name.clone(),
            token: symbol_or_index.to_string(),
        })
    }

    fn apply(&mut self, overrides: &NetworkConfig) -> Result<()> {
        if let Some(url) = &overrides.l1_rpc {
            self.l1_rpc = Some(url.clone());
        }
        if let Some(url) = &overrides.l2_rpc {
            self.l2_rpc = Some(url.clone());
        }
        if let Some(core) = &overrides.l1_core_contract {
            self.l1_core_contract = parse_address(core)?;
        }
        if let Some(tokens) = &overrides.tokens {
            for token in tokens {
                let token = TokenDescriptor::from_config(token)?;
                match self
                    .tokens
                    .iter_mut()
                    .find(|existing| existing.symbol.eq_ignore_ascii_case(&token.symbol))
                {
                    Some(existing) => *existing = token,
                    None => self.tokens.push(token),
                }
            }
        }
        Ok(())
    }
}

/// Read-only lookup from network name to its endpoints and tokens.
#[derive(Debug, Clone)]
pub struct ChainRegistry {
    networks: BTreeMap<String, Network>,
}

impl ChainRegistry {
    /// Sepolia and Mainnet as published by StarkWare. RPC endpoints are left
    /// empty and must come from the config or the environment.
    pub fn builtin() -> Self {
        let mut networks = BTreeMap::new();
        networks.insert("sepolia".to_string(), sepolia());
        networks.insert("mainnet".to_string(), mainnet());
        Self { networks }
    }

    pub fn from_config(config: &Config) -> Result<Self> {
        let mut registry = Self::builtin();
        for (name, overrides) in config.networks.iter().flatten() {
            let key = name.to_lowercase();
            match registry.networks.get_mut(&key) {
                Some(network) => network.apply(overrides)?,
                None => {
                    let core = overrides.l1_core_contract.as_deref().ok_or_else(|| {
                        BridgeError::config(format!("network {name} needs l1_core_contract"))
                    })?;
                    let mut network = Network {
                        name: name.clone(),
                        l1_rpc: None,
                        l2_rpc: None,
                        l1_core_contract: parse_address(core)?,
                        tokens: Vec::new(),
                    };
                    network.apply(overrides)?;
                    registry.networks.insert(key, network);
                }
            }
        }
        Ok(registry)
    }

    /// Endpoint overrides from `L1_RPC_URL` / `L2_RPC_URL` for one network.
    pub fn with_env_endpoints(mut self, name: &str) -> Self {
        if let Some(network) = self.networks.get_mut(&name.to_lowercase()) {
            if let Ok(url) = std::env::var("L1_RPC_URL") {
                network.l1_rpc = Some(url);
            }
            if let Ok(url) = std::env::var("L2_RPC_URL") {
                network.l2_rpc = Some(url);
            }
        }
        self
    }

    pub fn lookup(&self, name: &str) -> Result<&Network> {
        self.networks
            .get(&name.to_lowercase())
            .ok_or_else(|| BridgeError::UnknownNetwork(name.to_string()))
    }

    pub fn tokens(&self, name: &str) -> Result<&[TokenDescriptor]> {
        Ok(&self.lookup(name)?.tokens)
    }

    pub fn token(&self, name: &str, symbol_or_index: &str) -> Result<&TokenDescriptor> {
        self.lookup(name)?.token(symbol_or_index)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.networks.keys().map(String::as_str)
    }
}

fn token(
    name: &str,
    symbol: &str,
    decimals: u8,
    l1_token: Address,
    l2_token: &str,
    l1_bridge: Address,
    l2_bridge: &str,
) -> TokenDescriptor {
    TokenDescriptor {
        name: name.to_string(),
        symbol: symbol.to_string(),
        decimals,
        l1_token,
        l2_token: Felt::from_hex_unchecked(l2_token),
        l1_bridge,
        l2_bridge: Felt::from_hex_unchecked(l2_bridge),
    }
}

// https://github.com/starknet-io/starknet-addresses/blob/master/bridged_tokens/sepolia.json
fn sepolia() -> Network {
    Network {
        name: "Sepolia".to_string(),
        l1_rpc: None,
        l2_rpc: None,
        l1_core_contract: address!("E2Bb56ee936fd6433DC0F6e7e3b8365C906AA057"),
        tokens: vec![
            token(
                "Ether",
                "ETH",
                18,
                Address::ZERO,
                "0x049d36570d4e46f48e99674bd3fcc84644ddd6b96f7c741b1562b82f9e004dc7",
                address!("8453FC6Cd1bCfE8D4dFC069C400B433054d47bDc"),
                "0x04c5772d1914fe6ce891b64eb35bf3522aeae1315647314aac58b01137607f3f",
            ),
            token(
                "StarkNet Token",
                "STRK",
                18,
                address!("Ca14007Eff0dB1f8135f4C25B34De49AB0d42766"),
                "0x04718f5a0fc34cc1af16a1cdee98ffb20c31f5cd61d6ab07201858f4287c938d",
                address!("cE5485Cfb26914C5dcE00B9BAF0580364daFC7a4"),
                "0x0594c1582459ea03f77deaf9eb7e3917d6994a03c13405ba42867f83d85f085d",
            ),
        ],
    }
}

// https://github.com/starknet-io/starknet-addresses/blob/master/bridged_tokens/mainnet.json
fn mainnet() -> Network {
    Network {
        name: "Mainnet".to_string(),
        l1_rpc: None,
        l2_rpc: None,
        l1_core_contract: address!("c662c410C0ECf747543f5bA90660f6ABeBD9C8c4"),
        tokens: vec![
            token(
                "Ether",
                "ETH",
                18,
                ETH_L1_MARKER,
                "0x049d36570d4e46f48e99674bd3fcc84644ddd6b96f7c741b1562b82f9e004dc7",
                address!("ae0Ee0A63A2cE6BaeEFFE56e7714FB4EFE48D419"),
                "0x073314940630fd6dcda0d772d4c972c4e0a9946bef9dabf4ef84eda8ef542b82",
            ),
            token(
                "USD Coin",
                "USDC",
                6,
                address!("A0b86991c6218b36c1d19D4a2e9Eb0cE3606eB48"),
                "0x053c91253bc9682c04929ca02ed00b3e423f6710d2ee7e0d5ebb06f3ecf368a8",
                address!("F6080D9fbEEbcd44D89aFfBFd42F098cbFf92816"),
                "0x05cd48fccbfd8aa2773fe22c217e808319ffcc1c5a6a463f7d8fa2da48218196",
            ),
        ],
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lookup_is_case_insensitive_and_stable() {
        let registry = ChainRegistry::builtin();
        let first = registry.lookup("Sepolia").unwrap();
        let second = registry.lookup("sepolia").unwrap();
        assert_eq!(first.name, second.name);
        assert_eq!(first.tokens.len(), 2);

        let tokens = registry.tokens("sepolia").unwrap();
        assert_eq!(tokens[0].symbol, "ETH");
        assert_eq!(tokens[1].symbol, "STRK");
        assert_eq!(registry.tokens("sepolia").unwrap()[1].symbol, "STRK");
    }

    #[test]
    fn unknown_network_and_token_are_reported() {
        let registry = ChainRegistry::builtin();
        assert!(matches!(
            registry.lookup("goerli"),
            Err(BridgeError::UnknownNetwork(name)) if name == "goerli"
        ));
        assert!(matches!(
            registry.token("mainnet", "DAI"),
            Err(BridgeError::UnknownToken { .. })
        ));
    }

    #[test]
    fn tokens_resolve_by_symbol_or_index() {
        let registry = ChainRegistry::builtin();
        let usdc = registry.token("mainnet", "usdc").unwrap();
        assert_eq!(usdc.decimals, 6);
        assert!(!usdc.is_native());
        let eth = registry.token("mainnet", "0").unwrap();
        assert_eq!(eth.symbol, "ETH");
        assert!(eth.is_native());
        assert!(registry.token("sepolia", "ETH").unwrap().is_native());
    }

    #[test]
    fn missing_endpoints_are_configuration_errors() {
        let registry = ChainRegistry::builtin();
        let network = registry.lookup("sepolia").unwrap();
        assert!(matches!(network.l1_rpc(), Err(BridgeError::Configuration(_))));
        assert!(matches!(network.l2_rpc(), Err(BridgeError::Configuration(_))));
    }

    #[test]
    fn config_overrides_endpoints_and_adds_networks() {
        let config: Config = toml::from_str(
            r#"
            [networks.sepolia]
            l1_rpc = "http://l1"
            l2_rpc = "http://l2"

            [networks.devnet]
            l1_core_contract = "0x0000000000000000000000000000000000000001"
            l2_rpc = "http://devnet"

            [[networks.devnet.tokens]]
            symbol = "ETH"
            decimals = 18
            l1_token = "0x0000000000000000000000000000000000000000"
            l2_token = "0x49d36570d4e46f48e99674bd3fcc84644ddd6b96f7c741b1562b82f9e004dc7"
            l1_bridge = "0x0000000000000000000000000000000000000002"
            l2_bridge = "0x3"
            "#,
        )
        .unwrap();

        let registry = ChainRegistry::from_config(&config).unwrap();
        assert_eq!(registry.lookup("sepolia").unwrap().l1_rpc().unwrap(), "http://l1");
        let devnet = registry.lookup("devnet").unwrap();
        assert_eq!(devnet.l2_rpc().unwrap(), "http://devnet");
        assert_eq!(devnet.token("eth").unwrap().l2_bridge, Felt::from(3u64));
        assert_eq!(
            registry.names().collect::<Vec<_>>(),
            vec!["devnet", "mainnet", "sepolia"]
        );
    }

    #[test]
    fn custom_network_without_core_contract_is_rejected() {
        let config: Config = toml::from_str(
            r#"
            [networks.devnet]
            l2_rpc = "http://devnet"
            "#,
        )
        .unwrap();
        assert!(matches!(
            ChainRegistry::from_config(&config),
            Err(BridgeError::Configuration(_))
        ));
    }
}
