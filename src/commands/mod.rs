pub mod balance;
pub mod deposit;
pub mod networks;
pub mod status;
pub mod withdraw;

use crate::bridge::FlowSettings;
use crate::config::Config;
use crate::poller::{PollOptions, StatusPoller};
use crate::registry::ChainRegistry;
use crate::types::{parse_u256, u256_to_felt};
use anyhow::{anyhow, Result};
use serde::Serialize;
use tokio_util::sync::CancellationToken;

/// Registry for `network`, with `.env.<network>` loaded first so its RPC
/// endpoint variables apply.
pub fn load_registry(config: &Config, network: &str) -> Result<ChainRegistry> {
    Config::load_network_env(network);
    let registry = ChainRegistry::from_config(config)?.with_env_endpoints(network);
    registry.lookup(network)?;
    Ok(registry)
}

pub fn poller(config: &Config, cancel: CancellationToken) -> StatusPoller {
    let mut options = PollOptions::new(config.poll_interval(), config.poll_timeout());
    options.max_consecutive_errors = config.max_rpc_errors();
    StatusPoller::new(options, cancel)
}

pub fn flow_settings(config: &Config, cancel: CancellationToken) -> Result<FlowSettings> {
    let max_fee = parse_u256(&config.l2_max_fee())?;
    let l2_max_fee =
        u256_to_felt(max_fee).ok_or_else(|| anyhow!("fees.l2_max_fee {max_fee} is not a felt"))?;
    let deposit_message_fee = config
        .deposit_message_fee()
        .map(|fee| parse_u256(&fee))
        .transpose()?;
    Ok(FlowSettings {
        poller: poller(config, cancel),
        message_timeout: config.message_timeout(),
        l2_max_fee,
        deposit_message_fee,
    })
}

/// Print the checkpoint of a failed flow to stderr so it can be resumed.
pub fn report_checkpoint<C: Serialize>(checkpoint: &C, json: bool) -> Result<()> {
    if json {
        eprintln!("{}", serde_json::to_string_pretty(checkpoint)?);
        return Ok(());
    }
    let value = serde_json::to_value(checkpoint)?;
    eprintln!("checkpoint:");
    if let Some(fields) = value.as_object() {
        for (key, value) in fields {
            match value {
                serde_json::Value::Null => {}
                serde_json::Value::String(text) => eprintln!("  {key}: {text}"),
                other => eprintln!("  {key}: {other}"),
            }
        }
    }
    Ok(())
}
