use crate::cli::NetworksArgs;
use crate::commands::load_registry;
use crate::config::Config;
use crate::registry::{ChainRegistry, Network};
use crate::types::felt_hex;
use anyhow::Result;

pub fn run(args: NetworksArgs, config: Config) -> Result<()> {
    let (registry, names) = match args.network.as_deref() {
        Some(name) => (load_registry(&config, name)?, vec![name.to_string()]),
        None => {
            let registry = ChainRegistry::from_config(&config)?;
            let names = registry.names().map(str::to_string).collect();
            (registry, names)
        }
    };
    let networks = names
        .iter()
        .map(|name| registry.lookup(name))
        .collect::<Result<Vec<&Network>, _>>()?;

    if args.json {
        println!("{}", serde_json::to_string_pretty(&networks)?);
        return Ok(());
    }

    for network in networks {
        println!("{}", network.name);
        println!("  l1Rpc: {}", network.l1_rpc.as_deref().unwrap_or("-"));
        println!("  l2Rpc: {}", network.l2_rpc.as_deref().unwrap_or("-"));
        println!("  starknetCore: {:#x}", network.l1_core_contract);
        for (index, token) in registry.tokens(&network.name)?.iter().enumerate() {
            println!(
                "  [{index}] {symbol} ({decimals} decimals) l1Bridge={l1} l2Token={l2}",
                symbol = token.symbol,
                decimals = token.decimals,
                l1 = token.l1_bridge,
                l2 = felt_hex(&token.l2_token),
            );
        }
    }
    Ok(())
}
