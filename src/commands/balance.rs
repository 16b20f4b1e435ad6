use crate::balance::{l1_balance, l1_token_balance, l2_balance};
use crate::cli::BalanceArgs;
use crate::commands::load_registry;
use crate::config::Config;
use crate::rpc::{L1RpcClient, L2RpcClient};
use crate::signer::Credentials;
use crate::types::{felt_hex, TokenAmount};
use anyhow::Result;
use serde::Serialize;

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct BalanceOutput {
    network: String,
    token: String,
    l1_address: String,
    l2_address: String,
    l1_eth: TokenAmount,
    #[serde(skip_serializing_if = "Option::is_none")]
    l1_token: Option<TokenAmount>,
    l2_token: TokenAmount,
}

pub async fn run(args: BalanceArgs, config: Config) -> Result<()> {
    let registry = load_registry(&config, &args.target.network)?;
    let network = registry.lookup(&args.target.network)?;
    let token = registry.token(&args.target.network, &args.token)?;
    let credentials = Credentials::from_env(&config.signer())?;
    let l1 = L1RpcClient::new(network.l1_rpc()?)?;
    let l2 = L2RpcClient::new(network.l2_rpc()?)?;

    let l1_eth = l1_balance(&l1, credentials.l1.address()).await?;
    let l1_token = if token.is_native() {
        None
    } else {
        Some(l1_token_balance(&l1, token, credentials.l1.address()).await?)
    };
    let l2_token = l2_balance(&l2, token, credentials.l2.address()).await?;

    let output = BalanceOutput {
        network: network.name.clone(),
        token: token.symbol.clone(),
        l1_address: format!("{:#x}", credentials.l1.address()),
        l2_address: felt_hex(&credentials.l2.address()),
        l1_eth,
        l1_token,
        l2_token,
    };

    if args.target.json {
        println!("{}", serde_json::to_string_pretty(&output)?);
        return Ok(());
    }

    println!("network: {}", output.network);
    println!("l1Address: {}", output.l1_address);
    println!("l2Address: {}", output.l2_address);
    println!("l1 ETH: {}", output.l1_eth);
    if let Some(amount) = &output.l1_token {
        println!("l1 {}: {amount}", output.token);
    }
    println!("l2 {}: {}", output.token, output.l2_token);
    Ok(())
}
