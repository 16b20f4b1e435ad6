use crate::bridge::{DepositFlow, DepositRequest};
use crate::cli::DepositArgs;
use crate::commands::{flow_settings, load_registry, report_checkpoint};
use crate::config::Config;
use crate::rpc::{L1RpcClient, L2RpcClient};
use crate::signer::Credentials;
use crate::types::{felt_hex, parse_felt, parse_units, TokenAmount};
use anyhow::Result;
use tokio_util::sync::CancellationToken;

pub async fn run(args: DepositArgs, config: Config, cancel: CancellationToken) -> Result<()> {
    let registry = load_registry(&config, &args.target.network)?;
    let network = registry.lookup(&args.target.network)?;
    let token = network.token(&args.token)?.clone();
    let credentials = Credentials::from_env(&config.signer())?;
    let l1 = L1RpcClient::new(network.l1_rpc()?)?;
    let l2 = L2RpcClient::new(network.l2_rpc()?)?;

    let amount = parse_units(&args.amount, token.decimals as u32)?;
    let l2_recipient = match args.recipient.as_deref() {
        Some(recipient) => parse_felt(recipient)?,
        None => credentials.l2.address(),
    };
    tracing::info!(
        network = %network.name,
        token = %token.symbol,
        amount = %TokenAmount::new(amount, token.decimals),
        recipient = %felt_hex(&l2_recipient),
        "starting deposit"
    );
    let request = DepositRequest {
        token,
        amount,
        l2_recipient,
    };

    let flow = DepositFlow::new(&l1, &l2, &credentials.l1, flow_settings(&config, cancel)?);
    let outcome = match flow.run(&request).await {
        Ok(outcome) => outcome,
        Err(err) => {
            report_checkpoint(&err.checkpoint, args.target.json)?;
            return Err(err.into());
        }
    };

    if args.target.json {
        println!("{}", serde_json::to_string_pretty(&outcome)?);
        return Ok(());
    }

    println!("state: {:?}", outcome.state);
    println!("l1TxHash: {}", outcome.l1_deposit.tx.hash);
    if let Some(fee) = &outcome.checkpoint.message_fee {
        println!("messageFee: {fee}");
    }
    println!(
        "l2 {}: {} -> {}",
        request.token.symbol, outcome.l2_balance_before, outcome.l2_balance_after
    );
    Ok(())
}
