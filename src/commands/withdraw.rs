use crate::bridge::{WithdrawFlow, WithdrawRequest};
use crate::cli::WithdrawArgs;
use crate::commands::{flow_settings, load_registry, report_checkpoint};
use crate::config::Config;
use crate::rpc::{L1RpcClient, L2RpcClient};
use crate::signer::Credentials;
use crate::types::{parse_address, parse_felt, parse_units, TokenAmount};
use anyhow::Result;
use tokio_util::sync::CancellationToken;

pub async fn run(args: WithdrawArgs, config: Config, cancel: CancellationToken) -> Result<()> {
    let registry = load_registry(&config, &args.target.network)?;
    let network = registry.lookup(&args.target.network)?;
    let token = network.token(&args.token)?.clone();
    let credentials = Credentials::from_env(&config.signer())?;
    let l1 = L1RpcClient::new(network.l1_rpc()?)?;
    let l2 = L2RpcClient::new(network.l2_rpc()?)?;

    let amount = parse_units(&args.amount, token.decimals as u32)?;
    let l1_recipient = match args.recipient.as_deref() {
        Some(recipient) => parse_address(recipient)?,
        None => credentials.l1.address(),
    };
    let request = WithdrawRequest {
        amount,
        l1_recipient,
        skip_claim: args.skip_claim,
        token,
    };
    tracing::info!(
        network = %network.name,
        token = %request.token.symbol,
        amount = %TokenAmount::new(amount, request.token.decimals),
        recipient = %l1_recipient,
        "starting withdrawal"
    );

    let flow = WithdrawFlow::new(
        &l1,
        &l2,
        &credentials.l1,
        &credentials.l2,
        network.l1_core_contract,
        flow_settings(&config, cancel)?,
    );
    let result = match args.resume_tx.as_deref() {
        Some(tx_hash) => flow.resume(&request, parse_felt(tx_hash)?).await,
        None => flow.run(&request).await,
    };
    let outcome = match result {
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
    println!("l2TxHash: {}", outcome.l2_withdraw.tx.hash);
    if let Some(hash) = &outcome.checkpoint.message_hash {
        println!("messageHash: {hash}");
    }
    match &outcome.l1_claim {
        Some(claim) => println!("l1TxHash: {}", claim.tx.hash),
        None => println!("claim skipped; resume with --resume-tx {}", outcome.l2_withdraw.tx.hash),
    }
    Ok(())
}
