use crate::chain::{L1Chain, L2Chain};
use crate::cli::{Layer, StatusArgs};
use crate::commands::{load_registry, poller};
use crate::config::Config;
use crate::rpc::{L1RpcClient, L2RpcClient};
use crate::types::{felt_hex, parse_b256, parse_felt, L2TransactionStatus};
use anyhow::Result;
use serde::Serialize;
use tokio_util::sync::CancellationToken;

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct StatusOutput {
    layer: &'static str,
    tx_hash: String,
    status: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    execution_status: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    failure_reason: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    block_number: Option<u64>,
}

pub async fn run(args: StatusArgs, config: Config, cancel: CancellationToken) -> Result<()> {
    let registry = load_registry(&config, &args.target.network)?;
    let network = registry.lookup(&args.target.network)?;
    let poller = poller(&config, cancel);

    let output = match args.layer {
        Layer::L2 => {
            let client = L2RpcClient::new(network.l2_rpc()?)?;
            let tx_hash = parse_felt(&args.tx)?;
            let status = if args.wait {
                poller.await_l2_transaction(&client, tx_hash).await?
            } else {
                client.transaction_status(tx_hash).await?
            };
            l2_output(felt_hex(&tx_hash), status)
        }
        Layer::L1 => {
            let client = L1RpcClient::new(network.l1_rpc()?)?;
            let tx_hash = parse_b256(&args.tx)?;
            let receipt = if args.wait {
                Some(poller.await_l1_receipt(&client, tx_hash).await?)
            } else {
                client.receipt(tx_hash).await?
            };
            StatusOutput {
                layer: "l1",
                tx_hash: format!("{tx_hash:#x}"),
                status: match &receipt {
                    None => "PENDING",
                    Some(receipt) if receipt.success => "SUCCESS",
                    Some(_) => "REVERTED",
                }
                .to_string(),
                execution_status: None,
                failure_reason: None,
                block_number: receipt.and_then(|receipt| receipt.block_number),
            }
        }
    };

    if args.target.json {
        println!("{}", serde_json::to_string_pretty(&output)?);
        return Ok(());
    }

    println!("layer: {}", output.layer);
    println!("txHash: {}", output.tx_hash);
    println!("status: {}", output.status);
    if let Some(execution) = &output.execution_status {
        println!("executionStatus: {execution}");
    }
    if let Some(reason) = &output.failure_reason {
        println!("failureReason: {reason}");
    }
    if let Some(block) = output.block_number {
        println!("blockNumber: {block}");
    }
    Ok(())
}

fn l2_output(tx_hash: String, status: L2TransactionStatus) -> StatusOutput {
    StatusOutput {
        layer: "l2",
        tx_hash,
        status: serde_name(&status.finality_status),
        execution_status: status.execution_status.as_ref().map(serde_name),
        failure_reason: status.failure_reason,
        block_number: None,
    }
}

fn serde_name<T: Serialize>(value: &T) -> String {
    match serde_json::to_value(value) {
        Ok(serde_json::Value::String(name)) => name,
        _ => String::new(),
    }
}
