use crate::commands;
use crate::config::Config;
use anyhow::Result;
use clap::{Args, Parser, Subcommand, ValueEnum};
use std::path::PathBuf;
use tokio_util::sync::CancellationToken;

#[derive(Parser, Debug)]
#[command(
    name = "starkbridge",
    version,
    about = "Move ETH and tokens between Ethereum and Starknet through StarkGate"
)]
pub struct Cli {
    #[arg(long, global = true)]
    pub config_path: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

impl Cli {
    pub async fn run(self, config: Config, cancel: CancellationToken) -> Result<()> {
        match self.command {
            Command::Networks(args) => commands::networks::run(args, config),
            Command::Balance(args) => commands::balance::run(args, config).await,
            Command::Withdraw(args) => commands::withdraw::run(args, config, cancel).await,
            Command::Deposit(args) => commands::deposit::run(args, config, cancel).await,
            Command::Status(args) => commands::status::run(args, config, cancel).await,
        }
    }
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// List known networks and their bridged tokens.
    Networks(NetworksArgs),
    /// Show L1 and L2 balances of the configured accounts.
    Balance(BalanceArgs),
    /// Withdraw from Starknet to Ethereum.
    Withdraw(WithdrawArgs),
    /// Deposit from Ethereum to Starknet.
    Deposit(DepositArgs),
    /// Look up a transaction on either chain.
    Status(StatusArgs),
}

#[derive(Args, Debug)]
pub struct NetworkArgs {
    #[arg(long, default_value = "sepolia")]
    pub network: String,

    #[arg(long)]
    pub json: bool,
}

#[derive(Args, Debug)]
pub struct NetworksArgs {
    /// Only show this network.
    #[arg(long)]
    pub network: Option<String>,

    #[arg(long)]
    pub json: bool,
}

#[derive(Args, Debug)]
pub struct BalanceArgs {
    #[command(flatten)]
    pub target: NetworkArgs,

    /// Token symbol or index in the network's token list.
    #[arg(long, default_value = "ETH")]
    pub token: String,
}

#[derive(Args, Debug)]
pub struct WithdrawArgs {
    #[command(flatten)]
    pub target: NetworkArgs,

    #[arg(long, default_value = "ETH")]
    pub token: String,

    /// Decimal amount in token units.
    #[arg(long, default_value = "0.0001")]
    pub amount: String,

    /// L1 recipient; defaults to the L1 account.
    #[arg(long)]
    pub recipient: Option<String>,

    /// Stop once the message can be claimed on L1.
    #[arg(long)]
    pub skip_claim: bool,

    /// Continue from an already submitted L2 withdraw transaction.
    #[arg(long)]
    pub resume_tx: Option<String>,
}

#[derive(Args, Debug)]
pub struct DepositArgs {
    #[command(flatten)]
    pub target: NetworkArgs,

    #[arg(long, default_value = "ETH")]
    pub token: String,

    /// Decimal amount in token units.
    #[arg(long, default_value = "0.0001")]
    pub amount: String,

    /// L2 recipient; defaults to the L2 account.
    #[arg(long)]
    pub recipient: Option<String>,
}

#[derive(ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
pub enum Layer {
    L1,
    L2,
}

#[derive(Args, Debug)]
pub struct StatusArgs {
    #[command(flatten)]
    pub target: NetworkArgs,

    #[arg(long, value_enum, default_value_t = Layer::L2)]
    pub layer: Layer,

    #[arg(long)]
    pub tx: String,

    /// Poll until the transaction is final.
    #[arg(long)]
    pub wait: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn withdraw_flags_parse() {
        let cli = Cli::try_parse_from([
            "starkbridge",
            "withdraw",
            "--network",
            "mainnet",
            "--amount",
            "0.5",
            "--skip-claim",
            "--json",
        ])
        .unwrap();
        match cli.command {
            Command::Withdraw(args) => {
                assert_eq!(args.target.network, "mainnet");
                assert_eq!(args.amount, "0.5");
                assert_eq!(args.token, "ETH");
                assert!(args.skip_claim);
                assert!(args.target.json);
                assert!(args.resume_tx.is_none());
            }
            other => panic!("unexpected command {other:?}"),
        }
    }

    #[test]
    fn status_defaults_to_l2() {
        let cli = Cli::try_parse_from(["starkbridge", "status", "--tx", "0x1"]).unwrap();
        match cli.command {
            Command::Status(args) => {
                assert_eq!(args.layer, Layer::L2);
                assert_eq!(args.target.network, "sepolia");
                assert!(!args.wait);
            }
            other => panic!("unexpected command {other:?}"),
        }
    }

    #[test]
    fn config_path_is_global() {
        let cli = Cli::try_parse_from(["starkbridge", "networks", "--config-path", "/tmp/c.toml"])
            .unwrap();
        assert_eq!(cli.config_path, Some(PathBuf::from("/tmp/c.toml")));
    }
}
