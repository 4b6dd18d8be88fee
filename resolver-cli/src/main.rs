// Copyright (c) Starcoin, Inc.
// SPDX-License-Identifier: Apache-2.0

use clap::{Parser, Subcommand};
use ethers::signers::{coins_bip39::English, MnemonicBuilder, Signer};
use resolver::gmp::{
    DispatchCommand, MessageDispatcher, Network, PoolKind, RpcBroadcaster, TargetConfig,
};
use std::sync::Arc;
use tracing_subscriber::EnvFilter;
use url::Url;

#[derive(Parser)]
#[clap(name = "resolver-cli", about = "Dispatches cross-chain account and lending operations")]
struct Args {
    /// BIP-39 mnemonic of the dispatch account.
    #[clap(long, env = "MNEMONIC", hide_env_values = true)]
    mnemonic: String,
    /// Target network.
    #[clap(long, env = "NETWORK", default_value = "testnet")]
    network: Network,
    /// Source chain RPC endpoint. Defaults per network.
    #[clap(long)]
    rpc_url: Option<Url>,
    /// Bridge status API endpoint. Defaults per network.
    #[clap(long)]
    status_url: Option<Url>,
    #[clap(subcommand)]
    command: CliCommand,
}

#[derive(Subcommand)]
enum CliCommand {
    /// Creates the deterministic remote account on the destination chain.
    #[clap(name = "createRemoteAccount")]
    CreateRemoteAccount {
        chain: String,
        gas_amount: u64,
    },
    /// Transfers USDC and supplies it to the Aave pool from the remote
    /// account.
    #[clap(name = "supplyToAave")]
    SupplyToAave {
        chain: String,
        gas_amount: u64,
        transfer_amount: u64,
        remote_address: String,
    },
    /// Transfers USDC and supplies it to the Compound market from the
    /// remote account.
    #[clap(name = "supplyToCompound")]
    SupplyToCompound {
        chain: String,
        gas_amount: u64,
        transfer_amount: u64,
        remote_address: String,
    },
}

impl CliCommand {
    fn into_dispatch(self) -> DispatchCommand {
        match self {
            CliCommand::CreateRemoteAccount { chain, gas_amount } => {
                DispatchCommand::CreateRemoteAccount { chain, gas_amount }
            }
            CliCommand::SupplyToAave {
                chain,
                gas_amount,
                transfer_amount,
                remote_address,
            } => DispatchCommand::SupplyToLendingPool {
                pool: PoolKind::Aave,
                chain,
                gas_amount,
                transfer_amount,
                remote_address,
            },
            CliCommand::SupplyToCompound {
                chain,
                gas_amount,
                transfer_amount,
                remote_address,
            } => DispatchCommand::SupplyToLendingPool {
                pool: PoolKind::Compound,
                chain,
                gas_amount,
                transfer_amount,
                remote_address,
            },
        }
    }
}

fn default_rpc_url(network: Network) -> &'static str {
    match network {
        Network::Mainnet => "https://main.rpc.agoric.net",
        Network::Testnet => "https://emerynet.rpc.agoric.net",
    }
}

fn default_status_url(network: Network) -> &'static str {
    match network {
        Network::Mainnet => "https://api.gmp.axelarscan.io",
        Network::Testnet => "https://testnet.api.gmp.axelarscan.io",
    }
}

async fn run(args: Args) -> Result<(), String> {
    let rpc_url = match args.rpc_url {
        Some(url) => url,
        None => Url::parse(default_rpc_url(args.network)).map_err(|e| e.to_string())?,
    };
    let status_url = match args.status_url {
        Some(url) => url,
        None => Url::parse(default_status_url(args.network)).map_err(|e| e.to_string())?,
    };
    let wallet = MnemonicBuilder::<English>::default()
        .phrase(args.mnemonic.as_str())
        .build()
        .map_err(|e| format!("invalid mnemonic: {e}"))?;
    let sender = format!("{:#x}", wallet.address());
    let dispatcher = MessageDispatcher::new(
        TargetConfig::for_network(args.network),
        wallet,
        sender,
        Arc::new(RpcBroadcaster::new(rpc_url)),
        status_url,
    );

    let tx_hash = dispatcher
        .dispatch(&args.command.into_dispatch())
        .await
        .map_err(|e| e.to_string())?;
    println!("dispatched: {tx_hash}");

    match dispatcher.poll_status(&tx_hash).await {
        Ok(status) => {
            println!(
                "bridge status: {}",
                if status.success { "success" } else { "pending" }
            );
        }
        Err(e) => println!("bridge status not yet available: {e}"),
    }
    Ok(())
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .init();
    let args = Args::parse();
    if let Err(message) = run(args).await {
        eprintln!("error: {message}");
        eprintln!("run with --help for usage");
        std::process::exit(1);
    }
}
