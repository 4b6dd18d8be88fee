// Copyright (c) Starcoin, Inc.
// SPDX-License-Identifier: Apache-2.0

//! Node assembly: turns a validated config into a running coordinator.

use crate::chain_stream::{EventFilter, TendermintWsStream, NEW_BLOCK_HEADER_QUERY, TX_QUERY};
use crate::config::ResolverNodeConfig;
use crate::coordinator::SubscriptionCoordinator;
use crate::error::ResolverResult;
use crate::evm::{BridgeConfirmer, EvmClient};
use crate::gmp::{MessageDispatcher, RpcBroadcaster, TargetConfig};
use crate::metrics::ResolverMetrics;
use crate::portfolio::PortfolioIndex;
use crate::registry::WatcherRegistry;
use crate::store::VstorageClient;
use crate::subscription::SubscriptionIndex;
use anyhow::anyhow;
use ethers::signers::coins_bip39::English;
use ethers::signers::{MnemonicBuilder, Signer};
use std::sync::Arc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::info;

/// Builds every component from the config and spawns the coordinator
/// loop. The returned handle resolves when the loop exits; cancel the
/// token for a graceful stop.
pub async fn run_resolver_node(
    config: ResolverNodeConfig,
    prometheus_registry: &prometheus::Registry,
    cancel: CancellationToken,
) -> anyhow::Result<JoinHandle<ResolverResult<()>>> {
    let context = config.validate()?;
    let metrics = Arc::new(ResolverMetrics::new(prometheus_registry));

    let store = Arc::new(VstorageClient::new(context.chain_rpc_url.clone()));

    let mut confirmer = BridgeConfirmer::new(context.confirm_timeout, context.poll_interval);
    for (name, rpc_url, contracts) in &context.evm_chains {
        let client = Arc::new(EvmClient::new(rpc_url.as_str())?);
        confirmer.add_chain(name.clone(), client, *contracts);
        info!("[Node] watching {name} bridge contracts via {rpc_url}");
    }
    let confirmer = Arc::new(confirmer);

    let mnemonic = std::env::var("MNEMONIC")
        .map_err(|_| anyhow!("MNEMONIC environment variable is required"))?;
    let wallet = MnemonicBuilder::<English>::default()
        .phrase(mnemonic.as_str())
        .build()?;
    let sender = format!("{:#x}", wallet.address());
    let dispatcher = Arc::new(MessageDispatcher::new(
        TargetConfig::for_network(context.network),
        wallet,
        sender,
        Arc::new(RpcBroadcaster::new(context.chain_rpc_url.clone())),
        context.bridge_status_url.clone(),
    ));

    let registry = WatcherRegistry::new();
    let index = PortfolioIndex::new(
        store.clone(),
        confirmer.clone(),
        registry.clone(),
        metrics.clone(),
        &context.portfolio_prefix,
    );
    let subscriptions = SubscriptionIndex::new(
        store,
        confirmer,
        dispatcher,
        registry,
        metrics.clone(),
        &context.subscription_prefix,
    );

    let stream = TendermintWsStream::connect(
        &context.chain_ws_url,
        &[NEW_BLOCK_HEADER_QUERY, TX_QUERY],
    )
    .await?;
    info!(
        "[Node] subscribed to {} for header and tx events",
        context.chain_ws_url
    );

    let coordinator = SubscriptionCoordinator::new(
        stream,
        EventFilter::new(
            context.store_name,
            context.portfolio_prefix,
            context.subscription_prefix,
        ),
        index,
        subscriptions,
        metrics,
        cancel,
    );
    Ok(tokio::spawn(coordinator.run()))
}
