// Copyright (c) Starcoin, Inc.
// SPDX-License-Identifier: Apache-2.0

use crate::evm::ChainContracts;
use crate::gmp::Network;
use anyhow::anyhow;
use ethers::types::Address as EthAddress;
use resolver_config::Config;
use serde::{Deserialize, Serialize};
use serde_with::serde_as;
use std::time::Duration;
use url::Url;

pub const DEFAULT_STORE_NAME: &str = "vstorage";
pub const DEFAULT_PORTFOLIO_PREFIX: &str = "published.ymax0.portfolios";

#[serde_as]
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct EvmChainConfig {
    /// Chain name as it appears in portfolio transfer records.
    pub name: String,
    pub rpc_url: String,
    /// Token-minter contract emitting the mint leg.
    pub token_minter: String,
    /// Message-relay contract proving full delivery.
    pub message_relay: String,
}

#[serde_as]
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct ResolverNodeConfig {
    /// WebSocket endpoint for the two chain event subscriptions.
    pub chain_ws_url: String,
    /// HTTP JSON-RPC endpoint for store reads.
    pub chain_rpc_url: String,
    /// Bridge status API endpoint.
    pub bridge_status_url: String,
    #[serde(default = "default_store_name")]
    pub store_name: String,
    #[serde(default = "default_portfolio_prefix")]
    pub portfolio_prefix: String,
    #[serde(default = "default_subscription_prefix")]
    pub subscription_prefix: String,
    #[serde(default = "default_network")]
    pub network: String,
    pub metrics_port: u16,
    pub evm_chains: Vec<EvmChainConfig>,
    /// Confirmation window per watcher, seconds. Default 300.
    pub confirm_timeout_secs: Option<u64>,
    /// Destination-chain log poll cadence, seconds. Default 2.
    pub poll_interval_secs: Option<u64>,
}

fn default_store_name() -> String {
    DEFAULT_STORE_NAME.to_string()
}

fn default_portfolio_prefix() -> String {
    DEFAULT_PORTFOLIO_PREFIX.to_string()
}

fn default_subscription_prefix() -> String {
    crate::subscription::DEFAULT_SUBSCRIPTION_PREFIX.to_string()
}

fn default_network() -> String {
    "testnet".to_string()
}

impl Config for ResolverNodeConfig {}

/// Validated runtime view of the on-disk config.
#[derive(Clone, Debug)]
pub struct ResolverContext {
    pub chain_ws_url: Url,
    pub chain_rpc_url: Url,
    pub bridge_status_url: Url,
    pub store_name: String,
    pub portfolio_prefix: String,
    pub subscription_prefix: String,
    pub network: Network,
    pub metrics_port: u16,
    pub evm_chains: Vec<(String, Url, ChainContracts)>,
    pub confirm_timeout: Duration,
    pub poll_interval: Duration,
}

impl ResolverNodeConfig {
    /// Parses and cross-checks every endpoint and address up front so
    /// startup fails before any task is spawned.
    pub fn validate(&self) -> anyhow::Result<ResolverContext> {
        let chain_ws_url = Url::parse(&self.chain_ws_url)
            .map_err(|e| anyhow!("invalid chain-ws-url: {e}"))?;
        let chain_rpc_url = Url::parse(&self.chain_rpc_url)
            .map_err(|e| anyhow!("invalid chain-rpc-url: {e}"))?;
        let bridge_status_url = Url::parse(&self.bridge_status_url)
            .map_err(|e| anyhow!("invalid bridge-status-url: {e}"))?;
        let network: Network = self
            .network
            .parse()
            .map_err(|e| anyhow!("invalid network: {e}"))?;
        if self.evm_chains.is_empty() {
            return Err(anyhow!("at least one evm chain must be configured"));
        }
        let mut evm_chains = Vec::with_capacity(self.evm_chains.len());
        for chain in &self.evm_chains {
            let rpc_url = Url::parse(&chain.rpc_url)
                .map_err(|e| anyhow!("invalid rpc-url for {}: {e}", chain.name))?;
            let token_minter: EthAddress = chain
                .token_minter
                .parse()
                .map_err(|e| anyhow!("invalid token-minter for {}: {e}", chain.name))?;
            let message_relay: EthAddress = chain
                .message_relay
                .parse()
                .map_err(|e| anyhow!("invalid message-relay for {}: {e}", chain.name))?;
            evm_chains.push((
                chain.name.clone(),
                rpc_url,
                ChainContracts {
                    token_minter,
                    message_relay,
                },
            ));
        }
        Ok(ResolverContext {
            chain_ws_url,
            chain_rpc_url,
            bridge_status_url,
            store_name: self.store_name.clone(),
            portfolio_prefix: self.portfolio_prefix.clone(),
            subscription_prefix: self.subscription_prefix.clone(),
            network,
            metrics_port: self.metrics_port,
            evm_chains,
            confirm_timeout: Duration::from_secs(self.confirm_timeout_secs.unwrap_or(300)),
            poll_interval: Duration::from_secs(self.poll_interval_secs.unwrap_or(2)),
        })
    }
}
