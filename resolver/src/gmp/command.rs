// Copyright (c) Starcoin, Inc.
// SPDX-License-Identifier: Apache-2.0

use crate::error::{ResolverError, ResolverResult};
use crate::gmp::payload::{self, GMP_MESSAGE_ONLY, GMP_MESSAGE_WITH_TOKEN};
use ethers::types::Address as EthAddress;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

/// The two supported lending protocols. They share the approve-then-
/// supply call shape and differ only in function signature and target
/// contract.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PoolKind {
    Aave,
    Compound,
}

impl fmt::Display for PoolKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PoolKind::Aave => write!(f, "Aave"),
            PoolKind::Compound => write!(f, "Compound"),
        }
    }
}

/// A dispatch request, either built from CLI arguments or deserialized
/// from a `messageDispatch` subscription payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "method", rename_all = "camelCase", rename_all_fields = "camelCase")]
pub enum DispatchCommand {
    /// Zero-payload message whose only purpose is to trigger
    /// deterministic remote-account creation at the factory.
    CreateRemoteAccount { chain: String, gas_amount: u64 },
    SupplyToLendingPool {
        pool: PoolKind,
        chain: String,
        gas_amount: u64,
        transfer_amount: u64,
        remote_address: String,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Network {
    Mainnet,
    #[default]
    Testnet,
}

impl FromStr for Network {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "mainnet" => Ok(Network::Mainnet),
            "testnet" => Ok(Network::Testnet),
            other => Err(format!("unknown network {other:?}, expected mainnet|testnet")),
        }
    }
}

/// Bridge-facing contracts of one destination chain.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChainTargets {
    /// Destination chain id in the bridge's namespace.
    pub bridge_chain_id: String,
    pub account_factory: EthAddress,
    pub usdc: EthAddress,
    pub aave_pool: Option<EthAddress>,
    pub compound_market: Option<EthAddress>,
}

/// Closed set of dispatch targets for one network. Everything a
/// dispatch touches is validated against this before any network call.
#[derive(Debug, Clone)]
pub struct TargetConfig {
    pub chains: BTreeMap<String, ChainTargets>,
    /// Bridge gateway account on the source chain (message receiver).
    pub gmp_account: String,
    /// Gas-fee collector on the bridge network.
    pub gas_recipient: String,
    /// Native-asset denom used for the fee payment.
    pub fee_denom: String,
}

/// Fully validated dispatch, ready to wrap and broadcast.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DispatchPlan {
    pub destination_chain: String,
    pub destination_address: EthAddress,
    pub payload: Option<Vec<u8>>,
    pub message_type: u8,
    pub gas_amount: u64,
    pub transfer_amount: Option<u64>,
}

impl TargetConfig {
    pub fn for_network(network: Network) -> Self {
        match network {
            Network::Mainnet => Self::mainnet(),
            Network::Testnet => Self::testnet(),
        }
    }

    pub fn testnet() -> Self {
        let mut chains = BTreeMap::new();
        chains.insert(
            "Ethereum".to_string(),
            ChainTargets {
                bridge_chain_id: "ethereum-sepolia".to_string(),
                account_factory: addr("0x9d4e3f1c8a5b06d2f3c7a81e5b20d94cf1a3b7e2"),
                usdc: addr("0x1c7D4B196Cb0C7B01d743Fbc6116a902379C7238"),
                aave_pool: Some(addr("0x6Ae43d3271ff6888e7Fc43Fd7321a503ff738951")),
                compound_market: Some(addr("0xAec1F48e02Cfb822Be958B68C7957156EB3F0b6e")),
            },
        );
        chains.insert(
            "Avalanche".to_string(),
            ChainTargets {
                bridge_chain_id: "Avalanche".to_string(),
                account_factory: addr("0x2b8f0c5d9e41a7c3860b15df74a92e3d50c6b194"),
                usdc: addr("0x5425890298aed601595a70AB815c96711a31Bc65"),
                aave_pool: Some(addr("0xccEa5C65f6d4F465B71501418b88FBe4e7071283")),
                compound_market: None,
            },
        );
        Self {
            chains,
            gmp_account: "axelar1dv4u5k73pzqrxlzujxg3qp8kvc3pje7jtdvu72npnt5zhq05ejcsn5qme5"
                .to_string(),
            gas_recipient: "axelar1aythygn6z5thymj6tmzfwekzh05ewg3l7d6y89".to_string(),
            fee_denom: "ubld".to_string(),
        }
    }

    pub fn mainnet() -> Self {
        let mut chains = BTreeMap::new();
        chains.insert(
            "Ethereum".to_string(),
            ChainTargets {
                bridge_chain_id: "Ethereum".to_string(),
                account_factory: addr("0x7c3e9a2f5d80b461c97f24ae6b51d08e3f2a6c90"),
                usdc: addr("0xA0b86991c6218b36c1d19D4a2e9Eb0cE3606eB48"),
                aave_pool: Some(addr("0x87870Bca3F3fD6335C3F4ce8392D69350B4fA4E2")),
                compound_market: Some(addr("0xc3d688B66703497DAA19211EEdff47f25384cdc3")),
            },
        );
        chains.insert(
            "Avalanche".to_string(),
            ChainTargets {
                bridge_chain_id: "Avalanche".to_string(),
                account_factory: addr("0x4a1d8e6b72f05c3981d64af0c5be29137ea2d7c5"),
                usdc: addr("0xB97EF9Ef8734C71904D8002F8b6Bc66Dd9c48a6E"),
                aave_pool: Some(addr("0x794a61358D6845594F94dc1DB02A252b5b4814aD")),
                compound_market: None,
            },
        );
        Self {
            chains,
            gmp_account: "axelar1dv4u5k73pzqrxlzujxg3qp8kvc3pje7jtdvu72npnt5zhq05ejcsn5qme5"
                .to_string(),
            gas_recipient: "axelar1aythygn6z5thymj6tmzfwekzh05ewg3l7d6y89".to_string(),
            fee_denom: "ubld".to_string(),
        }
    }

    /// Validates the command against the closed target set and builds
    /// the dispatch plan. No network access.
    pub fn resolve(&self, command: &DispatchCommand) -> ResolverResult<DispatchPlan> {
        match command {
            DispatchCommand::CreateRemoteAccount { chain, gas_amount } => {
                let targets = self.chain_targets(chain)?;
                Ok(DispatchPlan {
                    destination_chain: targets.bridge_chain_id.clone(),
                    destination_address: targets.account_factory,
                    payload: None,
                    message_type: GMP_MESSAGE_ONLY,
                    gas_amount: *gas_amount,
                    transfer_amount: None,
                })
            }
            DispatchCommand::SupplyToLendingPool {
                pool,
                chain,
                gas_amount,
                transfer_amount,
                remote_address,
            } => {
                let targets = self.chain_targets(chain)?;
                let remote: EthAddress = remote_address.parse().map_err(|_| {
                    ResolverError::Dispatch(format!("invalid remote address {remote_address:?}"))
                })?;
                let (pool_contract, supply) = match pool {
                    PoolKind::Aave => {
                        let pool_contract = targets.aave_pool.ok_or_else(|| {
                            ResolverError::UnknownTarget(format!("{pool} on {chain}"))
                        })?;
                        (
                            pool_contract,
                            payload::aave_supply_call(
                                pool_contract,
                                targets.usdc,
                                *transfer_amount,
                                remote,
                            ),
                        )
                    }
                    PoolKind::Compound => {
                        let market = targets.compound_market.ok_or_else(|| {
                            ResolverError::UnknownTarget(format!("{pool} on {chain}"))
                        })?;
                        (
                            market,
                            payload::compound_supply_call(market, targets.usdc, *transfer_amount),
                        )
                    }
                };
                let calls = vec![
                    payload::approve_call(targets.usdc, pool_contract, *transfer_amount),
                    supply,
                ];
                Ok(DispatchPlan {
                    destination_chain: targets.bridge_chain_id.clone(),
                    destination_address: remote,
                    payload: Some(payload::encode_calls(&calls)),
                    message_type: GMP_MESSAGE_WITH_TOKEN,
                    gas_amount: *gas_amount,
                    transfer_amount: Some(*transfer_amount),
                })
            }
        }
    }

    fn chain_targets(&self, chain: &str) -> ResolverResult<&ChainTargets> {
        self.chains
            .get(chain)
            .ok_or_else(|| ResolverError::UnknownTarget(chain.to_string()))
    }
}

fn addr(s: &str) -> EthAddress {
    s.parse().expect("static address")
}
