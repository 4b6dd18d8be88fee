// Copyright (c) Starcoin, Inc.
// SPDX-License-Identifier: Apache-2.0

//! Burn/mint transfer confirmation.
//!
//! A confirmation watches the destination chain's token-minter contract
//! for the mint leg, then proves full relay completion by finding the
//! relay contract's "message received" log in the same transaction
//! receipt. Elapsing the window is a normal `false` outcome, not an
//! error.

use crate::error::{ResolverError, ResolverResult};
use crate::evm::client::EvmClient;
use crate::portfolio::TransferConfirmer;
use async_trait::async_trait;
use ethers::providers::JsonRpcClient;
use ethers::types::{Address as EthAddress, Log, H256, U256};
use ethers::utils::keccak256;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::MissedTickBehavior;
use tracing::{info, warn};

pub const DEFAULT_CONFIRM_TIMEOUT: Duration = Duration::from_secs(300);
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(2);

/// Mint leg of a completed bridge transfer.
const MINT_EVENT_SIGNATURE: &str = "MintAndWithdraw(address,uint256,address)";
/// Relay completion, emitted in the same transaction as the mint.
const RELAY_EVENT_SIGNATURE: &str = "MessageReceived(address,uint32,uint64,bytes32,bytes)";

pub fn mint_event_topic() -> H256 {
    H256::from(keccak256(MINT_EVENT_SIGNATURE))
}

pub fn relay_event_topic() -> H256 {
    H256::from(keccak256(RELAY_EVENT_SIGNATURE))
}

/// Bridge contracts of one destination chain.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChainContracts {
    pub token_minter: EthAddress,
    pub message_relay: EthAddress,
}

pub struct BridgeConfirmer<P> {
    chains: HashMap<String, (Arc<EvmClient<P>>, ChainContracts)>,
    confirm_timeout: Duration,
    poll_interval: Duration,
}

impl<P> BridgeConfirmer<P>
where
    P: JsonRpcClient + 'static,
{
    pub fn new(confirm_timeout: Duration, poll_interval: Duration) -> Self {
        Self {
            chains: HashMap::new(),
            confirm_timeout,
            poll_interval,
        }
    }

    pub fn add_chain(
        &mut self,
        chain: impl Into<String>,
        client: Arc<EvmClient<P>>,
        contracts: ChainContracts,
    ) {
        self.chains.insert(chain.into(), (client, contracts));
    }

    /// Confirms one expected transfer. Resolves `Ok(false)` when the
    /// window elapses; errs only on genuine I/O failures or an
    /// unconfigured chain. The log watch is torn down on every exit
    /// path since it lives inside the raced future.
    pub async fn confirm(
        &self,
        chain: &str,
        recipient: &str,
        expected_amount: u64,
    ) -> ResolverResult<bool> {
        let (client, contracts) = self
            .chains
            .get(chain)
            .ok_or_else(|| ResolverError::UnsupportedChain(chain.to_string()))?;
        let watch = watch_for_mint(
            client,
            *contracts,
            recipient,
            expected_amount,
            self.poll_interval,
        );
        match tokio::time::timeout(self.confirm_timeout, watch).await {
            Ok(result) => result,
            Err(_) => {
                info!(
                    "[BridgeConfirmer] no matching mint for {recipient} on {chain} within {:?}",
                    self.confirm_timeout
                );
                Ok(false)
            }
        }
    }
}

async fn watch_for_mint<P: JsonRpcClient + 'static>(
    client: &EvmClient<P>,
    contracts: ChainContracts,
    recipient: &str,
    expected_amount: u64,
    poll_interval: Duration,
) -> ResolverResult<bool> {
    let expected_amount = U256::from(expected_amount);
    let mut from_block = client.get_block_number().await?;
    let mut interval = tokio::time::interval(poll_interval);
    interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
    loop {
        interval.tick().await;
        let latest = client.get_block_number().await?;
        if latest < from_block {
            continue;
        }
        let logs = client
            .get_logs_in_range(contracts.token_minter, mint_event_topic(), from_block, latest)
            .await?;
        for log in &logs {
            let Some((log_recipient, log_amount)) = decode_mint_log(log) else {
                continue;
            };
            // Both checks gate acceptance independently; a log matching
            // only one of them is skipped.
            let recipient_matches =
                format!("{log_recipient:#x}").eq_ignore_ascii_case(recipient);
            let amount_matches = log_amount == expected_amount;
            if !recipient_matches || !amount_matches {
                continue;
            }
            let Some(tx_hash) = log.transaction_hash else {
                continue;
            };
            let Some(receipt) = client.get_transaction_receipt(tx_hash).await? else {
                warn!("[BridgeConfirmer] mint log without retrievable receipt: {tx_hash:?}");
                continue;
            };
            let relay_confirmed = receipt.logs.iter().any(|receipt_log| {
                receipt_log.address == contracts.message_relay
                    && receipt_log.topics.first() == Some(&relay_event_topic())
            });
            if relay_confirmed {
                info!(
                    "[BridgeConfirmer] transfer to {recipient} confirmed in tx {tx_hash:?}"
                );
                return Ok(true);
            }
            warn!(
                "[BridgeConfirmer] mint matched but no relay confirmation in tx {tx_hash:?}"
            );
        }
        from_block = latest + 1;
    }
}

fn decode_mint_log(log: &Log) -> Option<(EthAddress, U256)> {
    let recipient_topic = log.topics.get(1)?;
    let recipient = EthAddress::from_slice(&recipient_topic.as_bytes()[12..]);
    if log.data.len() < 32 {
        return None;
    }
    let amount = U256::from_big_endian(&log.data[..32]);
    Some((recipient, amount))
}

#[async_trait]
impl<P> TransferConfirmer for BridgeConfirmer<P>
where
    P: JsonRpcClient + 'static,
{
    async fn confirm(
        &self,
        chain: &str,
        recipient: &str,
        expected_amount: u64,
    ) -> ResolverResult<bool> {
        BridgeConfirmer::confirm(self, chain, recipient, expected_amount).await
    }
}
