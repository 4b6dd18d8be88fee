// Copyright (c) Starcoin, Inc.
// SPDX-License-Identifier: Apache-2.0

use crate::error::{ResolverError, ResolverResult};
use crate::gmp::command::{DispatchCommand, TargetConfig};
use crate::gmp::payload::{GmpFee, GmpMemo};
use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use ethers::signers::{coins_bip39::English, LocalWallet, MnemonicBuilder, Signer};
use ethers::types::H256;
use ethers::utils::keccak256;
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::sync::Arc;
use tracing::info;
use url::Url;

/// Denom of the bridged asset attached to supply dispatches.
const TRANSFER_DENOM: &str = "uusdc";

/// Source-chain transfer carrying the bridge memo. The ledger itself is
/// external; this is its wire shape at the boundary.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceTx {
    pub sender: String,
    pub receiver: String,
    pub denom: String,
    pub amount: String,
    pub memo: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignedSourceTx {
    pub tx: SourceTx,
    pub signer: String,
    pub signature: String,
}

/// Terminal report from the bridge status API for one dispatch.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct DispatchStatus {
    pub success: bool,
    #[serde(default)]
    pub logs: Vec<serde_json::Value>,
}

#[async_trait]
pub trait TxBroadcaster: Send + Sync {
    /// Submits the signed transaction, returning its hash.
    async fn broadcast(&self, signed: &SignedSourceTx) -> ResolverResult<String>;
}

/// Broadcasts through the chain RPC's sync endpoint.
pub struct RpcBroadcaster {
    http: reqwest::Client,
    rpc_url: Url,
}

impl RpcBroadcaster {
    pub fn new(rpc_url: Url) -> Self {
        Self {
            http: reqwest::Client::new(),
            rpc_url,
        }
    }
}

#[derive(Deserialize)]
struct BroadcastEnvelope {
    result: Option<BroadcastResult>,
    error: Option<serde_json::Value>,
}

#[derive(Deserialize)]
struct BroadcastResult {
    #[serde(default)]
    code: u32,
    #[serde(default)]
    log: String,
    hash: String,
}

#[async_trait]
impl TxBroadcaster for RpcBroadcaster {
    async fn broadcast(&self, signed: &SignedSourceTx) -> ResolverResult<String> {
        let tx_bytes = serde_json::to_vec(signed)
            .map_err(|e| ResolverError::Dispatch(format!("encode tx: {e}")))?;
        let request = json!({
            "jsonrpc": "2.0",
            "id": 1,
            "method": "broadcast_tx_sync",
            "params": { "tx": BASE64.encode(tx_bytes) },
        });
        let response = self
            .http
            .post(self.rpc_url.clone())
            .json(&request)
            .send()
            .await
            .map_err(|e| ResolverError::Dispatch(format!("broadcast send: {e}")))?;
        let envelope: BroadcastEnvelope = response
            .json()
            .await
            .map_err(|e| ResolverError::Dispatch(format!("broadcast body: {e}")))?;
        if let Some(error) = envelope.error {
            return Err(ResolverError::Dispatch(format!("broadcast error: {error}")));
        }
        let result = envelope
            .result
            .ok_or_else(|| ResolverError::Dispatch("broadcast: empty result".to_string()))?;
        if result.code != 0 {
            return Err(ResolverError::Dispatch(format!(
                "broadcast rejected with code {}: {}",
                result.code, result.log
            )));
        }
        Ok(result.hash)
    }
}

pub struct MessageDispatcher {
    targets: TargetConfig,
    wallet: LocalWallet,
    sender: String,
    broadcaster: Arc<dyn TxBroadcaster>,
    status_url: Url,
    http: reqwest::Client,
}

impl MessageDispatcher {
    pub fn new(
        targets: TargetConfig,
        wallet: LocalWallet,
        sender: String,
        broadcaster: Arc<dyn TxBroadcaster>,
        status_url: Url,
    ) -> Self {
        Self {
            targets,
            wallet,
            sender,
            broadcaster,
            status_url,
            http: reqwest::Client::new(),
        }
    }

    pub fn from_mnemonic(
        targets: TargetConfig,
        mnemonic: &str,
        sender: String,
        broadcaster: Arc<dyn TxBroadcaster>,
        status_url: Url,
    ) -> ResolverResult<Self> {
        let wallet = MnemonicBuilder::<English>::default()
            .phrase(mnemonic)
            .build()
            .map_err(|e| ResolverError::Dispatch(format!("mnemonic: {e}")))?;
        Ok(Self::new(targets, wallet, sender, broadcaster, status_url))
    }

    /// Validates, wraps, signs, and broadcasts the command as one
    /// source-chain transaction. Target validation happens before any
    /// network access.
    pub async fn dispatch(&self, command: &DispatchCommand) -> ResolverResult<String> {
        let plan = self.targets.resolve(command)?;
        let memo = GmpMemo {
            destination_chain: plan.destination_chain.clone(),
            destination_address: format!("{:#x}", plan.destination_address),
            payload: plan.payload,
            message_type: plan.message_type,
            fee: GmpFee {
                amount: plan.gas_amount.to_string(),
                recipient: self.targets.gas_recipient.clone(),
            },
        };
        let (denom, amount) = match plan.transfer_amount {
            Some(transfer_amount) => (TRANSFER_DENOM.to_string(), transfer_amount),
            None => (self.targets.fee_denom.clone(), plan.gas_amount),
        };
        let tx = SourceTx {
            sender: self.sender.clone(),
            receiver: self.targets.gmp_account.clone(),
            denom,
            amount: amount.to_string(),
            memo: serde_json::to_string(&memo)
                .map_err(|e| ResolverError::Dispatch(format!("encode memo: {e}")))?,
        };
        let tx_bytes = serde_json::to_vec(&tx)
            .map_err(|e| ResolverError::Dispatch(format!("encode tx: {e}")))?;
        let digest = H256::from(keccak256(&tx_bytes));
        let signature = self
            .wallet
            .sign_hash(digest)
            .map_err(|e| ResolverError::Dispatch(format!("sign: {e}")))?;
        let signed = SignedSourceTx {
            tx,
            signer: format!("{:#x}", self.wallet.address()),
            signature: signature.to_string(),
        };
        let tx_hash = self.broadcaster.broadcast(&signed).await?;
        info!(
            "[MessageDispatcher] dispatched to {} as {tx_hash}",
            plan.destination_chain
        );
        Ok(tx_hash)
    }

    /// One status query per call; retry cadence belongs to the caller.
    pub async fn poll_status(&self, tx_hash: &str) -> ResolverResult<DispatchStatus> {
        let response = self
            .http
            .get(self.status_url.clone())
            .query(&[("txHash", tx_hash)])
            .send()
            .await
            .map_err(|e| ResolverError::BridgeIo(format!("status query: {e}")))?;
        response
            .json()
            .await
            .map_err(|e| ResolverError::BridgeIo(format!("status body: {e}")))
    }
}

#[async_trait]
impl crate::subscription::CommandDispatcher for MessageDispatcher {
    async fn dispatch(&self, command: &DispatchCommand) -> ResolverResult<String> {
        MessageDispatcher::dispatch(self, command).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gmp::command::PoolKind;
    use std::sync::Mutex;

    const TEST_MNEMONIC: &str =
        "test test test test test test test test test test test junk";

    struct RecordingBroadcaster {
        sent: Mutex<Vec<SignedSourceTx>>,
    }

    impl RecordingBroadcaster {
        fn new() -> Arc<Self> {
            Arc::new(Self {
                sent: Mutex::new(Vec::new()),
            })
        }
    }

    #[async_trait]
    impl TxBroadcaster for RecordingBroadcaster {
        async fn broadcast(&self, signed: &SignedSourceTx) -> ResolverResult<String> {
            self.sent.lock().unwrap().push(signed.clone());
            Ok("ABCDEF0123".to_string())
        }
    }

    struct PanickingBroadcaster;

    #[async_trait]
    impl TxBroadcaster for PanickingBroadcaster {
        async fn broadcast(&self, _: &SignedSourceTx) -> ResolverResult<String> {
            panic!("unknown targets must be rejected before any network call");
        }
    }

    fn dispatcher(broadcaster: Arc<dyn TxBroadcaster>) -> MessageDispatcher {
        MessageDispatcher::from_mnemonic(
            TargetConfig::testnet(),
            TEST_MNEMONIC,
            "agoric1sender".to_string(),
            broadcaster,
            Url::parse("https://bridge-status.example/status").unwrap(),
        )
        .unwrap()
    }

    #[tokio::test]
    async fn test_unknown_chain_skips_broadcast() {
        let dispatcher = dispatcher(Arc::new(PanickingBroadcaster));
        let err = dispatcher
            .dispatch(&DispatchCommand::CreateRemoteAccount {
                chain: "Osmosis".to_string(),
                gas_amount: 1,
            })
            .await
            .unwrap_err();
        assert_eq!(err.error_type(), "unknown_target");
    }

    #[tokio::test]
    async fn test_create_remote_account_tx_shape() {
        let broadcaster = RecordingBroadcaster::new();
        let dispatcher = dispatcher(broadcaster.clone());
        let tx_hash = dispatcher
            .dispatch(&DispatchCommand::CreateRemoteAccount {
                chain: "Ethereum".to_string(),
                gas_amount: 500_000,
            })
            .await
            .unwrap();
        assert_eq!(tx_hash, "ABCDEF0123");

        let sent = broadcaster.sent.lock().unwrap();
        assert_eq!(sent.len(), 1);
        let signed = &sent[0];
        assert_eq!(signed.tx.sender, "agoric1sender");
        assert_eq!(signed.tx.receiver, TargetConfig::testnet().gmp_account);
        // Fee payment only; nothing transferred
        assert_eq!(signed.tx.denom, "ubld");
        assert_eq!(signed.tx.amount, "500000");
        assert!(!signed.signature.is_empty());

        let memo: serde_json::Value = serde_json::from_str(&signed.tx.memo).unwrap();
        assert_eq!(memo["destination_chain"], "ethereum-sepolia");
        assert_eq!(memo["type"], 1);
        assert_eq!(memo["payload"], serde_json::Value::Null);
    }

    #[tokio::test]
    async fn test_supply_tx_carries_transfer_amount() {
        let broadcaster = RecordingBroadcaster::new();
        let dispatcher = dispatcher(broadcaster.clone());
        dispatcher
            .dispatch(&DispatchCommand::SupplyToLendingPool {
                pool: PoolKind::Compound,
                chain: "Ethereum".to_string(),
                gas_amount: 400_000,
                transfer_amount: 1_000_000,
                remote_address: "0x8cb4b25e27b10e0c470906de2f79fc04a1d32b8c".to_string(),
            })
            .await
            .unwrap();

        let sent = broadcaster.sent.lock().unwrap();
        let signed = &sent[0];
        assert_eq!(signed.tx.denom, "uusdc");
        assert_eq!(signed.tx.amount, "1000000");
        let memo: serde_json::Value = serde_json::from_str(&signed.tx.memo).unwrap();
        assert_eq!(memo["type"], 2);
        assert_eq!(
            memo["destination_address"],
            "0x8cb4b25e27b10e0c470906de2f79fc04a1d32b8c"
        );
        assert!(memo["payload"].as_array().is_some());
        assert_eq!(memo["fee"]["amount"], "400000");
    }

    #[tokio::test]
    async fn test_signing_is_deterministic() {
        let broadcaster = RecordingBroadcaster::new();
        let dispatcher = dispatcher(broadcaster.clone());
        let command = DispatchCommand::CreateRemoteAccount {
            chain: "Avalanche".to_string(),
            gas_amount: 7,
        };
        dispatcher.dispatch(&command).await.unwrap();
        dispatcher.dispatch(&command).await.unwrap();
        let sent = broadcaster.sent.lock().unwrap();
        assert_eq!(sent[0], sent[1]);
    }

    #[test]
    fn test_status_wire_shape() {
        let status: DispatchStatus =
            serde_json::from_str(r#"{"success":true,"logs":[{"step":"executed"}]}"#).unwrap();
        assert!(status.success);
        assert_eq!(status.logs.len(), 1);

        let status: DispatchStatus = serde_json::from_str(r#"{"success":false}"#).unwrap();
        assert!(!status.success);
        assert!(status.logs.is_empty());
    }
}
