// Copyright (c) Starcoin, Inc.
// SPDX-License-Identifier: Apache-2.0

//! Orchestration subscription consumption.
//!
//! Next to the portfolio collection the store publishes a second
//! collection of subscription records: one-shot task requests with a
//! lifecycle status. Pending `bridgeConfirm` records are routed to the
//! transfer confirmer, pending `messageDispatch` records to the command
//! dispatcher, each as a detached watcher deduplicated through the
//! shared registry.

use crate::error::{ResolverError, ResolverResult};
use crate::gmp::DispatchCommand;
use crate::metrics::ResolverMetrics;
use crate::portfolio::{TransferConfirmer, TransferRecord, TransferStatus};
use crate::registry::{WatcherKey, WatcherRegistry};
use crate::store::{parse_stream_cell, StoreReader};
use async_trait::async_trait;
use serde::Deserialize;
use std::sync::Arc;
use tracing::{debug, error, info, warn};

pub const DEFAULT_SUBSCRIPTION_PREFIX: &str = "published.orchestration.subscriptions";

/// Dispatches a validated command to the bridge. [`MessageDispatcher`]
/// implements this; tests use recording fakes.
///
/// [`MessageDispatcher`]: crate::gmp::MessageDispatcher
#[async_trait]
pub trait CommandDispatcher: Send + Sync + 'static {
    async fn dispatch(&self, command: &DispatchCommand) -> ResolverResult<String>;
}

/// A pending bridge-transfer confirmation. The transfer record lives
/// keyed by chain inside a portfolio; standalone it carries its chain
/// inline.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BridgeConfirmTask {
    pub chain: String,
    #[serde(flatten)]
    pub transfer: TransferRecord,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(tag = "kind", content = "payload", rename_all = "camelCase")]
pub enum SubscriptionTask {
    BridgeConfirm(BridgeConfirmTask),
    MessageDispatch(DispatchCommand),
}

impl SubscriptionTask {
    fn kind(&self) -> &'static str {
        match self {
            SubscriptionTask::BridgeConfirm(_) => "bridgeConfirm",
            SubscriptionTask::MessageDispatch(_) => "messageDispatch",
        }
    }
}

/// One published subscription record. The id is not part of the value;
/// it is the store key under the collection prefix.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Subscription {
    pub status: TransferStatus,
    #[serde(flatten)]
    pub task: SubscriptionTask,
}

pub struct SubscriptionIndex {
    store: Arc<dyn StoreReader>,
    confirmer: Arc<dyn TransferConfirmer>,
    dispatcher: Arc<dyn CommandDispatcher>,
    registry: Arc<WatcherRegistry>,
    metrics: Arc<ResolverMetrics>,
    prefix: String,
}

impl SubscriptionIndex {
    pub fn new(
        store: Arc<dyn StoreReader>,
        confirmer: Arc<dyn TransferConfirmer>,
        dispatcher: Arc<dyn CommandDispatcher>,
        registry: Arc<WatcherRegistry>,
        metrics: Arc<ResolverMetrics>,
        prefix: impl Into<String>,
    ) -> Self {
        Self {
            store,
            confirmer,
            dispatcher,
            registry,
            metrics,
            prefix: prefix.into(),
        }
    }

    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    /// Lists existing subscriptions and starts handlers for the pending
    /// ones. Unlike the portfolio bootstrap, a failed listing is not
    /// fatal: the collection may simply not exist yet.
    pub async fn bootstrap(&self) {
        let keys = match self.store.keys(&self.prefix).await {
            Ok(keys) => keys,
            Err(e) => {
                warn!("[SubscriptionIndex] no existing subscriptions under {}: {e}", self.prefix);
                return;
            }
        };
        info!(
            "[SubscriptionIndex] found {} existing subscriptions under {}",
            keys.len(),
            self.prefix
        );
        for subscription_id in keys {
            let path = format!("{}.{}", self.prefix, subscription_id);
            let value = match self.store.read_published(&path).await {
                Ok(value) => value,
                Err(e) => {
                    warn!("[SubscriptionIndex] could not read {subscription_id}: {e}");
                    self.count_scoped_error(&e);
                    continue;
                }
            };
            match parse_subscription(value, 0) {
                Ok(subscription) => self.launch(&subscription_id, subscription),
                Err(e) => {
                    warn!("[SubscriptionIndex] skipping {subscription_id}: {e}");
                    self.count_scoped_error(&e);
                }
            }
        }
    }

    /// Applies one store mutation under the subscription prefix. The id
    /// is the first path segment after the prefix; each stream-cell
    /// element is handled independently, bad ones logged and skipped.
    pub async fn on_event(&self, path: &str, raw_value: &str) -> ResolverResult<()> {
        let Some(relative) = path
            .strip_prefix(self.prefix.as_str())
            .and_then(|rest| rest.strip_prefix('.'))
        else {
            // The collection root itself carries no records
            return Ok(());
        };
        let subscription_id = relative.split('.').next().unwrap_or(relative);

        let cell = parse_stream_cell(raw_value)?;
        for (index, decoded) in cell.decoded_values() {
            let parsed = decoded.and_then(|value| parse_subscription(value, index));
            match parsed {
                Ok(subscription) => self.launch(subscription_id, subscription),
                Err(e) => {
                    warn!("[SubscriptionIndex] skipping record {index} at {path}: {e}");
                    self.count_scoped_error(&e);
                }
            }
        }
        Ok(())
    }

    /// Starts the handler for a pending subscription as a detached
    /// watcher. Replays of the same record are absorbed by the
    /// registry's dedup.
    fn launch(&self, subscription_id: &str, subscription: Subscription) {
        if subscription.status != TransferStatus::Pending {
            debug!(
                "[SubscriptionIndex] {subscription_id} is {:?}, nothing to do",
                subscription.status
            );
            return;
        }
        let key = WatcherKey::new(subscription_id, subscription.task.kind());
        let confirmer = self.confirmer.clone();
        let dispatcher = self.dispatcher.clone();
        let metrics = self.metrics.clone();
        let watcher_key = key.clone();
        let started = self.registry.ensure(key, move || async move {
            metrics.active_watchers.inc();
            let label = match subscription.task {
                SubscriptionTask::BridgeConfirm(task) => {
                    match confirmer
                        .confirm(&task.chain, &task.transfer.receiver, task.transfer.amount)
                        .await
                    {
                        Ok(true) => {
                            info!(
                                "[Subscription] {watcher_key} confirmed transfer of {} to {}",
                                task.transfer.amount, task.transfer.receiver
                            );
                            "confirmed"
                        }
                        Ok(false) => {
                            warn!("[Subscription] {watcher_key} confirmation window elapsed");
                            "timeout"
                        }
                        Err(e) => {
                            error!("[Subscription] {watcher_key} failed: {e}");
                            "error"
                        }
                    }
                }
                SubscriptionTask::MessageDispatch(command) => {
                    match dispatcher.dispatch(&command).await {
                        Ok(tx_hash) => {
                            info!("[Subscription] {watcher_key} dispatched as {tx_hash}");
                            "dispatched"
                        }
                        Err(e) => {
                            error!("[Subscription] {watcher_key} dispatch failed: {e}");
                            "error"
                        }
                    }
                }
            };
            metrics.active_watchers.dec();
            metrics.watcher_outcomes.with_label_values(&[label]).inc();
        });
        if started {
            self.metrics.watchers_started.inc();
        } else {
            self.metrics.watchers_deduped.inc();
        }
    }

    fn count_scoped_error(&self, e: &ResolverError) {
        self.metrics
            .scoped_errors
            .with_label_values(&[e.error_type()])
            .inc();
    }
}

fn parse_subscription(value: serde_json::Value, index: usize) -> ResolverResult<Subscription> {
    serde_json::from_value(value).map_err(|e| ResolverError::InvalidRecord {
        index,
        reason: e.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::{FakeStore, RecordingConfirmer, RecordingDispatcher};
    use serde_json::json;
    use std::time::Duration;

    const PREFIX: &str = "published.orchestration.subscriptions";

    fn dispatch_record(status: &str) -> serde_json::Value {
        json!({
            "kind": "messageDispatch",
            "status": status,
            "payload": {
                "method": "createRemoteAccount",
                "chain": "Ethereum",
                "gasAmount": 500000
            }
        })
    }

    fn confirm_record() -> serde_json::Value {
        json!({
            "kind": "bridgeConfirm",
            "status": "pending",
            "payload": {
                "chain": "Ethereum",
                "amount": 1_000_000,
                "chainAssetId": "eip155:11155111",
                "receiver": "0x8cb4b25e27b10e0c470906de2f79fc04a1d32b8c",
                "status": "pending"
            }
        })
    }

    fn stream_cell(records: &[serde_json::Value]) -> String {
        json!({
            "values": records.iter().map(|r| r.to_string()).collect::<Vec<_>>(),
            "blockHeight": "200"
        })
        .to_string()
    }

    fn make_index(
        store: Arc<FakeStore>,
        confirmer: Arc<RecordingConfirmer>,
        dispatcher: Arc<RecordingDispatcher>,
    ) -> SubscriptionIndex {
        SubscriptionIndex::new(
            store,
            confirmer,
            dispatcher,
            WatcherRegistry::new(),
            Arc::new(ResolverMetrics::new_for_testing()),
            PREFIX,
        )
    }

    #[test]
    fn test_subscription_wire_shape() {
        let subscription: Subscription = serde_json::from_value(dispatch_record("pending")).unwrap();
        assert_eq!(subscription.status, TransferStatus::Pending);
        assert_eq!(
            subscription.task,
            SubscriptionTask::MessageDispatch(DispatchCommand::CreateRemoteAccount {
                chain: "Ethereum".to_string(),
                gas_amount: 500_000,
            })
        );

        let subscription: Subscription = serde_json::from_value(confirm_record()).unwrap();
        let SubscriptionTask::BridgeConfirm(task) = subscription.task else {
            panic!("expected bridgeConfirm");
        };
        assert_eq!(task.chain, "Ethereum");
        assert_eq!(task.transfer.amount, 1_000_000);
    }

    #[tokio::test]
    async fn test_pending_dispatch_reaches_dispatcher() {
        let dispatcher = Arc::new(RecordingDispatcher::succeeding());
        let index = make_index(
            Arc::new(FakeStore::default()),
            Arc::new(RecordingConfirmer::succeeding()),
            dispatcher.clone(),
        );
        index
            .on_event(
                &format!("{PREFIX}.subscription1234"),
                &stream_cell(&[dispatch_record("pending")]),
            )
            .await
            .unwrap();

        tokio::time::sleep(Duration::from_millis(50)).await;
        let calls = dispatcher.calls();
        assert_eq!(calls.len(), 1);
        assert_eq!(
            calls[0],
            DispatchCommand::CreateRemoteAccount {
                chain: "Ethereum".to_string(),
                gas_amount: 500_000,
            }
        );
    }

    #[tokio::test]
    async fn test_pending_confirm_reaches_confirmer() {
        let confirmer = Arc::new(RecordingConfirmer::succeeding());
        let index = make_index(
            Arc::new(FakeStore::default()),
            confirmer.clone(),
            Arc::new(RecordingDispatcher::succeeding()),
        );
        index
            .on_event(
                &format!("{PREFIX}.subscription77"),
                &stream_cell(&[confirm_record()]),
            )
            .await
            .unwrap();

        tokio::time::sleep(Duration::from_millis(50)).await;
        let calls = confirmer.calls();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].chain, "Ethereum");
        assert_eq!(calls[0].recipient, "0x8cb4b25e27b10e0c470906de2f79fc04a1d32b8c");
        assert_eq!(calls[0].expected_amount, 1_000_000);
    }

    #[tokio::test]
    async fn test_non_pending_subscription_is_skipped() {
        let dispatcher = Arc::new(RecordingDispatcher::succeeding());
        let index = make_index(
            Arc::new(FakeStore::default()),
            Arc::new(RecordingConfirmer::succeeding()),
            dispatcher.clone(),
        );
        index
            .on_event(
                &format!("{PREFIX}.subscription1234"),
                &stream_cell(&[dispatch_record("success"), dispatch_record("timeout")]),
            )
            .await
            .unwrap();

        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(dispatcher.calls().is_empty());
    }

    #[tokio::test]
    async fn test_replayed_record_is_deduped() {
        let dispatcher = Arc::new(RecordingDispatcher::hanging());
        let index = make_index(
            Arc::new(FakeStore::default()),
            Arc::new(RecordingConfirmer::succeeding()),
            dispatcher.clone(),
        );
        let path = format!("{PREFIX}.subscription1234");
        let cell = stream_cell(&[dispatch_record("pending")]);
        index.on_event(&path, &cell).await.unwrap();
        index.on_event(&path, &cell).await.unwrap();

        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(dispatcher.calls().len(), 1);
    }

    #[tokio::test]
    async fn test_malformed_record_is_scoped() {
        let dispatcher = Arc::new(RecordingDispatcher::succeeding());
        let index = make_index(
            Arc::new(FakeStore::default()),
            Arc::new(RecordingConfirmer::succeeding()),
            dispatcher.clone(),
        );
        let raw = json!({
            "values": ["{broken", dispatch_record("pending").to_string()],
            "blockHeight": "201"
        })
        .to_string();
        index
            .on_event(&format!("{PREFIX}.subscription9"), &raw)
            .await
            .unwrap();

        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(dispatcher.calls().len(), 1);
    }

    #[tokio::test]
    async fn test_bootstrap_launches_pending_subscriptions() {
        let store = Arc::new(FakeStore::default());
        store.put_keys(PREFIX, &["subscription1", "subscription2"]);
        store.put_value(&format!("{PREFIX}.subscription1"), dispatch_record("pending"));
        store.put_value(&format!("{PREFIX}.subscription2"), dispatch_record("success"));
        let dispatcher = Arc::new(RecordingDispatcher::succeeding());
        let index = make_index(
            store,
            Arc::new(RecordingConfirmer::succeeding()),
            dispatcher.clone(),
        );

        index.bootstrap().await;
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(dispatcher.calls().len(), 1);
    }

    #[tokio::test]
    async fn test_bootstrap_listing_failure_is_not_fatal() {
        let store = Arc::new(FakeStore::default());
        store.set_fail_keys(true);
        let index = make_index(
            store,
            Arc::new(RecordingConfirmer::succeeding()),
            Arc::new(RecordingDispatcher::succeeding()),
        );
        index.bootstrap().await;
    }
}
