// Copyright (c) Starcoin, Inc.
// SPDX-License-Identifier: Apache-2.0

//! In-memory index of portfolios and their pending cross-chain
//! transfers.
//!
//! The index is populated once at startup from a prefix listing and
//! then kept current from store-mutation events. Events only signal
//! that something changed; the authoritative value is always re-fetched
//! by point read, so the index never acts on partial stream-cell
//! fragments.

use crate::error::{ResolverError, ResolverResult};
use crate::metrics::ResolverMetrics;
use crate::registry::{WatcherKey, WatcherRegistry};
use crate::store::{parse_stream_cell, StoreReader};
use async_trait::async_trait;
use futures::StreamExt;
use serde::Deserialize;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, warn};

/// Bound on concurrent point reads during bootstrap.
const BOOTSTRAP_READ_CONCURRENCY: usize = 8;
/// Bootstrap point reads are retried with backoff up to this limit.
const BOOTSTRAP_READ_MAX_ELAPSED: Duration = Duration::from_secs(30);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransferStatus {
    Pending,
    Success,
    Timeout,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransferRecord {
    pub amount: u64,
    pub chain_asset_id: String,
    pub receiver: String,
    pub status: TransferStatus,
}

/// Last observed published status of one portfolio. `pending_transfers`
/// is a snapshot, replaced wholesale on every update, not an append log.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PortfolioStatus {
    #[serde(default)]
    pub position_keys: Vec<String>,
    pub flow_count: u64,
    #[serde(default)]
    pub account_id_by_chain: BTreeMap<String, String>,
    #[serde(default)]
    pub deposit_address: Option<String>,
    #[serde(default)]
    pub target_allocation: Option<BTreeMap<String, u64>>,
    #[serde(default)]
    pub pending_transfers: BTreeMap<String, TransferRecord>,
}

/// Confirms one pending transfer on its destination chain. Resolves
/// `Ok(false)` on timeout; `Err` only for genuine I/O failures.
#[async_trait]
pub trait TransferConfirmer: Send + Sync + 'static {
    async fn confirm(
        &self,
        chain: &str,
        recipient: &str,
        expected_amount: u64,
    ) -> ResolverResult<bool>;
}

pub struct PortfolioIndex {
    store: Arc<dyn StoreReader>,
    confirmer: Arc<dyn TransferConfirmer>,
    registry: Arc<WatcherRegistry>,
    metrics: Arc<ResolverMetrics>,
    /// Collection root path, e.g. `published.ymax0.portfolios`.
    prefix: String,
    portfolios: HashMap<String, PortfolioStatus>,
    portfolio_by_deposit: HashMap<String, String>,
}

impl PortfolioIndex {
    pub fn new(
        store: Arc<dyn StoreReader>,
        confirmer: Arc<dyn TransferConfirmer>,
        registry: Arc<WatcherRegistry>,
        metrics: Arc<ResolverMetrics>,
        prefix: impl Into<String>,
    ) -> Self {
        Self {
            store,
            confirmer,
            registry,
            metrics,
            prefix: prefix.into(),
            portfolios: HashMap::new(),
            portfolio_by_deposit: HashMap::new(),
        }
    }

    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    pub fn len(&self) -> usize {
        self.portfolios.len()
    }

    pub fn is_empty(&self) -> bool {
        self.portfolios.is_empty()
    }

    pub fn get(&self, portfolio_id: &str) -> Option<&PortfolioStatus> {
        self.portfolios.get(portfolio_id)
    }

    /// Reverse lookup from a bridge-facing deposit address.
    pub fn portfolio_for_deposit(&self, deposit_address: &str) -> Option<&str> {
        self.portfolio_by_deposit
            .get(deposit_address)
            .map(|s| s.as_str())
    }

    /// Lists every portfolio under the prefix and loads its current
    /// status. The listing itself is fatal; a single portfolio's
    /// read/validate failure is logged and skipped.
    pub async fn bootstrap(&mut self) -> ResolverResult<()> {
        let keys = self.store.keys(&self.prefix).await?;
        info!(
            "[PortfolioIndex] bootstrapping {} portfolios under {}",
            keys.len(),
            self.prefix
        );
        let store = self.store.clone();
        let prefix = self.prefix.clone();
        let reads: Vec<(String, ResolverResult<PortfolioStatus>)> =
            futures::stream::iter(keys.into_iter().map(|portfolio_id| {
                let store = store.clone();
                let path = format!("{prefix}.{portfolio_id}");
                async move {
                    let result = read_status_with_retry(&*store, &path, &portfolio_id).await;
                    (portfolio_id, result)
                }
            }))
            .buffer_unordered(BOOTSTRAP_READ_CONCURRENCY)
            .collect()
            .await;

        for (portfolio_id, result) in reads {
            match result {
                Ok(status) => self.upsert(&portfolio_id, status),
                Err(e) => {
                    warn!("[PortfolioIndex] skipping {portfolio_id} during bootstrap: {e}");
                    self.metrics
                        .scoped_errors
                        .with_label_values(&[e.error_type()])
                        .inc();
                }
            }
        }
        Ok(())
    }

    /// Applies one store mutation. Collection-root events announce new
    /// portfolios; any other path under the prefix is a change
    /// notification for that portfolio. Per-portfolio failures are
    /// logged and swallowed; only an undecodable collection-root cell
    /// is surfaced (the caller logs it and moves on).
    pub async fn on_event(&mut self, path: &str, raw_value: &str) -> ResolverResult<()> {
        if path == self.prefix {
            let cell = parse_stream_cell(raw_value)?;
            for (index, decoded) in cell.decoded_values().collect::<Vec<_>>() {
                let value = match decoded {
                    Ok(value) => value,
                    Err(e) => {
                        warn!("[PortfolioIndex] skipping record {index} at {path}: {e}");
                        self.metrics
                            .scoped_errors
                            .with_label_values(&[e.error_type()])
                            .inc();
                        continue;
                    }
                };
                let Some(portfolio_id) = value.get("addPortfolio").and_then(|v| v.as_str()) else {
                    continue;
                };
                info!("[PortfolioIndex] portfolio announced: {portfolio_id}");
                self.refresh_portfolio(&portfolio_id.to_string()).await;
            }
            return Ok(());
        }

        // `<prefix>.<id>` or deeper; either way the portfolio id is the
        // first segment after the prefix and the value is re-fetched.
        let Some(relative) = path
            .strip_prefix(self.prefix.as_str())
            .and_then(|rest| rest.strip_prefix('.'))
        else {
            warn!("[PortfolioIndex] event path {path} outside prefix {}", self.prefix);
            return Ok(());
        };
        let portfolio_id = relative
            .split('.')
            .next()
            .unwrap_or(relative)
            .to_string();
        self.refresh_portfolio(&portfolio_id).await;
        Ok(())
    }

    /// Re-reads a portfolio's authoritative status by point read and
    /// replaces the entry. Failures are logged and counted, never
    /// propagated; the next notification retries naturally.
    pub async fn refresh_portfolio(&mut self, portfolio_id: &str) {
        if let Err(e) = self.refresh(portfolio_id).await {
            warn!("[PortfolioIndex] failed to refresh {portfolio_id}: {e}");
            self.metrics
                .scoped_errors
                .with_label_values(&[e.error_type()])
                .inc();
        }
    }

    async fn refresh(&mut self, portfolio_id: &str) -> ResolverResult<()> {
        let path = format!("{}.{}", self.prefix, portfolio_id);
        let value = self.store.read_published(&path).await?;
        let status = parse_status(portfolio_id, value)?;
        self.upsert(portfolio_id, status);
        Ok(())
    }

    fn upsert(&mut self, portfolio_id: &str, status: PortfolioStatus) {
        // Keep the reverse map consistent with the new snapshot
        if let Some(previous) = self.portfolios.get(portfolio_id) {
            if let Some(old_addr) = &previous.deposit_address {
                if previous.deposit_address != status.deposit_address {
                    self.portfolio_by_deposit.remove(old_addr);
                }
            }
        }
        if let Some(addr) = &status.deposit_address {
            self.portfolio_by_deposit
                .insert(addr.clone(), portfolio_id.to_string());
        }

        self.trigger_watchers(portfolio_id, &status);
        self.portfolios.insert(portfolio_id.to_string(), status);
        self.metrics
            .known_portfolios
            .set(self.portfolios.len() as i64);
    }

    /// Starts one watcher per pending `(portfolio, chain)` transfer.
    /// Re-triggering is idempotent through the registry's dedup.
    fn trigger_watchers(&self, portfolio_id: &str, status: &PortfolioStatus) {
        for (chain, transfer) in &status.pending_transfers {
            if transfer.status != TransferStatus::Pending {
                continue;
            }
            let key = WatcherKey::new(portfolio_id, chain.as_str());
            let confirmer = self.confirmer.clone();
            let metrics = self.metrics.clone();
            let chain = chain.clone();
            let transfer = transfer.clone();
            let watcher_key = key.clone();
            let started = self.registry.ensure(key, move || async move {
                metrics.active_watchers.inc();
                let started_at = std::time::Instant::now();
                let outcome = confirmer
                    .confirm(&chain, &transfer.receiver, transfer.amount)
                    .await;
                metrics
                    .confirm_latency
                    .with_label_values(&[&chain])
                    .observe(started_at.elapsed().as_secs_f64());
                metrics.active_watchers.dec();
                let label = match outcome {
                    Ok(true) => {
                        info!(
                            "[Watcher] {watcher_key} confirmed transfer of {} to {}",
                            transfer.amount, transfer.receiver
                        );
                        "confirmed"
                    }
                    Ok(false) => {
                        warn!("[Watcher] {watcher_key} confirmation window elapsed");
                        "timeout"
                    }
                    Err(e) => {
                        error!("[Watcher] {watcher_key} failed: {e}");
                        "error"
                    }
                };
                metrics.watcher_outcomes.with_label_values(&[label]).inc();
            });
            if started {
                self.metrics.watchers_started.inc();
            } else {
                self.metrics.watchers_deduped.inc();
            }
        }
    }
}

fn parse_status(portfolio_id: &str, value: serde_json::Value) -> ResolverResult<PortfolioStatus> {
    serde_json::from_value(value).map_err(|e| ResolverError::SchemaViolation {
        portfolio: portfolio_id.to_string(),
        reason: e.to_string(),
    })
}

async fn read_status_with_retry(
    store: &dyn StoreReader,
    path: &str,
    portfolio_id: &str,
) -> ResolverResult<PortfolioStatus> {
    let value = match crate::retry_with_max_elapsed_time!(
        store.read_published(path),
        BOOTSTRAP_READ_MAX_ELAPSED
    ) {
        Ok(Ok(value)) => value,
        Ok(Err(e)) | Err(e) => return Err(e),
    };
    parse_status(portfolio_id, value)
}
