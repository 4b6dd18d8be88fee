// Copyright (c) Starcoin, Inc.
// SPDX-License-Identifier: Apache-2.0

//! Top-level consumption loop.
//!
//! One logical stream: subscribe, bootstrap, then process each frame's
//! store mutations in strict delivery order, routing portfolio updates
//! to the portfolio index and subscription records to the subscription
//! index. The loop itself never waits on a watcher; those run as
//! detached tasks and finish on their own schedule, including past
//! coordinator shutdown.

use crate::chain_stream::{ChainEventStream, EventFilter, RawEvent, SubscriptionFrame, UpdateKind};
use crate::error::ResolverResult;
use crate::metrics::ResolverMetrics;
use crate::portfolio::PortfolioIndex;
use crate::subscription::SubscriptionIndex;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

pub struct SubscriptionCoordinator<S> {
    stream: S,
    filter: EventFilter,
    index: PortfolioIndex,
    subscriptions: SubscriptionIndex,
    metrics: Arc<ResolverMetrics>,
    cancel: CancellationToken,
}

impl<S> SubscriptionCoordinator<S>
where
    S: ChainEventStream,
{
    pub fn new(
        stream: S,
        filter: EventFilter,
        index: PortfolioIndex,
        subscriptions: SubscriptionIndex,
        metrics: Arc<ResolverMetrics>,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            stream,
            filter,
            index,
            subscriptions,
            metrics,
            cancel,
        }
    }

    /// Runs until the stream ends (graceful), the subscription fails
    /// (fatal), or the token is cancelled. Portfolio bootstrap-listing
    /// failure is fatal too: there is no coherent state without it. The
    /// subscription collection bootstraps leniently.
    pub async fn run(mut self) -> ResolverResult<()> {
        self.index.bootstrap().await.map_err(|e| {
            error!("[Coordinator] bootstrap failed: {e}");
            e
        })?;
        self.subscriptions.bootstrap().await;
        info!(
            "[Coordinator] consuming events under {} and {}",
            self.filter.portfolio_prefix(),
            self.subscriptions.prefix()
        );
        loop {
            tokio::select! {
                _ = self.cancel.cancelled() => {
                    info!("[Coordinator] shutdown requested, closing subscriptions");
                    return Ok(());
                }
                frame = self.stream.next_frame() => {
                    match frame {
                        Ok(Some(frame)) => self.process_frame(frame).await,
                        Ok(None) => {
                            info!("[Coordinator] event stream ended");
                            return Ok(());
                        }
                        Err(e) => {
                            error!("[Coordinator] subscription failed: {e}");
                            return Err(e);
                        }
                    }
                }
            }
        }
    }

    async fn process_frame(&mut self, frame: SubscriptionFrame) {
        self.metrics
            .frames_received
            .with_label_values(&[&frame.query])
            .inc();
        if let Some(height) = frame.block_height {
            self.metrics.last_observed_height.set(height as i64);
        }
        let updates = self.filter.extract(&frame.events);
        self.metrics
            .store_updates_extracted
            .inc_by(updates.len() as u64);
        for update in updates {
            let result = match update.kind {
                UpdateKind::Portfolio => self.index.on_event(&update.path, &update.value).await,
                UpdateKind::Subscription => {
                    self.subscriptions.on_event(&update.path, &update.value).await
                }
            };
            if let Err(e) = result {
                warn!("[Coordinator] skipping event at {}: {e}", update.path);
                self.metrics
                    .scoped_errors
                    .with_label_values(&[e.error_type()])
                    .inc();
            }
        }
        self.detect_deposit_activity(&frame.events).await;
    }

    /// Matches the frame's bank activity against known deposit
    /// addresses. A hit re-reads that portfolio immediately instead of
    /// waiting for the next store notification.
    async fn detect_deposit_activity(&mut self, events: &[RawEvent]) {
        let mut addresses: Vec<&str> = Vec::new();
        for event in events {
            let names: &[&str] = match event.kind.as_str() {
                "coin_received" => &["receiver"],
                "coin_spent" => &["spender"],
                "transfer" => &["recipient", "sender"],
                _ => continue,
            };
            for name in names {
                if let Some(address) = event.attribute(name) {
                    if !addresses.contains(&address) {
                        addresses.push(address);
                    }
                }
            }
        }
        let mut touched: Vec<String> = Vec::new();
        for address in addresses {
            if let Some(portfolio_id) = self.index.portfolio_for_deposit(address) {
                info!("[Coordinator] deposit activity on {address} for {portfolio_id}");
                self.metrics.deposit_activity.inc();
                if !touched.iter().any(|id| id == portfolio_id) {
                    touched.push(portfolio_id.to_string());
                }
            }
        }
        for portfolio_id in touched {
            self.index.refresh_portfolio(&portfolio_id).await;
        }
    }
}
