// Copyright (c) Starcoin, Inc.
// SPDX-License-Identifier: Apache-2.0

use prometheus::{
    register_histogram_vec_with_registry, register_int_counter_vec_with_registry,
    register_int_counter_with_registry, register_int_gauge_with_registry, HistogramVec,
    IntCounter, IntCounterVec, IntGauge, Registry,
};

const CONFIRM_LATENCY_SEC_BUCKETS: &[f64] = &[
    0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10., 20., 30., 60., 120., 180., 240., 300.,
];

#[derive(Clone, Debug)]
pub struct ResolverMetrics {
    pub(crate) frames_received: IntCounterVec,
    pub(crate) store_updates_extracted: IntCounter,
    pub(crate) scoped_errors: IntCounterVec,

    pub(crate) watchers_started: IntCounter,
    pub(crate) watchers_deduped: IntCounter,
    pub(crate) watcher_outcomes: IntCounterVec,
    pub(crate) active_watchers: IntGauge,

    pub(crate) known_portfolios: IntGauge,
    pub(crate) last_observed_height: IntGauge,
    pub(crate) deposit_activity: IntCounter,

    pub(crate) confirm_latency: HistogramVec,
}

impl ResolverMetrics {
    pub fn new(registry: &Registry) -> Self {
        Self {
            frames_received: register_int_counter_vec_with_registry!(
                "resolver_frames_received",
                "Total number of subscription frames received, by query",
                &["query"],
                registry,
            )
            .unwrap(),
            store_updates_extracted: register_int_counter_with_registry!(
                "resolver_store_updates_extracted",
                "Total number of store mutation events extracted from frames",
                registry,
            )
            .unwrap(),
            scoped_errors: register_int_counter_vec_with_registry!(
                "resolver_scoped_errors",
                "Total number of per-event/per-portfolio errors that were logged and skipped",
                &["error_type"],
                registry,
            )
            .unwrap(),
            watchers_started: register_int_counter_with_registry!(
                "resolver_watchers_started",
                "Total number of confirmation watcher tasks started",
                registry,
            )
            .unwrap(),
            watchers_deduped: register_int_counter_with_registry!(
                "resolver_watchers_deduped",
                "Total number of watcher starts skipped because the key was in flight",
                registry,
            )
            .unwrap(),
            watcher_outcomes: register_int_counter_vec_with_registry!(
                "resolver_watcher_outcomes",
                "Total number of completed watchers, by terminal outcome",
                &["outcome"],
                registry,
            )
            .unwrap(),
            active_watchers: register_int_gauge_with_registry!(
                "resolver_active_watchers",
                "Number of watcher tasks currently in flight",
                registry,
            )
            .unwrap(),
            known_portfolios: register_int_gauge_with_registry!(
                "resolver_known_portfolios",
                "Number of portfolios in the in-memory index",
                registry,
            )
            .unwrap(),
            last_observed_height: register_int_gauge_with_registry!(
                "resolver_last_observed_height",
                "Latest block height observed from the header subscription",
                registry,
            )
            .unwrap(),
            deposit_activity: register_int_counter_with_registry!(
                "resolver_deposit_activity",
                "Total number of bank events matched to a portfolio deposit address",
                registry,
            )
            .unwrap(),
            confirm_latency: register_histogram_vec_with_registry!(
                "resolver_confirm_latency",
                "Seconds from watcher start to terminal confirmation status, by chain",
                &["chain"],
                CONFIRM_LATENCY_SEC_BUCKETS.to_vec(),
                registry,
            )
            .unwrap(),
        }
    }

    pub fn new_for_testing() -> Self {
        Self::new(&Registry::new())
    }
}
