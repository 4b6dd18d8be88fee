// Copyright (c) Starcoin, Inc.
// SPDX-License-Identifier: Apache-2.0

//! Chain event subscriptions and store-mutation extraction.
//!
//! The chain RPC delivers `{query, data, events}` frames over a
//! WebSocket subscription. Store mutations are spread across the
//! begin-block/end-block/deliver-tx buckets inside `data`; the
//! [`EventFilter`] narrows them down to `(path, raw_value)` pairs under
//! the configured collection prefix, preserving delivery order.

use crate::error::{ResolverError, ResolverResult};
use crate::store::{decode_key, path_starts_with};
use async_trait::async_trait;
use futures::{SinkExt, StreamExt};
use serde::Deserialize;
use serde_json::json;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use tracing::warn;
use url::Url;

/// Filter for block-header frames. Store mutations from block-level
/// activity ride on these.
pub const NEW_BLOCK_HEADER_QUERY: &str = "tm.event = 'NewBlockHeader'";
/// Filter for transaction frames.
pub const TX_QUERY: &str = "tm.event = 'Tx'";

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct EventAttribute {
    pub key: String,
    pub value: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct RawEvent {
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub attributes: Vec<EventAttribute>,
}

impl RawEvent {
    pub fn attribute(&self, key: &str) -> Option<&str> {
        self.attributes
            .iter()
            .find(|a| a.key == key)
            .map(|a| a.value.as_str())
    }
}

/// One delivered subscription frame, flattened: the buckets inside
/// `data` are concatenated in their wire order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubscriptionFrame {
    pub query: String,
    pub block_height: Option<u64>,
    pub events: Vec<RawEvent>,
}

/// Ordered stream of subscription frames. The WebSocket client
/// implements this; tests drive the coordinator with channel-backed
/// fakes.
#[async_trait]
pub trait ChainEventStream: Send {
    /// Next frame in delivery order. `Ok(None)` is a graceful stream
    /// end; `Err` is an unrecoverable subscription failure.
    async fn next_frame(&mut self) -> ResolverResult<Option<SubscriptionFrame>>;
}

/// Parses one raw JSON-RPC message from the event subscription.
/// Returns `None` for subscribe acks and other frames without payload.
pub fn parse_rpc_message(raw: &str) -> ResolverResult<Option<SubscriptionFrame>> {
    let message: serde_json::Value = serde_json::from_str(raw)
        .map_err(|e| ResolverError::Rpc(format!("subscription frame: {e}")))?;
    if let Some(error) = message.get("error") {
        return Err(ResolverError::Rpc(format!("subscription error: {error}")));
    }
    let result = match message.get("result") {
        Some(r) => r,
        None => return Ok(None),
    };
    let query = match result.get("query").and_then(|q| q.as_str()) {
        Some(q) => q.to_string(),
        // Subscribe ack carries an empty result
        None => return Ok(None),
    };
    let data_value = result
        .get("data")
        .and_then(|d| d.get("value"))
        .cloned()
        .unwrap_or(serde_json::Value::Null);

    let block_height = data_value
        .get("header")
        .and_then(|h| h.get("height"))
        .and_then(|h| h.as_str())
        .and_then(|h| h.parse::<u64>().ok());

    let mut events = Vec::new();
    if let Some(buckets) = data_value.as_object() {
        for (bucket, value) in buckets {
            let bucket_events = if bucket.starts_with("result_") {
                value.get("events")
            } else if bucket == "TxResult" {
                value.get("result").and_then(|r| r.get("events"))
            } else {
                None
            };
            let Some(bucket_events) = bucket_events else {
                continue;
            };
            match serde_json::from_value::<Vec<RawEvent>>(bucket_events.clone()) {
                Ok(mut parsed) => events.append(&mut parsed),
                Err(e) => warn!("[ChainStream] undecodable events in {bucket}: {e}"),
            }
        }
    }
    Ok(Some(SubscriptionFrame {
        query,
        block_height,
        events,
    }))
}

/// WebSocket subscription client for a tendermint-style chain RPC.
pub struct TendermintWsStream {
    ws: WebSocketStream<MaybeTlsStream<tokio::net::TcpStream>>,
}

impl TendermintWsStream {
    /// Connects and issues one `subscribe` call per query. Failure here
    /// is fatal to the caller.
    pub async fn connect(url: &Url, queries: &[&str]) -> ResolverResult<Self> {
        let (mut ws, _) = connect_async(url.as_str())
            .await
            .map_err(|e| ResolverError::Rpc(format!("subscription connect: {e}")))?;
        for (id, query) in queries.iter().enumerate() {
            let request = json!({
                "jsonrpc": "2.0",
                "id": id + 1,
                "method": "subscribe",
                "params": { "query": query },
            });
            ws.send(Message::Text(request.to_string()))
                .await
                .map_err(|e| ResolverError::Rpc(format!("subscribe {query:?}: {e}")))?;
        }
        Ok(Self { ws })
    }
}

#[async_trait]
impl ChainEventStream for TendermintWsStream {
    async fn next_frame(&mut self) -> ResolverResult<Option<SubscriptionFrame>> {
        loop {
            let message = match self.ws.next().await {
                Some(Ok(m)) => m,
                Some(Err(e)) => return Err(ResolverError::Rpc(format!("subscription read: {e}"))),
                None => return Ok(None),
            };
            match message {
                Message::Text(raw) => {
                    if let Some(frame) = parse_rpc_message(&raw)? {
                        return Ok(Some(frame));
                    }
                }
                Message::Ping(payload) => {
                    self.ws
                        .send(Message::Pong(payload))
                        .await
                        .map_err(|e| ResolverError::Rpc(format!("pong: {e}")))?;
                }
                Message::Close(_) => return Ok(None),
                _ => {}
            }
        }
    }
}

/// Which watched collection a store mutation belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpdateKind {
    Portfolio,
    Subscription,
}

/// One store mutation under a watched prefix, in delivery order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoreUpdate {
    pub kind: UpdateKind,
    pub path: String,
    pub value: String,
}

/// Narrows a frame's raw events down to store mutations under the two
/// watched collection prefixes, classifying each by collection.
#[derive(Debug, Clone)]
pub struct EventFilter {
    store_name: String,
    portfolio_prefix: String,
    subscription_prefix: String,
}

impl EventFilter {
    pub fn new(
        store_name: impl Into<String>,
        portfolio_prefix: impl Into<String>,
        subscription_prefix: impl Into<String>,
    ) -> Self {
        Self {
            store_name: store_name.into(),
            portfolio_prefix: portfolio_prefix.into(),
            subscription_prefix: subscription_prefix.into(),
        }
    }

    pub fn portfolio_prefix(&self) -> &str {
        &self.portfolio_prefix
    }

    /// Extracts classified updates in input order. A single defective
    /// event is dropped with a warning, never an error; dedup and
    /// reordering are downstream concerns.
    pub fn extract(&self, events: &[RawEvent]) -> Vec<StoreUpdate> {
        let mut updates = Vec::new();
        for event in events {
            if event.kind != "state_change" {
                continue;
            }
            if event.attribute("store") != Some(self.store_name.as_str()) {
                continue;
            }
            let (Some(key), Some(value)) = (event.attribute("key"), event.attribute("value"))
            else {
                warn!(
                    "[EventFilter] {} state_change missing key and/or value attribute",
                    self.store_name
                );
                continue;
            };
            let path = match decode_key(key) {
                Ok(path) => path,
                Err(e) => {
                    warn!("[EventFilter] dropping event with undecodable key: {e}");
                    continue;
                }
            };
            let kind = if path_starts_with(&path, &self.portfolio_prefix) {
                UpdateKind::Portfolio
            } else if path_starts_with(&path, &self.subscription_prefix) {
                UpdateKind::Subscription
            } else {
                continue;
            };
            updates.push(StoreUpdate {
                kind,
                path,
                value: value.to_string(),
            });
        }
        updates
    }
}
