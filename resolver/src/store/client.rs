// Copyright (c) Starcoin, Inc.
// SPDX-License-Identifier: Apache-2.0

use crate::error::{ResolverError, ResolverResult};
use crate::store::cell::parse_stream_cell;
use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use serde::Deserialize;
use serde_json::json;
use url::Url;

/// Read access to the chain's key-value store: paginated prefix listing
/// and point reads of the latest published value at a path.
#[async_trait]
pub trait StoreReader: Send + Sync + 'static {
    async fn keys(&self, prefix: &str) -> ResolverResult<Vec<String>>;
    async fn read_published(&self, path: &str) -> ResolverResult<serde_json::Value>;
}

/// JSON-RPC client for the store's abci_query endpoints.
#[derive(Debug, Clone)]
pub struct VstorageClient {
    http: reqwest::Client,
    rpc_url: Url,
}

#[derive(Deserialize)]
struct JsonRpcEnvelope {
    result: Option<AbciQueryResult>,
    error: Option<serde_json::Value>,
}

#[derive(Deserialize)]
struct AbciQueryResult {
    response: AbciResponse,
}

#[derive(Deserialize)]
struct AbciResponse {
    #[serde(default)]
    code: u32,
    #[serde(default)]
    value: Option<String>,
    #[serde(default)]
    log: String,
}

#[derive(Deserialize)]
struct ChildrenPage {
    #[serde(default)]
    children: Vec<String>,
    #[serde(default)]
    pagination: Option<Pagination>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct Pagination {
    #[serde(default)]
    next_key: Option<String>,
}

#[derive(Deserialize)]
struct DataCell {
    value: String,
}

impl VstorageClient {
    pub fn new(rpc_url: Url) -> Self {
        Self {
            http: reqwest::Client::new(),
            rpc_url,
        }
    }

    async fn abci_query(&self, query_path: &str, page_key: Option<&str>) -> ResolverResult<String> {
        let data = match page_key {
            Some(key) => hex::encode(key.as_bytes()),
            None => String::new(),
        };
        let request = json!({
            "jsonrpc": "2.0",
            "id": 1,
            "method": "abci_query",
            "params": { "path": query_path, "data": data, "prove": false },
        });
        let response = self
            .http
            .post(self.rpc_url.clone())
            .json(&request)
            .send()
            .await
            .map_err(|e| ResolverError::Rpc(format!("abci_query send: {e}")))?;
        let envelope: JsonRpcEnvelope = response
            .json()
            .await
            .map_err(|e| ResolverError::Rpc(format!("abci_query body: {e}")))?;
        if let Some(error) = envelope.error {
            return Err(ResolverError::Rpc(format!("abci_query error: {error}")));
        }
        let result = envelope
            .result
            .ok_or_else(|| ResolverError::Rpc("abci_query: empty result".to_string()))?;
        if result.response.code != 0 {
            return Err(ResolverError::Rpc(format!(
                "abci_query code {}: {}",
                result.response.code, result.response.log
            )));
        }
        decode_abci_value(result.response.value.as_deref().unwrap_or_default())
    }
}

/// The abci response value is base64-wrapped JSON.
fn decode_abci_value(b64: &str) -> ResolverResult<String> {
    let bytes = BASE64
        .decode(b64)
        .map_err(|e| ResolverError::Rpc(format!("abci value base64: {e}")))?;
    String::from_utf8(bytes).map_err(|e| ResolverError::Rpc(format!("abci value utf8: {e}")))
}

#[async_trait]
impl StoreReader for VstorageClient {
    async fn keys(&self, prefix: &str) -> ResolverResult<Vec<String>> {
        let query_path = format!("/custom/vstorage/children/{prefix}");
        let mut keys = Vec::new();
        let mut page_key: Option<String> = None;
        loop {
            let raw = self.abci_query(&query_path, page_key.as_deref()).await?;
            let page: ChildrenPage = serde_json::from_str(&raw)
                .map_err(|e| ResolverError::Rpc(format!("children page: {e}")))?;
            keys.extend(page.children);
            match page.pagination.and_then(|p| p.next_key) {
                Some(next) if !next.is_empty() => page_key = Some(next),
                _ => break,
            }
        }
        Ok(keys)
    }

    async fn read_published(&self, path: &str) -> ResolverResult<serde_json::Value> {
        let query_path = format!("/custom/vstorage/data/{path}");
        let raw = self.abci_query(&query_path, None).await?;
        let data: DataCell = serde_json::from_str(&raw)
            .map_err(|e| ResolverError::Rpc(format!("data cell at {path}: {e}")))?;
        let cell = parse_stream_cell(&data.value)?;
        match cell.latest() {
            Some(value) => value,
            None => Err(ResolverError::InvalidStreamCell(format!(
                "empty stream cell at {path}"
            ))),
        }
    }
}
