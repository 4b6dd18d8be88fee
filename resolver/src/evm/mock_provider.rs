// Copyright (c) Starcoin, Inc.
// SPDX-License-Identifier: Apache-2.0

//! A mock ethers provider keyed by `(method, params)`, so polling loops
//! can be tested deterministically.

use async_trait::async_trait;
use ethers::providers::{JsonRpcClient, MockError};
use serde::{de::DeserializeOwned, Serialize};
use serde_json::Value;
use std::borrow::Borrow;
use std::collections::HashMap;
use std::fmt::Debug;
use std::sync::{Arc, Mutex};

#[derive(Debug, Clone, Default)]
pub struct EthMockProvider {
    responses: Arc<Mutex<HashMap<(String, String), Value>>>,
}

impl EthMockProvider {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers (or replaces) the response for `method` called with
    /// exactly `params`.
    pub fn add_response<P: Serialize + Send + Sync, T: Serialize + Send + Sync, K: Borrow<T>>(
        &self,
        method: &str,
        params: P,
        data: K,
    ) -> Result<(), MockError> {
        let params = serde_json::to_value(params)?.to_string();
        let value = serde_json::to_value(data.borrow())?;
        self.responses
            .lock()
            .unwrap()
            .insert((method.to_owned(), params), value);
        Ok(())
    }
}

#[async_trait]
impl JsonRpcClient for EthMockProvider {
    type Error = MockError;

    async fn request<T: Debug + Serialize + Send + Sync, R: DeserializeOwned + Send>(
        &self,
        method: &str,
        params: T,
    ) -> Result<R, MockError> {
        let params = serde_json::to_value(&params)?.to_string();
        let element = self
            .responses
            .lock()
            .unwrap()
            .get(&(method.to_owned(), params))
            .cloned()
            .ok_or(MockError::EmptyResponses)?;
        Ok(serde_json::from_value(element)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ethers::providers::{Middleware, Provider};
    use ethers::types::U64;

    #[tokio::test]
    async fn test_responses_keyed_by_method_and_params() {
        let mock = EthMockProvider::new();
        mock.add_response::<_, U64, _>("eth_blockNumber", (), U64::from(42))
            .unwrap();
        let provider = Provider::new(mock.clone());
        assert_eq!(provider.get_block_number().await.unwrap(), U64::from(42));

        // Replacing the response takes effect immediately
        mock.add_response::<_, U64, _>("eth_blockNumber", (), U64::from(43))
            .unwrap();
        assert_eq!(provider.get_block_number().await.unwrap(), U64::from(43));
    }
}
