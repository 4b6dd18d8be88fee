// Copyright (c) Starcoin, Inc.
// SPDX-License-Identifier: Apache-2.0

use crate::error::{ResolverError, ResolverResult};
use ethers::providers::{Http, JsonRpcClient, Middleware, Provider};
use ethers::types::{Address as EthAddress, Filter, Log, TransactionReceipt, TxHash, H256};
use tap::TapFallible;

/// Thin wrapper over an ethers provider exposing just what transfer
/// confirmation needs: head queries, filtered log ranges, receipts.
#[derive(Debug, Clone)]
pub struct EvmClient<P> {
    provider: Provider<P>,
}

impl EvmClient<Http> {
    pub fn new(provider_url: &str) -> ResolverResult<Self> {
        let provider = Provider::<Http>::try_from(provider_url)
            .map_err(|e| ResolverError::BridgeIo(format!("bad provider url: {e}")))?;
        Ok(Self { provider })
    }
}

impl<P> EvmClient<P>
where
    P: JsonRpcClient + 'static,
{
    pub fn new_with_provider(provider: Provider<P>) -> Self {
        Self { provider }
    }

    pub async fn get_block_number(&self) -> ResolverResult<u64> {
        let block_number = self
            .provider
            .get_block_number()
            .await
            .map_err(|e| ResolverError::BridgeIo(format!("eth_blockNumber: {e}")))?;
        Ok(block_number.as_u64())
    }

    // Note: query may fail if the range is too big. Callsite is
    // responsible for chunking.
    pub async fn get_logs_in_range(
        &self,
        address: EthAddress,
        topic0: H256,
        start_block: u64,
        end_block: u64,
    ) -> ResolverResult<Vec<Log>> {
        let filter = Filter::new()
            .from_block(start_block)
            .to_block(end_block)
            .address(address)
            .topic0(topic0);
        let logs = self
            .provider
            .get_logs(&filter)
            .await
            .map_err(|e| ResolverError::BridgeIo(format!("eth_getLogs: {e}")))
            .tap_err(|e| {
                tracing::error!("get_logs_in_range failed. Filter: {:?}. Error {:?}", filter, e)
            })?;
        // Safeguard check that all logs come from the requested contract
        if logs.iter().any(|log| log.address != address) {
            return Err(ResolverError::BridgeIo(format!(
                "provider returned logs from unexpected contract (expected {address:?})"
            )));
        }
        Ok(logs)
    }

    pub async fn get_transaction_receipt(
        &self,
        tx_hash: TxHash,
    ) -> ResolverResult<Option<TransactionReceipt>> {
        self.provider
            .get_transaction_receipt(tx_hash)
            .await
            .map_err(|e| ResolverError::BridgeIo(format!("eth_getTransactionReceipt: {e}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::evm::mock_provider::EthMockProvider;
    use ethers::types::U64;

    #[tokio::test]
    async fn test_get_block_number() {
        let mock_provider = EthMockProvider::new();
        mock_provider
            .add_response::<_, U64, _>("eth_blockNumber", (), U64::from(777))
            .unwrap();
        let client = EvmClient::new_with_provider(Provider::new(mock_provider));
        assert_eq!(client.get_block_number().await.unwrap(), 777);
    }

    #[tokio::test]
    async fn test_get_logs_rejects_foreign_contract() {
        let mock_provider = EthMockProvider::new();
        let address = EthAddress::repeat_byte(1);
        let topic = H256::repeat_byte(9);
        let filter = Filter::new()
            .from_block(10)
            .to_block(20)
            .address(address)
            .topic0(topic);
        let foreign_log = Log {
            address: EthAddress::repeat_byte(2),
            ..Default::default()
        };
        mock_provider
            .add_response::<_, Vec<Log>, _>("eth_getLogs", [&filter], vec![foreign_log])
            .unwrap();
        let client = EvmClient::new_with_provider(Provider::new(mock_provider));
        let err = client
            .get_logs_in_range(address, topic, 10, 20)
            .await
            .unwrap_err();
        assert_eq!(err.error_type(), "bridge_io");
    }

    #[tokio::test]
    async fn test_missing_receipt_is_none() {
        let mock_provider = EthMockProvider::new();
        let tx_hash = TxHash::repeat_byte(3);
        mock_provider
            .add_response::<_, Option<TransactionReceipt>, _>(
                "eth_getTransactionReceipt",
                [tx_hash],
                None,
            )
            .unwrap();
        let client = EvmClient::new_with_provider(Provider::new(mock_provider));
        assert!(client
            .get_transaction_receipt(tx_hash)
            .await
            .unwrap()
            .is_none());
    }
}
