// Copyright (c) Starcoin, Inc.
// SPDX-License-Identifier: Apache-2.0

use ethers::abi::{encode, Token};
use ethers::types::{Address as EthAddress, U256};
use ethers::utils::keccak256;
use serde::{Deserialize, Serialize};

/// Pure contract-call message.
pub const GMP_MESSAGE_ONLY: u8 = 1;
/// Contract-call message that also carries tokens.
pub const GMP_MESSAGE_WITH_TOKEN: u8 = 2;

/// One destination-chain contract call: target plus selector-prefixed
/// ABI calldata.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContractCall {
    pub target: EthAddress,
    pub call_data: Vec<u8>,
}

fn selector(signature: &str) -> [u8; 4] {
    let hash = keccak256(signature);
    [hash[0], hash[1], hash[2], hash[3]]
}

fn encode_call(signature: &str, args: &[Token]) -> Vec<u8> {
    let mut data = selector(signature).to_vec();
    data.extend(encode(args));
    data
}

/// `approve(spender, amount)` on the asset contract.
pub fn approve_call(asset: EthAddress, spender: EthAddress, amount: u64) -> ContractCall {
    ContractCall {
        target: asset,
        call_data: encode_call(
            "approve(address,uint256)",
            &[Token::Address(spender), Token::Uint(U256::from(amount))],
        ),
    }
}

/// `supply(asset, amount, onBehalfOf, referralCode)` on the pool.
pub fn aave_supply_call(
    pool: EthAddress,
    asset: EthAddress,
    amount: u64,
    on_behalf_of: EthAddress,
) -> ContractCall {
    ContractCall {
        target: pool,
        call_data: encode_call(
            "supply(address,uint256,address,uint16)",
            &[
                Token::Address(asset),
                Token::Uint(U256::from(amount)),
                Token::Address(on_behalf_of),
                Token::Uint(U256::zero()),
            ],
        ),
    }
}

/// `supply(asset, amount)` on the market.
pub fn compound_supply_call(market: EthAddress, asset: EthAddress, amount: u64) -> ContractCall {
    ContractCall {
        target: market,
        call_data: encode_call(
            "supply(address,uint256)",
            &[Token::Address(asset), Token::Uint(U256::from(amount))],
        ),
    }
}

/// ABI-encodes the call sequence as `(address,bytes)[]`, the shape the
/// remote executor walks call by call.
pub fn encode_calls(calls: &[ContractCall]) -> Vec<u8> {
    let tokens = calls
        .iter()
        .map(|call| {
            Token::Tuple(vec![
                Token::Address(call.target),
                Token::Bytes(call.call_data.clone()),
            ])
        })
        .collect();
    encode(&[Token::Array(tokens)])
}

/// Fee attached to the source-chain transaction, collected by the
/// bridge network's gas service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GmpFee {
    pub amount: String,
    pub recipient: String,
}

/// Bridge-transport envelope carried in the source transaction's memo
/// field.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GmpMemo {
    pub destination_chain: String,
    pub destination_address: String,
    /// ABI payload as a byte list; absent for account-creation pings.
    pub payload: Option<Vec<u8>>,
    #[serde(rename = "type")]
    pub message_type: u8,
    pub fee: GmpFee,
}
