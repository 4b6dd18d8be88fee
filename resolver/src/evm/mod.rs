// Copyright (c) Starcoin, Inc.
// SPDX-License-Identifier: Apache-2.0

//! Destination-chain (EVM) access: provider wrapper and the burn/mint
//! transfer confirmer.

pub mod client;
pub mod confirm;

#[cfg(test)]
pub mod mock_provider;

pub use client::EvmClient;
pub use confirm::{BridgeConfirmer, ChainContracts};
