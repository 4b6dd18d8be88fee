// Copyright (c) Starcoin, Inc.
// SPDX-License-Identifier: Apache-2.0

//! Generalized cross-chain message dispatch.
//!
//! A dispatch builds one or more ABI-encoded destination-chain calls,
//! wraps them in the bridge-transport memo, and broadcasts a single
//! source-chain transaction carrying the native-asset fee. Execution
//! success is confirmed out of band through the bridge status API.

pub mod command;
pub mod dispatcher;
pub mod payload;

pub use command::{ChainTargets, DispatchCommand, Network, PoolKind, TargetConfig};
pub use dispatcher::{DispatchStatus, MessageDispatcher, RpcBroadcaster, TxBroadcaster};
pub use payload::{ContractCall, GmpFee, GmpMemo};
