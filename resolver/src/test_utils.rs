// Copyright (c) Starcoin, Inc.
// SPDX-License-Identifier: Apache-2.0

//! Channel-backed fakes shared across unit tests.

use crate::chain_stream::{ChainEventStream, SubscriptionFrame};
use crate::error::{ResolverError, ResolverResult};
use crate::gmp::DispatchCommand;
use crate::portfolio::TransferConfirmer;
use crate::store::StoreReader;
use crate::subscription::CommandDispatcher;
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Mutex;
use tokio::sync::mpsc;

/// In-memory store: path -> decoded value, prefix -> child keys.
#[derive(Default)]
pub struct FakeStore {
    keys: Mutex<HashMap<String, Vec<String>>>,
    values: Mutex<HashMap<String, serde_json::Value>>,
    fail_keys: Mutex<bool>,
}

impl FakeStore {
    pub fn set_fail_keys(&self, fail: bool) {
        *self.fail_keys.lock().unwrap() = fail;
    }

    pub fn put_keys(&self, prefix: &str, children: &[&str]) {
        self.keys.lock().unwrap().insert(
            prefix.to_string(),
            children.iter().map(|s| s.to_string()).collect(),
        );
    }

    pub fn put_value(&self, path: &str, value: serde_json::Value) {
        self.values
            .lock()
            .unwrap()
            .insert(path.to_string(), value);
    }
}

#[async_trait]
impl StoreReader for FakeStore {
    async fn keys(&self, prefix: &str) -> ResolverResult<Vec<String>> {
        if *self.fail_keys.lock().unwrap() {
            return Err(ResolverError::Rpc("listing unavailable".to_string()));
        }
        Ok(self
            .keys
            .lock()
            .unwrap()
            .get(prefix)
            .cloned()
            .unwrap_or_default())
    }

    async fn read_published(&self, path: &str) -> ResolverResult<serde_json::Value> {
        self.values
            .lock()
            .unwrap()
            .get(path)
            .cloned()
            .ok_or_else(|| ResolverError::Rpc(format!("no value at {path}")))
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConfirmCall {
    pub chain: String,
    pub recipient: String,
    pub expected_amount: u64,
}

/// Records confirm calls and resolves with a canned outcome.
pub struct RecordingConfirmer {
    calls: Mutex<Vec<ConfirmCall>>,
    outcome: ResolverResult<bool>,
    hang: bool,
}

impl RecordingConfirmer {
    pub fn succeeding() -> Self {
        Self::with_outcome(Ok(true))
    }

    /// Records the call, then never completes. For asserting that the
    /// caller does not block on watchers.
    pub fn hanging() -> Self {
        Self {
            hang: true,
            ..Self::succeeding()
        }
    }

    pub fn with_outcome(outcome: ResolverResult<bool>) -> Self {
        Self {
            calls: Mutex::new(Vec::new()),
            outcome,
            hang: false,
        }
    }

    pub fn calls(&self) -> Vec<ConfirmCall> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl TransferConfirmer for RecordingConfirmer {
    async fn confirm(
        &self,
        chain: &str,
        recipient: &str,
        expected_amount: u64,
    ) -> ResolverResult<bool> {
        self.calls.lock().unwrap().push(ConfirmCall {
            chain: chain.to_string(),
            recipient: recipient.to_string(),
            expected_amount,
        });
        if self.hang {
            std::future::pending::<()>().await;
        }
        self.outcome.clone()
    }
}

/// Records dispatched commands and returns a canned tx hash.
pub struct RecordingDispatcher {
    calls: Mutex<Vec<DispatchCommand>>,
    hang: bool,
}

impl RecordingDispatcher {
    pub fn succeeding() -> Self {
        Self {
            calls: Mutex::new(Vec::new()),
            hang: false,
        }
    }

    /// Records the call, then never completes.
    pub fn hanging() -> Self {
        Self {
            hang: true,
            ..Self::succeeding()
        }
    }

    pub fn calls(&self) -> Vec<DispatchCommand> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl CommandDispatcher for RecordingDispatcher {
    async fn dispatch(&self, command: &DispatchCommand) -> ResolverResult<String> {
        self.calls.lock().unwrap().push(command.clone());
        if self.hang {
            std::future::pending::<()>().await;
        }
        Ok("TESTHASH00".to_string())
    }
}

/// Frame stream fed from a channel. Sender drop ends the stream.
pub struct FakeStream {
    rx: mpsc::UnboundedReceiver<ResolverResult<SubscriptionFrame>>,
}

impl FakeStream {
    pub fn new() -> (mpsc::UnboundedSender<ResolverResult<SubscriptionFrame>>, Self) {
        let (tx, rx) = mpsc::unbounded_channel();
        (tx, Self { rx })
    }
}

#[async_trait]
impl ChainEventStream for FakeStream {
    async fn next_frame(&mut self) -> ResolverResult<Option<SubscriptionFrame>> {
        match self.rx.recv().await {
            Some(Ok(frame)) => Ok(Some(frame)),
            Some(Err(e)) => Err(e),
            None => Ok(None),
        }
    }
}
