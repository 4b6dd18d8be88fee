// Copyright (c) Starcoin, Inc.
// SPDX-License-Identifier: Apache-2.0

use std::collections::HashSet;
use std::fmt;
use std::future::Future;
use std::sync::{Arc, Mutex};
use tracing::debug;

/// Identity of one in-flight watcher task: the record it belongs to
/// (portfolio or subscription id) and the work being done for it
/// (destination chain, dispatch kind).
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct WatcherKey {
    pub owner: String,
    pub task: String,
}

impl WatcherKey {
    pub fn new(owner: impl Into<String>, task: impl Into<String>) -> Self {
        Self {
            owner: owner.into(),
            task: task.into(),
        }
    }
}

impl fmt::Display for WatcherKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.owner, self.task)
    }
}

/// Deduplicating set of in-flight watcher tasks.
///
/// Invariant: at most one active watcher per key. The check-and-insert
/// is atomic under a single mutex; the key is removed when the spawned
/// task completes, whatever the outcome, so a later event can start a
/// fresh attempt.
#[derive(Debug, Default)]
pub struct WatcherRegistry {
    active: Mutex<HashSet<WatcherKey>>,
}

impl WatcherRegistry {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Starts `start()` as a detached task unless a watcher for `key`
    /// is already running. Returns whether a task was started. Never
    /// blocks on the watcher itself.
    pub fn ensure<F, Fut>(self: &Arc<Self>, key: WatcherKey, start: F) -> bool
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = ()> + Send + 'static,
    {
        {
            let mut active = self.active.lock().expect("watcher registry poisoned");
            if !active.insert(key.clone()) {
                debug!("[WatcherRegistry] {key} already in flight, skipping");
                return false;
            }
        }
        let reservation = KeyReservation {
            registry: self.clone(),
            key,
        };
        let task = start();
        tokio::spawn(async move {
            // Removal lives in the reservation's Drop so a panicking
            // watcher still releases its key.
            let _reservation = reservation;
            task.await;
        });
        true
    }

    pub fn contains(&self, key: &WatcherKey) -> bool {
        self.active
            .lock()
            .expect("watcher registry poisoned")
            .contains(key)
    }

    pub fn len(&self) -> usize {
        self.active.lock().expect("watcher registry poisoned").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

struct KeyReservation {
    registry: Arc<WatcherRegistry>,
    key: WatcherKey,
}

impl Drop for KeyReservation {
    fn drop(&mut self) {
        self.registry
            .active
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .remove(&self.key);
    }
}
