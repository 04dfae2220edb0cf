// siphon-rs - The Siphon SIP Stack
// Copyright (C) 2025 James Ferris <ferrous.communications@gmail.com>
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! HA1 sources for response verification.

use async_trait::async_trait;
use dashmap::DashMap;
use smol_str::SmolStr;
use std::sync::Arc;
use tokio::runtime::Handle;
use tokio::task;

use crate::digest::{calc_ha1, Algorithm, HashHex};

/// Supplies the stored `MD5(username:realm:password)` for a user.
pub trait Ha1Provider: Send + Sync {
    fn ha1(&self, username: &str, realm: &str) -> Option<HashHex>;
}

/// Async HA1 source for non-blocking backends.
#[async_trait]
pub trait AsyncHa1Provider: Send + Sync {
    async fn ha1(&self, username: &str, realm: &str) -> Option<HashHex>;
}

/// Adapter to expose an async provider as a sync one.
///
/// Must be called from within a multi-threaded tokio runtime.
pub struct AsyncToSyncHa1Adapter<T: AsyncHa1Provider> {
    inner: T,
}

impl<T: AsyncHa1Provider> AsyncToSyncHa1Adapter<T> {
    pub fn new(inner: T) -> Self {
        Self { inner }
    }

    fn block_on<F: std::future::Future>(&self, fut: F) -> F::Output {
        task::block_in_place(|| Handle::current().block_on(fut))
    }
}

impl<T: AsyncHa1Provider> Ha1Provider for AsyncToSyncHa1Adapter<T> {
    fn ha1(&self, username: &str, realm: &str) -> Option<HashHex> {
        self.block_on(self.inner.ha1(username, realm))
    }
}

/// Adapter to expose a synchronous provider as async using spawn_blocking.
pub struct SyncToAsyncHa1Adapter<T: Ha1Provider> {
    inner: Arc<T>,
}

impl<T: Ha1Provider> SyncToAsyncHa1Adapter<T> {
    pub fn new(inner: T) -> Self {
        Self {
            inner: Arc::new(inner),
        }
    }
}

#[async_trait]
impl<T: Ha1Provider + 'static> AsyncHa1Provider for SyncToAsyncHa1Adapter<T> {
    async fn ha1(&self, username: &str, realm: &str) -> Option<HashHex> {
        let inner = Arc::clone(&self.inner);
        let username = username.to_owned();
        let realm = realm.to_owned();
        task::spawn_blocking(move || inner.ha1(&username, &realm))
            .await
            .ok()
            .flatten()
    }
}

/// In-memory HA1 table for testing and small deployments.
#[derive(Debug, Default)]
pub struct MemoryHa1Store {
    entries: DashMap<(SmolStr, SmolStr), HashHex>,
}

impl MemoryHa1Store {
    pub fn new() -> Self {
        Self::default()
    }

    /// Stores the HA1 derived from a plaintext password.
    pub fn add_password(&self, username: &str, realm: &str, password: &str) {
        let ha1 = calc_ha1(Algorithm::Md5, username, realm, password, "", "");
        self.add_ha1(username, realm, ha1);
    }

    pub fn add_ha1(&self, username: &str, realm: &str, ha1: HashHex) {
        self.entries
            .insert((SmolStr::new(username), SmolStr::new(realm)), ha1);
    }

    pub fn remove(&self, username: &str, realm: &str) -> bool {
        self.entries
            .remove(&(SmolStr::new(username), SmolStr::new(realm)))
            .is_some()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl Ha1Provider for MemoryHa1Store {
    fn ha1(&self, username: &str, realm: &str) -> Option<HashHex> {
        self.entries
            .get(&(SmolStr::new(username), SmolStr::new(realm)))
            .map(|entry| entry.value().clone())
    }
}

#[async_trait]
impl AsyncHa1Provider for MemoryHa1Store {
    async fn ha1(&self, username: &str, realm: &str) -> Option<HashHex> {
        Ha1Provider::ha1(self, username, realm)
    }
}

impl<T: Ha1Provider + ?Sized> Ha1Provider for Arc<T> {
    fn ha1(&self, username: &str, realm: &str) -> Option<HashHex> {
        (**self).ha1(username, realm)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn memory_store_lookup() {
        let store = MemoryHa1Store::new();
        store.add_password("Mufasa", "testrealm@host.com", "Circle Of Life");
        let ha1 = Ha1Provider::ha1(&store, "Mufasa", "testrealm@host.com").expect("ha1");
        assert_eq!(ha1.as_str(), "939e7578ed9e3c518a452acee763bce9");
        assert!(Ha1Provider::ha1(&store, "Mufasa", "other").is_none());
        assert!(store.remove("Mufasa", "testrealm@host.com"));
        assert!(store.is_empty());
    }

    #[test]
    fn stores_precomputed_ha1() {
        let store = MemoryHa1Store::new();
        let ha1 = HashHex::parse("939E7578ED9E3C518A452ACEE763BCE9").expect("hex");
        store.add_ha1("alice", "example.com", ha1.clone());
        assert_eq!(Ha1Provider::ha1(&store, "alice", "example.com"), Some(ha1));
    }

    #[tokio::test]
    async fn sync_to_async_adapter() {
        let store = MemoryHa1Store::new();
        store.add_password("alice", "example.com", "secret");
        let adapter = SyncToAsyncHa1Adapter::new(store);
        assert!(AsyncHa1Provider::ha1(&adapter, "alice", "example.com").await.is_some());
        assert!(AsyncHa1Provider::ha1(&adapter, "bob", "example.com").await.is_none());
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn async_to_sync_adapter() {
        let store = MemoryHa1Store::new();
        store.add_password("alice", "example.com", "secret");
        let adapter = AsyncToSyncHa1Adapter::new(store);
        assert!(Ha1Provider::ha1(&adapter, "alice", "example.com").is_some());
    }
}
