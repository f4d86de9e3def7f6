// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

use super::traits::{SetStore, StorageError};
use async_trait::async_trait;
use dashmap::DashMap;
use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, Ordering};

/// In-process [`SetStore`], for tests and single-node use.
///
/// Individual commands can be made to fail to exercise the degraded paths
/// of the cache adapter.
pub struct InMemorySetStore {
    sets: DashMap<String, HashSet<String>>,
    fail_adds: AtomicBool,
    fail_removes: AtomicBool,
    fail_lists: AtomicBool,
}

impl InMemorySetStore {
    #[must_use]
    pub fn new() -> Self {
        Self {
            sets: DashMap::new(),
            fail_adds: AtomicBool::new(false),
            fail_removes: AtomicBool::new(false),
            fail_lists: AtomicBool::new(false),
        }
    }

    /// Every command fails while offline.
    pub fn set_offline(&self, offline: bool) {
        self.fail_adds.store(offline, Ordering::SeqCst);
        self.fail_removes.store(offline, Ordering::SeqCst);
        self.fail_lists.store(offline, Ordering::SeqCst);
    }

    pub fn fail_adds(&self, fail: bool) {
        self.fail_adds.store(fail, Ordering::SeqCst);
    }

    pub fn fail_removes(&self, fail: bool) {
        self.fail_removes.store(fail, Ordering::SeqCst);
    }

    /// Cardinality of one set.
    #[must_use]
    pub fn len(&self, set: &str) -> usize {
        self.sets.get(set).map(|s| s.len()).unwrap_or(0)
    }

    /// True when no set holds any member.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.sets.iter().all(|entry| entry.value().is_empty())
    }

    pub fn clear(&self) {
        self.sets.clear();
    }

    fn check(flag: &AtomicBool, command: &str) -> Result<(), StorageError> {
        if flag.load(Ordering::SeqCst) {
            Err(StorageError::Backend(format!("{command} failed: store offline")))
        } else {
            Ok(())
        }
    }
}

impl Default for InMemorySetStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl SetStore for InMemorySetStore {
    async fn add_members(&self, set: &str, members: &[String]) -> Result<usize, StorageError> {
        Self::check(&self.fail_adds, "SADD")?;
        let mut entry = self.sets.entry(set.to_string()).or_default();
        Ok(members.iter().filter(|m| entry.insert((*m).clone())).count())
    }

    async fn remove_members(&self, set: &str, members: &[String]) -> Result<usize, StorageError> {
        Self::check(&self.fail_removes, "SREM")?;
        let Some(mut entry) = self.sets.get_mut(set) else {
            return Ok(0);
        };
        Ok(members.iter().filter(|m| entry.remove(m.as_str())).count())
    }

    async fn list_members(&self, set: &str) -> Result<Vec<String>, StorageError> {
        Self::check(&self.fail_lists, "SMEMBERS")?;
        Ok(self
            .sets
            .get(set)
            .map(|s| s.iter().cloned().collect())
            .unwrap_or_default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn members(items: &[&str]) -> Vec<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    #[tokio::test]
    async fn test_new_store_is_empty() {
        let store = InMemorySetStore::new();
        assert!(store.is_empty());
        assert_eq!(store.len("user"), 0);
        assert!(store.list_members("user").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_add_is_set_semantics() {
        let store = InMemorySetStore::new();
        assert_eq!(store.add_members("user", &members(&["a", "b"])).await.unwrap(), 2);
        assert_eq!(store.add_members("user", &members(&["a", "c"])).await.unwrap(), 1);
        assert_eq!(store.len("user"), 3);
    }

    #[tokio::test]
    async fn test_remove_counts_only_present() {
        let store = InMemorySetStore::new();
        store.add_members("user", &members(&["a", "b"])).await.unwrap();
        assert_eq!(store.remove_members("user", &members(&["a", "z"])).await.unwrap(), 1);
        assert_eq!(store.remove_members("nobody", &members(&["a"])).await.unwrap(), 0);

        let mut left = store.list_members("user").await.unwrap();
        left.sort();
        assert_eq!(left, members(&["b"]));
    }

    #[tokio::test]
    async fn test_offline_fails_every_command() {
        let store = InMemorySetStore::new();
        store.set_offline(true);
        assert!(store.add_members("s", &members(&["a"])).await.is_err());
        assert!(store.remove_members("s", &members(&["a"])).await.is_err());
        assert!(store.list_members("s").await.is_err());

        store.set_offline(false);
        store.fail_removes(true);
        assert!(store.add_members("s", &members(&["a"])).await.is_ok());
        assert!(store.remove_members("s", &members(&["a"])).await.is_err());
    }

    #[tokio::test]
    async fn test_clear() {
        let store = InMemorySetStore::new();
        store.add_members("a", &members(&["1"])).await.unwrap();
        store.clear();
        assert!(store.is_empty());
    }
}
