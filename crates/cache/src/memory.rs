use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::Mutex;

use crate::{CacheEntry, CacheProvider, Freshness};

/// MemoryProvider is a bounded in-process LRU store with a tag index.
///
/// Recency is tracked with a monotonic tick per touch; eviction removes
/// the least-recently-used entry once capacity is exceeded.
pub struct MemoryProvider {
    capacity: usize,
    inner: Mutex<Store>,
}

#[derive(Default)]
struct Store {
    entries: HashMap<String, Stored>,
    recency: BTreeMap<u64, String>,
    /// `namespace:tag` → keys declaring it.
    tags: HashMap<String, HashSet<String>>,
    tick: u64,
}

struct Stored {
    entry: CacheEntry,
    tick: u64,
}

impl MemoryProvider {
    pub fn new(capacity: usize) -> MemoryProvider {
        MemoryProvider {
            capacity: capacity.max(1),
            inner: Mutex::new(Store::default()),
        }
    }

    /// Drop expired entries wholesale.
    pub fn prune_expired(&self) -> usize {
        let mut store = self.inner.lock().expect("store lock is never poisoned");
        let expired: Vec<String> = store
            .entries
            .iter()
            .filter(|(_, stored)| stored.entry.freshness() == Freshness::Expired)
            .map(|(key, _)| key.clone())
            .collect();

        for key in &expired {
            store.remove(key);
        }
        tracing::debug!(pruned = expired.len(), "pruned expired cache entries");
        expired.len()
    }

    pub fn len(&self) -> usize {
        self.inner
            .lock()
            .expect("store lock is never poisoned")
            .entries
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Store {
    fn touch(&mut self, key: &str) {
        let next = {
            self.tick += 1;
            self.tick
        };
        if let Some(stored) = self.entries.get_mut(key) {
            self.recency.remove(&stored.tick);
            stored.tick = next;
            self.recency.insert(next, key.to_string());
        }
    }

    fn remove(&mut self, key: &str) -> Option<CacheEntry> {
        let stored = self.entries.remove(key)?;
        self.recency.remove(&stored.tick);
        for keys in self.tags.values_mut() {
            keys.remove(key);
        }
        Some(stored.entry)
    }

    fn evict_to(&mut self, capacity: usize) {
        while self.entries.len() > capacity {
            let Some((_, key)) = self.recency.iter().next().map(|(t, k)| (*t, k.clone())) else {
                break;
            };
            self.remove(&key);
        }
    }
}

fn tag_index(namespace: &str, tag: &str) -> String {
    format!("{namespace}:{tag}")
}

#[async_trait::async_trait]
impl CacheProvider for MemoryProvider {
    async fn get(&self, key: &str) -> Option<CacheEntry> {
        let mut store = self.inner.lock().expect("store lock is never poisoned");
        store.touch(key);
        store.entries.get(key).map(|stored| stored.entry.clone())
    }

    async fn set(&self, key: &str, entry: CacheEntry) {
        let mut store = self.inner.lock().expect("store lock is never poisoned");

        store.remove(key);
        store.tick += 1;
        let tick = store.tick;

        for tag in &entry.tags {
            // Tags are namespaced by the manager before they reach the
            // provider; index them verbatim.
            store
                .tags
                .entry(tag.clone())
                .or_default()
                .insert(key.to_string());
        }
        store.recency.insert(tick, key.to_string());
        store.entries.insert(key.to_string(), Stored { entry, tick });
        store.evict_to(self.capacity);
    }

    async fn delete(&self, key: &str) {
        let mut store = self.inner.lock().expect("store lock is never poisoned");
        store.remove(key);
    }

    async fn delete_by_tag(&self, namespace: &str, tag: &str) -> usize {
        let mut store = self.inner.lock().expect("store lock is never poisoned");
        let keys: Vec<String> = store
            .tags
            .get(&tag_index(namespace, tag))
            .map(|keys| keys.iter().cloned().collect())
            .unwrap_or_default();

        for key in &keys {
            store.remove(key);
        }
        store.tags.remove(&tag_index(namespace, tag));
        keys.len()
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use std::time::Duration;

    fn entry(tags: &[&str]) -> CacheEntry {
        CacheEntry::new(Vec::new(), Duration::from_secs(60))
            .with_tags(tags.iter().map(|t| tag_index("q", t)))
    }

    #[tokio::test]
    async fn least_recently_used_entries_evict_first() {
        let provider = MemoryProvider::new(2);
        provider.set("a", entry(&[])).await;
        provider.set("b", entry(&[])).await;

        // Touch `a` so that `b` becomes the eviction candidate.
        provider.get("a").await.unwrap();
        provider.set("c", entry(&[])).await;

        assert!(provider.get("a").await.is_some());
        assert!(provider.get("b").await.is_none());
        assert!(provider.get("c").await.is_some());
    }

    #[tokio::test]
    async fn tag_invalidation_removes_declaring_entries() {
        let provider = MemoryProvider::new(8);
        provider.set("a", entry(&["orders"])).await;
        provider.set("b", entry(&["orders", "daily"])).await;
        provider.set("c", entry(&["users"])).await;

        assert_eq!(provider.delete_by_tag("q", "orders").await, 2);
        assert!(provider.get("a").await.is_none());
        assert!(provider.get("b").await.is_none());
        assert!(provider.get("c").await.is_some());
    }

    #[tokio::test]
    async fn prune_drops_expired_entries() {
        let provider = MemoryProvider::new(8);
        let mut expired = entry(&[]);
        expired.created_at = std::time::Instant::now() - Duration::from_secs(120);
        provider.set("old", expired).await;
        provider.set("new", entry(&[])).await;

        assert_eq!(provider.prune_expired(), 1);
        assert_eq!(provider.len(), 1);
    }
}
