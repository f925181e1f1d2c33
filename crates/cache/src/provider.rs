use crate::CacheEntry;

/// CacheProvider is the storage contract behind the cache manager.
/// Readers receive value copies; the store exclusively owns its entries.
#[async_trait::async_trait]
pub trait CacheProvider: Send + Sync {
    async fn get(&self, key: &str) -> Option<CacheEntry>;
    async fn set(&self, key: &str, entry: CacheEntry);
    async fn delete(&self, key: &str);
    /// Remove every entry in `namespace` declaring `tag`; returns the
    /// number removed.
    async fn delete_by_tag(&self, namespace: &str, tag: &str) -> usize;
}

/// NoopProvider stores nothing. With it, every mode degrades to a plain
/// fetch while dedupe and statistics keep working.
#[derive(Debug, Default)]
pub struct NoopProvider;

#[async_trait::async_trait]
impl CacheProvider for NoopProvider {
    async fn get(&self, _key: &str) -> Option<CacheEntry> {
        None
    }
    async fn set(&self, _key: &str, _entry: CacheEntry) {}
    async fn delete(&self, _key: &str) {}
    async fn delete_by_tag(&self, _namespace: &str, _tag: &str) -> usize {
        0
    }
}
