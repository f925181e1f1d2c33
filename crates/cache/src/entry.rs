use std::collections::BTreeSet;
use std::time::{Duration, Instant};

/// A decoded result row, as cached.
pub type Row = serde_json::Map<String, serde_json::Value>;

/// Freshness of a cache entry relative to its TTLs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Freshness {
    /// Within the TTL.
    Fresh,
    /// Past the TTL but within the stale window.
    Stale,
    /// Beyond both windows.
    Expired,
}

/// CacheEntry owns one cached payload with its TTLs and declared tags.
#[derive(Debug, Clone)]
pub struct CacheEntry {
    pub payload: Vec<Row>,
    pub created_at: Instant,
    pub ttl: Duration,
    /// Additional window during which the entry may be served stale.
    pub stale_ttl: Option<Duration>,
    pub tags: BTreeSet<String>,
}

impl CacheEntry {
    pub fn new(payload: Vec<Row>, ttl: Duration) -> CacheEntry {
        CacheEntry {
            payload,
            created_at: Instant::now(),
            ttl,
            stale_ttl: None,
            tags: BTreeSet::new(),
        }
    }

    pub fn with_stale_ttl(mut self, stale_ttl: Duration) -> CacheEntry {
        self.stale_ttl = Some(stale_ttl);
        self
    }

    pub fn with_tags<I: IntoIterator<Item = String>>(mut self, tags: I) -> CacheEntry {
        self.tags.extend(tags);
        self
    }

    pub fn freshness(&self) -> Freshness {
        let age = self.created_at.elapsed();
        if age <= self.ttl {
            Freshness::Fresh
        } else if age <= self.ttl + self.stale_ttl.unwrap_or(Duration::ZERO) {
            Freshness::Stale
        } else {
            Freshness::Expired
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn freshness_windows() {
        let mut entry = CacheEntry::new(Vec::new(), Duration::from_millis(50))
            .with_stale_ttl(Duration::from_millis(50));

        assert_eq!(entry.freshness(), Freshness::Fresh);

        entry.created_at = Instant::now() - Duration::from_millis(75);
        assert_eq!(entry.freshness(), Freshness::Stale);

        entry.created_at = Instant::now() - Duration::from_millis(200);
        assert_eq!(entry.freshness(), Freshness::Expired);

        // Without a stale window, past-TTL is immediately expired.
        let mut entry = CacheEntry::new(Vec::new(), Duration::from_millis(50));
        entry.created_at = Instant::now() - Duration::from_millis(75);
        assert_eq!(entry.freshness(), Freshness::Expired);
    }
}
