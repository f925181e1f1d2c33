//! Read-through cache for query executions: modes, staleness windows,
//! in-flight dedupe, tag invalidation, warming, and statistics.

mod entry;
mod key;
mod memory;
mod provider;
mod stats;

pub use entry::{CacheEntry, Freshness, Row};
pub use key::KeySpec;
pub use memory::MemoryProvider;
pub use provider::{CacheProvider, NoopProvider};
pub use stats::{CacheStats, StatsCounters};

use std::collections::{BTreeSet, HashMap};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use events::CacheStatus;
use futures::future::{BoxFuture, FutureExt, Shared};

/// Cache resolution strategy for one execution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CacheMode {
    /// Never consult the cache, never store.
    Bypass,
    /// Read-through: serve fresh entries, otherwise fetch and store.
    #[default]
    CacheFirst,
    /// Serve stale entries immediately while refreshing in the background.
    StaleWhileRevalidate,
    /// Always fetch; fall back to a cached entry on failure.
    NetworkFirst,
}

/// Per-execution cache policy.
#[derive(Debug, Clone)]
pub struct CachePolicy {
    pub mode: CacheMode,
    pub ttl: Duration,
    pub stale_ttl: Option<Duration>,
    /// Explicit key; bypasses derivation but still participates in tagging.
    pub key: Option<String>,
    pub tags: Vec<String>,
    pub dedupe: bool,
}

impl Default for CachePolicy {
    fn default() -> CachePolicy {
        CachePolicy {
            mode: CacheMode::CacheFirst,
            ttl: Duration::from_secs(60),
            stale_ttl: None,
            key: None,
            tags: Vec::new(),
            dedupe: true,
        }
    }
}

/// How one execution resolved against the cache.
#[derive(Debug, Clone)]
pub struct CacheOutcome {
    pub rows: Vec<Row>,
    pub status: CacheStatus,
    pub key: String,
}

/// A fetch failure, shared verbatim by every caller coalesced onto the
/// failed in-flight fetch. The original error is reachable for downcasts.
#[derive(Debug, Clone)]
pub struct CacheError(pub Arc<anyhow::Error>);

impl CacheError {
    pub fn downcast_ref<E>(&self) -> Option<&E>
    where
        E: std::fmt::Display + std::fmt::Debug + Send + Sync + 'static,
    {
        self.0.downcast_ref::<E>()
    }
}

impl std::fmt::Display for CacheError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:#}", self.0)
    }
}

impl std::error::Error for CacheError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        let inner: &anyhow::Error = &self.0;
        Some(inner.as_ref())
    }
}

type FetchResult = Result<Vec<Row>, Arc<anyhow::Error>>;
type SharedFetch = Shared<BoxFuture<'static, FetchResult>>;

/// A deferred query whose result warms the cache under its derived key.
pub struct Warmer {
    pub spec: KeySpec,
    pub policy: CachePolicy,
    pub fetch: BoxFuture<'static, anyhow::Result<Vec<Row>>>,
}

/// CacheManager orchestrates providers, modes, dedupe, and statistics.
///
/// Concurrent non-bypass executions with the same key share a single
/// in-flight fetch; dedupe groups observe the same rows or the same error.
pub struct CacheManager {
    provider: Arc<dyn CacheProvider>,
    namespace: String,
    default_tags: Vec<String>,
    in_flight: Arc<Mutex<HashMap<String, SharedFetch>>>,
    stats: StatsCounters,
}

impl CacheManager {
    pub fn new(provider: Arc<dyn CacheProvider>) -> CacheManager {
        CacheManager {
            provider,
            namespace: "query".to_string(),
            default_tags: Vec::new(),
            in_flight: Arc::new(Mutex::new(HashMap::new())),
            stats: StatsCounters::default(),
        }
    }

    /// A manager that stores nothing; dedupe and statistics still apply.
    pub fn disabled() -> CacheManager {
        CacheManager::new(Arc::new(NoopProvider))
    }

    pub fn with_namespace(mut self, namespace: &str) -> CacheManager {
        self.namespace = namespace.to_string();
        self
    }

    /// Tags applied to every stored entry, in addition to per-call tags.
    pub fn with_default_tags<I: IntoIterator<Item = String>>(mut self, tags: I) -> CacheManager {
        self.default_tags = tags.into_iter().collect();
        self
    }

    pub fn stats(&self) -> CacheStats {
        self.stats.snapshot()
    }

    /// Remove every entry declaring any of `tags`; returns entries removed.
    pub async fn invalidate_tags(&self, tags: &[&str]) -> usize {
        let mut removed = 0;
        for tag in tags {
            removed += self.provider.delete_by_tag(&self.namespace, tag).await;
        }
        removed
    }

    /// Execute the supplied factories sequentially, storing each result
    /// under its derived key. Returns how many warmed successfully.
    pub async fn warm<I: IntoIterator<Item = Warmer>>(&self, factories: I) -> usize {
        let mut warmed = 0;
        for Warmer {
            spec,
            policy,
            fetch,
        } in factories
        {
            match self.execute(spec, &policy, move || fetch).await {
                Ok(_) => warmed += 1,
                Err(error) => {
                    tracing::warn!(%error, "cache warm factory failed");
                }
            }
        }
        warmed
    }

    /// Run one execution under `policy`, consulting and populating the
    /// cache per its mode.
    pub async fn execute<F>(
        &self,
        spec: KeySpec,
        policy: &CachePolicy,
        fetch: F,
    ) -> Result<CacheOutcome, CacheError>
    where
        F: FnOnce() -> BoxFuture<'static, anyhow::Result<Vec<Row>>>,
    {
        let key = policy
            .key
            .clone()
            .unwrap_or_else(|| spec.derive(&self.namespace));

        match policy.mode {
            CacheMode::Bypass => {
                let rows = fetch().await.map_err(|err| CacheError(Arc::new(err)))?;
                Ok(CacheOutcome {
                    rows,
                    status: CacheStatus::Bypass,
                    key,
                })
            }

            CacheMode::CacheFirst => {
                let existing = self.provider.get(&key).await;
                if let Some(entry) = &existing {
                    if entry.freshness() == Freshness::Fresh {
                        self.stats.record_hit();
                        return Ok(CacheOutcome {
                            rows: entry.payload.clone(),
                            status: CacheStatus::Hit,
                            key,
                        });
                    }
                }
                self.read_through(key, policy, fetch, existing).await
            }

            CacheMode::StaleWhileRevalidate => {
                let existing = self.provider.get(&key).await;
                match existing.as_ref().map(CacheEntry::freshness) {
                    Some(Freshness::Fresh) => {
                        self.stats.record_hit();
                        Ok(CacheOutcome {
                            rows: existing.expect("entry is present").payload,
                            status: CacheStatus::Hit,
                            key,
                        })
                    }
                    Some(Freshness::Stale) => {
                        self.stats.record_stale_hit();
                        // One background refresh per key until it lands.
                        let (shared, created) = self.join_or_spawn(&key, policy, fetch);
                        if created {
                            tokio::spawn(shared);
                        }
                        Ok(CacheOutcome {
                            rows: existing.expect("entry is present").payload,
                            status: CacheStatus::Stale,
                            key,
                        })
                    }
                    _ => self.read_through(key, policy, fetch, None).await,
                }
            }

            CacheMode::NetworkFirst => {
                let (shared, created) = self.join_or_spawn(&key, policy, fetch);
                match shared.await {
                    Ok(rows) => {
                        if created {
                            self.stats.record_miss();
                        } else {
                            self.stats.record_hit();
                        }
                        Ok(CacheOutcome {
                            rows,
                            status: CacheStatus::Miss,
                            key,
                        })
                    }
                    Err(error) => {
                        // Cached rows, however old, beat a failed fetch.
                        match self.provider.get(&key).await {
                            Some(entry) => {
                                self.stats.record_stale_hit();
                                Ok(CacheOutcome {
                                    rows: entry.payload,
                                    status: CacheStatus::Stale,
                                    key,
                                })
                            }
                            None => Err(CacheError(error)),
                        }
                    }
                }
            }
        }
    }

    /// The shared miss path: join or start the in-flight fetch, store on
    /// success, and fall back to `existing` if the fetch fails.
    async fn read_through<F>(
        &self,
        key: String,
        policy: &CachePolicy,
        fetch: F,
        existing: Option<CacheEntry>,
    ) -> Result<CacheOutcome, CacheError>
    where
        F: FnOnce() -> BoxFuture<'static, anyhow::Result<Vec<Row>>>,
    {
        let (shared, created) = self.join_or_spawn(&key, policy, fetch);
        if created {
            self.stats.record_miss();
        }

        match shared.await {
            Ok(rows) => {
                if !created {
                    // Joined an in-flight fetch: no adapter call was issued
                    // on this caller's behalf.
                    self.stats.record_hit();
                }
                Ok(CacheOutcome {
                    rows,
                    status: if created {
                        CacheStatus::Miss
                    } else {
                        CacheStatus::Hit
                    },
                    key,
                })
            }
            Err(error) => match existing {
                Some(entry) => Ok(CacheOutcome {
                    rows: entry.payload,
                    status: CacheStatus::Stale,
                    key,
                }),
                None => Err(CacheError(error)),
            },
        }
    }

    /// Join the in-flight fetch for `key`, or start (and register) a new
    /// one which stores its result and deregisters itself on completion.
    /// Returns whether this caller created the fetch.
    fn join_or_spawn<F>(&self, key: &str, policy: &CachePolicy, fetch: F) -> (SharedFetch, bool)
    where
        F: FnOnce() -> BoxFuture<'static, anyhow::Result<Vec<Row>>>,
    {
        let mut in_flight = self
            .in_flight
            .lock()
            .expect("in-flight lock is never poisoned");

        if policy.dedupe {
            if let Some(shared) = in_flight.get(key) {
                return (shared.clone(), false);
            }
        }

        let provider = self.provider.clone();
        let registry = self.in_flight.clone();
        let owned_key = key.to_string();
        let ttl = policy.ttl;
        let stale_ttl = policy.stale_ttl;
        let tags: BTreeSet<String> = policy
            .tags
            .iter()
            .chain(self.default_tags.iter())
            .map(|tag| format!("{}:{tag}", self.namespace))
            .collect();

        let future = fetch();
        let shared = async move {
            let result = future.await.map_err(Arc::new);

            if let Ok(rows) = &result {
                let mut entry = CacheEntry::new(rows.clone(), ttl).with_tags(tags);
                entry.stale_ttl = stale_ttl;
                provider.set(&owned_key, entry).await;
            }
            registry
                .lock()
                .expect("in-flight lock is never poisoned")
                .remove(&owned_key);
            result
        }
        .boxed()
        .shared();

        if policy.dedupe {
            in_flight.insert(key.to_string(), shared.clone());
        }
        (shared, true)
    }
}
