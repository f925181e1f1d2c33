//! Fluent composition of analytical queries: an immutable configuration
//! assembled through chainable operations, rendered deterministically to
//! SQL, and executed through an injected engine adapter under cache policy
//! with structured query events.

mod builder;
mod config;
pub mod expr;
mod format;
pub mod predicate;

pub use builder::paginate::{Cursor, Page, PageInfo, PaginateOptions};
pub use builder::{ExecuteOptions, GroupBuilder, QueryBuilder, RelationOptions};
pub use config::{CteDef, Join, OrderTerm, QueryConfig, SelectItem, WhereItem};
pub use format::render;

use std::sync::Arc;

use cache::{CacheManager, CachePolicy};
use engine::Adapter;
use events::EventBus;
use schema::{Schema, Value};

/// Errors surfaced by query construction and execution.
#[derive(Debug, thiserror::Error)]
pub enum QueryError {
    #[error(transparent)]
    Filter(#[from] filters::FilterError),
    #[error(transparent)]
    Schema(#[from] schema::SchemaError),
    #[error(transparent)]
    Adapter(#[from] engine::AdapterError),
    #[error("failed to render query: {0}")]
    Render(String),
    #[error("invalid cursor: {0}")]
    Cursor(String),
    #[error("query execution failed: {0}")]
    Execution(String),
}

/// A tenant discriminator scoped onto a Database handle. Every builder the
/// handle creates carries the filter, and the discriminator participates
/// in cache-key derivation.
#[derive(Debug, Clone)]
pub(crate) struct TenantScope {
    pub column: String,
    pub value: Value,
    pub discriminator: String,
}

#[derive(Clone)]
pub(crate) struct Shared {
    pub schema: Arc<Schema>,
    pub adapter: Arc<dyn Adapter>,
    pub cache: Arc<CacheManager>,
    pub events: Arc<EventBus>,
    pub default_cache: Option<CachePolicy>,
    pub tenant: Option<TenantScope>,
}

/// Database is the root handle binding a schema, an engine adapter, a
/// cache manager, and the query-event bus. It is cheap to clone and safe
/// to share; all state behind it is process-lifetime immutable except the
/// cache store and event subscribers.
#[derive(Clone)]
pub struct Database {
    shared: Arc<Shared>,
}

impl Database {
    pub fn new(schema: Arc<Schema>, adapter: Arc<dyn Adapter>) -> Database {
        Database {
            shared: Arc::new(Shared {
                schema,
                adapter,
                cache: Arc::new(CacheManager::disabled()),
                events: Arc::new(EventBus::new()),
                default_cache: None,
                tenant: None,
            }),
        }
    }

    pub fn with_cache(mut self, cache: Arc<CacheManager>) -> Database {
        self.update(|shared| shared.cache = cache);
        self
    }

    pub fn with_events(mut self, events: Arc<EventBus>) -> Database {
        self.update(|shared| shared.events = events);
        self
    }

    /// Cache policy applied when neither the builder nor the call site
    /// supplies one.
    pub fn with_default_cache_policy(mut self, policy: CachePolicy) -> Database {
        self.update(|shared| shared.default_cache = Some(policy));
        self
    }

    /// A handle whose builders all carry `column = value`, with
    /// `discriminator` folded into cache-key derivation. This is the
    /// injection point of the serve layer's tenant policy.
    pub fn scoped_to_tenant(mut self, column: &str, value: Value, discriminator: &str) -> Database {
        self.update(|shared| {
            shared.tenant = Some(TenantScope {
                column: column.to_string(),
                value,
                discriminator: discriminator.to_string(),
            })
        });
        self
    }

    /// Begin a query over `table`.
    pub fn table(&self, table: &str) -> QueryBuilder {
        QueryBuilder::new(self.shared.clone(), table)
    }

    pub fn schema(&self) -> &Arc<Schema> {
        &self.shared.schema
    }

    pub fn adapter(&self) -> &Arc<dyn Adapter> {
        &self.shared.adapter
    }

    pub fn cache(&self) -> &Arc<CacheManager> {
        &self.shared.cache
    }

    pub fn events(&self) -> &Arc<EventBus> {
        &self.shared.events
    }

    fn update(&mut self, apply: impl FnOnce(&mut Shared)) {
        let mut shared = (*self.shared).clone();
        apply(&mut shared);
        self.shared = Arc::new(shared);
    }
}
