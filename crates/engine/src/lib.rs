//! The narrow contract to the OLAP engine: a query/stream adapter over its
//! HTTP/JSON surface, last-mile parameter substitution, and a lazy decoder
//! for JSON-each-row response bodies.

mod clickhouse;
mod config;
mod decode;
mod substitute;

pub use clickhouse::ClickHouseHttpAdapter;
pub use config::Config;
pub use decode::JsonRowStream;
pub use substitute::substitute;

use schema::Value;
use std::sync::Arc;

/// A decoded result row.
pub type Row = serde_json::Map<String, serde_json::Value>;

/// A lazy sequence of row batches.
pub type RowBatchStream = futures::stream::BoxStream<'static, Result<Vec<Row>, AdapterError>>;

/// Errors surfaced by an adapter. Sources are held behind `Arc` so that
/// callers coalesced onto one in-flight fetch can share the same failure.
#[derive(Debug, Clone, thiserror::Error)]
pub enum AdapterError {
    #[error("adapter '{adapter}' does not support streaming")]
    StreamingUnsupported { adapter: String },
    #[error("engine returned {status}: {body}")]
    Engine { status: u16, body: String },
    #[error("failed to reach engine")]
    Transport(#[source] Arc<reqwest::Error>),
    #[error("failed to decode engine response at line {line}")]
    Decode {
        line: usize,
        #[source]
        source: Arc<serde_json::Error>,
    },
    #[error("SQL has {placeholders} placeholders but {parameters} parameters were bound")]
    PlaceholderMismatch {
        placeholders: usize,
        parameters: usize,
    },
    #[error("invalid engine endpoint: {0}")]
    InvalidEndpoint(String),
}

impl From<reqwest::Error> for AdapterError {
    fn from(error: reqwest::Error) -> AdapterError {
        AdapterError::Transport(Arc::new(error))
    }
}

/// Adapter is the contract between the query stack and a concrete engine
/// client. Implementations own authentication and transport; rows come
/// back as JSON objects per the engine's JSONEachRow format.
#[async_trait::async_trait]
pub trait Adapter: Send + Sync {
    /// Identifier used in error messages and cache-key derivation.
    fn name(&self) -> &str;

    /// Execute `sql` and materialize all result rows.
    async fn query(&self, sql: &str, parameters: &[Value]) -> Result<Vec<Row>, AdapterError>;

    /// Execute `sql`, returning a lazy sequence of row batches. Optional;
    /// the default declines.
    async fn stream(&self, sql: &str, parameters: &[Value]) -> Result<RowBatchStream, AdapterError> {
        let (_, _) = (sql, parameters);
        Err(AdapterError::StreamingUnsupported {
            adapter: self.name().to_string(),
        })
    }

    /// Engine-specific final substitution of positional placeholders.
    fn render(&self, sql: &str, parameters: &[Value]) -> Result<String, AdapterError> {
        substitute(sql, parameters)
    }
}
