use cache::{CacheMode, CachePolicy, KeySpec};
use engine::{AdapterError, Row, RowBatchStream};
use events::QueryEvent;
use futures::{FutureExt, TryStreamExt};
use schema::Value;

use crate::{format, QueryError};

use super::QueryBuilder;

/// Per-call execution options.
#[derive(Debug, Clone, Default)]
pub struct ExecuteOptions {
    /// Cache policy for this call; overrides the builder's and the
    /// database default.
    pub cache: Option<CachePolicy>,
}

impl QueryBuilder {
    /// Render to SQL text with positional placeholders and the parameters
    /// they bind. Pure: repeated calls yield identical output.
    pub fn to_sql_with_params(&self) -> Result<(String, Vec<Value>), QueryError> {
        format::render(&self.config)
    }

    /// Render to final SQL text with parameters substituted as quoted
    /// literals, via the adapter's own substitution when it has one.
    pub fn to_sql(&self) -> Result<String, QueryError> {
        let (sql, params) = self.to_sql_with_params()?;
        Ok(self.shared.adapter.render(&sql, &params)?)
    }

    /// Execute and materialize all rows, under the effective cache policy.
    pub async fn execute(&self) -> Result<Vec<Row>, QueryError> {
        self.execute_with(ExecuteOptions::default()).await
    }

    pub async fn execute_with(&self, options: ExecuteOptions) -> Result<Vec<Row>, QueryError> {
        let (sql, params) = self.to_sql_with_params()?;
        let policy = self.effective_policy(options.cache);

        let parameters: Vec<serde_json::Value> = params.iter().map(Value::to_json).collect();
        let started = QueryEvent::started(&sql, parameters.clone());
        self.shared.events.emit(&started);

        let spec = KeySpec {
            sql: sql.clone(),
            parameters: serde_json::Value::Array(parameters),
            adapter: self.shared.adapter.name().to_string(),
            tenant: self
                .shared
                .tenant
                .as_ref()
                .map(|tenant| tenant.discriminator.clone()),
        };

        let fetch = {
            let adapter = self.shared.adapter.clone();
            let sql = sql.clone();
            let params = params.clone();
            move || {
                async move {
                    adapter
                        .query(&sql, &params)
                        .await
                        .map_err(anyhow::Error::from)
                }
                .boxed()
            }
        };

        match self.shared.cache.execute(spec, &policy, fetch).await {
            Ok(outcome) => {
                self.shared.events.emit(
                    &started
                        .completed(Some(outcome.rows.len()))
                        .with_cache(outcome.status, &outcome.key),
                );
                Ok(outcome.rows)
            }
            Err(error) => {
                self.shared.events.emit(&started.errored(&error.to_string()));
                tracing::error!(sql = %sql, %error, "query execution failed");

                match error.downcast_ref::<AdapterError>() {
                    Some(adapter_error) => Err(QueryError::Adapter(adapter_error.clone())),
                    None => Err(QueryError::Execution(error.to_string())),
                }
            }
        }
    }

    /// Execute and deserialize each row into `T`.
    pub async fn execute_as<T: serde::de::DeserializeOwned>(&self) -> Result<Vec<T>, QueryError> {
        self.execute()
            .await?
            .into_iter()
            .map(|row| {
                serde_json::from_value(serde_json::Value::Object(row))
                    .map_err(|err| QueryError::Execution(format!("row decode failed: {err}")))
            })
            .collect()
    }

    /// Execute lazily, yielding row batches. Streams bypass the cache.
    pub async fn stream(&self) -> Result<RowBatchStream, QueryError> {
        let (sql, params) = self.to_sql_with_params()?;
        let parameters = params.iter().map(Value::to_json).collect();

        let started = QueryEvent::started(&sql, parameters);
        self.shared.events.emit(&started);

        match self.shared.adapter.stream(&sql, &params).await {
            Ok(stream) => {
                self.shared.events.emit(&started.completed(None));
                Ok(stream)
            }
            Err(error) => {
                self.shared.events.emit(&started.errored(&error.to_string()));
                Err(error.into())
            }
        }
    }

    /// Drive the stream, invoking `callback` per row. Returns rows seen.
    pub async fn stream_for_each<F>(&self, mut callback: F) -> Result<u64, QueryError>
    where
        F: FnMut(Row),
    {
        let mut stream = self.stream().await?;
        let mut count = 0u64;

        while let Some(batch) = stream.try_next().await? {
            for row in batch {
                callback(row);
                count += 1;
            }
        }
        Ok(count)
    }

    fn effective_policy(&self, call_policy: Option<CachePolicy>) -> CachePolicy {
        call_policy
            .or_else(|| self.cache_policy.clone())
            .or_else(|| self.shared.default_cache.clone())
            .unwrap_or(CachePolicy {
                mode: CacheMode::Bypass,
                ..CachePolicy::default()
            })
    }
}
