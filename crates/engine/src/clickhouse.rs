use futures::StreamExt;
use schema::Value;

use crate::{decode::JsonRowStream, AdapterError, Adapter, Config, Row, RowBatchStream};

/// ClickHouseHttpAdapter speaks the engine's HTTP interface: substituted
/// SQL is POSTed as the request body and rows come back as JSONEachRow.
///
/// The engine's HTTP surface accepts no bound parameters, so `render`
/// inlines them before the request leaves the process.
pub struct ClickHouseHttpAdapter {
    config: Config,
    http: reqwest::Client,
}

impl ClickHouseHttpAdapter {
    pub fn new(config: Config) -> ClickHouseHttpAdapter {
        ClickHouseHttpAdapter {
            config,
            http: reqwest::Client::new(),
        }
    }

    fn request(&self, sql: String) -> reqwest::RequestBuilder {
        let mut url = self.config.url.clone();
        {
            let mut pairs = url.query_pairs_mut();
            pairs.append_pair("default_format", "JSONEachRow");
            if let Some(database) = &self.config.database {
                pairs.append_pair("database", database);
            }
        }

        let mut builder = self.http.post(url).body(sql);
        if let Some(username) = &self.config.username {
            builder = builder.header("X-ClickHouse-User", username);
        }
        if let Some(password) = &self.config.password {
            builder = builder.header("X-ClickHouse-Key", password);
        }
        builder
    }

    async fn send(&self, sql: String) -> Result<reqwest::Response, AdapterError> {
        let response = self.request(sql).send().await?;
        let status = response.status();

        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(AdapterError::Engine {
                status: status.as_u16(),
                body,
            });
        }
        Ok(response)
    }
}

#[async_trait::async_trait]
impl Adapter for ClickHouseHttpAdapter {
    fn name(&self) -> &str {
        "clickhouse-http"
    }

    async fn query(&self, sql: &str, parameters: &[Value]) -> Result<Vec<Row>, AdapterError> {
        let rendered = self.render(sql, parameters)?;
        tracing::debug!(sql = %rendered, "executing engine query");

        let body = self.send(rendered).await?.text().await?;

        let mut rows = Vec::new();
        for (number, line) in body.lines().enumerate() {
            let line = line.trim();
            if line.is_empty() {
                continue;
            }
            rows.push(serde_json::from_str::<Row>(line).map_err(|err| {
                AdapterError::Decode {
                    line: number + 1,
                    source: std::sync::Arc::new(err),
                }
            })?);
        }
        Ok(rows)
    }

    async fn stream(&self, sql: &str, parameters: &[Value]) -> Result<RowBatchStream, AdapterError> {
        let rendered = self.render(sql, parameters)?;
        tracing::debug!(sql = %rendered, "streaming engine query");

        let response = self.send(rendered).await?;
        Ok(JsonRowStream::new(response.bytes_stream().boxed()).boxed())
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn request_carries_format_database_and_auth() {
        let config = Config::new("http://localhost:8123")
            .unwrap()
            .with_database("analytics")
            .with_credentials("reader", "secret");
        let adapter = ClickHouseHttpAdapter::new(config);

        let request = adapter
            .request("SELECT 1".to_string())
            .build()
            .expect("request builds");

        let url = request.url().as_str();
        assert!(url.contains("default_format=JSONEachRow"));
        assert!(url.contains("database=analytics"));
        assert_eq!(
            request.headers().get("X-ClickHouse-User").unwrap(),
            "reader"
        );
        assert_eq!(request.headers().get("X-ClickHouse-Key").unwrap(), "secret");
    }

    #[test]
    fn render_inlines_parameters() {
        let adapter =
            ClickHouseHttpAdapter::new(Config::new("http://localhost:8123").unwrap());
        let rendered = adapter
            .render("SELECT * FROM t WHERE a = ?", &[Value::from("x")])
            .unwrap();
        assert_eq!(rendered, "SELECT * FROM t WHERE a = 'x'");
    }
}
