use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use futures::{StreamExt, TryStreamExt};

use cache::{CacheManager, CacheMode, CachePolicy, MemoryProvider};
use engine::{Adapter, AdapterError, Row, RowBatchStream};
use events::{CacheStatus, EventStatus, QueryEvent};
use filters::Operator;
use query::{Database, PaginateOptions, QueryError};
use schema::{ColumnType as CT, Direction, Schema, Value};

/// MockAdapter serves a fixed table of rows, honoring the continuation
/// parameter and LIMIT of the queries pagination issues.
struct MockAdapter {
    rows: Vec<Row>,
    calls: AtomicUsize,
    fail: bool,
}

impl MockAdapter {
    fn with_ids(ids: &[i64]) -> MockAdapter {
        let rows = ids
            .iter()
            .map(|id| {
                let mut row = Row::new();
                row.insert("id".to_string(), serde_json::json!(id));
                row.insert("status".to_string(), serde_json::json!("active"));
                row
            })
            .collect();
        MockAdapter {
            rows,
            calls: AtomicUsize::new(0),
            fail: false,
        }
    }

    fn failing() -> MockAdapter {
        MockAdapter {
            rows: Vec::new(),
            calls: AtomicUsize::new(0),
            fail: true,
        }
    }

    fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait::async_trait]
impl Adapter for MockAdapter {
    fn name(&self) -> &str {
        "mock"
    }

    async fn query(&self, sql: &str, parameters: &[Value]) -> Result<Vec<Row>, AdapterError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.fail {
            return Err(AdapterError::Engine {
                status: 500,
                body: "table is read only".to_string(),
            });
        }

        if sql.contains("count()") {
            let mut row = Row::new();
            row.insert("total".to_string(), serde_json::json!(self.rows.len()));
            return Ok(vec![row]);
        }

        let mut rows: Vec<Row> = self.rows.clone();

        // Continuation predicates compare against the trailing parameter.
        let bound = parameters.last().and_then(|value| match value {
            Value::Int(n) => Some(*n),
            Value::UInt(n) => Some(*n as i64),
            _ => None,
        });
        if let Some(bound) = bound {
            if sql.contains("id > ?") {
                rows.retain(|row| row["id"].as_i64().unwrap() > bound);
            } else if sql.contains("id < ?") {
                rows.retain(|row| row["id"].as_i64().unwrap() < bound);
            }
        }
        if sql.contains("DESC") {
            rows.reverse();
        }
        if let Some(limit) = sql
            .rsplit("LIMIT ")
            .next()
            .and_then(|rest| rest.split_whitespace().next())
            .and_then(|n| n.parse::<usize>().ok())
        {
            rows.truncate(limit);
        }
        Ok(rows)
    }

    async fn stream(
        &self,
        _sql: &str,
        _parameters: &[Value],
    ) -> Result<RowBatchStream, AdapterError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let batches: Vec<Result<Vec<Row>, AdapterError>> = self
            .rows
            .chunks(2)
            .map(|chunk| Ok(chunk.to_vec()))
            .collect();
        Ok(futures::stream::iter(batches).boxed())
    }
}

fn test_schema() -> Arc<Schema> {
    Arc::new(
        Schema::builder()
            .table(
                "test_table",
                [("id", CT::UInt64), ("status", CT::String)],
            )
            .table(
                "users",
                [
                    ("id", CT::UInt64),
                    ("status", CT::String),
                    ("organization_id", CT::String),
                ],
            )
            .build()
            .unwrap(),
    )
}

fn capture_events(db: &Database) -> Arc<Mutex<Vec<QueryEvent>>> {
    let seen = Arc::new(Mutex::new(Vec::new()));
    let sink = seen.clone();
    db.events().subscribe(move |event| {
        sink.lock().unwrap().push(event.clone());
    });
    seen
}

#[tokio::test]
async fn execute_emits_started_and_completed_events() {
    let adapter = Arc::new(MockAdapter::with_ids(&[1, 2, 3]));
    let db = Database::new(test_schema(), adapter.clone());
    let events = capture_events(&db);

    let rows = db.table("test_table").select(["id"]).execute().await.unwrap();
    assert_eq!(rows.len(), 3);

    let events = events.lock().unwrap();
    assert_eq!(events.len(), 2);
    assert_eq!(events[0].status, EventStatus::Started);
    assert_eq!(events[0].query, "SELECT id FROM test_table");
    assert_eq!(events[1].status, EventStatus::Completed);
    assert_eq!(events[1].row_count, Some(3));
    assert_eq!(events[1].cache_status, Some(CacheStatus::Bypass));
    assert_eq!(events[1].query_id, events[0].query_id);
    assert!(events[1].duration_ms.is_some());
}

#[tokio::test]
async fn failures_emit_error_events_and_carry_the_adapter_error() {
    let adapter = Arc::new(MockAdapter::failing());
    let db = Database::new(test_schema(), adapter);
    let events = capture_events(&db);

    let err = db.table("test_table").execute().await.unwrap_err();
    assert!(matches!(err, QueryError::Adapter(AdapterError::Engine { status: 500, .. })));

    let events = events.lock().unwrap();
    assert_eq!(events[1].status, EventStatus::Error);
    assert!(events[1].error.as_deref().unwrap().contains("read only"));
}

#[tokio::test]
async fn cache_first_dedupes_concurrent_executions() {
    let adapter = Arc::new(MockAdapter::with_ids(&[1, 2]));
    let cache = Arc::new(CacheManager::new(Arc::new(MemoryProvider::new(16))));
    let db = Database::new(test_schema(), adapter.clone()).with_cache(cache.clone());

    let builder = db.table("test_table").select(["id"]).cache(CachePolicy {
        mode: CacheMode::CacheFirst,
        ttl: Duration::from_millis(5000),
        ..CachePolicy::default()
    });

    let (a, b) = tokio::join!(builder.execute(), builder.execute());
    let (a, b) = (a.unwrap(), b.unwrap());

    assert_eq!(adapter.calls(), 1);
    assert_eq!(a, b);

    let stats = cache.stats();
    assert_eq!((stats.hits, stats.misses, stats.stale_hits), (1, 1, 0));
}

#[tokio::test]
async fn repeated_cache_first_executions_hit_without_refetching() {
    let adapter = Arc::new(MockAdapter::with_ids(&[1]));
    let cache = Arc::new(CacheManager::new(Arc::new(MemoryProvider::new(16))));
    let db = Database::new(test_schema(), adapter.clone())
        .with_cache(cache)
        .with_default_cache_policy(CachePolicy::default());
    let events = capture_events(&db);

    let builder = db.table("test_table").select(["id"]);
    builder.execute().await.unwrap();
    builder.execute().await.unwrap();

    assert_eq!(adapter.calls(), 1);

    let events = events.lock().unwrap();
    let statuses: Vec<Option<CacheStatus>> = events
        .iter()
        .filter(|event| event.status == EventStatus::Completed)
        .map(|event| event.cache_status)
        .collect();
    assert_eq!(statuses, vec![Some(CacheStatus::Miss), Some(CacheStatus::Hit)]);

    // The hit still reports the cached row count and a cache key.
    let hit = events.last().unwrap();
    assert_eq!(hit.row_count, Some(1));
    assert!(hit.cache_key.is_some());
}

#[tokio::test]
async fn tenant_scoped_handles_inject_their_filter() {
    let adapter = Arc::new(MockAdapter::with_ids(&[1]));
    let db = Database::new(test_schema(), adapter)
        .scoped_to_tenant("organization_id", Value::from("org-456"), "org-456");

    let (sql, params) = db
        .table("users")
        .and_where("status", Operator::Eq, "active")
        .unwrap()
        .to_sql_with_params()
        .unwrap();

    assert_eq!(
        sql,
        "SELECT * FROM users WHERE organization_id = ? AND status = ?"
    );
    assert_eq!(params, vec![Value::from("org-456"), Value::from("active")]);
}

#[tokio::test]
async fn pagination_reaches_the_end_of_data() {
    let adapter = Arc::new(MockAdapter::with_ids(&[1, 2, 3, 4, 5]));
    let db = Database::new(test_schema(), adapter);
    let builder = db
        .table("test_table")
        .select(["id"])
        .order_by("id", Direction::Asc);

    let first = builder.first_page(2).await.unwrap();
    assert_eq!(first.data.len(), 2);
    assert_eq!(first.page_info.total_count, 5);
    assert_eq!(first.page_info.total_pages, 3);
    assert!(first.page_info.has_next_page);
    assert!(!first.page_info.has_previous_page);

    let second = builder
        .paginate(PaginateOptions {
            page_size: 2,
            after: Some(first.page_info.end_cursor.clone()),
            ..PaginateOptions::default()
        })
        .await
        .unwrap();
    assert_eq!(second.data[0]["id"], serde_json::json!(3));
    assert!(second.page_info.has_next_page);

    // Third page: one remaining row, so the page is short and final.
    let third = builder
        .paginate(PaginateOptions {
            page_size: 2,
            after: Some(second.page_info.end_cursor.clone()),
            ..PaginateOptions::default()
        })
        .await
        .unwrap();
    assert_eq!(third.data.len(), 1);
    assert_eq!(third.data[0]["id"], serde_json::json!(5));
    assert!(!third.page_info.has_next_page);
    assert!(third.page_info.has_previous_page);
}

#[tokio::test]
async fn iterate_pages_stops_when_exhausted() {
    let adapter = Arc::new(MockAdapter::with_ids(&[1, 2, 3, 4, 5]));
    let db = Database::new(test_schema(), adapter);
    let builder = db
        .table("test_table")
        .select(["id"])
        .order_by("id", Direction::Asc);

    let pages: Vec<_> = builder.iterate_pages(2).try_collect().await.unwrap();
    assert_eq!(pages.len(), 3);
    assert_eq!(
        pages.iter().map(|page| page.data.len()).collect::<Vec<_>>(),
        vec![2, 2, 1]
    );

    // The first yielded page matches a direct first_page call.
    let first = builder.first_page(2).await.unwrap();
    assert_eq!(first.page_info.end_cursor, pages[0].page_info.end_cursor);
}

#[tokio::test]
async fn limit_zero_returns_an_empty_terminal_page() {
    let adapter = Arc::new(MockAdapter::with_ids(&[1, 2, 3]));
    let db = Database::new(test_schema(), adapter);

    let page = db
        .table("test_table")
        .order_by("id", Direction::Asc)
        .first_page(0)
        .await
        .unwrap();

    assert!(page.data.is_empty());
    assert!(!page.page_info.has_next_page);
    assert!(!page.page_info.has_previous_page);
    assert_eq!(page.page_info.start_cursor, "");
    assert_eq!(page.page_info.total_count, 3);
}

#[tokio::test]
async fn backward_pagination_reverses_internally() {
    let adapter = Arc::new(MockAdapter::with_ids(&[1, 2, 3, 4, 5]));
    let db = Database::new(test_schema(), adapter);
    let builder = db
        .table("test_table")
        .select(["id"])
        .order_by("id", Direction::Asc);

    // Establish a cursor at id=3 by walking forward one page of 3.
    let first = builder.first_page(3).await.unwrap();
    let before = first.page_info.end_cursor.clone();

    let page = builder
        .paginate(PaginateOptions {
            page_size: 2,
            before: Some(before),
            ..PaginateOptions::default()
        })
        .await
        .unwrap();

    // Rows come back in the original ascending order.
    let ids: Vec<i64> = page
        .data
        .iter()
        .map(|row| row["id"].as_i64().unwrap())
        .collect();
    assert_eq!(ids, vec![1, 2]);
    assert!(page.page_info.has_next_page);
}

#[tokio::test]
async fn streaming_yields_batches_and_counts_rows() {
    let adapter = Arc::new(MockAdapter::with_ids(&[1, 2, 3, 4, 5]));
    let db = Database::new(test_schema(), adapter);
    let events = capture_events(&db);

    let seen = Arc::new(Mutex::new(Vec::new()));
    let sink = seen.clone();
    let count = db
        .table("test_table")
        .select(["id"])
        .stream_for_each(move |row| {
            sink.lock().unwrap().push(row["id"].as_i64().unwrap());
        })
        .await
        .unwrap();

    assert_eq!(count, 5);
    assert_eq!(*seen.lock().unwrap(), vec![1, 2, 3, 4, 5]);

    // Streaming completions don't claim a row count up front.
    let events = events.lock().unwrap();
    assert_eq!(events[1].status, EventStatus::Completed);
    assert_eq!(events[1].row_count, None);
}

#[tokio::test]
async fn execute_as_deserializes_rows() {
    #[derive(Debug, PartialEq, serde::Deserialize)]
    struct TestRow {
        id: i64,
        status: String,
    }

    let adapter = Arc::new(MockAdapter::with_ids(&[7]));
    let db = Database::new(test_schema(), adapter);

    let rows: Vec<TestRow> = db.table("test_table").execute_as().await.unwrap();
    assert_eq!(
        rows,
        vec![TestRow {
            id: 7,
            status: "active".to_string()
        }]
    );
}
