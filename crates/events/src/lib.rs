//! Normalized query events and the in-process bus that fans them out to
//! subscribers. Both the builder's executor and the serve pipeline emit
//! through this bus; sinks (console, custom callbacks) subscribe to it.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock};

use chrono::{DateTime, Utc};

/// Lifecycle stage of a query event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EventStatus {
    Started,
    Completed,
    Error,
}

/// How a cached execution resolved.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CacheStatus {
    Hit,
    Stale,
    Miss,
    Bypass,
}

/// QueryEvent is the normalized record of one query execution stage, for
/// both builder-issued and serve-issued queries.
#[derive(Debug, Clone, serde::Serialize)]
#[serde(rename_all = "camelCase")]
pub struct QueryEvent {
    pub status: EventStatus,
    pub start_time: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub end_time: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub duration_ms: Option<u64>,
    pub query: String,
    pub parameters: Vec<serde_json::Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub row_count: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cache_status: Option<CacheStatus>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cache_key: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub query_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub endpoint_key: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub response_status: Option<u16>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl QueryEvent {
    /// A fresh `started` event with a minted query id.
    pub fn started(query: &str, parameters: Vec<serde_json::Value>) -> QueryEvent {
        QueryEvent {
            status: EventStatus::Started,
            start_time: Utc::now(),
            end_time: None,
            duration_ms: None,
            query: query.to_string(),
            parameters,
            row_count: None,
            cache_status: None,
            cache_key: None,
            query_id: Some(uuid::Uuid::new_v4().to_string()),
            endpoint_key: None,
            response_status: None,
            error: None,
        }
    }

    /// Derive the `completed` event for this execution. Streaming
    /// completions pass `None`: their row count isn't known up front.
    pub fn completed(&self, row_count: Option<usize>) -> QueryEvent {
        let end = Utc::now();
        QueryEvent {
            status: EventStatus::Completed,
            end_time: Some(end),
            duration_ms: Some((end - self.start_time).num_milliseconds().max(0) as u64),
            row_count,
            ..self.clone()
        }
    }

    /// Derive the `error` event for this execution.
    pub fn errored(&self, error: &str) -> QueryEvent {
        let end = Utc::now();
        QueryEvent {
            status: EventStatus::Error,
            end_time: Some(end),
            duration_ms: Some((end - self.start_time).num_milliseconds().max(0) as u64),
            error: Some(error.to_string()),
            ..self.clone()
        }
    }

    pub fn with_endpoint(mut self, key: &str) -> QueryEvent {
        self.endpoint_key = Some(key.to_string());
        self
    }

    pub fn with_cache(mut self, status: CacheStatus, key: &str) -> QueryEvent {
        self.cache_status = Some(status);
        self.cache_key = Some(key.to_string());
        self
    }

    pub fn with_response_status(mut self, status: u16) -> QueryEvent {
        self.response_status = Some(status);
        self
    }
}

/// Opaque handle for removing a subscriber.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SubscriptionId(u64);

type Subscriber = Arc<dyn Fn(&QueryEvent) + Send + Sync>;

/// EventBus fans query events out to registered subscribers. Emission is
/// best-effort and synchronous; subscribers must not block.
#[derive(Default)]
pub struct EventBus {
    subscribers: RwLock<Vec<(u64, Subscriber)>>,
    next_id: AtomicU64,
}

impl EventBus {
    pub fn new() -> EventBus {
        EventBus::default()
    }

    pub fn subscribe<F>(&self, subscriber: F) -> SubscriptionId
    where
        F: Fn(&QueryEvent) + Send + Sync + 'static,
    {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        self.subscribers
            .write()
            .expect("subscriber lock is never poisoned")
            .push((id, Arc::new(subscriber)));
        SubscriptionId(id)
    }

    pub fn unsubscribe(&self, id: SubscriptionId) {
        self.subscribers
            .write()
            .expect("subscriber lock is never poisoned")
            .retain(|(held, _)| *held != id.0);
    }

    pub fn emit(&self, event: &QueryEvent) {
        let subscribers: Vec<Subscriber> = self
            .subscribers
            .read()
            .expect("subscriber lock is never poisoned")
            .iter()
            .map(|(_, subscriber)| subscriber.clone())
            .collect();

        for subscriber in subscribers {
            subscriber(event);
        }
    }
}

/// Output format of the console sink.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConsoleFormat {
    Plain,
    Json,
}

/// Attach a console sink to the bus, logging each event through `tracing`.
pub fn attach_console_sink(bus: &EventBus, format: ConsoleFormat) -> SubscriptionId {
    bus.subscribe(move |event| match format {
        ConsoleFormat::Plain => {
            tracing::info!(
                target: "query_events",
                status = ?event.status,
                query = %event.query,
                duration_ms = event.duration_ms,
                row_count = event.row_count,
                cache_status = ?event.cache_status,
                error = event.error.as_deref(),
                "query event",
            );
        }
        ConsoleFormat::Json => {
            let rendered = serde_json::to_string(event).unwrap_or_default();
            tracing::info!(target: "query_events", "{rendered}");
        }
    })
}
