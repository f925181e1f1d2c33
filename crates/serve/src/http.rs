//! Transport-agnostic request and response values. Concrete server
//! bindings adapt their framework's types to these; the pipeline itself
//! never touches a socket.

use std::collections::BTreeMap;

pub const REQUEST_ID_HEADER: &str = "x-request-id";

/// An incoming request. Header names are matched case-insensitively;
/// query values are JSON so bindings can carry repeated parameters as
/// arrays.
#[derive(Debug, Clone, Default, serde::Serialize, serde::Deserialize)]
pub struct Request {
    pub method: String,
    pub path: String,
    #[serde(default)]
    pub headers: BTreeMap<String, String>,
    #[serde(default)]
    pub query: serde_json::Map<String, serde_json::Value>,
    #[serde(default)]
    pub body: Option<serde_json::Value>,
}

impl Request {
    pub fn new(method: &str, path: &str) -> Request {
        Request {
            method: method.to_ascii_uppercase(),
            path: path.to_string(),
            ..Request::default()
        }
    }

    pub fn post(path: &str) -> Request {
        Request::new("POST", path)
    }

    pub fn get(path: &str) -> Request {
        Request::new("GET", path)
    }

    pub fn with_header(mut self, name: &str, value: &str) -> Request {
        self.headers
            .insert(name.to_ascii_lowercase(), value.to_string());
        self
    }

    pub fn with_body(mut self, body: serde_json::Value) -> Request {
        self.body = Some(body);
        self
    }

    pub fn with_query(mut self, name: &str, value: &str) -> Request {
        self.query
            .insert(name.to_string(), serde_json::Value::String(value.to_string()));
        self
    }

    /// Case-insensitive header lookup.
    pub fn header(&self, name: &str) -> Option<&str> {
        let name = name.to_ascii_lowercase();
        self.headers
            .iter()
            .find(|(held, _)| held.to_ascii_lowercase() == name)
            .map(|(_, value)| value.as_str())
    }
}

/// An outgoing response. Every response carries `x-request-id`.
#[derive(Debug, Clone, serde::Serialize)]
pub struct Response {
    pub status: u16,
    pub body: serde_json::Value,
    pub headers: BTreeMap<String, String>,
}

impl Response {
    pub fn json(status: u16, body: serde_json::Value, request_id: &str) -> Response {
        let mut headers = BTreeMap::new();
        headers.insert("content-type".to_string(), "application/json".to_string());
        headers.insert(REQUEST_ID_HEADER.to_string(), request_id.to_string());
        Response {
            status,
            body,
            headers,
        }
    }

    pub fn html(body: String, request_id: &str) -> Response {
        let mut headers = BTreeMap::new();
        headers.insert(
            "content-type".to_string(),
            "text/html; charset=utf-8".to_string(),
        );
        headers.insert(REQUEST_ID_HEADER.to_string(), request_id.to_string());
        Response {
            status: 200,
            body: serde_json::Value::String(body),
            headers,
        }
    }

    pub fn request_id(&self) -> Option<&str> {
        self.headers.get(REQUEST_ID_HEADER).map(String::as_str)
    }
}
