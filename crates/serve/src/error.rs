//! The uniform error envelope: every failure renders as
//! `{ "error": { "type", "message", "details"? } }`, with authorization
//! detail gated behind the verbose-errors security setting.

/// ServeError is what a handler, middleware, or the pipeline itself can
/// fail with. Each kind maps to one HTTP status and envelope type.
#[derive(Debug, thiserror::Error)]
pub enum ServeError {
    #[error("{message}")]
    Validation {
        message: String,
        details: Option<serde_json::Value>,
    },

    #[error("{0}")]
    Unauthorized(String),

    #[error("{message}")]
    Forbidden {
        message: String,
        /// One of `missing_role`, `missing_scope`, `missing_tenant_context`.
        reason: &'static str,
        required: Option<serde_json::Value>,
        actual: Option<serde_json::Value>,
    },

    #[error("no route for this method and path")]
    NotFound,

    #[error(transparent)]
    Query(#[from] query::QueryError),

    /// Middleware short-circuits surface their own status and type.
    #[error("{message}")]
    Custom {
        status: u16,
        error_type: String,
        message: String,
    },

    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

impl ServeError {
    pub fn validation(message: &str) -> ServeError {
        ServeError::Validation {
            message: message.to_string(),
            details: None,
        }
    }

    pub fn custom(status: u16, error_type: &str, message: &str) -> ServeError {
        ServeError::Custom {
            status,
            error_type: error_type.to_string(),
            message: message.to_string(),
        }
    }

    pub fn status(&self) -> u16 {
        match self {
            ServeError::Validation { .. } => 400,
            ServeError::Unauthorized(_) => 401,
            ServeError::Forbidden { .. } => 403,
            ServeError::NotFound => 404,
            ServeError::Custom { status, .. } => *status,
            ServeError::Query(query::QueryError::Filter(_)) => 400,
            ServeError::Query(_) | ServeError::Internal(_) => 500,
        }
    }

    pub fn error_type(&self) -> &str {
        match self {
            ServeError::Validation { .. } => "VALIDATION_ERROR",
            ServeError::Unauthorized(_) => "UNAUTHORIZED",
            ServeError::Forbidden { .. } => "FORBIDDEN",
            ServeError::NotFound => "NOT_FOUND",
            ServeError::Custom { error_type, .. } => error_type,
            ServeError::Query(query::QueryError::Filter(_)) => "VALIDATION_ERROR",
            ServeError::Query(_) | ServeError::Internal(_) => "INTERNAL_ERROR",
        }
    }

    /// Render the error envelope. `verbose` governs whether authorization
    /// failures reveal their reason and the required/actual sets, and
    /// whether internal messages surface at all.
    pub fn envelope(&self, verbose: bool) -> serde_json::Value {
        let (message, details) = match self {
            ServeError::Validation { message, details } => {
                (message.clone(), details.clone())
            }
            ServeError::Unauthorized(message) if verbose => (message.clone(), None),
            ServeError::Unauthorized(_) => ("Access denied".to_string(), None),
            ServeError::Forbidden {
                message,
                reason,
                required,
                actual,
            } if verbose => {
                let mut details = serde_json::Map::new();
                details.insert("reason".to_string(), serde_json::json!(reason));
                if let Some(required) = required {
                    details.insert("required".to_string(), required.clone());
                }
                if let Some(actual) = actual {
                    details.insert("actual".to_string(), actual.clone());
                }
                (message.clone(), Some(serde_json::Value::Object(details)))
            }
            ServeError::Forbidden { .. } => ("Insufficient permissions".to_string(), None),
            ServeError::NotFound => (self.to_string(), None),
            ServeError::Custom { message, .. } => (message.clone(), None),
            ServeError::Query(error) if self.status() == 400 => (error.to_string(), None),
            ServeError::Query(_) | ServeError::Internal(_) if !verbose => {
                ("Internal server error".to_string(), None)
            }
            ServeError::Query(error) => (format!("{error:#}"), None),
            ServeError::Internal(error) => (format!("{error:#}"), None),
        };

        let mut error = serde_json::Map::new();
        error.insert("type".to_string(), serde_json::json!(self.error_type()));
        error.insert("message".to_string(), serde_json::json!(message));
        if let Some(details) = details {
            error.insert("details".to_string(), details);
        }
        serde_json::json!({ "error": error })
    }
}
