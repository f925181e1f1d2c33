use std::collections::BTreeMap;
use std::sync::Arc;

use futures::future::BoxFuture;
use query::Database;

use crate::auth::{AuthContext, AuthGuard};
use crate::middleware::Middleware;
use crate::ServeError;

/// The context a handler (and middleware) receives for one request.
#[derive(Clone)]
pub struct RequestContext {
    pub request_id: String,
    pub method: String,
    pub path: String,
    pub headers: BTreeMap<String, String>,
    pub auth: Option<AuthContext>,
    pub tenant_id: Option<String>,
    db: Database,
}

impl RequestContext {
    pub(crate) fn new(
        request_id: String,
        method: String,
        path: String,
        headers: BTreeMap<String, String>,
        auth: Option<AuthContext>,
        tenant_id: Option<String>,
        db: Database,
    ) -> RequestContext {
        RequestContext {
            request_id,
            method,
            path,
            headers,
            auth,
            tenant_id,
            db,
        }
    }

    /// The database handle for this request. Under an auto-inject tenant
    /// policy, every builder it creates carries the tenant filter.
    pub fn db(&self) -> &Database {
        &self.db
    }
}

pub type Handler = Arc<
    dyn Fn(serde_json::Value, Arc<RequestContext>) -> BoxFuture<'static, Result<serde_json::Value, ServeError>>
        + Send
        + Sync,
>;

/// How a tenant policy applies to the request's database handle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TenantMode {
    /// Builders issued through the context implicitly filter by tenant.
    #[default]
    AutoInject,
    /// The handler filters explicitly; registration logs a warning.
    Manual,
}

/// Multi-tenancy policy of an endpoint.
pub struct TenantPolicy {
    pub(crate) extract: Box<dyn Fn(&AuthContext) -> Option<String> + Send + Sync>,
    pub(crate) required: bool,
    pub(crate) column: String,
    pub(crate) mode: TenantMode,
}

impl TenantPolicy {
    /// Filter by `column = extract(auth)`.
    pub fn new<F>(column: &str, extract: F) -> TenantPolicy
    where
        F: Fn(&AuthContext) -> Option<String> + Send + Sync + 'static,
    {
        TenantPolicy {
            extract: Box::new(extract),
            required: false,
            column: column.to_string(),
            mode: TenantMode::AutoInject,
        }
    }

    /// Reject requests without a tenant with 403 `missing_tenant_context`.
    pub fn required(mut self) -> TenantPolicy {
        self.required = true;
        self
    }

    pub fn mode(mut self, mode: TenantMode) -> TenantPolicy {
        self.mode = mode;
        self
    }
}

/// A named server-side operation bound to an HTTP method. Auto-routed at
/// `POST <base>/<key>` unless the method or route is overridden.
pub struct Endpoint {
    pub(crate) key: String,
    pub(crate) method: String,
    pub(crate) input_schema: Option<serde_json::Value>,
    pub(crate) output_schema: Option<serde_json::Value>,
    pub(crate) handler: Handler,
    pub(crate) middlewares: Vec<Arc<dyn Middleware>>,
    pub(crate) guards: Vec<AuthGuard>,
    pub(crate) public: bool,
    pub(crate) tenant: Option<TenantPolicy>,
    pub(crate) description: Option<String>,
}

impl Endpoint {
    pub fn new<F, Fut>(key: &str, handler: F) -> Endpoint
    where
        F: Fn(serde_json::Value, Arc<RequestContext>) -> Fut + Send + Sync + 'static,
        Fut: std::future::Future<Output = Result<serde_json::Value, ServeError>> + Send + 'static,
    {
        let handler: Handler = Arc::new(move |input, ctx| Box::pin(handler(input, ctx)));
        Endpoint {
            key: key.to_string(),
            method: "POST".to_string(),
            input_schema: None,
            output_schema: None,
            handler,
            middlewares: Vec::new(),
            guards: Vec::new(),
            public: false,
            tenant: None,
            description: None,
        }
    }

    pub fn method(mut self, method: &str) -> Endpoint {
        self.method = method.to_ascii_uppercase();
        self
    }

    /// Validate merged body+query input against `T`'s JSON schema.
    pub fn input_schema<T: schemars::JsonSchema>(mut self) -> Endpoint {
        self.input_schema = serde_json::to_value(schemars::schema_for!(T)).ok();
        self
    }

    /// Document (not validate) the response body as `T`.
    pub fn output_schema<T: schemars::JsonSchema>(mut self) -> Endpoint {
        self.output_schema = serde_json::to_value(schemars::schema_for!(T)).ok();
        self
    }

    /// Supply an input schema as a raw JSON Schema value.
    pub fn input_schema_value(mut self, schema: serde_json::Value) -> Endpoint {
        self.input_schema = Some(schema);
        self
    }

    pub fn require_auth(mut self) -> Endpoint {
        self.guards.push(AuthGuard::RequireAuth);
        self
    }

    /// At least one of `roles` (OR semantics).
    pub fn require_role<I, S>(mut self, roles: I) -> Endpoint
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.guards
            .push(AuthGuard::RequireRole(roles.into_iter().map(Into::into).collect()));
        self
    }

    /// Every one of `scopes` (AND semantics).
    pub fn require_scope<I, S>(mut self, scopes: I) -> Endpoint
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.guards
            .push(AuthGuard::RequireScope(scopes.into_iter().map(Into::into).collect()));
        self
    }

    /// Opt out of global authentication.
    pub fn public(mut self) -> Endpoint {
        self.public = true;
        self
    }

    pub fn tenant(mut self, policy: TenantPolicy) -> Endpoint {
        if policy.mode == TenantMode::Manual {
            tracing::warn!(
                endpoint = %self.key,
                "tenant policy is manual: no filter will be injected",
            );
        }
        self.tenant = Some(policy);
        self
    }

    pub fn middleware(mut self, middleware: Arc<dyn Middleware>) -> Endpoint {
        self.middlewares.push(middleware);
        self
    }

    pub fn description(mut self, description: &str) -> Endpoint {
        self.description = Some(description.to_string());
        self
    }

    pub fn key(&self) -> &str {
        &self.key
    }
}
