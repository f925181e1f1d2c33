use std::collections::HashMap;
use std::sync::Arc;

use events::QueryEvent;
use query::Database;
use schema::Value;

use crate::auth::{AuthContext, AuthStrategy};
use crate::endpoint::{Endpoint, RequestContext, TenantMode};
use crate::http::{Request, Response, REQUEST_ID_HEADER};
use crate::middleware::{Middleware, Next};
use crate::{openapi, validate, ServeError};

/// Security controls of the pipeline.
#[derive(Debug, Clone, Default)]
pub struct SecuritySettings {
    /// When false (the default), 401/403 bodies collapse to a generic
    /// message and internal error messages are elided.
    pub verbose_auth_errors: bool,
}

#[derive(Default, Clone)]
pub(crate) struct Hooks {
    pub request_start: Vec<Arc<dyn Fn(&Request, &str) + Send + Sync>>,
    pub request_end: Vec<Arc<dyn Fn(&Request, &Response) + Send + Sync>>,
    pub error: Vec<Arc<dyn Fn(&ServeError, &str) + Send + Sync>>,
    pub auth_failure: Vec<Arc<dyn Fn(&Request) + Send + Sync>>,
    pub authorization_failure: Vec<Arc<dyn Fn(&Request, &AuthContext) + Send + Sync>>,
}

/// App is the assembled serve pipeline: a route table over endpoints,
/// auth strategies, global middleware, hooks, and the OpenAPI surface.
/// Configuration is process-lifetime immutable once built.
pub struct App {
    db: Database,
    title: String,
    version: String,
    openapi_path: String,
    docs_path: String,
    routes: HashMap<(String, String), Arc<Endpoint>>,
    /// Registration-ordered `(method, path, endpoint)` for OpenAPI.
    listing: Vec<(String, String, Arc<Endpoint>)>,
    strategies: Vec<Arc<dyn AuthStrategy>>,
    middlewares: Vec<Arc<dyn Middleware>>,
    hooks: Hooks,
    security: SecuritySettings,
}

impl App {
    pub fn builder(db: Database) -> AppBuilder {
        AppBuilder {
            db,
            base_path: "/api/analytics".to_string(),
            openapi_path: "/openapi.json".to_string(),
            docs_path: "/docs".to_string(),
            title: "Analytics API".to_string(),
            version: "0.1.0".to_string(),
            auto_route: true,
            endpoints: Vec::new(),
            manual_routes: Vec::new(),
            strategies: Vec::new(),
            middlewares: Vec::new(),
            hooks: Hooks::default(),
            security: SecuritySettings::default(),
        }
    }

    pub fn openapi_document(&self) -> serde_json::Value {
        openapi::build_document(
            &self.title,
            &self.version,
            &self.listing,
            !self.strategies.is_empty(),
        )
    }

    /// Process one request through the full lifecycle: routing, auth,
    /// guards, tenancy, validation, middleware, the handler, and the
    /// error envelope.
    pub async fn handle(&self, request: Request) -> Response {
        let request_id = request
            .header(REQUEST_ID_HEADER)
            .map(str::to_string)
            .unwrap_or_else(|| uuid::Uuid::new_v4().to_string());

        for hook in &self.hooks.request_start {
            hook(&request, &request_id);
        }

        // The documentation surface stays public under any auth setup.
        let response = if request.method == "GET" && request.path == self.openapi_path {
            Response::json(200, self.openapi_document(), &request_id)
        } else if request.method == "GET" && request.path == self.docs_path {
            Response::html(
                openapi::docs_html(&self.title, &self.openapi_path),
                &request_id,
            )
        } else {
            self.handle_api(&request, &request_id).await
        };

        for hook in &self.hooks.request_end {
            hook(&request, &response);
        }
        response
    }

    async fn handle_api(&self, request: &Request, request_id: &str) -> Response {
        let endpoint = self
            .routes
            .get(&(request.method.clone(), request.path.clone()))
            .cloned();

        let mut started = QueryEvent::started(
            &format!("{} {}", request.method, request.path),
            Vec::new(),
        );
        started.query_id = Some(request_id.to_string());
        if let Some(endpoint) = &endpoint {
            started = started.with_endpoint(&endpoint.key);
        }
        self.db.events().emit(&started);

        let outcome = match endpoint {
            Some(endpoint) => self.dispatch(request, endpoint, request_id).await,
            None => Err(ServeError::NotFound),
        };

        match outcome {
            Ok(response) => {
                self.db.events().emit(
                    &started
                        .completed(None)
                        .with_response_status(response.status),
                );
                response
            }
            Err(error) => {
                for hook in &self.hooks.error {
                    hook(&error, request_id);
                }
                let status = error.status();
                self.db.events().emit(
                    &started
                        .errored(&error.to_string())
                        .with_response_status(status),
                );
                tracing::debug!(
                    %request_id,
                    status,
                    error_type = error.error_type(),
                    "request failed",
                );
                Response::json(
                    status,
                    error.envelope(self.security.verbose_auth_errors),
                    request_id,
                )
            }
        }
    }

    async fn dispatch(
        &self,
        request: &Request,
        endpoint: Arc<Endpoint>,
        request_id: &str,
    ) -> Result<Response, ServeError> {
        // Authentication: strategies run in order until one claims the
        // request. Strategy failures are logged, not fatal.
        let mut auth = None;
        if !endpoint.public {
            for strategy in &self.strategies {
                match strategy.authenticate(request).await {
                    Ok(Some(context)) => {
                        auth = Some(context);
                        break;
                    }
                    Ok(None) => (),
                    Err(error) => {
                        tracing::warn!(%error, "auth strategy failed");
                    }
                }
            }
        }

        if auth.is_none() && !endpoint.guards.is_empty() {
            for hook in &self.hooks.auth_failure {
                hook(request);
            }
            return Err(ServeError::Unauthorized(
                "authentication required".to_string(),
            ));
        }

        // Authorization guards.
        if let Some(context) = &auth {
            for guard in &endpoint.guards {
                if let Err(error) = guard.check(context) {
                    for hook in &self.hooks.authorization_failure {
                        hook(request, context);
                    }
                    return Err(error);
                }
            }
        }

        // Tenant policy: extract, enforce presence, and scope the
        // database handle under auto-injection.
        let mut db = self.db.clone();
        let mut tenant_id = None;
        if let Some(policy) = &endpoint.tenant {
            tenant_id = auth.as_ref().and_then(|context| (policy.extract)(context));

            match &tenant_id {
                None if policy.required => {
                    return Err(ServeError::Forbidden {
                        message: "tenant context is required".to_string(),
                        reason: "missing_tenant_context",
                        required: None,
                        actual: None,
                    });
                }
                Some(id) if policy.mode == TenantMode::AutoInject => {
                    db = db.scoped_to_tenant(&policy.column, Value::from(id.as_str()), id);
                }
                _ => (),
            }
        }

        // Input assembly and validation.
        let input = validate::merge_input(request.body.as_ref(), &request.query);
        if let Some(schema) = &endpoint.input_schema {
            validate::validate_input(schema, &input)?;
        }

        let ctx = Arc::new(RequestContext::new(
            request_id.to_string(),
            request.method.clone(),
            request.path.clone(),
            request.headers.clone(),
            auth,
            tenant_id,
            db,
        ));

        // Middleware onion: global first, per-endpoint inside, handler at
        // the center.
        let chain: Vec<Arc<dyn Middleware>> = self
            .middlewares
            .iter()
            .chain(endpoint.middlewares.iter())
            .cloned()
            .collect();
        let body = Next::new(chain.into(), endpoint.handler.clone())
            .run(input, ctx)
            .await?;

        Ok(Response::json(200, body, request_id))
    }
}

/// AppBuilder assembles process-scoped serve configuration.
pub struct AppBuilder {
    db: Database,
    base_path: String,
    openapi_path: String,
    docs_path: String,
    title: String,
    version: String,
    auto_route: bool,
    endpoints: Vec<Arc<Endpoint>>,
    manual_routes: Vec<(String, String, Arc<Endpoint>)>,
    strategies: Vec<Arc<dyn AuthStrategy>>,
    middlewares: Vec<Arc<dyn Middleware>>,
    hooks: Hooks,
    security: SecuritySettings,
}

impl AppBuilder {
    pub fn base_path(mut self, base_path: &str) -> Self {
        self.base_path = base_path.trim_end_matches('/').to_string();
        self
    }

    pub fn openapi_path(mut self, path: &str) -> Self {
        self.openapi_path = path.to_string();
        self
    }

    pub fn docs_path(mut self, path: &str) -> Self {
        self.docs_path = path.to_string();
        self
    }

    pub fn title(mut self, title: &str) -> Self {
        self.title = title.to_string();
        self
    }

    pub fn version(mut self, version: &str) -> Self {
        self.version = version.to_string();
        self
    }

    /// Disable auto-routing; only manual routes are reachable.
    pub fn auto_route(mut self, enabled: bool) -> Self {
        self.auto_route = enabled;
        self
    }

    /// Register an endpoint at its auto-route `<method> <base>/<key>`.
    pub fn endpoint(mut self, endpoint: Endpoint) -> Self {
        self.endpoints.push(Arc::new(endpoint));
        self
    }

    /// Register an endpoint at an explicit path, superseding any
    /// auto-route it would otherwise get.
    pub fn route(mut self, method: &str, path: &str, endpoint: Endpoint) -> Self {
        self.manual_routes.push((
            method.to_ascii_uppercase(),
            path.to_string(),
            Arc::new(endpoint),
        ));
        self
    }

    pub fn auth_strategy(mut self, strategy: Arc<dyn AuthStrategy>) -> Self {
        self.strategies.push(strategy);
        self
    }

    pub fn middleware(mut self, middleware: Arc<dyn Middleware>) -> Self {
        self.middlewares.push(middleware);
        self
    }

    pub fn security(mut self, security: SecuritySettings) -> Self {
        self.security = security;
        self
    }

    pub fn on_request_start<F: Fn(&Request, &str) + Send + Sync + 'static>(mut self, hook: F) -> Self {
        self.hooks.request_start.push(Arc::new(hook));
        self
    }

    pub fn on_request_end<F: Fn(&Request, &Response) + Send + Sync + 'static>(mut self, hook: F) -> Self {
        self.hooks.request_end.push(Arc::new(hook));
        self
    }

    pub fn on_error<F: Fn(&ServeError, &str) + Send + Sync + 'static>(mut self, hook: F) -> Self {
        self.hooks.error.push(Arc::new(hook));
        self
    }

    pub fn on_auth_failure<F: Fn(&Request) + Send + Sync + 'static>(mut self, hook: F) -> Self {
        self.hooks.auth_failure.push(Arc::new(hook));
        self
    }

    pub fn on_authorization_failure<F: Fn(&Request, &AuthContext) + Send + Sync + 'static>(
        mut self,
        hook: F,
    ) -> Self {
        self.hooks.authorization_failure.push(Arc::new(hook));
        self
    }

    pub fn build(self) -> App {
        let mut routes = HashMap::new();
        let mut listing = Vec::new();

        for (method, path, endpoint) in self.manual_routes {
            routes.insert((method.clone(), path.clone()), endpoint.clone());
            listing.push((method, path, endpoint));
        }

        if self.auto_route {
            for endpoint in self.endpoints {
                let path = format!("{}/{}", self.base_path, endpoint.key);
                let key = (endpoint.method.clone(), path.clone());
                if routes.contains_key(&key) {
                    tracing::warn!(path = %path, "auto-route shadowed by a manual route");
                    continue;
                }
                routes.insert(key, endpoint.clone());
                listing.push((endpoint.method.clone(), path, endpoint));
            }
        }

        App {
            db: self.db,
            title: self.title,
            version: self.version,
            openapi_path: self.openapi_path,
            docs_path: self.docs_path,
            routes,
            listing,
            strategies: self.strategies,
            middlewares: self.middlewares,
            hooks: self.hooks,
            security: self.security,
        }
    }
}
