//! The serve pipeline: a curated set of named queries exposed as HTTP
//! endpoints with input validation, pluggable authentication, role/scope
//! authorization, multi-tenant filter injection, middleware, OpenAPI
//! publication, and structured query events.
//!
//! The pipeline is transport-agnostic: it consumes [`Request`] values and
//! produces [`Response`] values, and a concrete server binding adapts its
//! framework's types at the edge.

mod app;
mod auth;
mod endpoint;
mod error;
mod http;
mod middleware;
mod openapi;
mod validate;

pub use app::{App, AppBuilder, SecuritySettings};
pub use auth::{ApiKeyStrategy, AuthContext, AuthGuard, AuthStrategy};
pub use endpoint::{Endpoint, Handler, RequestContext, TenantMode, TenantPolicy};
pub use error::ServeError;
pub use http::{Request, Response, REQUEST_ID_HEADER};
pub use middleware::{Middleware, MiddlewareFn, Next};
pub use validate::{merge_input, validate_input};
