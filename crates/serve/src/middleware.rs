use std::sync::Arc;

use crate::endpoint::{Handler, RequestContext};
use crate::ServeError;

/// Middleware wraps the handler in an onion: registration order runs
/// outermost-first, the handler at the center, unwinding in reverse. A
/// middleware short-circuits by returning an error (typically
/// `ServeError::Custom` to control status and type).
#[async_trait::async_trait]
pub trait Middleware: Send + Sync {
    async fn handle(
        &self,
        input: serde_json::Value,
        ctx: Arc<RequestContext>,
        next: Next,
    ) -> Result<serde_json::Value, ServeError>;
}

/// The remainder of the chain from a middleware's point of view.
pub struct Next {
    chain: Arc<[Arc<dyn Middleware>]>,
    at: usize,
    handler: Handler,
}

impl Next {
    pub(crate) fn new(chain: Arc<[Arc<dyn Middleware>]>, handler: Handler) -> Next {
        Next {
            chain,
            at: 0,
            handler,
        }
    }

    pub async fn run(
        self,
        input: serde_json::Value,
        ctx: Arc<RequestContext>,
    ) -> Result<serde_json::Value, ServeError> {
        match self.chain.get(self.at).cloned() {
            Some(middleware) => {
                let next = Next {
                    chain: self.chain.clone(),
                    at: self.at + 1,
                    handler: self.handler.clone(),
                };
                middleware.handle(input, ctx, next).await
            }
            None => (self.handler)(input, ctx).await,
        }
    }
}

/// A middleware from a plain async closure.
pub struct MiddlewareFn<F>(pub F);

#[async_trait::async_trait]
impl<F> Middleware for MiddlewareFn<F>
where
    F: Fn(
            serde_json::Value,
            Arc<RequestContext>,
            Next,
        ) -> futures::future::BoxFuture<'static, Result<serde_json::Value, ServeError>>
        + Send
        + Sync,
{
    async fn handle(
        &self,
        input: serde_json::Value,
        ctx: Arc<RequestContext>,
        next: Next,
    ) -> Result<serde_json::Value, ServeError> {
        (self.0)(input, ctx, next).await
    }
}
