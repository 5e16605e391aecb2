// Global error handlers (controller advice)

use crate::logging::{debug, error, warn};
use crate::middleware::{Middleware, Next};
use crate::{Error, HttpResponse, RequestContext, Result};
use async_trait::async_trait;
use std::sync::Arc;

/// Application-wide handler for errors escaping the request pipeline.
///
/// Returning `Err` passes the (possibly replaced) error on to the next
/// registered handler.
///
/// ```ignore
/// struct NotFoundAsJson;
///
/// #[async_trait]
/// impl ErrorHandler for NotFoundAsJson {
///     async fn handle(&self, _ctx: &RequestContext, error: Error) -> Result<HttpResponse> {
///         match error {
///             Error::NotFound(what) => HttpResponse::not_found().with_json(&json!({ "missing": what })),
///             other => Err(other),
///         }
///     }
/// }
/// ```
#[async_trait]
pub trait ErrorHandler: Send + Sync {
    async fn handle(&self, ctx: &RequestContext, error: Error) -> Result<HttpResponse>;
}

/// Generic failure response: `{"error": message, "status": code}`.
pub fn error_response(err: &Error) -> HttpResponse {
    let status = err.status_code().as_u16();
    let body = serde_json::json!({
        "error": err.to_string(),
        "status": status,
    });
    HttpResponse::new(status)
        .with_json(&body)
        .unwrap_or_else(|_| HttpResponse::internal_server_error())
}

/// Handlers in registration order, installed as the outermost middleware.
#[derive(Clone, Default)]
pub struct ErrorHandlerChain {
    handlers: Vec<Arc<dyn ErrorHandler>>,
}

impl ErrorHandlerChain {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, handler: Arc<dyn ErrorHandler>) {
        self.handlers.push(handler);
    }

    pub fn len(&self) -> usize {
        self.handlers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }

    /// Turn `err` into a response, consulting each handler in turn.
    pub async fn recover(&self, ctx: &RequestContext, err: Error) -> HttpResponse {
        let mut err = err;
        for (index, handler) in self.handlers.iter().enumerate() {
            match handler.handle(ctx, err).await {
                Ok(response) => {
                    debug!(request_id = %ctx.id(), handler = index, status = response.status, "Error handled");
                    return response;
                }
                Err(next) => err = next,
            }
        }

        if err.is_server_error() {
            error!(request_id = %ctx.id(), method = %ctx.method(), path = %ctx.path(), error = %err, "Unhandled error");
        } else {
            warn!(request_id = %ctx.id(), method = %ctx.method(), path = %ctx.path(), error = %err, "Request rejected");
        }
        error_response(&err)
    }
}

#[async_trait]
impl Middleware for ErrorHandlerChain {
    async fn handle(&self, ctx: RequestContext, next: Next) -> Result<HttpResponse> {
        match next(ctx.clone()).await {
            Ok(response) => Ok(response),
            Err(err) => Ok(self.recover(&ctx, err).await),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::HttpRequest;

    struct Teapot;

    #[async_trait]
    impl ErrorHandler for Teapot {
        async fn handle(&self, _ctx: &RequestContext, error: Error) -> Result<HttpResponse> {
            match error {
                Error::BadRequest(_) => Ok(HttpResponse::new(418)),
                other => Err(other),
            }
        }
    }

    struct Rename;

    #[async_trait]
    impl ErrorHandler for Rename {
        async fn handle(&self, _ctx: &RequestContext, error: Error) -> Result<HttpResponse> {
            match error {
                Error::NotFound(what) => Err(Error::BadRequest(what)),
                other => Err(other),
            }
        }
    }

    fn ctx() -> RequestContext {
        RequestContext::new(HttpRequest::new("GET", "/broken"))
    }

    #[test]
    fn test_generic_failure_body() {
        let response = error_response(&Error::Forbidden("nope".into()));
        assert_eq!(response.status, 403);
        let body: serde_json::Value = serde_json::from_slice(&response.body).unwrap();
        assert_eq!(body["status"], 403);
        assert_eq!(body["error"], "Forbidden: nope");
    }

    #[tokio::test]
    async fn test_exhausted_chain_falls_back() {
        let chain = ErrorHandlerChain::new();
        let response = chain.recover(&ctx(), Error::Internal("boom".into())).await;
        assert_eq!(response.status, 500);
    }

    #[tokio::test]
    async fn test_handlers_run_in_order_and_can_delegate() {
        let mut chain = ErrorHandlerChain::new();
        chain.push(Arc::new(Rename));
        chain.push(Arc::new(Teapot));

        let response = chain.recover(&ctx(), Error::NotFound("x".into())).await;
        assert_eq!(response.status, 418);

        let response = chain.recover(&ctx(), Error::Forbidden("x".into())).await;
        assert_eq!(response.status, 403);
    }
}
