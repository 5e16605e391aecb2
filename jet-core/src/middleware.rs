// Middleware system for request/response processing

use crate::logging::{debug, info, trace, warn};
use crate::{HttpResponse, RequestContext, Result};
use async_trait::async_trait;
use futures_util::future::BoxFuture;
use std::sync::Arc;

/// Type alias for the next handler in the middleware chain
pub type Next = Box<dyn FnOnce(RequestContext) -> BoxFuture<'static, Result<HttpResponse>> + Send>;

/// Terminal handler a chain delegates to once every middleware has run.
pub type Endpoint =
    Arc<dyn Fn(RequestContext) -> BoxFuture<'static, Result<HttpResponse>> + Send + Sync>;

/// Middleware trait for processing requests before they reach the handler
#[async_trait]
pub trait Middleware: Send + Sync {
    /// Process the request and optionally pass to next middleware
    async fn handle(&self, ctx: RequestContext, next: Next) -> Result<HttpResponse>;
}

/// Which request paths a middleware applies to.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum PathPattern {
    /// `*`
    All,
    /// `/api` or `/api/*`: the path itself and everything below it
    Prefix(String),
}

impl PathPattern {
    pub fn parse(pattern: &str) -> Self {
        let prefix = pattern.strip_suffix('*').unwrap_or(pattern);
        match trim(prefix) {
            "/" => PathPattern::All,
            prefix => PathPattern::Prefix(prefix.to_string()),
        }
    }

    pub fn matches(&self, path: &str) -> bool {
        let path = trim(path);
        match self {
            PathPattern::All => true,
            PathPattern::Prefix(prefix) => {
                path == prefix
                    || path
                        .strip_prefix(prefix.as_str())
                        .is_some_and(|rest| rest.starts_with('/'))
            }
        }
    }
}

fn trim(path: &str) -> &str {
    match path.trim_end_matches('/') {
        "" => "/",
        trimmed => trimmed,
    }
}

#[derive(Clone)]
struct Layer {
    pattern: PathPattern,
    middleware: Arc<dyn Middleware>,
}

/// Middleware chain executor
#[derive(Clone, Default)]
pub struct MiddlewareChain {
    layers: Arc<Vec<Layer>>,
}

impl MiddlewareChain {
    pub fn new() -> Self {
        Self {
            layers: Arc::new(Vec::new()),
        }
    }

    /// Add a middleware that runs for every request matching `pattern`.
    pub fn use_middleware(&mut self, pattern: &str, middleware: Arc<dyn Middleware>) {
        let pattern = PathPattern::parse(pattern);
        trace!(pattern = ?pattern, "Registered middleware");
        Arc::make_mut(&mut self.layers).push(Layer {
            pattern,
            middleware,
        });
    }

    pub fn len(&self) -> usize {
        self.layers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.layers.is_empty()
    }

    /// Execute the middleware chain with a handler
    pub async fn apply(&self, ctx: RequestContext, endpoint: Endpoint) -> Result<HttpResponse> {
        debug!(
            middleware_count = self.layers.len(),
            request_id = %ctx.id(),
            path = %ctx.path(),
            method = %ctx.method(),
            "Executing middleware chain"
        );
        self.execute_from(0, ctx, endpoint).await
    }

    fn execute_from(
        &self,
        index: usize,
        ctx: RequestContext,
        endpoint: Endpoint,
    ) -> BoxFuture<'static, Result<HttpResponse>> {
        let Some(position) = self.layers[index.min(self.layers.len())..]
            .iter()
            .position(|layer| layer.pattern.matches(ctx.path()))
            .map(|offset| index + offset)
        else {
            trace!("Middleware chain complete, calling handler");
            return endpoint(ctx);
        };

        let middleware = self.layers[position].middleware.clone();
        let chain = self.clone();

        trace!(middleware_index = position, "Executing middleware");
        Box::pin(async move {
            middleware
                .handle(
                    ctx,
                    Box::new(move |ctx| chain.execute_from(position + 1, ctx, endpoint)),
                )
                .await
        })
    }
}

/// Request logging middleware
#[derive(Debug, Default)]
pub struct LoggerMiddleware {
    pub log_body: bool,
}

impl LoggerMiddleware {
    pub fn new() -> Self {
        Self { log_body: false }
    }

    pub fn with_body(mut self) -> Self {
        self.log_body = true;
        self
    }
}

#[async_trait]
impl Middleware for LoggerMiddleware {
    async fn handle(&self, ctx: RequestContext, next: Next) -> Result<HttpResponse> {
        let start = std::time::Instant::now();
        let request_id = ctx.id();
        let method = ctx.method().to_string();
        let path = ctx.path().to_string();

        if self.log_body {
            info!(request_id = %request_id, method = %method, path = %path, body_bytes = ctx.request().body.len(), "Request received");
        } else {
            info!(request_id = %request_id, method = %method, path = %path, "Request received");
        }

        let result = next(ctx).await;
        let elapsed_ms = start.elapsed().as_millis() as u64;

        match &result {
            Ok(response) => {
                info!(request_id = %request_id, method = %method, path = %path, status = response.status, elapsed_ms, "Request completed");
            }
            Err(e) => {
                warn!(request_id = %request_id, method = %method, path = %path, error = %e, elapsed_ms, "Request failed");
            }
        }

        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{Error, HttpRequest};
    use parking_lot::Mutex;

    struct Recorder {
        name: &'static str,
        log: Arc<Mutex<Vec<&'static str>>>,
    }

    #[async_trait]
    impl Middleware for Recorder {
        async fn handle(&self, ctx: RequestContext, next: Next) -> Result<HttpResponse> {
            self.log.lock().push(self.name);
            next(ctx).await
        }
    }

    struct Blocker;

    #[async_trait]
    impl Middleware for Blocker {
        async fn handle(&self, _ctx: RequestContext, _next: Next) -> Result<HttpResponse> {
            Err(Error::Forbidden("blocked".into()))
        }
    }

    fn endpoint(log: Arc<Mutex<Vec<&'static str>>>) -> Endpoint {
        Arc::new(move |_ctx: RequestContext| -> BoxFuture<'static, Result<HttpResponse>> {
            let log = log.clone();
            Box::pin(async move {
                log.lock().push("handler");
                Ok(HttpResponse::ok())
            })
        })
    }

    fn recorder(name: &'static str, log: &Arc<Mutex<Vec<&'static str>>>) -> Arc<dyn Middleware> {
        Arc::new(Recorder {
            name,
            log: log.clone(),
        })
    }

    #[test]
    fn test_path_patterns() {
        assert!(PathPattern::parse("*").matches("/anything"));
        let api = PathPattern::parse("/api/*");
        assert!(api.matches("/api"));
        assert!(api.matches("/api/users/1"));
        assert!(!api.matches("/apis"));
        assert_eq!(PathPattern::parse("/"), PathPattern::All);

        let bare = PathPattern::parse("/api");
        assert_eq!(bare, api);
        assert!(bare.matches("/api"));
        assert!(bare.matches("/api/"));
        assert!(bare.matches("/api/users"));
        assert!(!bare.matches("/apis"));
        assert!(!bare.matches("/"));

        let health = PathPattern::parse("/health/");
        assert!(health.matches("/health"));
        assert!(health.matches("/health/live"));
    }

    #[tokio::test]
    async fn test_chain_runs_in_registration_order() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let mut chain = MiddlewareChain::new();
        chain.use_middleware("*", recorder("first", &log));
        chain.use_middleware("/admin/*", recorder("admin", &log));
        chain.use_middleware("*", recorder("second", &log));

        let ctx = RequestContext::new(HttpRequest::new("GET", "/users"));
        let response = chain.apply(ctx, endpoint(log.clone())).await.unwrap();

        assert_eq!(response.status, 200);
        assert_eq!(*log.lock(), vec!["first", "second", "handler"]);
    }

    #[tokio::test]
    async fn test_middleware_can_short_circuit() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let mut chain = MiddlewareChain::new();
        chain.use_middleware("*", Arc::new(Blocker));

        let ctx = RequestContext::new(HttpRequest::new("GET", "/"));
        let result = chain.apply(ctx, endpoint(log.clone())).await;

        assert!(matches!(result, Err(Error::Forbidden(_))));
        assert!(log.lock().is_empty());
    }

    #[tokio::test]
    async fn test_logger_passes_results_through() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let mut chain = MiddlewareChain::new();
        chain.use_middleware("*", Arc::new(LoggerMiddleware::new().with_body()));
        chain.use_middleware("/private/*", Arc::new(Blocker));

        let ok = chain
            .apply(
                RequestContext::new(HttpRequest::new("POST", "/public").with_body("ping")),
                endpoint(log.clone()),
            )
            .await;
        assert_eq!(ok.unwrap().status, 200);

        let blocked = chain
            .apply(
                RequestContext::new(HttpRequest::new("GET", "/private/x")),
                endpoint(log.clone()),
            )
            .await;
        assert!(matches!(blocked, Err(Error::Forbidden(_))));
        assert_eq!(*log.lock(), vec!["handler"]);
    }
}
