// Routing system for HTTP requests

use crate::logging::trace;
use crate::route_registry::HttpMethod;
use crate::{Error, HttpResponse, RequestContext, Result};
use futures_util::future::BoxFuture;
use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;

/// A route handler function type
pub type HandlerFn =
    Arc<dyn Fn(RequestContext) -> BoxFuture<'static, Result<HttpResponse>> + Send + Sync>;

/// Route definition with handler
#[derive(Clone)]
pub struct Route {
    pub method: HttpMethod,
    pub path: String,
    pub handler: HandlerFn,
}

impl std::fmt::Debug for Route {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Route")
            .field("method", &self.method)
            .field("path", &self.path)
            .finish()
    }
}

/// Ordered route table; the first matching route wins.
#[derive(Clone, Debug, Default)]
pub struct Router {
    routes: Vec<Route>,
}

impl Router {
    pub fn new() -> Self {
        Self { routes: Vec::new() }
    }

    /// Add a route to the router
    pub fn add_route(&mut self, method: HttpMethod, path: &str, handler: HandlerFn) {
        self.routes.push(Route {
            method,
            path: normalize(path),
            handler,
        });
    }

    /// Add a route from an async closure.
    pub fn on<F, Fut>(&mut self, method: HttpMethod, path: &str, handler: F)
    where
        F: Fn(RequestContext) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<HttpResponse>> + Send + 'static,
    {
        self.add_route(
            method,
            path,
            Arc::new(move |ctx: RequestContext| -> BoxFuture<'static, Result<HttpResponse>> {
                Box::pin(handler(ctx))
            }),
        );
    }

    /// Append every route of `sub` under `base_path`, keeping their order.
    pub fn mount(&mut self, base_path: &str, sub: Router) {
        for route in sub.routes {
            let path = join_paths(base_path, &route.path);
            trace!(method = %route.method, path = %path, "Mounted route");
            self.routes.push(Route { path, ..route });
        }
    }

    pub fn routes(&self) -> &[Route] {
        &self.routes
    }

    pub fn len(&self) -> usize {
        self.routes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.routes.is_empty()
    }

    /// Dispatch `ctx` to the first route matching its method and path.
    pub async fn route(&self, ctx: RequestContext) -> Result<HttpResponse> {
        let mut path_matched = false;

        for route in &self.routes {
            let Some(params) = match_path(&route.path, ctx.path()) else {
                continue;
            };
            if !route.method.accepts(ctx.method()) {
                path_matched = true;
                continue;
            }

            trace!(method = %route.method, pattern = %route.path, "Route matched");
            ctx.set_path_params(params);
            return (route.handler)(ctx).await;
        }

        let target = format!("{} {}", ctx.method(), ctx.path());
        if path_matched {
            Err(Error::MethodNotAllowed(target))
        } else {
            Err(Error::RouteNotFound(target))
        }
    }
}

/// Join a base path and a route suffix; an empty suffix maps to the base path itself.
pub fn join_paths(base: &str, suffix: &str) -> String {
    let base = base.trim_end_matches('/');
    let suffix = suffix.trim_start_matches('/');
    match (base.is_empty(), suffix.is_empty()) {
        (true, true) => "/".to_string(),
        (true, false) => format!("/{}", suffix),
        (false, true) => normalize(base),
        (false, false) => normalize(&format!("{}/{}", base, suffix)),
    }
}

fn normalize(path: &str) -> String {
    if path.starts_with('/') {
        path.to_string()
    } else {
        format!("/{}", path)
    }
}

/// Match a route path pattern against a request path
/// Returns Some(params) if matched, None otherwise
fn match_path(pattern: &str, path: &str) -> Option<HashMap<String, String>> {
    let pattern_parts: Vec<&str> = pattern.split('/').filter(|s| !s.is_empty()).collect();
    let path_parts: Vec<&str> = path.split('/').filter(|s| !s.is_empty()).collect();

    let mut params = HashMap::new();

    for (i, pattern_part) in pattern_parts.iter().enumerate() {
        if *pattern_part == "*" && i + 1 == pattern_parts.len() {
            // Trailing wildcard swallows the rest of the path
            return Some(params);
        }

        let path_part = path_parts.get(i)?;
        if let Some(param_name) = pattern_part.strip_prefix(':') {
            let value = urlencoding::decode(path_part)
                .map(|v| v.into_owned())
                .unwrap_or_else(|_| path_part.to_string());
            params.insert(param_name.to_string(), value);
        } else if pattern_part != path_part {
            return None;
        }
    }

    if pattern_parts.len() == path_parts.len() {
        Some(params)
    } else {
        None
    }
}
