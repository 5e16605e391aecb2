//! Request filters
//!
//! [`OncePerRequest`] runs a filter's logic at most once per inbound request,
//! however often the request is routed through it. The set of requests
//! already filtered holds weak references only and drops entries as their
//! requests complete.

use crate::{AuthenticationManager, UserDetails, UserDetailsService};
use async_trait::async_trait;
use base64::Engine as _;
use base64::engine::general_purpose::STANDARD;
use jet_core::logging::{debug, trace};
use jet_core::{
    Error, HttpResponse, Middleware, Next, RequestContext, RequestId, Result, WeakRequestContext,
};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;

/// Filter logic wrapped by [`OncePerRequest`].
#[async_trait]
pub trait OncePerRequestFilter: Send + Sync {
    /// Decides whether and when to call `next`.
    async fn filter(&self, ctx: RequestContext, next: Next) -> Result<HttpResponse>;
}

/// Runs `F` once per request; later passes go straight to `next`.
pub struct OncePerRequest<F> {
    filter: F,
    applied: Mutex<HashMap<RequestId, WeakRequestContext>>,
}

impl<F: OncePerRequestFilter> OncePerRequest<F> {
    pub fn new(filter: F) -> Self {
        Self {
            filter,
            applied: Mutex::new(HashMap::new()),
        }
    }

    pub fn inner(&self) -> &F {
        &self.filter
    }

    /// Requests currently remembered as filtered.
    pub fn tracked(&self) -> usize {
        let mut applied = self.applied.lock();
        applied.retain(|_, request| request.is_alive());
        applied.len()
    }

    pub async fn do_filter(&self, ctx: RequestContext, next: Next) -> Result<HttpResponse> {
        if !self.mark_applied(&ctx) {
            trace!(request_id = %ctx.id(), "Filter already applied, continuing");
            return next(ctx).await;
        }
        self.filter.filter(ctx, next).await
    }

    /// Record `ctx` as filtered; false if it already was.
    fn mark_applied(&self, ctx: &RequestContext) -> bool {
        let mut applied = self.applied.lock();
        applied.retain(|_, request| request.is_alive());
        if applied.contains_key(&ctx.id()) {
            return false;
        }
        applied.insert(ctx.id(), ctx.downgrade());
        true
    }
}

#[async_trait]
impl<F: OncePerRequestFilter + 'static> Middleware for OncePerRequest<F> {
    async fn handle(&self, ctx: RequestContext, next: Next) -> Result<HttpResponse> {
        self.do_filter(ctx, next).await
    }
}

/// Authenticates `Authorization: Basic` credentials and attaches the
/// resulting [`jet_core::Principal`] to the request.
///
/// Requests without the header, or with a scheme other than `Basic`, pass
/// through anonymously; route role checks then reject them where roles are
/// required.
pub struct BasicAuthenticationFilter<S: UserDetailsService> {
    manager: Arc<AuthenticationManager<S>>,
}

impl<S: UserDetailsService + 'static> BasicAuthenticationFilter<S> {
    pub fn new(manager: Arc<AuthenticationManager<S>>) -> Self {
        Self { manager }
    }

    /// Wrapped so it runs once per request.
    pub fn once_per_request(self) -> OncePerRequest<Self> {
        OncePerRequest::new(self)
    }
}

/// The credentials of an `Authorization` header whose scheme is `Basic`.
///
/// The scheme name is case-insensitive.
fn basic_token(header: &str) -> Option<&str> {
    let header = header.trim();
    let (scheme, token) = header.split_once(' ').unwrap_or((header, ""));
    scheme.eq_ignore_ascii_case("basic").then(|| token.trim())
}

fn basic_credentials(token: &str) -> Result<(String, String)> {
    let decoded = STANDARD
        .decode(token)
        .map_err(|_| Error::Unauthorized("malformed basic credentials".to_string()))?;
    let decoded = String::from_utf8(decoded)
        .map_err(|_| Error::Unauthorized("malformed basic credentials".to_string()))?;
    let (username, password) = decoded
        .split_once(':')
        .ok_or_else(|| Error::Unauthorized("malformed basic credentials".to_string()))?;
    Ok((username.to_string(), password.to_string()))
}

#[async_trait]
impl<S: UserDetailsService + 'static> OncePerRequestFilter for BasicAuthenticationFilter<S> {
    async fn filter(&self, ctx: RequestContext, next: Next) -> Result<HttpResponse> {
        let Some(token) = ctx
            .header("authorization")
            .and_then(basic_token)
            .map(str::to_string)
        else {
            return next(ctx).await;
        };

        let (username, password) = basic_credentials(&token)?;
        let user = self.manager.authenticate(&username, &password).await?;
        debug!(request_id = %ctx.id(), username = %username, "Request authenticated");
        ctx.insert(user.to_principal());

        next(ctx).await
    }
}
