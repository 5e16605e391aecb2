//! Per-request context handed to filters, middleware and handlers.
//!
//! A [`RequestContext`] is a cheap, cloneable handle: every clone refers to the
//! same inbound request and shares its [`RequestId`], path parameters and
//! extensions. Request identity is what once-per-request filters key on.

use crate::logging::trace;
use crate::{Error, HttpRequest, Result};
use once_cell::sync::OnceCell;
use parking_lot::RwLock;
use std::any::{Any, TypeId};
use std::collections::{BTreeSet, HashMap};
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};

static NEXT_REQUEST_ID: AtomicU64 = AtomicU64::new(1);

/// Process-unique identity of one inbound request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RequestId(u64);

impl RequestId {
    fn next() -> Self {
        Self(NEXT_REQUEST_ID.fetch_add(1, Ordering::Relaxed))
    }

    pub fn as_u64(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for RequestId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "req-{}", self.0)
    }
}

struct ContextInner {
    id: RequestId,
    request: HttpRequest,
    path: String,
    query: Vec<(String, String)>,
    path_params: RwLock<HashMap<String, String>>,
    extensions: RwLock<HashMap<TypeId, Arc<dyn Any + Send + Sync>>>,
    body: OnceCell<serde_json::Value>,
}

/// Shared handle to one inbound request.
#[derive(Clone)]
pub struct RequestContext {
    inner: Arc<ContextInner>,
}

impl RequestContext {
    pub fn new(request: HttpRequest) -> Self {
        let (path, query) = request.split_target();
        let path = path.to_string();
        let query = query.map(parse_query_string).unwrap_or_default();
        let id = RequestId::next();

        trace!(request_id = %id, method = %request.method, path = %path, "Created request context");

        Self {
            inner: Arc::new(ContextInner {
                id,
                request,
                path,
                query,
                path_params: RwLock::new(HashMap::new()),
                extensions: RwLock::new(HashMap::new()),
                body: OnceCell::new(),
            }),
        }
    }

    pub fn id(&self) -> RequestId {
        self.inner.id
    }

    pub fn request(&self) -> &HttpRequest {
        &self.inner.request
    }

    pub fn method(&self) -> &str {
        &self.inner.request.method
    }

    /// Request path without the query string.
    pub fn path(&self) -> &str {
        &self.inner.path
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.inner.request.header(name)
    }

    /// Named path parameter captured by the matched route.
    pub fn param(&self, name: &str) -> Option<String> {
        self.inner.path_params.read().get(name).cloned()
    }

    pub fn path_params(&self) -> HashMap<String, String> {
        self.inner.path_params.read().clone()
    }

    pub(crate) fn set_path_params(&self, params: HashMap<String, String>) {
        *self.inner.path_params.write() = params;
    }

    /// First value of a query parameter.
    pub fn query(&self, name: &str) -> Option<String> {
        self.inner
            .query
            .iter()
            .find(|(key, _)| key == name)
            .map(|(_, value)| value.clone())
    }

    /// Every value of a repeated query parameter, in order.
    pub fn query_all(&self, name: &str) -> Vec<String> {
        self.inner
            .query
            .iter()
            .filter(|(key, _)| key == name)
            .map(|(_, value)| value.clone())
            .collect()
    }

    /// Request body parsed per its declared content type.
    ///
    /// The parsed value is cached, so several body bindings on one handler
    /// parse the payload once.
    pub fn body(&self) -> Result<serde_json::Value> {
        self.inner
            .body
            .get_or_try_init(|| parse_body(&self.inner.request))
            .cloned()
    }

    /// Attach a typed value to this request, replacing any previous value of `T`.
    pub fn insert<T: Send + Sync + 'static>(&self, value: T) {
        self.inner
            .extensions
            .write()
            .insert(TypeId::of::<T>(), Arc::new(value));
    }

    pub fn get<T: Send + Sync + 'static>(&self) -> Option<Arc<T>> {
        self.inner
            .extensions
            .read()
            .get(&TypeId::of::<T>())
            .and_then(|value| value.clone().downcast::<T>().ok())
    }

    pub fn contains<T: Send + Sync + 'static>(&self) -> bool {
        self.inner.extensions.read().contains_key(&TypeId::of::<T>())
    }

    /// Weak handle that does not keep the request alive.
    pub fn downgrade(&self) -> WeakRequestContext {
        WeakRequestContext {
            id: self.inner.id,
            inner: Arc::downgrade(&self.inner),
        }
    }
}

impl fmt::Debug for RequestContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RequestContext")
            .field("id", &self.inner.id)
            .field("method", &self.inner.request.method)
            .field("path", &self.inner.path)
            .finish()
    }
}

/// Non-owning reference to a request; dead once every [`RequestContext`]
/// clone of that request has been dropped.
#[derive(Clone)]
pub struct WeakRequestContext {
    id: RequestId,
    inner: Weak<ContextInner>,
}

impl WeakRequestContext {
    pub fn id(&self) -> RequestId {
        self.id
    }

    pub fn is_alive(&self) -> bool {
        self.inner.strong_count() > 0
    }

    pub fn upgrade(&self) -> Option<RequestContext> {
        self.inner.upgrade().map(|inner| RequestContext { inner })
    }
}

/// Authenticated caller, attached to the request by an authentication filter.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Principal {
    pub username: String,
    pub roles: BTreeSet<String>,
    pub permissions: BTreeSet<String>,
}

impl Principal {
    pub fn new(username: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            ..Self::default()
        }
    }

    pub fn with_role(mut self, role: impl Into<String>) -> Self {
        self.roles.insert(role.into());
        self
    }

    pub fn with_permission(mut self, permission: impl Into<String>) -> Self {
        self.permissions.insert(permission.into());
        self
    }

    pub fn has_role(&self, role: &str) -> bool {
        self.roles.contains(role)
    }

    /// Whether the principal holds at least one of `roles`.
    pub fn has_any_role<'a>(&self, roles: impl IntoIterator<Item = &'a String>) -> bool {
        roles.into_iter().any(|role| self.roles.contains(role))
    }
}

fn parse_query_string(query: &str) -> Vec<(String, String)> {
    query
        .split('&')
        .filter(|part| !part.is_empty())
        .map(|part| {
            let (key, value) = part.split_once('=').unwrap_or((part, ""));
            (decode_component(key), decode_component(value))
        })
        .collect()
}

fn decode_component(raw: &str) -> String {
    let spaced = raw.replace('+', " ");
    urlencoding::decode(&spaced)
        .map(|decoded| decoded.into_owned())
        .unwrap_or(spaced)
}

fn parse_body(request: &HttpRequest) -> Result<serde_json::Value> {
    if request.body.is_empty() {
        return Err(Error::MalformedBody("request body is empty".to_string()));
    }

    let content_type = request.content_type();
    match content_type.as_deref() {
        None | Some("application/json") => serde_json::from_slice(&request.body)
            .map_err(|e| Error::MalformedBody(format!("invalid JSON: {}", e))),
        Some(media) if media.ends_with("+json") => serde_json::from_slice(&request.body)
            .map_err(|e| Error::MalformedBody(format!("invalid JSON: {}", e))),
        Some("application/x-www-form-urlencoded") => {
            let pairs: Vec<(String, String)> = serde_urlencoded::from_bytes(&request.body)
                .map_err(|e| Error::MalformedBody(format!("invalid form body: {}", e)))?;
            let object = pairs
                .into_iter()
                .map(|(key, value)| (key, serde_json::Value::String(value)))
                .collect();
            Ok(serde_json::Value::Object(object))
        }
        Some("text/plain") => String::from_utf8(request.body.clone())
            .map(serde_json::Value::String)
            .map_err(|e| Error::MalformedBody(format!("body is not UTF-8: {}", e))),
        Some(other) => Err(Error::MalformedBody(format!(
            "unsupported content type: {}",
            other
        ))),
    }
}
