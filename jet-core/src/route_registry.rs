//! Route descriptor registry
//!
//! Records, per controller type, the base path and mapping options, the
//! ordered route table and the parameter bindings of every handler. Data is
//! kept in the [`MetadataStore`] so declarations and route installation can
//! happen at different points of the bootstrap.

use crate::logging::{debug, trace, warn};
use crate::metadata::{MetadataKey, MetadataStore, Scope, TypeKey};
use crate::{Error, Result};
use std::collections::BTreeSet;
use std::fmt;
use std::marker::PhantomData;
use std::sync::Arc;

/// HTTP methods a route can be declared for.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum HttpMethod {
    GET,
    POST,
    PUT,
    DELETE,
    PATCH,
    HEAD,
    OPTIONS,
    /// Matches every method.
    ANY,
}

impl HttpMethod {
    #[allow(clippy::should_implement_trait)]
    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_uppercase().as_str() {
            "GET" => Some(HttpMethod::GET),
            "POST" => Some(HttpMethod::POST),
            "PUT" => Some(HttpMethod::PUT),
            "DELETE" => Some(HttpMethod::DELETE),
            "PATCH" => Some(HttpMethod::PATCH),
            "HEAD" => Some(HttpMethod::HEAD),
            "OPTIONS" => Some(HttpMethod::OPTIONS),
            "ANY" | "ALL" => Some(HttpMethod::ANY),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            HttpMethod::GET => "GET",
            HttpMethod::POST => "POST",
            HttpMethod::PUT => "PUT",
            HttpMethod::DELETE => "DELETE",
            HttpMethod::PATCH => "PATCH",
            HttpMethod::HEAD => "HEAD",
            HttpMethod::OPTIONS => "OPTIONS",
            HttpMethod::ANY => "ANY",
        }
    }

    /// Whether a route declared with `self` accepts a request using `method`.
    pub fn accepts(&self, method: &str) -> bool {
        *self == HttpMethod::ANY || self.as_str().eq_ignore_ascii_case(method)
    }
}

impl fmt::Display for HttpMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One declared route of a controller.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RouteDescriptor {
    pub method: HttpMethod,
    pub path_suffix: String,
    pub handler_name: String,
}

/// Where a handler argument comes from.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ParameterSource {
    Context,
    Body,
    PathParam,
    Query,
}

impl ParameterSource {
    pub fn requires_key(&self) -> bool {
        matches!(self, ParameterSource::PathParam | ParameterSource::Query)
    }
}

/// Rule for extracting one handler argument from the request.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ParameterBinding {
    pub argument_index: usize,
    pub source: ParameterSource,
    pub key: Option<String>,
}

impl ParameterBinding {
    pub fn context(argument_index: usize) -> Self {
        Self {
            argument_index,
            source: ParameterSource::Context,
            key: None,
        }
    }

    pub fn body(argument_index: usize) -> Self {
        Self {
            argument_index,
            source: ParameterSource::Body,
            key: None,
        }
    }

    pub fn path(argument_index: usize, key: impl Into<String>) -> Self {
        Self {
            argument_index,
            source: ParameterSource::PathParam,
            key: Some(key.into()),
        }
    }

    pub fn query(argument_index: usize, key: impl Into<String>) -> Self {
        Self {
            argument_index,
            source: ParameterSource::Query,
            key: Some(key.into()),
        }
    }

    fn validate(&self) -> Result<()> {
        match (&self.key, self.source.requires_key()) {
            (None, true) => Err(Error::Configuration(format!(
                "{:?} binding at argument {} needs a key",
                self.source, self.argument_index
            ))),
            (Some(key), true) if key.is_empty() => Err(Error::Configuration(format!(
                "{:?} binding at argument {} has an empty key",
                self.source, self.argument_index
            ))),
            _ => Ok(()),
        }
    }
}

/// Per-controller options declared alongside the base path.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct MappingOptions {
    pub emit_route_log: bool,
    pub allowed_methods: BTreeSet<String>,
    pub authorized_roles: BTreeSet<String>,
}

impl MappingOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn emit_route_log(mut self, enable: bool) -> Self {
        self.emit_route_log = enable;
        self
    }

    pub fn allow_method(mut self, method: HttpMethod) -> Self {
        self.allowed_methods.insert(method.as_str().to_string());
        self
    }

    pub fn authorize_role(mut self, role: impl Into<String>) -> Self {
        self.authorized_roles.insert(role.into());
        self
    }

    /// Whether routes declared with `method` may be installed.
    pub fn permits(&self, method: HttpMethod) -> bool {
        self.allowed_methods.is_empty()
            || self
                .allowed_methods
                .iter()
                .any(|allowed| allowed.eq_ignore_ascii_case(method.as_str()))
    }
}

/// Base path and options of one controller type.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ControllerMapping {
    pub base_path: String,
    pub options: MappingOptions,
}

/// Handle over a [`MetadataStore`] exposing route-level declarations.
#[derive(Clone)]
pub struct RouteRegistry {
    store: Arc<MetadataStore>,
}

impl RouteRegistry {
    pub fn new(store: Arc<MetadataStore>) -> Self {
        Self { store }
    }

    pub fn store(&self) -> &Arc<MetadataStore> {
        &self.store
    }

    /// Append a route; identical routes are kept twice.
    pub fn record_route(
        &self,
        controller: TypeKey,
        method: HttpMethod,
        path_suffix: impl Into<String>,
        handler_name: impl Into<String>,
    ) -> Result<()> {
        let descriptor = RouteDescriptor {
            method,
            path_suffix: path_suffix.into(),
            handler_name: handler_name.into(),
        };

        let mut duplicate = false;
        self.store.update(
            MetadataKey::Routes,
            Scope::Type(controller),
            Vec::new(),
            |routes: &mut Vec<RouteDescriptor>| {
                duplicate = routes.contains(&descriptor);
                routes.push(descriptor.clone());
            },
        )?;

        if duplicate {
            warn!(
                controller = controller.name(),
                method = %descriptor.method,
                path = %descriptor.path_suffix,
                handler = %descriptor.handler_name,
                "Route declared twice; it will be installed twice"
            );
        } else {
            trace!(
                controller = controller.name(),
                method = %descriptor.method,
                path = %descriptor.path_suffix,
                handler = %descriptor.handler_name,
                "Recorded route"
            );
        }
        Ok(())
    }

    /// Set the controller mapping; a second call replaces the first.
    pub fn record_base_path(
        &self,
        controller: TypeKey,
        base_path: impl Into<String>,
        options: MappingOptions,
    ) -> Result<()> {
        let scope = Scope::Type(controller);
        let base_path = base_path.into();

        if let Some(previous) = self
            .store
            .get_opt::<ControllerMapping>(MetadataKey::BasePath, &scope)
        {
            warn!(
                controller = controller.name(),
                previous = %previous.base_path,
                base_path = %base_path,
                "Controller mapping declared twice; last declaration wins"
            );
        }

        debug!(controller = controller.name(), base_path = %base_path, "Recorded controller mapping");
        self.store.define(
            MetadataKey::BasePath,
            scope,
            ControllerMapping { base_path, options },
        )
    }

    /// Add a binding for `handler_name`; a binding at an existing argument
    /// index replaces the earlier one.
    pub fn record_param_binding(
        &self,
        controller: TypeKey,
        handler_name: &str,
        binding: ParameterBinding,
    ) -> Result<()> {
        binding.validate()?;

        let mut replaced = false;
        self.store.update(
            MetadataKey::ParamBindings,
            Scope::member(controller, handler_name.to_string()),
            Vec::new(),
            |bindings: &mut Vec<ParameterBinding>| {
                if let Some(existing) = bindings
                    .iter_mut()
                    .find(|b| b.argument_index == binding.argument_index)
                {
                    *existing = binding.clone();
                    replaced = true;
                } else {
                    bindings.push(binding.clone());
                }
            },
        )?;

        if replaced {
            warn!(
                controller = controller.name(),
                handler = handler_name,
                argument = binding.argument_index,
                "Argument bound twice; last binding wins"
            );
        }
        Ok(())
    }

    /// Routes in declaration order.
    pub fn get_routes(&self, controller: TypeKey) -> Vec<RouteDescriptor> {
        self.store
            .get(MetadataKey::Routes, &Scope::Type(controller), Vec::new())
    }

    pub fn get_mapping(&self, controller: TypeKey) -> Option<ControllerMapping> {
        self.store
            .get_opt(MetadataKey::BasePath, &Scope::Type(controller))
    }

    /// Base path of a declared controller; undeclared controllers are a
    /// configuration error.
    pub fn get_base_path(&self, controller: TypeKey) -> Result<String> {
        self.get_mapping(controller)
            .map(|mapping| mapping.base_path)
            .ok_or_else(|| {
                Error::Configuration(format!(
                    "{} has no base path; declare it before installing routes",
                    controller.name()
                ))
            })
    }

    pub fn get_options(&self, controller: TypeKey) -> MappingOptions {
        self.get_mapping(controller)
            .map(|mapping| mapping.options)
            .unwrap_or_default()
    }

    pub fn get_param_bindings(
        &self,
        controller: TypeKey,
        handler_name: &str,
    ) -> Vec<ParameterBinding> {
        self.store.get(
            MetadataKey::ParamBindings,
            &Scope::member(controller, handler_name.to_string()),
            Vec::new(),
        )
    }

    /// Start a fluent declaration for controller `C`.
    pub fn declare<C: 'static>(
        &self,
        base_path: impl Into<String>,
        options: MappingOptions,
    ) -> ControllerDeclaration<'_, C> {
        let controller = TypeKey::of::<C>();
        let error = self
            .record_base_path(controller, base_path, options)
            .err();
        ControllerDeclaration {
            registry: self,
            controller,
            error,
            _marker: PhantomData,
        }
    }
}

/// Fluent declaration of a controller's routes and bindings.
///
/// Records eagerly; the first failure is kept and reported by
/// [`ControllerDeclaration::finish`].
#[must_use = "call finish() to surface declaration errors"]
pub struct ControllerDeclaration<'a, C> {
    registry: &'a RouteRegistry,
    controller: TypeKey,
    error: Option<Error>,
    _marker: PhantomData<fn() -> C>,
}

impl<C> ControllerDeclaration<'_, C> {
    pub fn route(mut self, method: HttpMethod, path: &str, handler_name: &str) -> Self {
        if self.error.is_none() {
            self.error = self
                .registry
                .record_route(self.controller, method, path, handler_name)
                .err();
        }
        self
    }

    pub fn get(self, path: &str, handler_name: &str) -> Self {
        self.route(HttpMethod::GET, path, handler_name)
    }

    pub fn post(self, path: &str, handler_name: &str) -> Self {
        self.route(HttpMethod::POST, path, handler_name)
    }

    pub fn put(self, path: &str, handler_name: &str) -> Self {
        self.route(HttpMethod::PUT, path, handler_name)
    }

    pub fn delete(self, path: &str, handler_name: &str) -> Self {
        self.route(HttpMethod::DELETE, path, handler_name)
    }

    pub fn patch(self, path: &str, handler_name: &str) -> Self {
        self.route(HttpMethod::PATCH, path, handler_name)
    }

    pub fn options(self, path: &str, handler_name: &str) -> Self {
        self.route(HttpMethod::OPTIONS, path, handler_name)
    }

    pub fn any(self, path: &str, handler_name: &str) -> Self {
        self.route(HttpMethod::ANY, path, handler_name)
    }

    pub fn bind(mut self, handler_name: &str, binding: ParameterBinding) -> Self {
        if self.error.is_none() {
            self.error = self
                .registry
                .record_param_binding(self.controller, handler_name, binding)
                .err();
        }
        self
    }

    pub fn finish(self) -> Result<()> {
        match self.error {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct UsersController;
    struct Undeclared;

    fn registry() -> RouteRegistry {
        RouteRegistry::new(Arc::new(MetadataStore::new()))
    }

    #[test]
    fn test_routes_keep_declaration_order() {
        let registry = registry();
        registry
            .declare::<UsersController>("/users", MappingOptions::new())
            .get("/:id", "find_one")
            .get("", "find_all")
            .post("", "create")
            .finish()
            .unwrap();

        let routes = registry.get_routes(TypeKey::of::<UsersController>());
        let handlers: Vec<_> = routes.iter().map(|r| r.handler_name.as_str()).collect();
        assert_eq!(handlers, vec!["find_one", "find_all", "create"]);
        assert_eq!(routes[0].method, HttpMethod::GET);
        assert_eq!(routes[2].method, HttpMethod::POST);
    }

    #[test]
    fn test_duplicate_routes_are_not_deduplicated() {
        let registry = registry();
        let key = TypeKey::of::<UsersController>();
        registry.record_route(key, HttpMethod::GET, "/", "list").unwrap();
        registry.record_route(key, HttpMethod::GET, "/", "list").unwrap();
        assert_eq!(registry.get_routes(key).len(), 2);
    }

    #[test]
    fn test_base_path_last_write_wins() {
        let registry = registry();
        let key = TypeKey::of::<UsersController>();
        registry
            .record_base_path(key, "/v1/users", MappingOptions::new())
            .unwrap();
        registry
            .record_base_path(key, "/v2/users", MappingOptions::new().emit_route_log(true))
            .unwrap();

        assert_eq!(registry.get_base_path(key).unwrap(), "/v2/users");
        assert!(registry.get_options(key).emit_route_log);
    }

    #[test]
    fn test_undeclared_controller() {
        let registry = registry();
        let key = TypeKey::of::<Undeclared>();
        assert!(matches!(
            registry.get_base_path(key),
            Err(Error::Configuration(_))
        ));
        assert!(registry.get_routes(key).is_empty());
        assert_eq!(registry.get_options(key), MappingOptions::default());
        assert!(registry.get_param_bindings(key, "anything").is_empty());
    }

    #[test]
    fn test_bindings_are_keyed_by_argument_index() {
        let registry = registry();
        let key = TypeKey::of::<UsersController>();
        registry
            .record_param_binding(key, "update", ParameterBinding::path(0, "id"))
            .unwrap();
        registry
            .record_param_binding(key, "update", ParameterBinding::body(3))
            .unwrap();
        registry
            .record_param_binding(key, "update", ParameterBinding::path(0, "user_id"))
            .unwrap();

        let bindings = registry.get_param_bindings(key, "update");
        assert_eq!(bindings.len(), 2);
        assert!(bindings.contains(&ParameterBinding::path(0, "user_id")));
        assert!(bindings.contains(&ParameterBinding::body(3)));
        assert!(registry.get_param_bindings(key, "create").is_empty());
    }

    #[test]
    fn test_keyed_sources_require_key() {
        let registry = registry();
        let key = TypeKey::of::<UsersController>();
        let keyless = ParameterBinding {
            argument_index: 0,
            source: ParameterSource::Query,
            key: None,
        };
        assert!(matches!(
            registry.record_param_binding(key, "search", keyless),
            Err(Error::Configuration(_))
        ));

        let result = registry
            .declare::<UsersController>("/users", MappingOptions::new())
            .bind("search", ParameterBinding::query(0, ""))
            .get("/search", "search")
            .finish();
        assert!(result.is_err());
        // Recording stops at the first failure.
        assert!(registry.get_routes(key).is_empty());
    }

    #[test]
    fn test_mapping_options_permits() {
        let open = MappingOptions::new();
        assert!(open.permits(HttpMethod::DELETE));

        let read_only = MappingOptions::new().allow_method(HttpMethod::GET);
        assert!(read_only.permits(HttpMethod::GET));
        assert!(!read_only.permits(HttpMethod::POST));
        assert!(!read_only.permits(HttpMethod::ANY));
    }

    #[test]
    fn test_method_accepts() {
        assert!(HttpMethod::GET.accepts("get"));
        assert!(!HttpMethod::GET.accepts("POST"));
        assert!(HttpMethod::ANY.accepts("DELETE"));
        assert_eq!(HttpMethod::from_str("all"), Some(HttpMethod::ANY));
        assert_eq!(HttpMethod::from_str("TRACE"), None);
    }
}
