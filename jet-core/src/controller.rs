//! Controller dispatch
//!
//! A controller declares its mapping and routes once through
//! [`Controller::declare`], names its handlers in a [`HandlerTable`], and is
//! built by the dependency registry like any other injectable. Routes become
//! live only when [`ControllerHandle::install_routes`] runs, which binds every
//! declared route to a wrapper that assembles the handler's arguments from the
//! request.

use crate::arguments::Arguments;
use crate::container::Injectable;
use crate::logging::{debug, info};
use crate::metadata::TypeKey;
use crate::route_registry::{MappingOptions, ParameterBinding, RouteRegistry};
use crate::routing::{HandlerFn, Router, join_paths};
use crate::{Error, HttpResponse, Principal, RequestContext, Result};
use futures_util::future::BoxFuture;
use std::collections::{BTreeSet, HashMap};
use std::future::Future;
use std::sync::Arc;

/// Handler bound to a controller instance.
pub type ControllerHandlerFn<C> =
    Arc<dyn Fn(Arc<C>, Arguments) -> BoxFuture<'static, Result<HttpResponse>> + Send + Sync>;

/// Handler names mapped to the code they run.
pub struct HandlerTable<C> {
    handlers: HashMap<&'static str, ControllerHandlerFn<C>>,
}

impl<C: Send + Sync + 'static> HandlerTable<C> {
    pub fn new() -> Self {
        Self {
            handlers: HashMap::new(),
        }
    }

    pub fn handler<F, Fut>(mut self, name: &'static str, handler: F) -> Self
    where
        F: Fn(Arc<C>, Arguments) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<HttpResponse>> + Send + 'static,
    {
        let handler: ControllerHandlerFn<C> = Arc::new(
            move |controller: Arc<C>, args: Arguments| -> BoxFuture<'static, Result<HttpResponse>> {
                Box::pin(handler(controller, args))
            },
        );
        self.handlers.insert(name, handler);
        self
    }

    pub fn get(&self, name: &str) -> Option<&ControllerHandlerFn<C>> {
        self.handlers.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.handlers.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.handlers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }
}

impl<C: Send + Sync + 'static> Default for HandlerTable<C> {
    fn default() -> Self {
        Self::new()
    }
}

/// A unit grouping related request handlers under one base path.
pub trait Controller: Injectable {
    /// Record the mapping, routes and parameter bindings of this controller.
    fn declare(routes: &RouteRegistry) -> Result<()>;

    /// Handlers referenced by the declared routes.
    fn handlers() -> HandlerTable<Self>;
}

/// Lifecycle of a controller instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControllerState {
    Constructed,
    RoutesInstalled,
}

/// A constructed controller and its installation state.
pub struct ControllerHandle<C: Controller> {
    instance: Arc<C>,
    state: ControllerState,
}

impl<C: Controller> ControllerHandle<C> {
    pub fn new(instance: Arc<C>) -> Self {
        Self {
            instance,
            state: ControllerState::Constructed,
        }
    }

    pub fn instance(&self) -> &Arc<C> {
        &self.instance
    }

    pub fn state(&self) -> ControllerState {
        self.state
    }

    /// Bind every declared route of `C` to this instance.
    ///
    /// Runs once; the returned table lists routes relative to the base path,
    /// in declaration order.
    pub fn install_routes(&mut self, registry: &RouteRegistry) -> Result<InstalledController> {
        let controller = TypeKey::of::<C>();
        if self.state == ControllerState::RoutesInstalled {
            return Err(Error::Configuration(format!(
                "routes of {} are already installed",
                controller.name()
            )));
        }

        let base_path = registry.get_base_path(controller)?;
        let options = registry.get_options(controller);
        let handlers = C::handlers();
        let mut router = Router::new();

        for route in registry.get_routes(controller) {
            if !options.permits(route.method) {
                return Err(Error::Configuration(format!(
                    "{} declares {} {} but only allows {:?}",
                    controller.name(),
                    route.method,
                    route.path_suffix,
                    options.allowed_methods
                )));
            }

            let handler = handlers.get(&route.handler_name).cloned().ok_or_else(|| {
                Error::Configuration(format!(
                    "{} has no handler named `{}` for {} {}",
                    controller.name(),
                    route.handler_name,
                    route.method,
                    route.path_suffix
                ))
            })?;
            let bindings = registry.get_param_bindings(controller, &route.handler_name);

            let full_path = join_paths(&base_path, &route.path_suffix);
            if options.emit_route_log {
                info!(method = %route.method, path = %full_path, handler = %route.handler_name, "[ROUTE] mapped");
            } else {
                debug!(method = %route.method, path = %full_path, handler = %route.handler_name, "[ROUTE] mapped");
            }

            let wrapped = wrap_handler(
                self.instance.clone(),
                handler,
                bindings,
                options.authorized_roles.clone(),
            );
            router.add_route(route.method, &route.path_suffix, wrapped);
        }

        self.state = ControllerState::RoutesInstalled;
        Ok(InstalledController {
            name: controller.short_name(),
            base_path,
            options,
            router,
        })
    }
}

fn wrap_handler<C: Controller>(
    instance: Arc<C>,
    handler: ControllerHandlerFn<C>,
    bindings: Vec<ParameterBinding>,
    authorized_roles: BTreeSet<String>,
) -> HandlerFn {
    let bindings = Arc::new(bindings);
    let authorized_roles = Arc::new(authorized_roles);

    Arc::new(move |ctx: RequestContext| -> BoxFuture<'static, Result<HttpResponse>> {
        let instance = instance.clone();
        let handler = handler.clone();
        let bindings = bindings.clone();
        let authorized_roles = authorized_roles.clone();

        Box::pin(async move {
            authorize(&ctx, &authorized_roles)?;
            let args = Arguments::assemble(&ctx, &bindings)?;
            handler(instance, args).await
        })
    })
}

fn authorize(ctx: &RequestContext, authorized_roles: &BTreeSet<String>) -> Result<()> {
    if authorized_roles.is_empty() {
        return Ok(());
    }

    let principal = ctx
        .get::<Principal>()
        .ok_or_else(|| Error::Unauthorized("authentication required".to_string()))?;

    if principal.has_any_role(authorized_roles.iter()) {
        Ok(())
    } else {
        Err(Error::Forbidden(format!(
            "{} lacks a role required for {} {}",
            principal.username,
            ctx.method(),
            ctx.path()
        )))
    }
}

/// A controller's live route table, ready to be mounted.
pub struct InstalledController {
    pub name: &'static str,
    pub base_path: String,
    pub options: MappingOptions,
    pub router: Router,
}

impl InstalledController {
    pub fn route_count(&self) -> usize {
        self.router.len()
    }
}

impl std::fmt::Debug for InstalledController {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InstalledController")
            .field("name", &self.name)
            .field("base_path", &self.base_path)
            .field("routes", &self.router.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::container::ResolvedFields;
    use crate::metadata::MetadataStore;
    use crate::route_registry::{HttpMethod, MappingOptions};
    use crate::HttpRequest;

    struct Empty;

    impl Injectable for Empty {
        fn construct(_: &mut ResolvedFields) -> Result<Self> {
            Ok(Empty)
        }
    }

    impl Controller for Empty {
        fn declare(routes: &RouteRegistry) -> Result<()> {
            routes.declare::<Self>("/empty", MappingOptions::new()).finish()
        }

        fn handlers() -> HandlerTable<Self> {
            HandlerTable::new()
        }
    }

    struct Admin;

    impl Injectable for Admin {
        fn construct(_: &mut ResolvedFields) -> Result<Self> {
            Ok(Admin)
        }
    }

    impl Controller for Admin {
        fn declare(routes: &RouteRegistry) -> Result<()> {
            routes
                .declare::<Self>(
                    "/admin",
                    MappingOptions::new()
                        .allow_method(HttpMethod::GET)
                        .authorize_role("ADMIN"),
                )
                .get("/stats", "stats")
                .finish()
        }

        fn handlers() -> HandlerTable<Self> {
            HandlerTable::new().handler("stats", |_this, _args| async {
                Ok(HttpResponse::text("ok"))
            })
        }
    }

    fn registry() -> RouteRegistry {
        RouteRegistry::new(Arc::new(MetadataStore::new()))
    }

    #[test]
    fn test_zero_routes_install_zero_handlers() {
        let registry = registry();
        Empty::declare(&registry).unwrap();

        let mut handle = ControllerHandle::new(Arc::new(Empty));
        let installed = handle.install_routes(&registry).unwrap();
        assert_eq!(installed.route_count(), 0);
        assert_eq!(installed.base_path, "/empty");
        assert_eq!(handle.state(), ControllerState::RoutesInstalled);
    }

    #[test]
    fn test_install_runs_once() {
        let registry = registry();
        Empty::declare(&registry).unwrap();

        let mut handle = ControllerHandle::new(Arc::new(Empty));
        handle.install_routes(&registry).unwrap();
        assert!(matches!(
            handle.install_routes(&registry),
            Err(Error::Configuration(_))
        ));
    }

    #[test]
    fn test_undeclared_controller_fails() {
        let mut handle = ControllerHandle::new(Arc::new(Empty));
        assert!(matches!(
            handle.install_routes(&registry()),
            Err(Error::Configuration(_))
        ));
        assert_eq!(handle.state(), ControllerState::Constructed);
    }

    #[test]
    fn test_missing_handler_fails() {
        let registry = registry();
        Empty::declare(&registry).unwrap();
        registry
            .record_route(TypeKey::of::<Empty>(), HttpMethod::GET, "/ghost", "ghost")
            .unwrap();

        let mut handle = ControllerHandle::new(Arc::new(Empty));
        let err = handle.install_routes(&registry).unwrap_err();
        assert!(err.to_string().contains("ghost"));
    }

    #[test]
    fn test_disallowed_method_fails() {
        let registry = registry();
        Admin::declare(&registry).unwrap();
        registry
            .record_route(TypeKey::of::<Admin>(), HttpMethod::DELETE, "/stats", "stats")
            .unwrap();

        let mut handle = ControllerHandle::new(Arc::new(Admin));
        assert!(matches!(
            handle.install_routes(&registry),
            Err(Error::Configuration(_))
        ));
    }

    #[tokio::test]
    async fn test_authorized_roles_are_enforced() {
        let registry = registry();
        Admin::declare(&registry).unwrap();
        let mut handle = ControllerHandle::new(Arc::new(Admin));
        let router = handle.install_routes(&registry).unwrap().router;

        let anonymous = RequestContext::new(HttpRequest::new("GET", "/stats"));
        assert!(matches!(
            router.route(anonymous).await,
            Err(Error::Unauthorized(_))
        ));

        let user = RequestContext::new(HttpRequest::new("GET", "/stats"));
        user.insert(Principal::new("bob").with_role("USER"));
        assert!(matches!(router.route(user).await, Err(Error::Forbidden(_))));

        let admin = RequestContext::new(HttpRequest::new("GET", "/stats"));
        admin.insert(Principal::new("alice").with_role("ADMIN"));
        assert_eq!(router.route(admin).await.unwrap().status, 200);
    }
}
