// Application bootstrapper and HTTP server

use crate::advice::{ErrorHandler, ErrorHandlerChain, error_response};
use crate::container::{DependencyRegistry, Injectable};
use crate::controller::{Controller, ControllerHandle, InstalledController};
use crate::logging::{debug, error, info};
use crate::metadata::{MetadataStore, TypeKey};
use crate::middleware::{Endpoint, Middleware, MiddlewareChain};
use crate::route_registry::RouteRegistry;
use crate::routing::Router;
use crate::{Error, HttpRequest, HttpResponse, RequestContext, Result};
use futures_util::future::BoxFuture;
use http_body_util::{BodyExt, Full};
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper::{Request, Response, StatusCode, body::Incoming as IncomingBody};
use hyper_util::rt::TokioIo;
use std::any::TypeId;
use std::collections::HashSet;
use std::future::Future;
use std::sync::Arc;
use tokio::net::{TcpListener, ToSocketAddrs};

/// Cloneable request entry point returned by [`Application::run`].
pub type RequestHandler = Arc<dyn Fn(HttpRequest) -> BoxFuture<'static, HttpResponse> + Send + Sync>;

/// Application entry point: registers controllers, services and handlers.
///
/// ```ignore
/// struct Main;
///
/// impl MainApplication for Main {
///     fn configure(&self, app: &mut ApplicationBuilder) -> Result<()> {
///         app.service::<UserService>()?;
///         app.controller::<UserController>()?;
///         app.error_handler(JsonErrors);
///         Ok(())
///     }
/// }
///
/// run_server(Main, "0.0.0.0:3000").await?;
/// ```
pub trait MainApplication {
    fn configure(&self, app: &mut ApplicationBuilder) -> Result<()>;
}

/// Single bootstrap pass collecting everything an [`Application`] serves.
pub struct ApplicationBuilder {
    store: Arc<MetadataStore>,
    routes: RouteRegistry,
    dependencies: DependencyRegistry,
    controllers: Vec<InstalledController>,
    controller_types: HashSet<TypeId>,
    error_handlers: ErrorHandlerChain,
    middleware: Vec<(String, Arc<dyn Middleware>)>,
}

impl ApplicationBuilder {
    /// Builder over a fresh metadata store.
    pub fn new() -> Self {
        Self::with_store(Arc::new(MetadataStore::new()))
    }

    /// Builder over the process-wide metadata store.
    pub fn global() -> Self {
        Self::with_store(MetadataStore::global())
    }

    pub fn with_store(store: Arc<MetadataStore>) -> Self {
        Self {
            routes: RouteRegistry::new(store.clone()),
            dependencies: DependencyRegistry::new(store.clone()),
            store,
            controllers: Vec::new(),
            controller_types: HashSet::new(),
            error_handlers: ErrorHandlerChain::new(),
            middleware: Vec::new(),
        }
    }

    pub fn routes(&self) -> &RouteRegistry {
        &self.routes
    }

    pub fn dependencies(&self) -> &DependencyRegistry {
        &self.dependencies
    }

    /// Declare, construct and install controller `C`.
    pub fn controller<C: Controller>(&mut self) -> Result<&mut Self> {
        let key = TypeKey::of::<C>();
        if !self.controller_types.insert(key.id()) {
            return Err(Error::Configuration(format!(
                "controller {} is registered twice",
                key.name()
            )));
        }

        C::declare(&self.routes)?;
        self.dependencies.declare::<C>()?;
        let instance = self.dependencies.resolve::<C>()?;

        let mut handle = ControllerHandle::new(instance);
        let installed = handle.install_routes(&self.routes)?;
        debug!(
            controller = installed.name,
            base_path = %installed.base_path,
            routes = installed.route_count(),
            "Controller constructed"
        );
        self.controllers.push(installed);
        Ok(self)
    }

    /// Declare service `T` and build its singleton now.
    pub fn service<T: Injectable>(&mut self) -> Result<Arc<T>> {
        self.dependencies.register_service::<T>()
    }

    /// Register a ready-made singleton.
    pub fn singleton<T: Send + Sync + 'static>(&mut self, value: T) -> &mut Self {
        self.dependencies.register_singleton(value);
        self
    }

    pub fn error_handler<H: ErrorHandler + 'static>(&mut self, handler: H) -> &mut Self {
        self.error_handlers.push(Arc::new(handler));
        self
    }

    /// Install a filter for every request.
    pub fn filter<M: Middleware + 'static>(&mut self, filter: M) -> &mut Self {
        self.use_middleware("*", filter)
    }

    pub fn use_middleware<M: Middleware + 'static>(&mut self, pattern: &str, middleware: M) -> &mut Self {
        let middleware: Arc<dyn Middleware> = Arc::new(middleware);
        self.middleware.push((pattern.to_string(), middleware));
        self
    }

    /// Compose the application and freeze its metadata.
    pub fn build(self) -> Result<Application> {
        let router = Self::register_controllers(self.controllers);
        let middleware = Self::register_error_handlers(self.error_handlers, self.middleware);

        self.store.freeze();
        info!(
            routes = router.len(),
            middleware = middleware.len(),
            "Application bootstrap complete"
        );

        Ok(Application {
            inner: Arc::new(ApplicationInner {
                router,
                middleware,
                dependencies: self.dependencies,
                routes: self.routes,
            }),
        })
    }

    fn register_controllers(controllers: Vec<InstalledController>) -> Router {
        let mut router = Router::new();
        for installed in controllers {
            info!(
                controller = installed.name,
                base_path = %installed.base_path,
                routes = installed.route_count(),
                "Registered controller"
            );
            router.mount(&installed.base_path, installed.router);
        }
        router
    }

    fn register_error_handlers(
        error_handlers: ErrorHandlerChain,
        middleware: Vec<(String, Arc<dyn Middleware>)>,
    ) -> MiddlewareChain {
        debug!(handlers = error_handlers.len(), "Registering error handlers");
        let mut chain = MiddlewareChain::new();
        chain.use_middleware("*", Arc::new(error_handlers));
        for (pattern, layer) in middleware {
            chain.use_middleware(&pattern, layer);
        }
        chain
    }
}

impl Default for ApplicationBuilder {
    fn default() -> Self {
        Self::new()
    }
}

struct ApplicationInner {
    router: Router,
    middleware: MiddlewareChain,
    dependencies: DependencyRegistry,
    routes: RouteRegistry,
}

/// A bootstrapped application.
#[derive(Clone)]
pub struct Application {
    inner: Arc<ApplicationInner>,
}

impl Application {
    pub fn builder() -> ApplicationBuilder {
        ApplicationBuilder::new()
    }

    /// Build an application from its entry point.
    pub fn create<A: MainApplication>(main: &A) -> Result<Self> {
        info!("Bootstrapping Jet application");
        let mut builder = ApplicationBuilder::new();
        main.configure(&mut builder)?;
        builder.build()
    }

    pub fn router(&self) -> &Router {
        &self.inner.router
    }

    pub fn dependencies(&self) -> &DependencyRegistry {
        &self.inner.dependencies
    }

    pub fn routes(&self) -> &RouteRegistry {
        &self.inner.routes
    }

    /// Serve one request through filters, middleware and the router.
    ///
    /// Never fails: errors that no handler turns into a response become the
    /// generic failure response.
    pub async fn handle(&self, request: HttpRequest) -> HttpResponse {
        let ctx = RequestContext::new(request);
        let app = self.inner.clone();
        let endpoint: Endpoint = Arc::new(move |ctx: RequestContext| -> BoxFuture<'static, Result<HttpResponse>> {
            let app = app.clone();
            Box::pin(async move { app.router.route(ctx).await })
        });

        match self.inner.middleware.apply(ctx, endpoint).await {
            Ok(response) => response,
            Err(err) => error_response(&err),
        }
    }

    /// Cloneable entry point over [`Application::handle`].
    pub fn run(&self) -> RequestHandler {
        let app = self.clone();
        Arc::new(move |request: HttpRequest| -> BoxFuture<'static, HttpResponse> {
            let app = app.clone();
            Box::pin(async move { app.handle(request).await })
        })
    }

    /// Serve over HTTP/1.1 until the process exits.
    pub async fn listen(self, addr: impl ToSocketAddrs) -> Result<()> {
        let listener = TcpListener::bind(addr).await?;
        self.serve(listener, std::future::pending()).await
    }

    /// Serve connections from `listener` until `shutdown` resolves.
    pub async fn serve<F>(self, listener: TcpListener, shutdown: F) -> Result<()>
    where
        F: Future<Output = ()> + Send,
    {
        info!(addr = %listener.local_addr()?, "Server listening");
        tokio::pin!(shutdown);

        loop {
            let (stream, peer) = tokio::select! {
                accepted = listener.accept() => accepted?,
                _ = &mut shutdown => {
                    info!("Server shutting down");
                    return Ok(());
                }
            };
            let io = TokioIo::new(stream);
            let app = self.clone();

            tokio::spawn(async move {
                let service = service_fn(move |req: Request<IncomingBody>| {
                    let app = app.clone();
                    async move { handle_request(req, app).await }
                });

                if let Err(err) = http1::Builder::new().serve_connection(io, service).await {
                    error!(peer = %peer, error = %err, "Error serving connection");
                }
            });
        }
    }
}

/// Bootstrap `main` and serve it on `addr`.
pub async fn run_server<A: MainApplication>(main: A, addr: impl ToSocketAddrs) -> Result<()> {
    Application::create(&main)?.listen(addr).await
}

async fn handle_request(
    req: Request<IncomingBody>,
    app: Application,
) -> std::result::Result<Response<Full<bytes::Bytes>>, hyper::Error> {
    let method = req.method().to_string();
    let target = req
        .uri()
        .path_and_query()
        .map(|pq| pq.as_str().to_string())
        .unwrap_or_else(|| req.uri().path().to_string());

    let mut request = HttpRequest::new(method, target);
    for (name, value) in req.headers() {
        if let Ok(value) = value.to_str() {
            request.headers.insert(name.to_string(), value.to_string());
        }
    }

    request.body = req.collect().await?.to_bytes().to_vec();

    let response = app.handle(request).await;

    let mut builder = Response::builder().status(response.status);
    for (key, value) in response.headers {
        builder = builder.header(key, value);
    }

    Ok(builder
        .body(Full::new(bytes::Bytes::from(response.body)))
        .unwrap_or_else(|err| {
            error!(error = %err, "Handler produced an invalid response");
            let mut fallback = Response::new(Full::new(bytes::Bytes::new()));
            *fallback.status_mut() = StatusCode::INTERNAL_SERVER_ERROR;
            fallback
        }))
}
