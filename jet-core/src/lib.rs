// Core library for the Jet framework
// Metadata-driven routing, dependency injection and the request pipeline

pub mod advice;
pub mod application;
pub mod arguments;
pub mod container;
pub mod context;
pub mod controller;
pub mod error;
pub mod http;
pub mod logging;
pub mod metadata;
pub mod middleware;
pub mod route_registry;
pub mod routing;

// Re-export commonly used types
pub use advice::{ErrorHandler, ErrorHandlerChain, error_response};
pub use application::*;
pub use arguments::{Argument, Arguments};
pub use container::*;
pub use context::{Principal, RequestContext, RequestId, WeakRequestContext};
pub use controller::*;
pub use error::*;
pub use crate::http::*;
pub use metadata::{MetadataKey, MetadataStore, Scope, TypeKey};
pub use middleware::*;
pub use route_registry::*;
pub use routing::{HandlerFn, Route, Router, join_paths};
