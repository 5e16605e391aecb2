// Jet - a metadata-driven HTTP framework for Rust
//
// Controllers declare their routes and parameter bindings up front, services
// are wired through a dependency registry, and every request runs through
// filters and a global error handler chain.

// Re-export core functionality
pub use jet_core::*;

// Re-export optional crates
#[cfg(feature = "security")]
pub use jet_security;

#[cfg(feature = "config")]
pub use jet_config;

#[cfg(feature = "testing")]
pub use jet_testing;

// Prelude for common imports
pub mod prelude {
    pub use crate::{
        Application,
        ApplicationBuilder,
        Arguments,
        Controller,
        Error,
        ErrorHandler,
        HandlerTable,
        HttpMethod,
        HttpRequest,
        HttpResponse,
        Injectable,
        InjectableField,
        Json,
        MainApplication,
        MappingOptions,
        Middleware,
        Next,
        ParameterBinding,
        Principal,
        RequestContext,
        ResolvedFields,
        Result,
        RouteRegistry,
        run_server,
    };

    pub use async_trait::async_trait;
    pub use std::sync::Arc;

    #[cfg(feature = "security")]
    pub use jet_security::{
        AuthenticationManager, BasicAuthenticationFilter, PasswordEncoder, PasswordOptions,
        UserDetails, UserDetailsService,
    };

    #[cfg(feature = "config")]
    pub use jet_config::{ApplicationConfig, ConfigBuilder};
}
