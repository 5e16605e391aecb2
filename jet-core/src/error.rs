// Error types for the Jet framework

use http::StatusCode;
use thiserror::Error;

/// Errors raised while bootstrapping or serving a Jet application.
///
/// Bootstrap errors (`Configuration`, `DependencyResolution`) abort startup.
/// Everything else is per-request and is translated into a response by the
/// global error handler chain.
#[derive(Error, Debug)]
pub enum Error {
    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Dependency resolution error: {0}")]
    DependencyResolution(String),

    #[error("Malformed request body: {0}")]
    MalformedBody(String),

    #[error("Route not found: {0}")]
    RouteNotFound(String),

    #[error("Method not allowed: {0}")]
    MethodNotAllowed(String),

    #[error("Bad Request: {0}")]
    BadRequest(String),

    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    #[error("Forbidden: {0}")]
    Forbidden(String),

    #[error("Not Found: {0}")]
    NotFound(String),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Internal server error: {0}")]
    Internal(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("HTTP transport error: {0}")]
    Hyper(#[from] hyper::Error),
}

impl Error {
    /// Get the HTTP status code for this error
    pub fn status_code(&self) -> StatusCode {
        match self {
            Error::MalformedBody(_) | Error::BadRequest(_) => StatusCode::BAD_REQUEST,
            Error::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            Error::Forbidden(_) => StatusCode::FORBIDDEN,
            Error::RouteNotFound(_) | Error::NotFound(_) => StatusCode::NOT_FOUND,
            Error::MethodNotAllowed(_) => StatusCode::METHOD_NOT_ALLOWED,
            Error::Configuration(_)
            | Error::DependencyResolution(_)
            | Error::Serialization(_)
            | Error::Internal(_)
            | Error::Io(_)
            | Error::Hyper(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Check if this is a client error (4xx)
    pub fn is_client_error(&self) -> bool {
        self.status_code().is_client_error()
    }

    /// Check if this is a server error (5xx)
    pub fn is_server_error(&self) -> bool {
        self.status_code().is_server_error()
    }

    /// Bootstrap errors must stop the application from starting.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            Error::Configuration(_) | Error::DependencyResolution(_)
        )
    }
}

pub type Result<T> = std::result::Result<T, Error>;
