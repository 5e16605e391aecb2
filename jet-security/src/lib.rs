// Security for the Jet framework: request filters, password encoding and authentication

pub mod error;
pub mod filter;
pub mod manager;
pub mod password;
pub mod user;

pub use error::{BAD_CREDENTIALS, Result, SecurityError};
pub use filter::{BasicAuthenticationFilter, OncePerRequest, OncePerRequestFilter};
pub use manager::AuthenticationManager;
pub use password::{
    DefaultPasswordAdapter, HashAlgorithm, PasswordAdapter, PasswordEncoder, PasswordOptions,
};
pub use user::{User, UserDetails, UserDetailsService};
