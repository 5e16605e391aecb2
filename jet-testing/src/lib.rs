//! Testing utilities for Jet applications.
//!
//! [`TestClient`] sends requests straight into an [`Application`], so tests
//! exercise routing, filters and error handlers without binding a port.
//!
//! ```no_run
//! use jet_core::MainApplication;
//! use jet_testing::TestClient;
//!
//! # async fn demo<A: MainApplication>(main: A) -> jet_core::Result<()> {
//! let client = TestClient::from_main(&main)?;
//!
//! client
//!     .get("/health")
//!     .await
//!     .assert_status(200)
//!     .assert_body_contains("ok");
//!
//! let created = client
//!     .post_json("/users", &serde_json::json!({"name": "Ada"}))
//!     .await?;
//! created.assert_status(201);
//! # Ok(())
//! # }
//! ```
//!
//! [`Application`]: jet_core::Application

pub mod assertions;
pub mod test_client;

pub use assertions::*;
pub use test_client::{TestClient, TestRequestBuilder, TestResponse};
