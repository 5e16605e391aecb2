// Test HTTP client

use crate::assertions;
use jet_core::{Application, Error, HttpRequest, HttpResponse, MainApplication, Result};
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::collections::HashMap;

/// Drives an [`Application`] in-process, without opening a socket.
///
/// Requests go through the same middleware and error handler chain as
/// requests served over TCP.
#[derive(Clone)]
pub struct TestClient {
    app: Application,
}

impl TestClient {
    pub fn new(app: Application) -> Self {
        Self { app }
    }

    /// Bootstrap `main` and wrap the resulting application.
    pub fn from_main<A: MainApplication>(main: &A) -> Result<Self> {
        Ok(Self::new(Application::create(main)?))
    }

    pub fn app(&self) -> &Application {
        &self.app
    }

    pub async fn get(&self, path: &str) -> TestResponse {
        self.request(TestRequestBuilder::new("GET", path)).await
    }

    pub async fn delete(&self, path: &str) -> TestResponse {
        self.request(TestRequestBuilder::new("DELETE", path)).await
    }

    /// POST `body` as JSON.
    pub async fn post_json<T: Serialize>(&self, path: &str, body: &T) -> Result<TestResponse> {
        Ok(self
            .request(TestRequestBuilder::new("POST", path).json(body)?)
            .await)
    }

    /// PUT `body` as JSON.
    pub async fn put_json<T: Serialize>(&self, path: &str, body: &T) -> Result<TestResponse> {
        Ok(self
            .request(TestRequestBuilder::new("PUT", path).json(body)?)
            .await)
    }

    pub async fn request(&self, builder: TestRequestBuilder) -> TestResponse {
        self.send(builder.build()).await
    }

    pub async fn send(&self, request: HttpRequest) -> TestResponse {
        TestResponse::new(self.app.handle(request).await)
    }
}

/// Builder for test requests
pub struct TestRequestBuilder {
    method: String,
    path: String,
    headers: HashMap<String, String>,
    body: Vec<u8>,
    query_params: Vec<(String, String)>,
}

impl TestRequestBuilder {
    pub fn new(method: impl Into<String>, path: impl Into<String>) -> Self {
        Self {
            method: method.into(),
            path: path.into(),
            headers: HashMap::new(),
            body: Vec::new(),
            query_params: Vec::new(),
        }
    }

    pub fn header(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(key.into(), value.into());
        self
    }

    pub fn body(mut self, body: impl Into<Vec<u8>>) -> Self {
        self.body = body.into();
        self
    }

    pub fn json<T: Serialize>(mut self, data: &T) -> Result<Self> {
        self.body = serde_json::to_vec(data).map_err(|e| Error::Serialization(e.to_string()))?;
        self.headers
            .insert("Content-Type".to_string(), "application/json".to_string());
        Ok(self)
    }

    /// URL-encoded form body.
    pub fn form<T: Serialize>(mut self, data: &T) -> Result<Self> {
        let encoded =
            serde_urlencoded::to_string(data).map_err(|e| Error::Serialization(e.to_string()))?;
        self.body = encoded.into_bytes();
        self.headers.insert(
            "Content-Type".to_string(),
            "application/x-www-form-urlencoded".to_string(),
        );
        Ok(self)
    }

    /// Append a query parameter; repeated keys are kept in order.
    pub fn query(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.query_params.push((key.into(), value.into()));
        self
    }

    pub fn build(self) -> HttpRequest {
        let mut path = self.path;
        if !self.query_params.is_empty() {
            let separator = if path.contains('?') { '&' } else { '?' };
            // Encoding string pairs cannot fail.
            let query = serde_urlencoded::to_string(&self.query_params).unwrap_or_default();
            path.push(separator);
            path.push_str(&query);
        }

        let mut request = HttpRequest::new(self.method, path).with_body(self.body);
        request.headers = self.headers;
        request
    }
}

/// Response from a test request
#[derive(Debug, Clone)]
pub struct TestResponse {
    response: HttpResponse,
}

impl TestResponse {
    pub fn new(response: HttpResponse) -> Self {
        Self { response }
    }

    pub fn status(&self) -> u16 {
        self.response.status
    }

    /// Case-insensitive header lookup
    pub fn header(&self, key: &str) -> Option<&str> {
        self.response
            .headers
            .iter()
            .find(|(name, _)| name.eq_ignore_ascii_case(key))
            .map(|(_, value)| value.as_str())
    }

    pub fn body(&self) -> &[u8] {
        &self.response.body
    }

    /// Body as UTF-8, lossily.
    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.response.body).into_owned()
    }

    pub fn json<T: DeserializeOwned>(&self) -> Result<T> {
        serde_json::from_slice(&self.response.body)
            .map_err(|e| Error::Serialization(e.to_string()))
    }

    pub fn into_inner(self) -> HttpResponse {
        self.response
    }

    pub fn assert_status(&self, expected: u16) -> &Self {
        assertions::assert_status(self, expected);
        self
    }

    pub fn assert_header(&self, key: &str, expected: &str) -> &Self {
        assertions::assert_header(self, key, expected);
        self
    }

    pub fn assert_body_contains(&self, expected: &str) -> &Self {
        assertions::assert_body_contains(self, expected);
        self
    }

    pub fn assert_json<T>(&self, expected: &T) -> &Self
    where
        T: DeserializeOwned + PartialEq + std::fmt::Debug,
    {
        assertions::assert_json(self, expected);
        self
    }
}
