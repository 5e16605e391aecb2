// Test assertions for HTTP responses

use crate::TestResponse;
use serde::de::DeserializeOwned;
use std::fmt::Debug;

/// Assert that a response has a specific status code
pub fn assert_status(response: &TestResponse, expected: u16) {
    let actual = response.status();
    assert_eq!(
        actual,
        expected,
        "Expected status {}, got {}. Body: {}",
        expected,
        actual,
        response.text()
    );
}

/// Assert that the response body deserializes to `expected`
pub fn assert_json<T>(response: &TestResponse, expected: &T)
where
    T: DeserializeOwned + PartialEq + Debug,
{
    let actual: T = match response.json() {
        Ok(actual) => actual,
        Err(e) => panic!("Failed to deserialize response body: {}. Body: {}", e, response.text()),
    };
    assert_eq!(actual, *expected, "JSON bodies do not match");
}

/// Assert that a response has a specific header
pub fn assert_header(response: &TestResponse, key: &str, expected: &str) {
    let actual = response.header(key);
    assert_eq!(
        actual,
        Some(expected),
        "Expected header '{}' to be '{}', got {:?}",
        key,
        expected,
        actual
    );
}

/// Assert that a response body contains a string
pub fn assert_body_contains(response: &TestResponse, expected: &str) {
    let body = response.text();
    assert!(
        body.contains(expected),
        "Expected body to contain '{}', but it didn't. Body: {}",
        expected,
        body
    );
}

/// Assert that a response is successful (2xx status)
pub fn assert_success(response: &TestResponse) {
    let status = response.status();
    assert!(
        (200..300).contains(&status),
        "Expected successful status (2xx), got {}",
        status
    );
}

/// Assert that a response is a client error (4xx status)
pub fn assert_client_error(response: &TestResponse) {
    let status = response.status();
    assert!(
        (400..500).contains(&status),
        "Expected client error status (4xx), got {}",
        status
    );
}

/// Assert that a response is a server error (5xx status)
pub fn assert_server_error(response: &TestResponse) {
    let status = response.status();
    assert!(
        (500..600).contains(&status),
        "Expected server error status (5xx), got {}",
        status
    );
}

/// Assert that the body is the framework's generic error payload for `status`
pub fn assert_error_body(response: &TestResponse, status: u16) {
    assert_status(response, status);
    let body: serde_json::Value = match response.json() {
        Ok(body) => body,
        Err(e) => panic!("Error body is not JSON: {}. Body: {}", e, response.text()),
    };
    assert_eq!(body["status"], status, "Unexpected error payload: {}", body);
    assert!(body["error"].is_string(), "Unexpected error payload: {}", body);
}

#[cfg(test)]
mod tests {
    use super::*;
    use jet_core::{Error, HttpResponse, error_response};

    fn ok_json() -> TestResponse {
        TestResponse::new(
            HttpResponse::ok()
                .with_header("Content-Type", "application/json")
                .with_body(br#"{"status":"ok"}"#.to_vec()),
        )
    }

    #[test]
    fn test_passing_assertions() {
        let response = ok_json();
        assert_status(&response, 200);
        assert_success(&response);
        assert_header(&response, "Content-Type", "application/json");
        assert_body_contains(&response, "ok");
        assert_json(&response, &serde_json::json!({"status": "ok"}));
    }

    #[test]
    fn test_error_payload() {
        let response = TestResponse::new(error_response(&Error::Forbidden("no".into())));
        assert_client_error(&response);
        assert_error_body(&response, 403);

        let response = TestResponse::new(error_response(&Error::Internal("boom".into())));
        assert_server_error(&response);
    }

    #[test]
    #[should_panic(expected = "Expected status 404, got 200")]
    fn test_status_mismatch_panics() {
        assert_status(&ok_json(), 404);
    }
}
