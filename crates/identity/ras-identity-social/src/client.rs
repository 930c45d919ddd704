//! HTTP round trips to provider endpoints.

use crate::error::{SocialAuthError, SocialAuthResult};
use reqwest::header::{AUTHORIZATION, CONTENT_TYPE};
use reqwest::{Client, Response, StatusCode};
use serde_json::{Map, Value};
use std::time::Duration;
use tracing::{debug, error};

/// Raw file downloaded from a provider, e.g. an avatar.
#[derive(Debug, Clone)]
pub struct FetchedFile {
    pub status: StatusCode,
    pub content_type: Option<String>,
    pub content: Vec<u8>,
}

/// Shared HTTP client with a bounded timeout for every provider call.
#[derive(Debug, Clone)]
pub struct ProviderClient {
    http: Client,
    timeout: Duration,
}

impl ProviderClient {
    pub fn new(timeout_seconds: u64) -> SocialAuthResult<Self> {
        let timeout = Duration::from_secs(timeout_seconds);
        let http = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| SocialAuthError::Configuration(format!("Failed to create HTTP client: {e}")))?;

        Ok(Self { http, timeout })
    }

    /// Form-encoded POST expecting a JSON object back.
    pub async fn post_form(&self, url: &str, form: &[(&str, &str)]) -> SocialAuthResult<Map<String, Value>> {
        let response = self
            .http
            .post(url)
            .form(form)
            .send()
            .await
            .map_err(|e| self.transport_error(url, e))?;

        self.json_object(url, response).await
    }

    /// GET expecting a JSON object back.
    pub async fn get_json(
        &self,
        url: &str,
        authorization: Option<&str>,
    ) -> SocialAuthResult<Map<String, Value>> {
        let mut request = self.http.get(url);
        if let Some(value) = authorization {
            request = request.header(AUTHORIZATION, value);
        }

        let response = request
            .send()
            .await
            .map_err(|e| self.transport_error(url, e))?;

        self.json_object(url, response).await
    }

    /// GET returning the raw body whatever the status.
    pub async fn get_bytes(&self, url: &str) -> SocialAuthResult<FetchedFile> {
        let response = self
            .http
            .get(url)
            .send()
            .await
            .map_err(|e| self.transport_error(url, e))?;

        let status = response.status();
        let content_type = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(String::from);
        let content = response
            .bytes()
            .await
            .map_err(|e| self.transport_error(url, e))?
            .to_vec();

        debug!("Fetched {} bytes from {}", content.len(), url);
        Ok(FetchedFile {
            status,
            content_type,
            content,
        })
    }

    /// Provider error payloads often come with 4xx statuses, so the body is
    /// parsed before the status is considered.
    async fn json_object(&self, url: &str, response: Response) -> SocialAuthResult<Map<String, Value>> {
        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| self.transport_error(url, e))?;

        let object = match serde_json::from_str::<Value>(&body) {
            Ok(Value::Object(object)) => object,
            _ => {
                error!("Unexpected response from {} (status {})", url, status);
                return Err(SocialAuthError::Transport(format!(
                    "{url} returned a non JSON object response (status {status})"
                )));
            }
        };

        if !status.is_success() && !object.contains_key("error") {
            return Err(SocialAuthError::Transport(format!(
                "{url} returned status {status}"
            )));
        }

        Ok(object)
    }

    fn transport_error(&self, url: &str, err: reqwest::Error) -> SocialAuthError {
        if err.is_timeout() {
            SocialAuthError::Transport(format!(
                "request to {url} timed out after {}s",
                self.timeout.as_secs()
            ))
        } else {
            SocialAuthError::Transport(format!("request to {url} failed: {err}"))
        }
    }
}

/// Text of a provider error payload: every value joined by a space.
pub fn error_message(body: &Map<String, Value>) -> String {
    body.values()
        .map(|value| match value {
            Value::String(s) => s.clone(),
            other => other.to_string(),
        })
        .collect::<Vec<_>>()
        .join(" ")
}

/// `Some(message)` when `body` is a provider error payload.
pub fn provider_error(body: &Map<String, Value>) -> Option<String> {
    match body.get("error") {
        None | Some(Value::Null) | Some(Value::Bool(false)) => None,
        Some(Value::String(s)) if s.is_empty() => None,
        Some(_) => Some(error_message(body)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use wiremock::matchers::{header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[test]
    fn test_error_message_joins_values_in_order() {
        let body = json!({
            "error": "unsupported_grant_type",
            "error_description": "Invalid grant_type: ",
            "code": 400
        });
        let body = body.as_object().unwrap();

        assert_eq!(
            provider_error(body).as_deref(),
            Some("unsupported_grant_type Invalid grant_type:  400")
        );
    }

    #[test]
    fn test_falsy_error_field_is_ignored() {
        let body = json!({ "error": null, "access_token": "tok" });
        assert_eq!(provider_error(body.as_object().unwrap()), None);
    }

    #[tokio::test]
    async fn test_error_payload_with_bad_status_is_returned() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/token"))
            .respond_with(ResponseTemplate::new(400).set_body_json(json!({
                "error": "invalid_grant",
                "error_description": "Bad Request"
            })))
            .mount(&server)
            .await;

        let client = ProviderClient::new(5).unwrap();
        let body = client
            .post_form(&format!("{}/token", server.uri()), &[("code", "abc")])
            .await
            .unwrap();
        assert_eq!(body["error"], "invalid_grant");
    }

    #[tokio::test]
    async fn test_non_json_response_is_a_transport_error() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/me"))
            .and(header("Authorization", "Bearer tok"))
            .respond_with(ResponseTemplate::new(502).set_body_string("<html>bad gateway</html>"))
            .mount(&server)
            .await;

        let client = ProviderClient::new(5).unwrap();
        let result = client
            .get_json(&format!("{}/me", server.uri()), Some("Bearer tok"))
            .await;
        assert!(matches!(result, Err(SocialAuthError::Transport(_))));
    }

    #[tokio::test]
    async fn test_timeout_is_a_transport_error() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/slow"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(json!({}))
                    .set_delay(Duration::from_secs(3)),
            )
            .mount(&server)
            .await;

        let client = ProviderClient::new(1).unwrap();
        let result = client.get_json(&format!("{}/slow", server.uri()), None).await;

        match result {
            Err(SocialAuthError::Transport(msg)) => assert!(msg.contains("timed out")),
            other => panic!("Expected transport timeout, got {other:?}"),
        }
    }
}
