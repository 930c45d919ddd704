//! HTTP surface for the two social login flows.

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use ras_identity_social::{AuthorizationUrl, ExternalAccessTokens, SocialAuth, SocialAuthError};
use serde_json::{Value, json};
use std::sync::Arc;
use tower_http::trace::TraceLayer;
use tracing::{error, warn};

#[derive(Clone)]
pub struct AppState {
    pub social: Arc<SocialAuth>,
}

/// Response wrapper turning flow failures into JSON errors.
pub struct ApiError(SocialAuthError);

impl From<SocialAuthError> for ApiError {
    fn from(err: SocialAuthError) -> Self {
        Self(err)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match &self.0 {
            SocialAuthError::Auth(_) => StatusCode::BAD_REQUEST,
            SocialAuthError::Transport(_) | SocialAuthError::Validation(_) => StatusCode::BAD_GATEWAY,
            SocialAuthError::Configuration(_)
            | SocialAuthError::Identity(_)
            | SocialAuthError::Pipeline(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };

        if self.0.is_recoverable() {
            warn!("Social login rejected: {}", self.0);
        } else {
            error!("Social login failed: {}", self.0);
        }

        (status, Json(json!({ "error": self.0.to_string() }))).into_response()
    }
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/providers", get(providers))
        .route("/auth/authorization-url", post(authorization_url))
        .route("/auth/tokens", post(obtain_tokens))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn health() -> &'static str {
    "ok"
}

async fn providers(State(state): State<AppState>) -> Json<Vec<String>> {
    Json(
        state
            .social
            .registry()
            .names()
            .into_iter()
            .map(String::from)
            .collect(),
    )
}

async fn authorization_url(
    State(state): State<AppState>,
    Json(payload): Json<Value>,
) -> Result<Json<AuthorizationUrl>, ApiError> {
    Ok(Json(state.social.authorization_url(payload)?))
}

async fn obtain_tokens(
    State(state): State<AppState>,
    Json(payload): Json<Value>,
) -> Result<Json<ExternalAccessTokens>, ApiError> {
    Ok(Json(state.social.obtain_tokens(payload).await?))
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum_test::TestServer;
    use ras_identity_core::InMemoryUserStore;
    use ras_identity_session::{JwtTokenIssuer, SessionConfig};
    use ras_identity_social::{
        ConfigurationEntry, ProviderRegistry, SocialAuthConfig, ThumbnailQueue,
    };
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn server(document: Option<String>) -> TestServer {
        let entry = document
            .map(ConfigurationEntry::providers)
            .unwrap_or_else(ConfigurationEntry::default_providers);
        let registry = ProviderRegistry::load(&[entry]).unwrap();
        let (queue, _jobs) = ThumbnailQueue::channel(8);
        let social = SocialAuth::new(
            registry,
            &SocialAuthConfig::default(),
            Arc::new(InMemoryUserStore::new()),
            Arc::new(queue),
            Arc::new(JwtTokenIssuer::new(SessionConfig::default())),
        )
        .unwrap();

        TestServer::new(router(AppState {
            social: Arc::new(social),
        }))
        .unwrap()
    }

    #[tokio::test]
    async fn test_health() {
        let response = server(None).get("/health").await;
        response.assert_status_ok();
        response.assert_text("ok");
    }

    #[tokio::test]
    async fn test_lists_configured_providers() {
        let response = server(None).get("/providers").await;
        response.assert_status_ok();
        response.assert_json(&json!(["facebook", "google"]));
    }

    #[tokio::test]
    async fn test_authorization_url() {
        let response = server(None)
            .post("/auth/authorization-url")
            .json(&json!({ "provider": "google" }))
            .await;

        response.assert_status_ok();
        let body: Value = response.json();
        let url = body["authorizationUrl"].as_str().unwrap();
        assert!(url.starts_with("https://accounts.google.com/o/oauth2/v2/auth?client_id=your google id&state="));
    }

    #[tokio::test]
    async fn test_unknown_provider_is_a_bad_request() {
        let response = server(None)
            .post("/auth/authorization-url")
            .json(&json!({ "provider": "github" }))
            .await;

        response.assert_status(StatusCode::BAD_REQUEST);
        response.assert_json(&json!({
            "error": "External Authentication Error: Provider not found in configuration"
        }));
    }

    #[tokio::test]
    async fn test_forged_state_is_a_bad_request() {
        let response = server(None)
            .post("/auth/tokens")
            .json(&json!({ "provider": "google", "code": "abc", "state": "forged" }))
            .await;

        response.assert_status(StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_broken_token_endpoint_is_a_bad_gateway() {
        let provider = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/token"))
            .respond_with(ResponseTemplate::new(500).set_body_string("<html>oops</html>"))
            .mount(&provider)
            .await;

        let document = format!(
            r#"
google:
    client_id: "id"
    client_secret: "secret"
    auth_uri: "{base}/auth"
    tokens_uri: "{base}/token"
    user_info_uri: "{base}/userinfo"
"#,
            base = provider.uri()
        );
        let app = server(Some(document));

        let url: Value = app
            .post("/auth/authorization-url")
            .json(&json!({ "provider": "google" }))
            .await
            .json();
        let url = url["authorizationUrl"].as_str().unwrap();
        let state = url.split("state=").nth(1).unwrap();

        let response = app
            .post("/auth/tokens")
            .json(&json!({ "provider": "google", "code": "abc", "state": state }))
            .await;

        response.assert_status(StatusCode::BAD_GATEWAY);
    }
}
