//! Per-request authentication context threaded through the pipeline.

use crate::error::{SocialAuthError, SocialAuthResult};
use crate::registry::Provider;
use crate::types::ExternalAccessTokens;
use ras_identity_core::User;
use serde_json::{Map, Value};
use std::sync::Arc;

/// Results accumulated by the pipeline steps.
///
/// Each step fills in its own slot and may read the slots of earlier steps.
#[derive(Debug, Clone, Default)]
pub struct ContextData {
    pub credentials: Option<Map<String, Value>>,
    pub user_info: Option<Map<String, Value>>,
    pub user: Option<User>,
    pub avatar_uri: Option<String>,
    pub tokens: Option<ExternalAccessTokens>,
}

#[derive(Debug, Clone)]
pub struct AuthContext {
    payload: Map<String, Value>,
    provider: Arc<Provider>,
    pub data: ContextData,
}

impl AuthContext {
    pub fn new(payload: Map<String, Value>, provider: Arc<Provider>) -> Self {
        Self {
            payload,
            provider,
            data: ContextData::default(),
        }
    }

    pub fn payload(&self) -> &Map<String, Value> {
        &self.payload
    }

    pub fn provider(&self) -> &Provider {
        &self.provider
    }

    /// String value of a payload field, `None` when absent or not a string.
    pub fn payload_str(&self, key: &str) -> Option<&str> {
        self.payload.get(key).and_then(Value::as_str)
    }

    /// The request's `redirectUri` override, else the provider default.
    pub fn redirect_uri(&self) -> Option<&str> {
        self.payload_str("redirectUri")
            .or(self.provider.redirect_uri.as_deref())
    }

    pub fn credentials(&self) -> SocialAuthResult<&Map<String, Value>> {
        self.data
            .credentials
            .as_ref()
            .ok_or_else(|| missing("credentials"))
    }

    pub fn user_info(&self) -> SocialAuthResult<&Map<String, Value>> {
        self.data.user_info.as_ref().ok_or_else(|| missing("user info"))
    }

    pub fn user(&self) -> SocialAuthResult<&User> {
        self.data.user.as_ref().ok_or_else(|| missing("user"))
    }

    pub fn into_tokens(self) -> SocialAuthResult<ExternalAccessTokens> {
        self.data.tokens.ok_or_else(|| missing("tokens"))
    }
}

fn missing(what: &str) -> SocialAuthError {
    SocialAuthError::Pipeline(format!("no {what} in authentication context"))
}
