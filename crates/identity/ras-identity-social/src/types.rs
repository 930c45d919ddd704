//! Inputs and outputs of the social login flows.

use ras_identity_core::User;
use serde::{Deserialize, Serialize};

/// Request to start a login with `provider`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthorizationUrlRequest {
    pub provider: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub redirect_uri: Option<String>,
}

/// Callback data sent back by the provider.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TokensRequest {
    pub provider: String,
    pub code: String,
    pub state: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub redirect_uri: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthorizationUrl {
    pub authorization_url: String,
}

/// Platform session tokens minted for the resolved user.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ExternalAccessTokens {
    pub user: User,
    #[serde(rename = "token")]
    pub platform_token: String,
    #[serde(rename = "refreshToken")]
    pub platform_refresh_token: String,
    pub csrf_token: String,
}
