//! Social login configuration types.

use serde::{Deserialize, Serialize};

/// Name of the configuration entry holding the providers document.
pub const PROVIDERS_CONFIG_FIELD: &str = "providers_config_list";

/// Example providers document shipped with the crate.
///
/// Top-level keys name providers. Each provider has `name`, `client_id`,
/// `client_secret`, `redirect_uri`, `auth_uri`, `tokens_uri` and
/// `user_info_uri`. The three uris are mappings with a `path` and optional
/// `extra_params`, so
///
/// ```text
/// https://auth.com?scope=email profile&access_type=offline
/// ```
///
/// is written as
///
/// ```yaml
/// auth_uri:
///     path: "https://auth.com"
///     extra_params:
///         scope: "email profile"
///         access_type: "offline"
/// ```
pub const DEFAULT_PROVIDERS_CONFIG: &str = r#"---
google:
    name: "google"
    client_id: "your google id"
    client_secret: "your google secret"
    redirect_uri: "http://localhost:3000/auth/google"
    auth_uri:
        path: "https://accounts.google.com/o/oauth2/v2/auth"
        extra_params:
            scope: "openid email profile"
            access_type: "offline"
            include_granted_scopes: "true"
            response_type: "code"
    tokens_uri:
        path: "https://oauth2.googleapis.com/token"
        extra_params:
            grant_type: "authorization_code"
    user_info_uri:
        path: "https://www.googleapis.com/oauth2/v2/userinfo"
facebook:
    name: "facebook"
    client_id: "your facebook id"
    client_secret: "your facebook secret"
    redirect_uri: "http://localhost:3000/auth/facebook"
    auth_uri:
        path: "https://www.facebook.com/v13.0/dialog/oauth"
        extra_params:
    tokens_uri:
        path: "https://graph.facebook.com/v13.0/oauth/access_token"
        extra_params:
            grant_type: "authorization_code"
    user_info_uri:
        path: "https://graph.facebook.com/v13.0/me"
        extra_params:
            fields: "id,name,email,first_name,last_name,middle_name,is_guest_user,picture{url,height,width}"
"#;

/// A named configuration value as stored by the host.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConfigurationEntry {
    pub name: String,
    pub value: Option<String>,
}

impl ConfigurationEntry {
    pub fn providers(value: impl Into<String>) -> Self {
        Self {
            name: PROVIDERS_CONFIG_FIELD.to_string(),
            value: Some(value.into()),
        }
    }

    pub fn default_providers() -> Self {
        Self::providers(DEFAULT_PROVIDERS_CONFIG)
    }
}

/// Runtime settings of the social login service.
#[derive(Debug, Clone)]
pub struct SocialAuthConfig {
    /// Upper bound for every provider round trip.
    pub http_timeout_seconds: u64,
    /// Edge sizes of the square avatar thumbnails.
    pub thumbnail_sizes: Vec<u32>,
    /// Pending thumbnail jobs kept before new ones are dropped.
    pub thumbnail_queue_capacity: usize,
}

impl Default for SocialAuthConfig {
    fn default() -> Self {
        Self {
            http_timeout_seconds: 10,
            thumbnail_sizes: vec![32, 64, 128, 256],
            thumbnail_queue_capacity: 1024,
        }
    }
}

impl SocialAuthConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_http_timeout(mut self, seconds: u64) -> Self {
        self.http_timeout_seconds = seconds;
        self
    }

    pub fn with_thumbnail_sizes(mut self, sizes: Vec<u32>) -> Self {
        self.thumbnail_sizes = sizes;
        self
    }

    pub fn with_thumbnail_queue_capacity(mut self, capacity: usize) -> Self {
        self.thumbnail_queue_capacity = capacity;
        self
    }
}
