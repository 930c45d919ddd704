//! The individual stages of the social login pipeline.
//!
//! Every stage takes the [`AuthContext`] by value and hands it back enriched,
//! or fails and thereby stops the pipeline.

use crate::avatar::{ImagePipeline, avatar_filename};
use crate::client::{ProviderClient, provider_error};
use crate::context::AuthContext;
use crate::error::{SocialAuthError, SocialAuthResult};
use crate::registry::ProviderRegistry;
use crate::state::{MaskingCodec, new_csrf_token, verify_state};
use crate::types::ExternalAccessTokens;
use async_trait::async_trait;
use chrono::Utc;
use ras_identity_core::{Avatar, TokenIssuer, UserField, UserStore};
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{debug, info, warn};

#[async_trait]
pub trait PipelineStep: Send + Sync {
    fn name(&self) -> &'static str;

    async fn apply(&self, context: AuthContext) -> SocialAuthResult<AuthContext>;
}

/// Create the context for `payload` by looking up its `provider` field.
pub fn resolve_provider(registry: &ProviderRegistry, payload: Value) -> SocialAuthResult<AuthContext> {
    let Value::Object(payload) = payload else {
        return Err(SocialAuthError::auth("Provider not found in configuration"));
    };

    let provider = payload
        .get("provider")
        .and_then(Value::as_str)
        .and_then(|name| registry.get(name))
        .ok_or_else(|| SocialAuthError::auth("Provider not found in configuration"))?;

    Ok(AuthContext::new(payload, provider))
}

pub struct VerifyState {
    codec: Arc<dyn MaskingCodec>,
}

impl VerifyState {
    pub fn new(codec: Arc<dyn MaskingCodec>) -> Self {
        Self { codec }
    }
}

#[async_trait]
impl PipelineStep for VerifyState {
    fn name(&self) -> &'static str {
        "verify_state"
    }

    async fn apply(&self, context: AuthContext) -> SocialAuthResult<AuthContext> {
        verify_state(self.codec.as_ref(), context)
    }
}

/// Trade the authorization code for provider credentials.
pub struct ExchangeCode {
    client: ProviderClient,
}

impl ExchangeCode {
    pub fn new(client: ProviderClient) -> Self {
        Self { client }
    }
}

#[async_trait]
impl PipelineStep for ExchangeCode {
    fn name(&self) -> &'static str {
        "exchange_code"
    }

    async fn apply(&self, mut context: AuthContext) -> SocialAuthResult<AuthContext> {
        let provider = context.provider();
        let code = context
            .payload_str("code")
            .ok_or_else(|| SocialAuthError::auth("Missing authorization code"))?;
        let grant_type = provider
            .tokens_uri
            .extra_params
            .get("grant_type")
            .map(String::as_str)
            .unwrap_or("authorization_code");

        let mut form = vec![
            ("code", code),
            ("client_id", provider.client_id.as_str()),
            ("client_secret", provider.client_secret.as_str()),
        ];
        if let Some(redirect_uri) = context.redirect_uri() {
            form.push(("redirect_uri", redirect_uri));
        }
        form.push(("grant_type", grant_type));

        let credentials = self
            .client
            .post_form(&provider.tokens_uri.path, &form)
            .await
            .map_err(|e| match e {
                SocialAuthError::Transport(detail) => SocialAuthError::Transport(format!(
                    "Could not get credentials from {} authorization server ({detail}); check \
                     client_id, client_secret, tokens_uri and grant_type in the providers \
                     configuration and that the authorization url is returning the code",
                    provider.name
                )),
                other => other,
            })?;

        if let Some(message) = provider_error(&credentials) {
            warn!(provider = %provider.name, "Token endpoint returned an error");
            return Err(SocialAuthError::Auth(message));
        }

        debug!(provider = %provider.name, "Exchanged authorization code");
        context.data.credentials = Some(credentials);
        Ok(context)
    }
}

/// Fetch the user's profile with the exchanged access token.
pub struct FetchUserInfo {
    client: ProviderClient,
}

impl FetchUserInfo {
    pub fn new(client: ProviderClient) -> Self {
        Self { client }
    }
}

#[async_trait]
impl PipelineStep for FetchUserInfo {
    fn name(&self) -> &'static str {
        "fetch_user_info"
    }

    async fn apply(&self, mut context: AuthContext) -> SocialAuthResult<AuthContext> {
        let provider = context.provider();
        let credentials = context.credentials()?;

        let access_token = credentials
            .get("access_token")
            .and_then(Value::as_str)
            .ok_or_else(|| {
                SocialAuthError::Transport(format!(
                    "{} token endpoint returned no access_token",
                    provider.name
                ))
            })?;
        let token_type = credentials
            .get("token_type")
            .and_then(Value::as_str)
            .unwrap_or("Bearer");

        let mut params = provider.user_info_uri.extra_params.clone();
        params.shift_insert(0, "access_token".to_string(), access_token.to_string());
        let uri = crate::uri::build_uri(&provider.user_info_uri.path, &params);

        let user_info = self
            .client
            .get_json(&uri, Some(&format!("{token_type} {access_token}")))
            .await?;

        if let Some(message) = provider_error(&user_info) {
            warn!(provider = %provider.name, "User info endpoint returned an error");
            return Err(SocialAuthError::Auth(message));
        }

        context.data.user_info = Some(user_info);
        Ok(context)
    }
}

/// Get or create the local user matching the provider profile.
pub struct ResolveUser {
    store: Arc<dyn UserStore>,
}

impl ResolveUser {
    pub fn new(store: Arc<dyn UserStore>) -> Self {
        Self { store }
    }
}

#[async_trait]
impl PipelineStep for ResolveUser {
    fn name(&self) -> &'static str {
        "resolve_user"
    }

    async fn apply(&self, mut context: AuthContext) -> SocialAuthResult<AuthContext> {
        let user_info = context.user_info()?;

        let email = user_info
            .get("email")
            .and_then(Value::as_str)
            .filter(|email| !email.is_empty())
            .ok_or_else(|| {
                SocialAuthError::Auth(format!(
                    "{} did not share an email address",
                    context.provider().name
                ))
            })?;
        let first_name = name_field(user_info, "first_name", "given_name");
        let last_name = name_field(user_info, "last_name", "family_name");

        let (user, created) = self.store.get_or_create(email, first_name, last_name).await?;
        if created {
            info!("Created user {} from {} login", user.id, context.provider().name);
        }

        let avatar_uri = find_avatar_uri(user_info);
        context.data.user = Some(user);
        context.data.avatar_uri = avatar_uri;
        Ok(context)
    }
}

/// `primary` when the profile has it, else `fallback`.
fn name_field<'a>(user_info: &'a Map<String, Value>, primary: &str, fallback: &str) -> Option<&'a str> {
    match user_info.get(primary) {
        Some(value) => value.as_str(),
        None => user_info.get(fallback).and_then(Value::as_str),
    }
}

/// First string containing `http`, searching nested objects and arrays in
/// document order.
pub fn find_avatar_uri(user_info: &Map<String, Value>) -> Option<String> {
    fn search(value: &Value) -> Option<&str> {
        match value {
            Value::String(s) if s.contains("http") => Some(s.as_str()),
            Value::Object(map) => map.values().find_map(search),
            Value::Array(items) => items.iter().find_map(search),
            _ => None,
        }
    }

    user_info.values().find_map(search).map(String::from)
}

/// Record the login and attach the provider avatar when none is stored yet.
pub struct ReconcileUser {
    client: ProviderClient,
    store: Arc<dyn UserStore>,
    images: Arc<dyn ImagePipeline>,
}

impl ReconcileUser {
    pub fn new(client: ProviderClient, store: Arc<dyn UserStore>, images: Arc<dyn ImagePipeline>) -> Self {
        Self { client, store, images }
    }

    async fn fetch_avatar(&self, uri: &str, email: &str) -> SocialAuthResult<Avatar> {
        let file = self.client.get_bytes(uri).await?;

        let error_body = serde_json::from_slice::<Map<String, Value>>(&file.content)
            .ok()
            .and_then(|body| provider_error(&body));
        if let Some(message) = error_body {
            return Err(SocialAuthError::Auth(message));
        }
        if !file.status.is_success() {
            return Err(SocialAuthError::Auth(format!(
                "Avatar request failed with status {}",
                file.status
            )));
        }

        let content_type = file
            .content_type
            .as_deref()
            .and_then(|value| value.split(';').next())
            .map(str::trim)
            .filter(|value| !value.is_empty())
            .ok_or_else(|| SocialAuthError::Validation("avatar response has no content type".to_string()))?
            .to_string();

        self.images.validate_image(&file.content, &content_type)?;

        Ok(Avatar {
            filename: avatar_filename(email, &content_type, &file.content),
            content_type,
            content: file.content,
            thumbnails: BTreeMap::new(),
        })
    }
}

#[async_trait]
impl PipelineStep for ReconcileUser {
    fn name(&self) -> &'static str {
        "reconcile_user"
    }

    async fn apply(&self, mut context: AuthContext) -> SocialAuthResult<AuthContext> {
        let mut user = context.user()?.clone();
        user.last_login = Some(Utc::now());
        let mut fields = vec![UserField::LastLogin];

        if user.avatar.is_none() {
            if let Some(uri) = context.data.avatar_uri.as_deref() {
                let avatar = self.fetch_avatar(uri, &user.email).await?;
                debug!("Stored avatar {} for user {}", avatar.filename, user.id);
                user.avatar = Some(avatar);
                fields.push(UserField::Avatar);
            }
        }

        self.store.save(&user, &fields).await?;

        if fields.contains(&UserField::Avatar) {
            self.images.schedule_avatar_thumbnails(user.id);
        }

        context.data.user = Some(user);
        Ok(context)
    }
}

/// Mint the platform session tokens for the resolved user.
pub struct IssueTokens {
    issuer: Arc<dyn TokenIssuer>,
    codec: Arc<dyn MaskingCodec>,
}

impl IssueTokens {
    pub fn new(issuer: Arc<dyn TokenIssuer>, codec: Arc<dyn MaskingCodec>) -> Self {
        Self { issuer, codec }
    }
}

#[async_trait]
impl PipelineStep for IssueTokens {
    fn name(&self) -> &'static str {
        "issue_tokens"
    }

    async fn apply(&self, mut context: AuthContext) -> SocialAuthResult<AuthContext> {
        let user = context.user()?.clone();
        let csrf_token = new_csrf_token(self.codec.as_ref());

        let platform_token = self.issuer.create_access_token(&user)?;
        let mut claims = Map::new();
        claims.insert("csrfToken".to_string(), Value::String(csrf_token.clone()));
        let platform_refresh_token = self.issuer.create_refresh_token(&user, claims)?;

        context.data.tokens = Some(ExternalAccessTokens {
            user,
            platform_token,
            platform_refresh_token,
            csrf_token,
        });
        Ok(context)
    }
}
