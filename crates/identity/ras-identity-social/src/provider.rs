//! The social login service exposing both flows.

use crate::avatar::ImagePipeline;
use crate::client::ProviderClient;
use crate::config::SocialAuthConfig;
use crate::context::AuthContext;
use crate::error::{SocialAuthError, SocialAuthResult};
use crate::pipeline::Pipeline;
use crate::registry::ProviderRegistry;
use crate::state::{CipherMask, MaskingCodec, derive_state};
use crate::steps::{
    ExchangeCode, FetchUserInfo, IssueTokens, ReconcileUser, ResolveUser, VerifyState,
    resolve_provider,
};
use crate::types::{AuthorizationUrl, ExternalAccessTokens};
use crate::uri::build_uri;
use indexmap::IndexMap;
use ras_identity_core::{TokenIssuer, UserStore};
use serde_json::Value;
use std::sync::Arc;
use tracing::info;

/// Social login against the configured providers.
///
/// Payloads are untyped JSON objects so that hosts can forward request bodies
/// as they are; see [`crate::types`] for their shape.
#[derive(Clone)]
pub struct SocialAuth {
    registry: Arc<ProviderRegistry>,
    codec: Arc<dyn MaskingCodec>,
    pipeline: Pipeline,
}

impl SocialAuth {
    pub fn new(
        registry: ProviderRegistry,
        config: &SocialAuthConfig,
        store: Arc<dyn UserStore>,
        images: Arc<dyn ImagePipeline>,
        issuer: Arc<dyn TokenIssuer>,
    ) -> SocialAuthResult<Self> {
        Self::with_codec(registry, config, store, images, issuer, Arc::new(CipherMask))
    }

    pub fn with_codec(
        registry: ProviderRegistry,
        config: &SocialAuthConfig,
        store: Arc<dyn UserStore>,
        images: Arc<dyn ImagePipeline>,
        issuer: Arc<dyn TokenIssuer>,
        codec: Arc<dyn MaskingCodec>,
    ) -> SocialAuthResult<Self> {
        let client = ProviderClient::new(config.http_timeout_seconds)?;

        let pipeline = Pipeline::new()
            .then(VerifyState::new(codec.clone()))
            .then(ExchangeCode::new(client.clone()))
            .then(FetchUserInfo::new(client.clone()))
            .then(ResolveUser::new(store.clone()))
            .then(ReconcileUser::new(client, store, images))
            .then(IssueTokens::new(issuer, codec.clone()));

        info!("Social login ready for providers: {}", registry.names().join(", "));

        Ok(Self {
            registry: Arc::new(registry),
            codec,
            pipeline,
        })
    }

    pub fn registry(&self) -> &ProviderRegistry {
        &self.registry
    }

    /// Build the url the user is sent to for consent at the requested provider.
    pub fn authorization_url(&self, payload: Value) -> SocialAuthResult<AuthorizationUrl> {
        let context = resolve_provider(&self.registry, payload)?;
        let authorization_url = self.build_authorization_url(&context)?;

        info!("Issued authorization url for provider: {}", context.provider().name);
        Ok(AuthorizationUrl { authorization_url })
    }

    fn build_authorization_url(&self, context: &AuthContext) -> SocialAuthResult<String> {
        let provider = context.provider();
        let auth_uri = provider.auth_uri.as_ref().ok_or_else(|| {
            SocialAuthError::Configuration(format!(
                "provider `{}` has no auth_uri configured",
                provider.name
            ))
        })?;

        let mut params = IndexMap::new();
        params.insert("client_id".to_string(), provider.client_id.clone());
        params.insert(
            "state".to_string(),
            derive_state(self.codec.as_ref(), &provider.client_secret),
        );
        if let Some(redirect_uri) = context.redirect_uri() {
            params.insert("redirect_uri".to_string(), redirect_uri.to_string());
        }
        for (key, value) in &auth_uri.extra_params {
            params.insert(key.clone(), value.clone());
        }

        Ok(build_uri(&auth_uri.path, &params))
    }

    /// Complete a login from the provider callback and mint platform tokens.
    pub async fn obtain_tokens(&self, payload: Value) -> SocialAuthResult<ExternalAccessTokens> {
        let context = resolve_provider(&self.registry, payload)?;
        let provider = context.provider().name.clone();

        let tokens = self.pipeline.run(context).await?.into_tokens()?;

        info!("User {} logged in with {}", tokens.user.id, provider);
        Ok(tokens)
    }
}
