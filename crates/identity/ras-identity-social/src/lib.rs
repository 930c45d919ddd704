//! Configuration driven social login.
//!
//! Providers are described by a YAML document (see
//! [`config::DEFAULT_PROVIDERS_CONFIG`]). The crate builds authorization urls
//! carrying a stateless anti-CSRF `state`, and turns provider callbacks into
//! platform tokens by running a [`Pipeline`] of steps: verify the state,
//! exchange the code, fetch the profile, get or create the user, attach the
//! avatar and issue tokens.

pub mod avatar;
pub mod client;
pub mod config;
pub mod context;
pub mod error;
pub mod pipeline;
pub mod provider;
pub mod registry;
pub mod state;
pub mod steps;
pub mod types;
pub mod uri;

pub use avatar::{ImagePipeline, ThumbnailQueue, ThumbnailWorker};
pub use client::ProviderClient;
pub use config::{ConfigurationEntry, DEFAULT_PROVIDERS_CONFIG, PROVIDERS_CONFIG_FIELD, SocialAuthConfig};
pub use context::{AuthContext, ContextData};
pub use error::{SocialAuthError, SocialAuthResult};
pub use pipeline::Pipeline;
pub use provider::SocialAuth;
pub use registry::{Endpoint, Provider, ProviderRegistry};
pub use state::{CipherMask, MaskingCodec};
pub use steps::PipelineStep;
pub use types::{AuthorizationUrl, AuthorizationUrlRequest, ExternalAccessTokens, TokensRequest};
