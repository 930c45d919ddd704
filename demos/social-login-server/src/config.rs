//! Configuration for the social login server.
//!
//! Values come from, in increasing precedence: defaults, an optional
//! `social-login.toml` (path overridable with `SOCIAL_LOGIN_CONFIG_FILE`) and
//! `SOCIAL_LOGIN__*` environment variables, e.g. `SOCIAL_LOGIN__SERVER__PORT`.

use anyhow::{Context, Result};
use config::{Config as ConfigBuilder, Environment, File};
use ras_identity_session::SessionConfig;
use ras_identity_social::{ConfigurationEntry, SocialAuthConfig};
use serde::{Deserialize, Serialize};
use std::net::IpAddr;
use std::path::PathBuf;
use tracing::{debug, info, warn};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub server: ServerConfig,
    pub auth: AuthConfig,
    pub social: SocialConfig,
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub host: IpAddr,
    pub port: u16,
}

/// Platform token settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AuthConfig {
    pub jwt_secret: String,
    pub access_ttl_seconds: i64,
    pub refresh_ttl_seconds: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SocialConfig {
    /// YAML providers document; the shipped example is used when unset.
    pub providers_file: Option<PathBuf>,
    pub http_timeout_seconds: u64,
    pub thumbnail_sizes: Vec<u32>,
    pub thumbnail_queue_capacity: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Default filter when `RUST_LOG` is not set.
    pub level: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: IpAddr::from([127, 0, 0, 1]),
            port: 3000,
        }
    }
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            jwt_secret: "dev-secret-key-change-in-production".to_string(),
            access_ttl_seconds: 300,
            refresh_ttl_seconds: 30 * 24 * 3600,
        }
    }
}

impl Default for SocialConfig {
    fn default() -> Self {
        let defaults = SocialAuthConfig::default();
        Self {
            providers_file: None,
            http_timeout_seconds: defaults.http_timeout_seconds,
            thumbnail_sizes: defaults.thumbnail_sizes,
            thumbnail_queue_capacity: defaults.thumbnail_queue_capacity,
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}

impl Config {
    pub fn load() -> Result<Self> {
        let mut builder = ConfigBuilder::builder();

        let config_path = std::env::var("SOCIAL_LOGIN_CONFIG_FILE")
            .unwrap_or_else(|_| "social-login.toml".to_string());

        if std::path::Path::new(&config_path).exists() {
            info!("Loading configuration from {}", config_path);
            builder = builder.add_source(File::with_name(&config_path));
        } else {
            debug!("No config file found at {}, using defaults", config_path);
        }

        builder = builder.add_source(
            Environment::with_prefix("SOCIAL_LOGIN")
                .prefix_separator("__")
                .separator("__")
                .list_separator(",")
                .with_list_parse_key("social.thumbnail_sizes")
                .try_parsing(true),
        );

        let settings: Config = builder
            .build()
            .context("Failed to build configuration")?
            .try_deserialize()
            .context("Failed to deserialize configuration")?;

        settings.validate()?;
        Ok(settings)
    }

    pub fn validate(&self) -> Result<()> {
        if self.auth.jwt_secret == AuthConfig::default().jwt_secret {
            warn!("Using default JWT secret - this is insecure for production!");
        }
        if self.auth.access_ttl_seconds <= 0 || self.auth.refresh_ttl_seconds <= 0 {
            anyhow::bail!("Token lifetimes must be positive");
        }
        if self.social.http_timeout_seconds == 0 {
            anyhow::bail!("social.http_timeout_seconds must be at least 1");
        }
        if self.social.thumbnail_queue_capacity == 0 {
            anyhow::bail!("social.thumbnail_queue_capacity must be at least 1");
        }
        Ok(())
    }

    pub fn session(&self) -> SessionConfig {
        SessionConfig::default()
            .with_secret(self.auth.jwt_secret.clone())
            .with_access_ttl(chrono::Duration::seconds(self.auth.access_ttl_seconds))
            .with_refresh_ttl(chrono::Duration::seconds(self.auth.refresh_ttl_seconds))
    }

    pub fn social_auth(&self) -> SocialAuthConfig {
        SocialAuthConfig::new()
            .with_http_timeout(self.social.http_timeout_seconds)
            .with_thumbnail_sizes(self.social.thumbnail_sizes.clone())
            .with_thumbnail_queue_capacity(self.social.thumbnail_queue_capacity)
    }

    /// The providers configuration entry as the registry expects it.
    pub fn providers_entry(&self) -> Result<ConfigurationEntry> {
        match &self.social.providers_file {
            Some(path) => {
                let document = std::fs::read_to_string(path).with_context(|| {
                    format!("Failed to read providers file {}", path.display())
                })?;
                info!("Loaded providers from {}", path.display());
                Ok(ConfigurationEntry::providers(document))
            }
            None => {
                warn!("No providers file configured, using the example providers");
                Ok(ConfigurationEntry::default_providers())
            }
        }
    }
}
