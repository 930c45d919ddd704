//! Provider registry built from the host's providers document.

use crate::config::ConfigurationEntry;
use crate::error::{SocialAuthError, SocialAuthResult};
use crate::state::sanitize_secret;
use indexmap::IndexMap;
use serde_yaml::{Mapping, Value};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, info, warn};
use url::Url;

/// A provider endpoint: base url plus provider specific query parameters.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Endpoint {
    pub path: String,
    /// Kept in configuration order.
    pub extra_params: IndexMap<String, String>,
}

impl Endpoint {
    pub fn new(path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            extra_params: IndexMap::new(),
        }
    }

    pub fn with_param(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.extra_params.insert(key.into(), value.into());
        self
    }

    fn from_value(value: &Value, provider: &str, field: &str) -> SocialAuthResult<Self> {
        let endpoint = match value {
            // Older documents spell an endpoint as a bare url.
            Value::String(path) => Endpoint::new(path.clone()),
            Value::Mapping(map) => {
                let path = required_str(map, "path", provider)
                    .map_err(|_| config_error(provider, format!("`{field}.path` is required")))?;

                let extra_params = match map.get("extra_params") {
                    None | Some(Value::Null) => IndexMap::new(),
                    Some(Value::Mapping(params)) => params
                        .iter()
                        .map(|(k, v)| -> SocialAuthResult<(String, String)> {
                            let key = scalar_to_string(k).ok_or_else(|| {
                                config_error(provider, format!("`{field}.extra_params` has a non scalar key"))
                            })?;
                            let value = scalar_to_string(v).ok_or_else(|| {
                                config_error(
                                    provider,
                                    format!("`{field}.extra_params.{key}` must be a scalar value"),
                                )
                            })?;
                            Ok((key, value))
                        })
                        .collect::<SocialAuthResult<_>>()?,
                    Some(_) => {
                        return Err(config_error(
                            provider,
                            format!("`{field}.extra_params` must be a mapping"),
                        ));
                    }
                };

                Endpoint { path, extra_params }
            }
            _ => {
                return Err(config_error(
                    provider,
                    format!("`{field}` must be a mapping with a `path`"),
                ));
            }
        };

        Url::parse(&endpoint.path).map_err(|e| {
            config_error(
                provider,
                format!("`{field}.path` is not an absolute url ({e}): {}", endpoint.path),
            )
        })?;

        Ok(endpoint)
    }
}

/// A configured OAuth2 style identity source.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Provider {
    pub name: String,
    pub client_id: String,
    pub client_secret: String,
    /// Default redirect uri, a request may override it.
    pub redirect_uri: Option<String>,
    pub auth_uri: Option<Endpoint>,
    pub tokens_uri: Endpoint,
    pub user_info_uri: Endpoint,
}

impl Provider {
    fn from_value(key: &str, map: &Mapping) -> SocialAuthResult<Self> {
        let name = optional_str(map, "name").unwrap_or_else(|| key.to_string());

        let endpoint = |field: &str| -> SocialAuthResult<Option<Endpoint>> {
            match map.get(field) {
                None | Some(Value::Null) => Ok(None),
                Some(value) => Endpoint::from_value(value, key, field).map(Some),
            }
        };

        let tokens_uri = endpoint("tokens_uri")?
            .ok_or_else(|| config_error(key, "`tokens_uri` is required"))?;
        let user_info_uri = endpoint("user_info_uri")?
            .ok_or_else(|| config_error(key, "`user_info_uri` is required"))?;

        let client_secret = required_str(map, "client_secret", key)?;
        if sanitize_secret(&client_secret).is_empty() {
            return Err(config_error(
                key,
                "`client_secret` has no letters or digits to derive the request state from",
            ));
        }

        Ok(Provider {
            name,
            client_id: required_str(map, "client_id", key)?,
            client_secret,
            redirect_uri: optional_str(map, "redirect_uri"),
            auth_uri: endpoint("auth_uri")?,
            tokens_uri,
            user_info_uri,
        })
    }
}

/// Read-only lookup of providers by case-insensitive name.
#[derive(Debug, Clone, Default)]
pub struct ProviderRegistry {
    providers: HashMap<String, Arc<Provider>>,
}

impl ProviderRegistry {
    /// Build the registry from the host configuration entries.
    ///
    /// The first entry's `value` must hold a YAML (or JSON) document with one
    /// top-level key per provider.
    pub fn load(entries: &[ConfigurationEntry]) -> SocialAuthResult<Self> {
        let document = entries
            .first()
            .and_then(|entry| entry.value.as_deref())
            .filter(|value| !value.trim().is_empty())
            .ok_or_else(|| {
                SocialAuthError::Configuration("No provider configuration available".to_string())
            })?;

        Self::from_yaml(document)
    }

    pub fn from_yaml(document: &str) -> SocialAuthResult<Self> {
        let tree = lowercase_keys(serde_yaml::from_str::<Value>(document)?);

        let Value::Mapping(root) = tree else {
            return Err(SocialAuthError::Configuration(
                "Provider configuration must be a mapping of provider names".to_string(),
            ));
        };

        let mut providers = HashMap::new();
        for (key, value) in &root {
            let Some(key) = key.as_str() else {
                warn!("Skipping provider entry with a non string key");
                continue;
            };

            let Value::Mapping(map) = value else {
                warn!("Skipping provider entry `{}`: not a mapping", key);
                continue;
            };

            let provider = Provider::from_value(key, map)?;
            debug!("Loaded provider `{}`", key);
            providers.insert(key.to_lowercase(), Arc::new(provider));
        }

        if providers.is_empty() {
            return Err(SocialAuthError::Configuration(
                "No provider configuration available".to_string(),
            ));
        }

        info!("Loaded {} social login providers", providers.len());
        Ok(Self { providers })
    }

    pub fn from_providers(providers: impl IntoIterator<Item = Provider>) -> Self {
        Self {
            providers: providers
                .into_iter()
                .map(|p| (p.name.to_lowercase(), Arc::new(p)))
                .collect(),
        }
    }

    pub fn get(&self, name: &str) -> Option<Arc<Provider>> {
        self.providers.get(&name.to_lowercase()).cloned()
    }

    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.providers.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    pub fn len(&self) -> usize {
        self.providers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.providers.is_empty()
    }
}

/// Lowercase every mapping key in `value`, leaving values untouched.
fn lowercase_keys(value: Value) -> Value {
    match value {
        Value::Mapping(map) => Value::Mapping(
            map.into_iter()
                .map(|(k, v)| {
                    let k = match k {
                        Value::String(s) => Value::String(s.to_lowercase()),
                        other => other,
                    };
                    (k, lowercase_keys(v))
                })
                .collect(),
        ),
        Value::Sequence(seq) => Value::Sequence(seq.into_iter().map(lowercase_keys).collect()),
        other => other,
    }
}

fn scalar_to_string(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Bool(b) => Some(b.to_string()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

fn optional_str(map: &Mapping, field: &str) -> Option<String> {
    map.get(field).and_then(scalar_to_string)
}

fn required_str(map: &Mapping, field: &str, provider: &str) -> SocialAuthResult<String> {
    optional_str(map, field).ok_or_else(|| config_error(provider, format!("`{field}` is required")))
}

fn config_error(provider: &str, message: impl std::fmt::Display) -> SocialAuthError {
    SocialAuthError::Configuration(format!("provider `{provider}`: {message}"))
}
