//! JWT token issuance for users resolved by social login.

use chrono::{Duration, Utc};
use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation, decode, encode};
use ras_identity_core::{IdentityError, IdentityResult, TokenIssuer, User};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

#[derive(Debug, Error)]
pub enum SessionError {
    #[error("JWT error: {0}")]
    JwtError(#[from] jsonwebtoken::errors::Error),

    #[error("Unexpected token type: expected {expected}, got {actual}")]
    WrongTokenType { expected: TokenType, actual: TokenType },
}

impl From<SessionError> for IdentityError {
    fn from(err: SessionError) -> Self {
        IdentityError::TokenError(err.to_string())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TokenType {
    Access,
    Refresh,
}

impl std::fmt::Display for TokenType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TokenType::Access => write!(f, "access"),
            TokenType::Refresh => write!(f, "refresh"),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JwtClaims {
    pub sub: String,
    pub exp: i64,
    pub iat: i64,
    pub jti: String,
    pub token: TokenType,
    pub email: String,
    /// Caller supplied claims, e.g. the `csrfToken` of a refresh token.
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

#[derive(Debug, Clone)]
pub struct SessionConfig {
    pub jwt_secret: String,
    pub access_ttl: Duration,
    pub refresh_ttl: Duration,
    pub algorithm: Algorithm,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            jwt_secret: "change-me-in-production".to_string(),
            access_ttl: Duration::minutes(5),
            refresh_ttl: Duration::days(30),
            algorithm: Algorithm::HS256,
        }
    }
}

impl SessionConfig {
    pub fn with_secret(mut self, secret: impl Into<String>) -> Self {
        self.jwt_secret = secret.into();
        self
    }

    pub fn with_access_ttl(mut self, ttl: Duration) -> Self {
        self.access_ttl = ttl;
        self
    }

    pub fn with_refresh_ttl(mut self, ttl: Duration) -> Self {
        self.refresh_ttl = ttl;
        self
    }
}

/// HMAC-signed JWT implementation of [`TokenIssuer`].
#[derive(Clone)]
pub struct JwtTokenIssuer {
    config: SessionConfig,
}

impl JwtTokenIssuer {
    pub fn new(config: SessionConfig) -> Self {
        Self { config }
    }

    fn issue(
        &self,
        user: &User,
        token: TokenType,
        ttl: Duration,
        extra: serde_json::Map<String, serde_json::Value>,
    ) -> Result<String, SessionError> {
        let now = Utc::now();
        let claims = JwtClaims {
            sub: user.id.to_string(),
            exp: (now + ttl).timestamp(),
            iat: now.timestamp(),
            jti: Uuid::new_v4().to_string(),
            token,
            email: user.email.clone(),
            extra,
        };

        Ok(encode(
            &Header::new(self.config.algorithm),
            &claims,
            &EncodingKey::from_secret(self.config.jwt_secret.as_bytes()),
        )?)
    }

    /// Decode `token` and check it is of the `expected` kind.
    pub fn verify(&self, token: &str, expected: TokenType) -> Result<JwtClaims, SessionError> {
        let token_data = decode::<JwtClaims>(
            token,
            &DecodingKey::from_secret(self.config.jwt_secret.as_bytes()),
            &Validation::new(self.config.algorithm),
        )?;

        if token_data.claims.token != expected {
            return Err(SessionError::WrongTokenType {
                expected,
                actual: token_data.claims.token,
            });
        }

        Ok(token_data.claims)
    }
}

impl TokenIssuer for JwtTokenIssuer {
    fn create_access_token(&self, user: &User) -> IdentityResult<String> {
        Ok(self.issue(
            user,
            TokenType::Access,
            self.config.access_ttl,
            serde_json::Map::new(),
        )?)
    }

    fn create_refresh_token(
        &self,
        user: &User,
        claims: serde_json::Map<String, serde_json::Value>,
    ) -> IdentityResult<String> {
        Ok(self.issue(user, TokenType::Refresh, self.config.refresh_ttl, claims)?)
    }
}
