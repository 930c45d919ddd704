//! Social login error types.

use ras_identity_core::IdentityError;
use thiserror::Error;

pub type SocialAuthResult<T> = Result<T, SocialAuthError>;

/// Failure of a social login flow.
///
/// Only [`SocialAuthError::Auth`] is an expected, user or admin actionable
/// failure. Every other variant means the integration itself is broken and
/// must not be reported as a bad login attempt.
#[derive(Debug, Error)]
pub enum SocialAuthError {
    #[error("External Authentication Error: {0}")]
    Auth(String),

    #[error("Invalid provider configuration: {0}")]
    Configuration(String),

    #[error("Transport error: {0}")]
    Transport(String),

    #[error("Image validation failed: {0}")]
    Validation(String),

    #[error("Identity error: {0}")]
    Identity(#[from] IdentityError),

    #[error("Pipeline error: {0}")]
    Pipeline(String),
}

impl SocialAuthError {
    pub fn auth(message: impl Into<String>) -> Self {
        SocialAuthError::Auth(message.into())
    }

    /// `true` when the caller did something wrong, `false` for system faults.
    pub fn is_recoverable(&self) -> bool {
        matches!(self, SocialAuthError::Auth(_))
    }
}

impl From<serde_yaml::Error> for SocialAuthError {
    fn from(err: serde_yaml::Error) -> Self {
        SocialAuthError::Configuration(err.to_string())
    }
}
