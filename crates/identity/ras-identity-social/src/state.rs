//! Stateless anti-CSRF state tokens.
//!
//! The `state` sent to the provider is the provider's client secret, filtered
//! to [`ALLOWED_CHARS`] and masked with a random one-time pad. On callback the
//! pad is removed again and the result must be a prefix of the filtered
//! secret, so no server-side state store is needed.

use crate::context::AuthContext;
use crate::error::{SocialAuthError, SocialAuthResult};
use rand::Rng;
use tracing::debug;

pub const ALLOWED_CHARS: &str = "abcdefghijklmnopqrstuvwxyzABCDEFGHIJKLMNOPQRSTUVWXYZ0123456789";

/// Length of a mask, and the longest secret prefix a token can carry.
pub const SECRET_LENGTH: usize = 32;

/// Reversible masking of secrets drawn from [`ALLOWED_CHARS`].
pub trait MaskingCodec: Send + Sync {
    fn mask(&self, secret: &str) -> String;

    /// `None` when `token` contains characters outside [`ALLOWED_CHARS`].
    fn unmask(&self, token: &str) -> Option<String>;
}

/// Additive cipher over [`ALLOWED_CHARS`] with a random per-token mask.
///
/// A token is the mask followed by the ciphered secret; only the first
/// [`SECRET_LENGTH`] secret characters are kept.
#[derive(Debug, Clone, Copy, Default)]
pub struct CipherMask;

impl CipherMask {
    fn alphabet() -> &'static [u8] {
        ALLOWED_CHARS.as_bytes()
    }

    fn index(c: u8) -> Option<usize> {
        Self::alphabet().iter().position(|&a| a == c)
    }

    fn random_string(len: usize) -> String {
        let alphabet = Self::alphabet();
        let mut rng = rand::thread_rng();
        (0..len)
            .map(|_| alphabet[rng.gen_range(0..alphabet.len())] as char)
            .collect()
    }
}

impl MaskingCodec for CipherMask {
    fn mask(&self, secret: &str) -> String {
        let alphabet = Self::alphabet();
        let mask = Self::random_string(SECRET_LENGTH);

        let cipher: String = secret
            .bytes()
            .filter_map(Self::index)
            .zip(mask.bytes().filter_map(Self::index))
            .map(|(x, y)| alphabet[(x + y) % alphabet.len()] as char)
            .collect();

        mask + &cipher
    }

    fn unmask(&self, token: &str) -> Option<String> {
        let alphabet = Self::alphabet();
        let indexes = token
            .bytes()
            .map(Self::index)
            .collect::<Option<Vec<usize>>>()?;

        let split = indexes.len().min(SECRET_LENGTH);
        let (mask, cipher) = indexes.split_at(split);

        Some(
            cipher
                .iter()
                .zip(mask)
                .map(|(&x, &y)| alphabet[(x + alphabet.len() - y) % alphabet.len()] as char)
                .collect(),
        )
    }
}

/// Keep only the characters of `secret` that belong to [`ALLOWED_CHARS`].
pub fn sanitize_secret(secret: &str) -> String {
    secret.chars().filter(|c| ALLOWED_CHARS.contains(*c)).collect()
}

/// Build the `state` parameter for a provider with `client_secret`.
pub fn derive_state(codec: &dyn MaskingCodec, client_secret: &str) -> String {
    codec.mask(&sanitize_secret(client_secret))
}

/// Check that the payload `state` was derived from the context provider's secret.
pub fn verify_state(codec: &dyn MaskingCodec, context: AuthContext) -> SocialAuthResult<AuthContext> {
    let secret = sanitize_secret(&context.provider().client_secret);

    let unmasked = context
        .payload_str("state")
        .and_then(|state| codec.unmask(state))
        .unwrap_or_default();

    // An empty prefix would match any secret.
    if unmasked.is_empty() || !secret.starts_with(&unmasked) {
        debug!(provider = %context.provider().name, "Rejected request state");
        return Err(SocialAuthError::auth("Invalid request state"));
    }

    Ok(context)
}

/// Fresh masked csrf token for a new session.
pub fn new_csrf_token(codec: &dyn MaskingCodec) -> String {
    codec.mask(&CipherMask::random_string(SECRET_LENGTH))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::{Endpoint, Provider};
    use serde_json::json;
    use std::sync::Arc;

    fn context(client_secret: &str, state: serde_json::Value) -> AuthContext {
        let provider = Provider {
            name: "google".to_string(),
            client_id: "your google id".to_string(),
            client_secret: client_secret.to_string(),
            redirect_uri: None,
            auth_uri: None,
            tokens_uri: Endpoint::new("https://oauth2.googleapis.com/token"),
            user_info_uri: Endpoint::new("https://www.googleapis.com/oauth2/v2/userinfo"),
        };
        let payload = json!({ "provider": "google", "state": state });
        AuthContext::new(payload.as_object().cloned().unwrap(), Arc::new(provider))
    }

    #[test]
    fn test_sanitize_secret_drops_disallowed_chars() {
        assert_eq!(sanitize_secret("GOCSPX-a_b.c d!9"), "GOCSPXabcd9");
        assert_eq!(sanitize_secret("äöü"), "");
    }

    #[test]
    fn test_mask_round_trip() {
        let codec = CipherMask;
        let secret = "abcXYZ0123456789";
        let token = codec.mask(secret);

        assert_eq!(token.len(), SECRET_LENGTH + secret.len());
        assert_eq!(codec.unmask(&token).as_deref(), Some(secret));
    }

    #[test]
    fn test_mask_is_randomised() {
        let codec = CipherMask;
        assert_ne!(codec.mask("samesecret"), codec.mask("samesecret"));
    }

    #[test]
    fn test_long_secret_is_truncated() {
        let codec = CipherMask;
        let secret: String = ALLOWED_CHARS.chars().collect();
        let unmasked = codec.unmask(&codec.mask(&secret)).unwrap();

        assert_eq!(unmasked.len(), SECRET_LENGTH);
        assert!(secret.starts_with(&unmasked));
    }

    #[test]
    fn test_unmask_rejects_foreign_chars() {
        assert_eq!(CipherMask.unmask("abc-def"), None);
    }

    #[test]
    fn test_state_round_trip_for_various_secrets() {
        let codec = CipherMask;
        for secret in [
            "your google secret",
            "GOCSPX-1234567890abcdefghijklmnopqrstuvwxyz",
            "x",
            "a.b.c-d_e",
        ] {
            let state = derive_state(&codec, secret);
            let ctx = context(secret, json!(state));
            assert!(verify_state(&codec, ctx).is_ok(), "secret {secret:?}");
        }
    }

    #[test]
    fn test_state_from_other_provider_is_rejected() {
        let codec = CipherMask;
        let state = derive_state(&codec, "your facebook secret");
        let result = verify_state(&codec, context("your google secret", json!(state)));

        assert!(matches!(result, Err(SocialAuthError::Auth(msg)) if msg == "Invalid request state"));
    }

    #[test]
    fn test_missing_or_malformed_state_is_rejected() {
        let codec = CipherMask;
        for state in [json!(null), json!(42), json!(""), json!("not-a-token!")] {
            let result = verify_state(&codec, context("your google secret", state));
            assert!(matches!(result, Err(SocialAuthError::Auth(_))));
        }
    }

    #[test]
    fn test_bare_mask_is_rejected() {
        let codec = CipherMask;
        let result = verify_state(
            &codec,
            context("your google secret", json!(CipherMask::random_string(SECRET_LENGTH))),
        );
        assert!(result.is_err());
    }

    #[test]
    fn test_csrf_tokens_are_unique() {
        let codec = CipherMask;
        let first = new_csrf_token(&codec);
        let second = new_csrf_token(&codec);

        assert_eq!(first.len(), SECRET_LENGTH * 2);
        assert_ne!(first, second);
    }
}
