//! Bearer token authentication for admin routes.

use axum::extract::FromRequestParts;
use axum::http::header::AUTHORIZATION;
use axum::http::request::Parts;
use updist_core::{Caller, Role};

use super::AppState;
use super::error::ApiError;

/// The authenticated caller of an admin route.
#[derive(Debug, Clone, Copy)]
pub struct AuthCaller(pub Caller);

/// Constant-time string comparison.
fn tokens_match(expected: &str, supplied: &str) -> bool {
    expected.len() == supplied.len()
        && expected
            .as_bytes()
            .iter()
            .zip(supplied.as_bytes())
            .fold(0u8, |acc, (a, b)| acc | (a ^ b))
            == 0
}

fn bearer(parts: &Parts) -> Option<&str> {
    parts
        .headers
        .get(AUTHORIZATION)?
        .to_str()
        .ok()?
        .strip_prefix("Bearer ")
        .map(str::trim)
}

#[axum::async_trait]
impl FromRequestParts<AppState> for AuthCaller {
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, ApiError> {
        let Some(token) = bearer(parts) else {
            return Err(ApiError::Unauthorized);
        };

        let config = &state.config;
        let role = if config
            .admin_token
            .as_deref()
            .is_some_and(|t| tokens_match(t, token))
        {
            Role::SuperAdmin
        } else if config
            .support_token
            .as_deref()
            .is_some_and(|t| tokens_match(t, token))
        {
            Role::Support
        } else {
            tracing::warn!(path = %parts.uri.path(), "rejected admin request with unknown token");
            return Err(ApiError::Unauthorized);
        };

        Ok(Self(Caller::new(role)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn token_comparison() {
        assert!(tokens_match("s3cret", "s3cret"));
        assert!(!tokens_match("s3cret", "s3cres"));
        assert!(!tokens_match("s3cret", "s3cret!"));
        assert!(!tokens_match("s3cret", ""));
    }
}
