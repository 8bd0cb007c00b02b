//! Bearer-token authentication for the HTTP API.
//!
//! Tokens are opaque strings from `auth.tokens`, each mapped to the account
//! id it authenticates as. There are no sessions to mint or refresh;
//! presenting a configured token is the whole ceremony.

use axum::http::header::AUTHORIZATION;
use axum::http::HeaderMap;
use secrecy::ExposeSecret;

use revvy_core::config::ApiToken;

/// Resolves a presented bearer token to the account it belongs to.
pub trait SessionVerifier: Send + Sync {
    fn verify(&self, token: &str) -> Option<i64>;
}

/// Verifier over the statically configured token table.
pub struct StaticTokenVerifier {
    tokens: Vec<ApiToken>,
}

impl StaticTokenVerifier {
    pub fn new(tokens: Vec<ApiToken>) -> Self {
        Self { tokens }
    }
}

impl SessionVerifier for StaticTokenVerifier {
    fn verify(&self, token: &str) -> Option<i64> {
        if token.is_empty() {
            return None;
        }
        self.tokens
            .iter()
            .find(|entry| entry.token.expose_secret() == token)
            .map(|entry| entry.user_id)
    }
}

/// Extract the token from an `Authorization: Bearer <token>` header. The
/// scheme match is case-insensitive; a blank token reads as absent.
pub fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    let value = headers.get(AUTHORIZATION)?.to_str().ok()?;
    let (scheme, token) = value.split_once(' ')?;
    if !scheme.eq_ignore_ascii_case("bearer") {
        return None;
    }
    let token = token.trim();
    (!token.is_empty()).then_some(token)
}
