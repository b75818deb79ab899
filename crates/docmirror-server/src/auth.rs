//! Client-credentials tokens for outgoing repository calls, and bearer
//! claim parsing for the served API.
//!
//! The served API does not verify token signatures itself; that happens at
//! the ingress proxy. Here the claims are only decoded for scope checks.

use std::sync::Mutex;
use std::time::{Duration, Instant};

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use serde::Deserialize;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum AuthError {
    #[error("oidc discovery: {0}")]
    Discovery(String),

    #[error("token request: {0}")]
    TokenRequest(String),

    #[error("malformed bearer token: {0}")]
    MalformedToken(String),
}

/// Identity and scopes extracted from a bearer token.
#[derive(Debug, Clone, PartialEq)]
pub struct AuthInfo {
    pub subject: String,
    pub scopes: Vec<String>,
}

impl AuthInfo {
    /// True when the caller holds at least one of the given scopes.
    pub fn has_any_scope(&self, scopes: &[&str]) -> bool {
        self.scopes.iter().any(|s| scopes.contains(&s.as_str()))
    }
}

#[derive(Deserialize)]
struct Claims {
    #[serde(default)]
    sub: String,
    #[serde(default)]
    scope: String,
}

/// Decodes the claims of a JWT bearer token without verifying it.
pub fn parse_bearer(token: &str) -> Result<AuthInfo, AuthError> {
    let mut parts = token.split('.');
    let (Some(_), Some(payload)) = (parts.next(), parts.next()) else {
        return Err(AuthError::MalformedToken("not a JWT".to_string()));
    };

    let raw = URL_SAFE_NO_PAD
        .decode(payload)
        .map_err(|err| AuthError::MalformedToken(err.to_string()))?;
    let claims: Claims =
        serde_json::from_slice(&raw).map_err(|err| AuthError::MalformedToken(err.to_string()))?;

    Ok(AuthInfo {
        subject: claims.sub,
        scopes: claims
            .scope
            .split_whitespace()
            .map(str::to_string)
            .collect(),
    })
}

#[derive(Deserialize)]
struct OidcDiscovery {
    token_endpoint: String,
}

#[derive(Deserialize)]
struct TokenResponse {
    access_token: String,
    #[serde(default)]
    expires_in: u64,
}

/// Fetches and caches client-credentials access tokens.
pub struct TokenSource {
    client: reqwest::Client,
    token_endpoint: String,
    client_id: String,
    client_secret: String,
    cached: Mutex<Option<(String, Instant)>>,
}

/// Tokens are refreshed this long before they would expire.
const EXPIRY_SKEW: Duration = Duration::from_secs(30);

impl TokenSource {
    /// Resolves the token endpoint from the OIDC discovery document and
    /// returns a source for the given client.
    pub async fn discover(
        client: reqwest::Client,
        oidc_config_url: &str,
        client_id: String,
        client_secret: String,
    ) -> Result<Self, AuthError> {
        let discovery: OidcDiscovery = client
            .get(oidc_config_url)
            .send()
            .await
            .map_err(|err| AuthError::Discovery(err.to_string()))?
            .error_for_status()
            .map_err(|err| AuthError::Discovery(err.to_string()))?
            .json()
            .await
            .map_err(|err| AuthError::Discovery(err.to_string()))?;

        Ok(Self {
            client,
            token_endpoint: discovery.token_endpoint,
            client_id,
            client_secret,
            cached: Mutex::new(None),
        })
    }

    /// Returns a valid access token, fetching a new one when the cached
    /// token is near expiry.
    pub async fn token(&self) -> Result<String, AuthError> {
        if let Some((token, expires)) = self.cached.lock().unwrap().clone() {
            if Instant::now() < expires {
                return Ok(token);
            }
        }

        let response: TokenResponse = self
            .client
            .post(&self.token_endpoint)
            .form(&[
                ("grant_type", "client_credentials"),
                ("client_id", self.client_id.as_str()),
                ("client_secret", self.client_secret.as_str()),
            ])
            .send()
            .await
            .map_err(|err| AuthError::TokenRequest(err.to_string()))?
            .error_for_status()
            .map_err(|err| AuthError::TokenRequest(err.to_string()))?
            .json()
            .await
            .map_err(|err| AuthError::TokenRequest(err.to_string()))?;

        let lifetime = Duration::from_secs(response.expires_in)
            .saturating_sub(EXPIRY_SKEW)
            .max(Duration::from_secs(1));
        let expires = Instant::now() + lifetime;

        *self.cached.lock().unwrap() = Some((response.access_token.clone(), expires));

        Ok(response.access_token)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn unsigned_jwt(sub: &str, scope: &str) -> String {
        let header = URL_SAFE_NO_PAD.encode(br#"{"alg":"none"}"#);
        let payload = URL_SAFE_NO_PAD.encode(
            serde_json::json!({"sub": sub, "scope": scope})
                .to_string()
                .as_bytes(),
        );
        format!("{header}.{payload}.")
    }

    #[test]
    fn test_parse_bearer_extracts_scopes() {
        let info = parse_bearer(&unsigned_jwt("core://user/jane", "doc_read doc_write")).unwrap();
        assert_eq!(info.subject, "core://user/jane");
        assert_eq!(info.scopes, vec!["doc_read", "doc_write"]);
    }

    #[test]
    fn test_parse_bearer_rejects_non_jwt() {
        assert!(parse_bearer("opaque-token").is_err());
        assert!(parse_bearer("a.%%%.c").is_err());
    }

    #[test]
    fn test_has_any_scope() {
        let info = AuthInfo {
            subject: String::new(),
            scopes: vec!["doc_write".to_string()],
        };
        assert!(info.has_any_scope(&["doc_admin", "doc_write"]));
        assert!(!info.has_any_scope(&["doc_admin"]));
    }

    #[test]
    fn test_empty_scope_claim() {
        let info = parse_bearer(&unsigned_jwt("s", "")).unwrap();
        assert!(info.scopes.is_empty());
        assert!(!info.has_any_scope(&["doc_admin"]));
    }
}
