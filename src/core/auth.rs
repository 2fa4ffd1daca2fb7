//! Bearer credential extraction and decoding
//!
//! Credentials are HS256 JSON Web Tokens. The token is read from the `token`
//! query parameter first and from an `Authorization: Bearer <token>` header
//! otherwise. The `exp` claim is required and checked without leeway.

use axum::http::HeaderMap;
use axum::http::header::AUTHORIZATION;
use jsonwebtoken::{Algorithm, DecodingKey, Validation, decode};
use regex::Regex;
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::fmt;
use std::sync::OnceLock;

/// Decoded, time-validated token payload
pub type Claims = Map<String, Value>;

/// Query parameter carrying a token
pub const TOKEN_PARAM: &str = "token";

/// Shared secret used to verify credentials
///
/// Debug output never shows the secret itself.
#[derive(Clone)]
pub struct CredentialSecret(String);

impl CredentialSecret {
    pub fn new(secret: impl Into<String>) -> Self {
        Self(secret.into())
    }

    pub fn expose(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for CredentialSecret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("CredentialSecret(***)")
    }
}

/// Why a credential was rejected
#[derive(Debug)]
pub enum AuthError {
    /// No token in the query string or headers
    MissingCredential,
    /// The endpoint is protected but no secret is configured
    MissingSecret,
    /// Signature, format or time validation failed
    Invalid(jsonwebtoken::errors::Error),
}

impl fmt::Display for AuthError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AuthError::MissingCredential => write!(f, "no credential presented"),
            AuthError::MissingSecret => write!(f, "no credential secret configured"),
            AuthError::Invalid(e) => write!(f, "{}", e),
        }
    }
}

impl std::error::Error for AuthError {}

fn bearer_separator() -> &'static Regex {
    static BEARER: OnceLock<Regex> = OnceLock::new();
    BEARER.get_or_init(|| Regex::new(r"Bearer\s+").expect("bearer pattern is valid"))
}

/// Find the raw token on a request: query parameter first, then header
pub fn credential_from_request(
    query: &HashMap<String, String>,
    headers: &HeaderMap,
) -> Option<String> {
    if let Some(token) = query.get(TOKEN_PARAM).filter(|t| !t.is_empty()) {
        return Some(token.clone());
    }

    let header = headers.get(AUTHORIZATION)?.to_str().ok()?;
    bearer_separator()
        .splitn(header, 2)
        .nth(1)
        .map(str::to_string)
}

/// Verify a token and return its claims
pub fn decode_claims(token: &str, secret: &CredentialSecret) -> Result<Claims, AuthError> {
    let mut validation = Validation::new(Algorithm::HS256);
    validation.set_required_spec_claims(&["exp"]);
    validation.leeway = 0;
    validation.validate_exp = true;
    validation.validate_aud = false;

    let key = DecodingKey::from_secret(secret.expose().as_bytes());
    decode::<Claims>(token, &key, &validation)
        .map(|data| data.claims)
        .map_err(AuthError::Invalid)
}

/// Extract and verify the credential on a request
pub fn authenticate_request(
    query: &HashMap<String, String>,
    headers: &HeaderMap,
    secret: Option<&CredentialSecret>,
) -> (Option<String>, Result<Claims, AuthError>) {
    let token = credential_from_request(query, headers);
    let result = match (&token, secret) {
        (_, None) => Err(AuthError::MissingSecret),
        (None, _) => Err(AuthError::MissingCredential),
        (Some(token), Some(secret)) => decode_claims(token, secret),
    };
    (token, result)
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;
    use chrono::Utc;
    use jsonwebtoken::{EncodingKey, Header, encode};
    use serde_json::json;

    const SECRET: &str = "test-secret";

    fn token(claims: Value) -> String {
        encode(
            &Header::new(Algorithm::HS256),
            &claims,
            &EncodingKey::from_secret(SECRET.as_bytes()),
        )
        .unwrap()
    }

    fn header_map(value: &str) -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(AUTHORIZATION, HeaderValue::from_str(value).unwrap());
        headers
    }

    #[test]
    fn test_query_token_wins_over_header() {
        let mut query = HashMap::new();
        query.insert("token".to_string(), "from-query".to_string());
        let headers = header_map("Bearer from-header");

        assert_eq!(
            credential_from_request(&query, &headers),
            Some("from-query".to_string())
        );
    }

    #[test]
    fn test_empty_query_token_falls_back_to_header() {
        let mut query = HashMap::new();
        query.insert("token".to_string(), String::new());
        let headers = header_map("Bearer   abc.def");

        assert_eq!(
            credential_from_request(&query, &headers),
            Some("abc.def".to_string())
        );
    }

    #[test]
    fn test_non_bearer_header_is_ignored() {
        let headers = header_map("Basic dXNlcjpwYXNz");
        assert_eq!(credential_from_request(&HashMap::new(), &headers), None);
        assert_eq!(
            credential_from_request(&HashMap::new(), &HeaderMap::new()),
            None
        );
    }

    #[test]
    fn test_decode_valid_token() {
        let exp = Utc::now().timestamp() + 60;
        let claims = decode_claims(
            &token(json!({"sub": "u1", "exp": exp})),
            &CredentialSecret::new(SECRET),
        )
        .unwrap();
        assert_eq!(claims["sub"], "u1");
    }

    #[test]
    fn test_expired_token_is_rejected() {
        let exp = Utc::now().timestamp() - 5;
        let result = decode_claims(
            &token(json!({"sub": "u1", "exp": exp})),
            &CredentialSecret::new(SECRET),
        );
        assert!(matches!(result, Err(AuthError::Invalid(_))));
    }

    #[test]
    fn test_token_without_exp_is_rejected() {
        let result = decode_claims(&token(json!({"sub": "u1"})), &CredentialSecret::new(SECRET));
        assert!(matches!(result, Err(AuthError::Invalid(_))));
    }

    #[test]
    fn test_wrong_secret_is_rejected() {
        let exp = Utc::now().timestamp() + 60;
        let result = decode_claims(
            &token(json!({"exp": exp})),
            &CredentialSecret::new("another-secret"),
        );
        assert!(matches!(result, Err(AuthError::Invalid(_))));
    }

    #[test]
    fn test_missing_secret_fails() {
        let headers = header_map("Bearer abc");
        let (raw, result) = authenticate_request(&HashMap::new(), &headers, None);
        assert_eq!(raw.as_deref(), Some("abc"));
        assert!(matches!(result, Err(AuthError::MissingSecret)));
    }

    #[test]
    fn test_secret_debug_is_redacted() {
        let secret = CredentialSecret::new("hunter2");
        assert!(!format!("{:?}", secret).contains("hunter2"));
    }
}
