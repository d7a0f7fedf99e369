//! Caller identity from a pre-validated bearer token.
//!
//! The hosting runtime validates the JWT signature and expiry before the
//! request reaches us, so claims are decoded here without verification. The
//! identity comes only from the token's `sub` claim, never from payload fields.

use std::fmt;

use http::header::AUTHORIZATION;
use serde::Deserialize;
use thiserror::Error;

use crate::RequestContext;

/// Authenticated caller identifier (`sub` claim).
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Identity(String);

impl Identity {
    /// The user id.
    #[must_use]
    pub fn user_id(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Identity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Identity extraction error.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum IdentityError {
    #[error(
        "No request headers found in context. Ensure the runtime forwards the Authorization header."
    )]
    MissingHeaders,
    #[error("No Authorization header found in request context. Ensure JWT inbound auth is configured.")]
    MissingAuthorization,
    #[error("Authorization token could not be decoded: {0}")]
    MalformedToken(String),
    #[error("JWT token does not contain a 'sub' claim. Cannot determine user identity.")]
    MissingSubjectClaim,
}

#[derive(Deserialize)]
struct Claims {
    #[serde(default)]
    sub: Option<String>,
}

/// Stateless extractor for the caller identity.
#[derive(Debug, Clone, Copy, Default)]
pub struct IdentityExtractor;

impl IdentityExtractor {
    /// Extract the caller identity from the request context.
    ///
    /// # Errors
    /// Returns an [`IdentityError`] if headers, the Authorization header or
    /// the `sub` claim are missing, or the token is not a JWT.
    pub fn extract(&self, ctx: &RequestContext) -> Result<Identity, IdentityError> {
        let headers = ctx
            .headers()
            .filter(|h| !h.is_empty())
            .ok_or(IdentityError::MissingHeaders)?;

        let auth = headers
            .get(AUTHORIZATION)
            .and_then(|v| v.to_str().ok())
            .filter(|v| !v.is_empty())
            .ok_or(IdentityError::MissingAuthorization)?;

        let token = auth.strip_prefix("Bearer ").unwrap_or(auth);
        let claims = decode_unverified(token)?;

        let user_id = claims
            .sub
            .filter(|s| !s.is_empty())
            .ok_or(IdentityError::MissingSubjectClaim)?;

        tracing::info!(user_id = %user_id, "Extracted user identity from JWT");
        Ok(Identity(user_id))
    }
}

fn decode_unverified(token: &str) -> Result<Claims, IdentityError> {
    // Any signing algorithm is accepted; no key is needed to read the claims.
    jsonwebtoken::dangerous::insecure_decode::<Claims>(token)
        .map(|data| data.claims)
        .map_err(|e| IdentityError::MalformedToken(e.to_string()))
}

#[cfg(test)]
mod tests {
    use http::{HeaderMap, HeaderValue};
    use jsonwebtoken::{EncodingKey, Header};
    use serde_json::json;

    use super::*;

    fn token(claims: &serde_json::Value) -> String {
        jsonwebtoken::encode(&Header::default(), claims, &EncodingKey::from_secret(b"runtime-signed")).unwrap()
    }

    fn ctx_with_auth(value: &str) -> RequestContext {
        let mut headers = HeaderMap::new();
        headers.insert(AUTHORIZATION, HeaderValue::from_str(value).unwrap());
        RequestContext::new(headers)
    }

    #[test]
    fn test_extract_bearer_subject() {
        let jwt = token(&json!({"sub": "u-123", "scope": "openid", "exp": 1}));
        let identity = IdentityExtractor.extract(&ctx_with_auth(&format!("Bearer {jwt}"))).unwrap();
        assert_eq!(identity.user_id(), "u-123");
    }

    /// RS256 header, `sub` = u-123, placeholder signature.
    const RS256_TOKEN: &str = "eyJhbGciOiJSUzI1NiIsInR5cCI6IkpXVCIsImtpZCI6ImsxIn0.\
        eyJzdWIiOiJ1LTEyMyIsImlzcyI6Imh0dHBzOi8vaWRwLmV4YW1wbGUuY29tIiwiZXhwIjoxfQ.\
        bm90LWEtcmVhbC1zaWduYXR1cmU";

    #[test]
    fn test_extract_rs256_subject_without_key() {
        let identity = IdentityExtractor
            .extract(&ctx_with_auth(&format!("Bearer {RS256_TOKEN}")))
            .unwrap();
        assert_eq!(identity.user_id(), "u-123");
    }

    #[test]
    fn test_extract_raw_token_without_prefix() {
        let jwt = token(&json!({"sub": "u-123"}));
        let identity = IdentityExtractor.extract(&ctx_with_auth(&jwt)).unwrap();
        assert_eq!(identity.to_string(), "u-123");
    }

    #[test]
    fn test_other_claims_do_not_matter() {
        let jwt = token(&json!({"sub": "u-123", "user_id": "admin", "aud": "elsewhere"}));
        let identity = IdentityExtractor.extract(&ctx_with_auth(&jwt)).unwrap();
        assert_eq!(identity.user_id(), "u-123");
    }

    #[test]
    fn test_missing_headers() {
        let err = IdentityExtractor.extract(&RequestContext::without_headers()).unwrap_err();
        assert_eq!(err, IdentityError::MissingHeaders);

        let err = IdentityExtractor.extract(&RequestContext::new(HeaderMap::new())).unwrap_err();
        assert_eq!(err, IdentityError::MissingHeaders);
    }

    #[test]
    fn test_missing_authorization() {
        let mut headers = HeaderMap::new();
        headers.insert("x-request-id", HeaderValue::from_static("abc"));
        let err = IdentityExtractor.extract(&RequestContext::new(headers)).unwrap_err();
        assert_eq!(err, IdentityError::MissingAuthorization);
    }

    #[test]
    fn test_missing_subject_claim() {
        let jwt = token(&json!({"scope": "openid"}));
        let err = IdentityExtractor.extract(&ctx_with_auth(&jwt)).unwrap_err();
        assert_eq!(err, IdentityError::MissingSubjectClaim);
    }

    #[test]
    fn test_garbage_token() {
        let err = IdentityExtractor.extract(&ctx_with_auth("Bearer not-a-jwt")).unwrap_err();
        assert!(matches!(err, IdentityError::MalformedToken(_)));
    }
}
