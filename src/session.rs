//! Signed bearer tokens for authenticated requests.

use std::sync::Arc;

use axum::{extract::FromRequestParts, http::header::AUTHORIZATION, http::request::Parts};
use chrono::{DateTime, Duration, Utc};
use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation, decode, encode};
use serde::{Deserialize, Serialize};

use crate::{
    AppState,
    error::{AppError, AuthError},
};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Claims {
    pub user_id: i64,
    pub username: String,
    pub iat: i64,
    pub exp: i64,
}

#[derive(Clone)]
pub struct SessionIssuer {
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    validation: Validation,
    ttl: Duration,
}

impl SessionIssuer {
    pub fn new(secret: &[u8], ttl: Duration) -> Self {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.leeway = 0;

        Self {
            encoding_key: EncodingKey::from_secret(secret),
            decoding_key: DecodingKey::from_secret(secret),
            validation,
            ttl,
        }
    }

    pub fn issue(&self, user_id: i64, username: &str) -> Result<String, AppError> {
        self.issue_at(user_id, username, Utc::now())
    }

    pub fn issue_at(
        &self,
        user_id: i64,
        username: &str,
        issued_at: DateTime<Utc>,
    ) -> Result<String, AppError> {
        let claims = Claims {
            user_id,
            username: username.to_string(),
            iat: issued_at.timestamp(),
            exp: (issued_at + self.ttl).timestamp(),
        };

        encode(&Header::new(Algorithm::HS256), &claims, &self.encoding_key)
            .map_err(|err| AppError::Internal(format!("failed to sign session token: {}", err)))
    }

    pub fn verify(&self, token: Option<&str>) -> Result<Claims, AuthError> {
        let token = token.filter(|t| !t.is_empty()).ok_or(AuthError::Missing)?;

        decode::<Claims>(token, &self.decoding_key, &self.validation)
            .map(|data| data.claims)
            .map_err(|err| {
                tracing::info!("Token verification failed: {}", err);
                AuthError::Invalid
            })
    }
}

/// Pulls the token out of an `Authorization: Bearer <token>` header.
pub fn bearer_token(parts: &Parts) -> Option<&str> {
    parts
        .headers
        .get(AUTHORIZATION)?
        .to_str()
        .ok()?
        .split_whitespace()
        .nth(1)
}

/// Claims of the caller, available to any handler behind bearer auth.
pub struct AuthUser(pub Claims);

impl FromRequestParts<Arc<AppState>> for AuthUser {
    type Rejection = AppError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &Arc<AppState>,
    ) -> Result<Self, Self::Rejection> {
        let claims = state.sessions.verify(bearer_token(parts))?;
        Ok(AuthUser(claims))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::Request;

    fn issuer() -> SessionIssuer {
        SessionIssuer::new(b"test-secret", Duration::hours(24))
    }

    #[test]
    fn issued_token_verifies() {
        let issuer = issuer();
        let token = issuer.issue(7, "alice").unwrap();

        let claims = issuer.verify(Some(&token)).unwrap();
        assert_eq!(claims.user_id, 7);
        assert_eq!(claims.username, "alice");
        assert_eq!(claims.exp - claims.iat, 24 * 60 * 60);
    }

    #[test]
    fn expired_token_is_invalid() {
        let issuer = issuer();
        let token = issuer
            .issue_at(7, "alice", Utc::now() - Duration::hours(25))
            .unwrap();

        assert_eq!(issuer.verify(Some(&token)), Err(AuthError::Invalid));
    }

    #[test]
    fn token_nearly_expired_is_still_valid() {
        let issuer = issuer();
        let token = issuer
            .issue_at(7, "alice", Utc::now() - Duration::hours(23))
            .unwrap();

        assert!(issuer.verify(Some(&token)).is_ok());
    }

    #[test]
    fn tampered_or_foreign_tokens_are_invalid() {
        let issuer = issuer();
        let token = issuer.issue(7, "alice").unwrap();

        let mut tampered = token.clone();
        tampered.push('x');
        assert_eq!(issuer.verify(Some(&tampered)), Err(AuthError::Invalid));

        let other = SessionIssuer::new(b"another-secret", Duration::hours(24));
        let foreign = other.issue(7, "alice").unwrap();
        assert_eq!(issuer.verify(Some(&foreign)), Err(AuthError::Invalid));

        assert_eq!(issuer.verify(Some("not.a.jwt")), Err(AuthError::Invalid));
    }

    #[test]
    fn missing_token() {
        let issuer = issuer();

        assert_eq!(issuer.verify(None), Err(AuthError::Missing));
        assert_eq!(issuer.verify(Some("")), Err(AuthError::Missing));
    }

    #[test]
    fn bearer_token_is_second_header_word() {
        let (parts, _) = Request::builder()
            .header(AUTHORIZATION, "Bearer abc.def.ghi")
            .body(())
            .unwrap()
            .into_parts();
        assert_eq!(bearer_token(&parts), Some("abc.def.ghi"));

        let (parts, _) = Request::builder()
            .header(AUTHORIZATION, "Bearer")
            .body(())
            .unwrap()
            .into_parts();
        assert_eq!(bearer_token(&parts), None);

        let (parts, _) = Request::builder().body(()).unwrap().into_parts();
        assert_eq!(bearer_token(&parts), None);
    }
}
