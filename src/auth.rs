//! Principal extraction for request handlers.
//!
//! Token issuance lives in an external identity service; this module only
//! verifies bearer tokens and exposes the authenticated principal, which the
//! services trust verbatim for ownership checks.

use std::sync::Arc;

use async_trait::async_trait;
use axum::{extract::FromRequestParts, http::header::AUTHORIZATION, http::request::Parts};
use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::errors::ServiceError;

/// Header carrying the opaque guest session id for unauthenticated carts.
pub const SESSION_HEADER: &str = "x-session-id";

/// Claims carried by identity-service tokens.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    pub sub: Uuid,
    #[serde(default)]
    pub email: Option<String>,
    pub exp: usize,
}

/// Verifies bearer tokens against the shared signing secret.
#[derive(Clone)]
pub struct AuthVerifier {
    decoding_key: DecodingKey,
    validation: Validation,
}

impl AuthVerifier {
    pub fn new(secret: &str) -> Self {
        Self {
            decoding_key: DecodingKey::from_secret(secret.as_bytes()),
            validation: Validation::new(Algorithm::HS256),
        }
    }

    pub fn verify(&self, token: &str) -> Result<Claims, ServiceError> {
        jsonwebtoken::decode::<Claims>(token, &self.decoding_key, &self.validation)
            .map(|data| data.claims)
            .map_err(|e| ServiceError::Unauthorized(format!("invalid bearer token: {}", e)))
    }
}

/// Issues a token for the given principal. The production issuer is the
/// external identity service; this exists for tests and local tooling.
pub fn issue_token(
    secret: &str,
    user_id: Uuid,
    email: Option<String>,
    ttl: std::time::Duration,
) -> Result<String, ServiceError> {
    let claims = Claims {
        sub: user_id,
        email,
        exp: (chrono::Utc::now() + chrono::Duration::seconds(ttl.as_secs() as i64)).timestamp()
            as usize,
    };
    jsonwebtoken::encode(
        &Header::new(Algorithm::HS256),
        &claims,
        &EncodingKey::from_secret(secret.as_bytes()),
    )
    .map_err(|e| ServiceError::InternalError(format!("failed to sign token: {}", e)))
}

/// The authenticated principal. Rejects the request when no valid bearer
/// token is present.
#[derive(Debug, Clone)]
pub struct AuthenticatedUser {
    pub user_id: Uuid,
    pub email: Option<String>,
}

#[async_trait]
impl<S> FromRequestParts<S> for AuthenticatedUser
where
    S: Send + Sync,
{
    type Rejection = ServiceError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let token = bearer_token(parts)?
            .ok_or_else(|| ServiceError::Unauthorized("missing bearer token".to_string()))?;
        let claims = verifier(parts)?.verify(&token)?;
        Ok(Self {
            user_id: claims.sub,
            email: claims.email,
        })
    }
}

/// Like [`AuthenticatedUser`] but absent credentials yield `None` instead of
/// a rejection. A present-but-invalid token is still rejected.
#[derive(Debug, Clone)]
pub struct OptionalUser(pub Option<AuthenticatedUser>);

#[async_trait]
impl<S> FromRequestParts<S> for OptionalUser
where
    S: Send + Sync,
{
    type Rejection = ServiceError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        match bearer_token(parts)? {
            None => Ok(Self(None)),
            Some(token) => {
                let claims = verifier(parts)?.verify(&token)?;
                Ok(Self(Some(AuthenticatedUser {
                    user_id: claims.sub,
                    email: claims.email,
                })))
            }
        }
    }
}

fn verifier(parts: &Parts) -> Result<Arc<AuthVerifier>, ServiceError> {
    parts
        .extensions
        .get::<Arc<AuthVerifier>>()
        .cloned()
        .ok_or_else(|| ServiceError::InternalError("auth verifier not configured".to_string()))
}

fn bearer_token(parts: &Parts) -> Result<Option<String>, ServiceError> {
    let Some(value) = parts.headers.get(AUTHORIZATION) else {
        return Ok(None);
    };
    let value = value
        .to_str()
        .map_err(|_| ServiceError::Unauthorized("malformed authorization header".to_string()))?;
    let token = value
        .strip_prefix("Bearer ")
        .ok_or_else(|| ServiceError::Unauthorized("expected bearer authorization".to_string()))?;
    Ok(Some(token.to_string()))
}
