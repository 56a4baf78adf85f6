use axum::{async_trait, extract::FromRequestParts, http::request::Parts};
use jsonwebtoken::{decode, Algorithm, DecodingKey, Validation};
use serde::{Deserialize, Serialize};
use tracing::debug;
use uuid::Uuid;

use crate::errors::ServiceError;
use crate::AppState;

/// Claim structure for externally issued identity tokens
#[derive(Debug, Serialize, Deserialize)]
pub struct Claims {
    pub sub: Uuid,   // Subject (user ID)
    pub admin: bool, // Staff flag
    pub iss: String, // Issuer
    pub iat: i64,    // Issued at time
    pub exp: i64,    // Expiration time
}

/// Authenticated caller extracted from the bearer token
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthUser {
    pub user_id: Uuid,
    pub admin: bool,
}

impl AuthUser {
    /// Check if the caller holds the staff flag
    pub fn is_admin(&self) -> bool {
        self.admin
    }
}

impl From<Claims> for AuthUser {
    fn from(claims: Claims) -> Self {
        Self {
            user_id: claims.sub,
            admin: claims.admin,
        }
    }
}

/// Verifies a bearer token against the configured secret and issuer
pub fn decode_claims(secret: &str, issuer: &str, token: &str) -> Result<Claims, ServiceError> {
    let mut validation = Validation::new(Algorithm::HS256);
    validation.set_issuer(&[issuer]);

    decode::<Claims>(
        token,
        &DecodingKey::from_secret(secret.as_bytes()),
        &validation,
    )
    .map(|data| data.claims)
    .map_err(|e| {
        debug!("Token verification failed: {}", e);
        ServiceError::Unauthorized("Invalid or expired token".into())
    })
}

/// Pulls the bearer token out of the Authorization header, if present
fn bearer_token(parts: &Parts) -> Option<&str> {
    parts
        .headers
        .get(axum::http::header::AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.strip_prefix("Bearer "))
        .map(str::trim)
        .filter(|token| !token.is_empty())
}

#[async_trait]
impl FromRequestParts<AppState> for AuthUser {
    type Rejection = ServiceError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let token = bearer_token(parts)
            .ok_or_else(|| ServiceError::Unauthorized("Missing bearer token".into()))?;
        let claims = decode_claims(&state.config.jwt_secret, &state.config.auth_issuer, token)?;
        Ok(claims.into())
    }
}

/// Extractor for endpoints that accept anonymous callers.
///
/// A missing Authorization header yields `None`; a header that is present but
/// fails verification is still rejected rather than treated as anonymous.
#[derive(Debug, Clone)]
pub struct OptionalAuthUser(pub Option<AuthUser>);

#[async_trait]
impl FromRequestParts<AppState> for OptionalAuthUser {
    type Rejection = ServiceError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        match bearer_token(parts) {
            None => Ok(OptionalAuthUser(None)),
            Some(token) => {
                let claims =
                    decode_claims(&state.config.jwt_secret, &state.config.auth_issuer, token)?;
                Ok(OptionalAuthUser(Some(claims.into())))
            }
        }
    }
}
