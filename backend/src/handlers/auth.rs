use anyhow::Result;
use axum::extract::FromRequestParts;
use axum::http::{header::AUTHORIZATION, request::Parts};
use jsonwebtoken::{decode, encode, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::{error::ApiError, AppState};

/// JWT claims issued at login.
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct Claims {
    pub id: i32,      // User id
    pub role: String, // "user" or "admin"
    pub iat: i64,
    pub exp: i64,
}

/// Creates and verifies session tokens (HS256, shared secret).
#[derive(Clone)]
pub struct JwtKeys {
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
}

impl JwtKeys {
    pub fn new(secret: &str) -> Self {
        Self {
            encoding_key: EncodingKey::from_secret(secret.as_bytes()),
            decoding_key: DecodingKey::from_secret(secret.as_bytes()),
        }
    }

    pub fn create_token(&self, user_id: i32, role: &str, ttl: chrono::Duration) -> Result<String> {
        let now = chrono::Utc::now();
        let claims = Claims {
            id: user_id,
            role: role.to_string(),
            iat: now.timestamp(),
            exp: (now + ttl).timestamp(),
        };
        encode(&Header::default(), &claims, &self.encoding_key).map_err(Into::into)
    }

    pub fn verify_token(&self, token: &str) -> Result<Claims> {
        decode::<Claims>(token, &self.decoding_key, &Validation::default())
            .map(|data| data.claims)
            .map_err(Into::into)
    }
}

/// The authenticated caller. Handlers pass `user_id` on explicitly as the
/// actor of every match operation.
#[derive(Debug, Clone)]
pub struct AuthUser {
    pub user_id: i32,
    pub role: String,
}

impl FromRequestParts<AppState> for AuthUser {
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        let header = parts
            .headers
            .get(AUTHORIZATION)
            .and_then(|value| value.to_str().ok())
            .ok_or_else(|| ApiError::Unauthorized("No JWT token found".to_string()))?;

        let token = header.strip_prefix("Bearer ").unwrap_or(header).trim();

        let claims = state.jwt.verify_token(token).map_err(|e| {
            debug!("JWT verification failed: {}", e);
            ApiError::Unauthorized("Invalid JWT token".to_string())
        })?;

        Ok(AuthUser {
            user_id: claims.id,
            role: claims.role,
        })
    }
}
