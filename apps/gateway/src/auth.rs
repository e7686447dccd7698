//! Bearer-JWT authentication (HS256, shared secret).
//!
//! Tokens must carry `aud = "authenticated"` and an unexpired `exp`; `sub`
//! is the user id. Admin rights ride in `app_metadata.claims_admin`.

use axum::extract::FromRequestParts;
use axum::http::HeaderMap;
use axum::http::request::Parts;
use jsonwebtoken::{Algorithm, DecodingKey, Validation, decode};
use serde::{Deserialize, Serialize};

use crate::error::ApiError;
use crate::state::AppState;

pub const EXPECTED_AUDIENCE: &str = "authenticated";

#[derive(Debug, Default, Clone, Serialize, Deserialize)]
pub struct AppMetadata {
    #[serde(default)]
    pub claims_admin: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    pub sub: String,
    pub aud: String,
    pub exp: i64,
    #[serde(default)]
    pub app_metadata: AppMetadata,
}

fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    headers
        .get("authorization")
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.strip_prefix("Bearer "))
}

pub fn decode_claims(token: &str, secret: &str) -> Result<Claims, jsonwebtoken::errors::Error> {
    let mut validation = Validation::new(Algorithm::HS256);
    validation.set_audience(&[EXPECTED_AUDIENCE]);
    decode::<Claims>(token, &DecodingKey::from_secret(secret.as_bytes()), &validation)
        .map(|data| data.claims)
}

/// Rate-limit key: the authenticated user when the token checks out,
/// otherwise `anon`. Invalid or expired tokens degrade rather than reject,
/// so abusers cannot dodge the limiter by sending garbage tokens.
pub fn lenient_user_key(headers: &HeaderMap, secret: &str) -> String {
    bearer_token(headers)
        .and_then(|token| decode_claims(token, secret).ok())
        .map(|claims| claims.sub)
        .unwrap_or_else(|| "anon".to_string())
}

/// Extractor for authenticated user endpoints.
#[derive(Debug, Clone)]
pub struct AuthUser {
    pub user_id: String,
    pub is_admin: bool,
}

impl FromRequestParts<AppState> for AuthUser {
    type Rejection = ApiError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let token = bearer_token(&parts.headers)
            .ok_or_else(|| ApiError::unauthorized("Missing or invalid Authorization header"))?;
        let claims = decode_claims(token, &state.settings.db.jwt_secret)
            .map_err(|_| ApiError::unauthorized("Invalid authentication token"))?;
        Ok(Self {
            user_id: claims.sub,
            is_admin: claims.app_metadata.claims_admin,
        })
    }
}

/// Extractor for admin endpoints; 403 without the admin claim.
#[derive(Debug, Clone)]
pub struct AdminUser(pub AuthUser);

impl FromRequestParts<AppState> for AdminUser {
    type Rejection = ApiError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let user = AuthUser::from_request_parts(parts, state).await?;
        if !user.is_admin {
            return Err(ApiError::forbidden("Admin privileges required"));
        }
        Ok(Self(user))
    }
}
