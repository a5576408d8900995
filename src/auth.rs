use axum::http::HeaderMap;
use jsonwebtoken::{decode, Algorithm, DecodingKey, Validation};
use serde::Deserialize;

use crate::error::AppError;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
struct Claims {
    sub: String,
    #[allow(dead_code)]
    exp: usize,
}

/// Resolves the acting user id from the request, preferring the bearer
/// token. The `x-user-id` override only works outside production with
/// dev overrides enabled.
pub async fn require_user_id(state: &AppState, headers: &HeaderMap) -> Result<String, AppError> {
    if state.config.auth_dev_overrides_enabled() {
        if let Some(user_id) = header_value(headers, "x-user-id") {
            return Ok(user_id);
        }
    }

    if let Some(token) = bearer_token(headers) {
        let secret = state.config.jwt_secret.as_ref().ok_or_else(|| {
            AppError::Dependency("JWT_SECRET is not configured.".to_string())
        })?;
        let decoded = decode::<Claims>(
            &token,
            &DecodingKey::from_secret(secret.as_bytes()),
            &Validation::new(Algorithm::HS256),
        )
        .map_err(|error| AppError::Unauthorized(format!("Invalid bearer token: {error}")))?;
        let sub = decoded.claims.sub.trim().to_string();
        if sub.is_empty() {
            return Err(AppError::Unauthorized(
                "Bearer token has no subject.".to_string(),
            ));
        }
        return Ok(sub);
    }

    if let Some(default_user) = &state.config.default_user_id {
        if !state.config.is_production() {
            return Ok(default_user.clone());
        }
    }

    Err(AppError::Unauthorized(
        "Missing Authorization header.".to_string(),
    ))
}

fn bearer_token(headers: &HeaderMap) -> Option<String> {
    let raw = header_value(headers, "authorization")?;
    let token = raw.strip_prefix("Bearer ").or_else(|| raw.strip_prefix("bearer "))?;
    let trimmed = token.trim();
    if trimmed.is_empty() {
        return None;
    }
    Some(trimmed.to_string())
}

fn header_value(headers: &HeaderMap, name: &str) -> Option<String> {
    headers
        .get(name)
        .and_then(|value| value.to_str().ok())
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .map(ToOwned::to_owned)
}
