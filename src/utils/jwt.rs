use chrono::Utc;
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use uuid::Uuid;

use crate::config::get_config;
use crate::error::{Error, Result};
use crate::middleware::auth::Claims;

/// Sign a bearer token for an authenticated user. The subject is the row id
/// of the student or faculty account; the role gates the route groups.
pub fn issue_token(subject: Uuid, role: &str) -> Result<String> {
    let config = get_config();
    sign_token(subject, role, &config.jwt_secret, config.token_ttl_hours)
}

pub fn sign_token(subject: Uuid, role: &str, secret: &str, ttl_hours: i64) -> Result<String> {
    let expires_at = Utc::now().timestamp() + ttl_hours * 3600;
    let claims = Claims {
        sub: subject.to_string(),
        exp: expires_at as usize,
        role: Some(role.to_string()),
    };
    encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(secret.as_bytes()),
    )
    .map_err(|e| Error::Internal(format!("Failed to sign token: {}", e)))
}

pub fn decode_token(token: &str, secret: &str) -> Result<Claims> {
    let data = decode::<Claims>(
        token,
        &DecodingKey::from_secret(secret.as_bytes()),
        &Validation::new(Algorithm::HS256),
    )
    .map_err(|_| Error::Unauthorized("Invalid or expired token".to_string()))?;
    Ok(data.claims)
}
