use chrono::{Duration, Utc};
use jsonwebtoken::{decode, encode, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

use crate::config;
use crate::types::Role;

/// Bearer token payload. Tokens are issued by the identity provider; the
/// `token` CLI command mints them for local use.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    pub user_id: Uuid,
    pub email: Option<String>,
    pub role: Role,
    pub exp: i64,
    pub iat: i64,
}

impl Claims {
    pub fn new(user_id: Uuid, email: Option<String>, role: Role) -> Self {
        let now = Utc::now();
        let expiry_hours = config::config().security.jwt_expiry_hours;
        let exp = (now + Duration::hours(expiry_hours as i64)).timestamp();

        Self {
            user_id,
            email,
            role,
            exp,
            iat: now.timestamp(),
        }
    }
}

#[derive(Debug, Error)]
pub enum JwtError {
    #[error("JWT generation error: {0}")]
    TokenGeneration(String),
    #[error("Invalid JWT token: {0}")]
    InvalidToken(String),
    #[error("JWT secret not configured")]
    InvalidSecret,
}

pub fn generate_jwt(claims: &Claims) -> Result<String, JwtError> {
    generate_jwt_with_secret(claims, &config::config().security.jwt_secret)
}

pub fn generate_jwt_with_secret(claims: &Claims, secret: &str) -> Result<String, JwtError> {
    if secret.is_empty() {
        return Err(JwtError::InvalidSecret);
    }

    let encoding_key = EncodingKey::from_secret(secret.as_bytes());
    encode(&Header::default(), claims, &encoding_key).map_err(|e| JwtError::TokenGeneration(e.to_string()))
}

pub fn verify_jwt(token: &str) -> Result<Claims, JwtError> {
    verify_jwt_with_secret(token, &config::config().security.jwt_secret)
}

pub fn verify_jwt_with_secret(token: &str, secret: &str) -> Result<Claims, JwtError> {
    if secret.is_empty() {
        return Err(JwtError::InvalidSecret);
    }

    let decoding_key = DecodingKey::from_secret(secret.as_bytes());
    decode::<Claims>(token, &decoding_key, &Validation::default())
        .map(|data| data.claims)
        .map_err(|e| JwtError::InvalidToken(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    const SECRET: &str = "unit-test-secret";

    #[test]
    fn token_round_trips_claims() {
        let user = Uuid::new_v4();
        let claims = Claims::new(user, Some("siti@cadre.test".into()), Role::Learner);
        let token = generate_jwt_with_secret(&claims, SECRET).unwrap();

        let decoded = verify_jwt_with_secret(&token, SECRET).unwrap();
        assert_eq!(decoded.user_id, user);
        assert_eq!(decoded.role, Role::Learner);
        assert_eq!(decoded.email.as_deref(), Some("siti@cadre.test"));
    }

    #[test]
    fn wrong_secret_is_rejected() {
        let claims = Claims::new(Uuid::new_v4(), None, Role::Admin);
        let token = generate_jwt_with_secret(&claims, SECRET).unwrap();
        assert!(matches!(
            verify_jwt_with_secret(&token, "another-secret"),
            Err(JwtError::InvalidToken(_))
        ));
    }

    #[test]
    fn expired_token_is_rejected() {
        let mut claims = Claims::new(Uuid::new_v4(), None, Role::Learner);
        claims.exp = (Utc::now() - Duration::hours(2)).timestamp();
        let token = generate_jwt_with_secret(&claims, SECRET).unwrap();
        assert!(verify_jwt_with_secret(&token, SECRET).is_err());
    }

    #[test]
    fn empty_secret_is_refused() {
        let claims = Claims::new(Uuid::new_v4(), None, Role::Learner);
        assert!(matches!(generate_jwt_with_secret(&claims, ""), Err(JwtError::InvalidSecret)));
    }
}
