//! Password hashing, bearer-token issuance and the auth middleware.

use anyhow::{Context, Result};
use argon2::{
    password_hash::{rand_core::OsRng, PasswordHash, PasswordHasher, PasswordVerifier, SaltString},
    Argon2,
};
use axum::{
    body::Body,
    http::{header::AUTHORIZATION, Request, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
};
use jsonwebtoken::{DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::config::AuthConfig;
use crate::models::User;
use crate::storage::Storage;

#[derive(Debug, Serialize, Deserialize)]
pub struct Claims {
    /// The user's email.
    pub sub: String,
    pub iat: i64,
    pub exp: i64,
}

/// Authenticated user, inserted as a request extension by the middleware.
#[derive(Clone)]
pub struct CurrentUser(pub User);

pub struct AuthService {
    jwt_secret: String,
    token_ttl_secs: i64,
}

impl AuthService {
    pub fn new(config: AuthConfig) -> Self {
        Self {
            jwt_secret: config.jwt_secret,
            token_ttl_secs: config.token_ttl_secs,
        }
    }

    pub fn create_access_token(&self, email: &str) -> Result<String> {
        let now = chrono::Utc::now().timestamp();
        let claims = Claims {
            sub: email.to_string(),
            iat: now,
            exp: now + self.token_ttl_secs,
        };
        jsonwebtoken::encode(
            &Header::default(),
            &claims,
            &EncodingKey::from_secret(self.jwt_secret.as_bytes()),
        )
        .context("Failed to create access token")
    }

    pub fn validate_access_token(&self, token: &str) -> Result<Claims> {
        let token_data = jsonwebtoken::decode::<Claims>(
            token,
            &DecodingKey::from_secret(self.jwt_secret.as_bytes()),
            &Validation::default(),
        )
        .context("Invalid access token")?;
        Ok(token_data.claims)
    }
}

/// Hash a password using argon2id.
pub fn hash_password(password: &str) -> Result<String> {
    let salt = SaltString::generate(&mut OsRng);
    let argon2 = Argon2::default();
    let hash = argon2
        .hash_password(password.as_bytes(), &salt)
        .map_err(|e| anyhow::anyhow!("Failed to hash password: {}", e))?;
    Ok(hash.to_string())
}

/// Verify a password against a stored hash.
pub fn verify_password(password: &str, hash: &str) -> Result<bool> {
    let parsed_hash =
        PasswordHash::new(hash).map_err(|e| anyhow::anyhow!("Invalid password hash: {}", e))?;
    Ok(Argon2::default()
        .verify_password(password.as_bytes(), &parsed_hash)
        .is_ok())
}

/// Validate the bearer token and resolve it to a user row, inserted as a
/// `CurrentUser` extension for downstream handlers.
pub async fn auth_middleware(
    auth: Arc<AuthService>,
    storage: Arc<dyn Storage>,
    mut request: Request<Body>,
    next: Next,
) -> Response {
    let token = request
        .headers()
        .get(AUTHORIZATION)
        .and_then(|h| h.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "));

    let Some(token) = token else {
        return unauthorized();
    };

    let claims = match auth.validate_access_token(token) {
        Ok(claims) => claims,
        Err(_) => return unauthorized(),
    };

    let user = match storage.get_user_by_email(&claims.sub).await {
        Ok(Some(user)) => user,
        Ok(None) => return unauthorized(),
        Err(err) => {
            tracing::error!(error = %err, "failed to load user during authentication");
            return (StatusCode::INTERNAL_SERVER_ERROR, "Internal server error").into_response();
        }
    };

    request.extensions_mut().insert(CurrentUser(user));
    next.run(request).await
}

fn unauthorized() -> Response {
    (StatusCode::UNAUTHORIZED, "Not authenticated").into_response()
}
