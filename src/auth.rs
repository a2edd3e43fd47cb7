use argon2::{
    password_hash::{rand_core::OsRng, PasswordHash, PasswordHasher, PasswordVerifier, SaltString},
    Argon2,
};
use axum::http::{header::AUTHORIZATION, HeaderMap};
use chrono::{Duration, Utc};
use jsonwebtoken::{decode, encode, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::{
    config::AppConfig,
    error::{AppError, AppResult},
    models::Role,
    repository::{table_service::get_row, val_str},
    state::{db_pool, AppState},
};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    pub sub: String,
    pub role: Role,
    pub iat: i64,
    pub exp: i64,
}

/// The caller behind a verified bearer token.
#[derive(Debug, Clone, Serialize)]
pub struct AuthUser {
    pub id: String,
    pub role: Role,
    pub name: String,
    pub phone: String,
}

impl AuthUser {
    pub fn is_admin(&self) -> bool {
        self.role == Role::Admin
    }

    pub fn from_row(row: &Value) -> Option<Self> {
        let id = val_str(row, "id");
        let role = Role::parse(&val_str(row, "role"))?;
        if id.is_empty() {
            return None;
        }
        Some(Self {
            id,
            role,
            name: val_str(row, "name"),
            phone: val_str(row, "phone"),
        })
    }
}

pub fn hash_password(password: &str) -> AppResult<String> {
    let salt = SaltString::generate(&mut OsRng);
    Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map(|hash| hash.to_string())
        .map_err(|error| {
            tracing::error!(error = %error, "Password hashing failed");
            AppError::Internal("Could not hash password.".to_string())
        })
}

/// False for a wrong password and for a stored value that is not a valid
/// argon2 hash.
pub fn verify_password(password: &str, stored_hash: &str) -> bool {
    let Ok(parsed) = PasswordHash::new(stored_hash) else {
        return false;
    };
    Argon2::default()
        .verify_password(password.as_bytes(), &parsed)
        .is_ok()
}

fn jwt_secret(config: &AppConfig) -> AppResult<&str> {
    config
        .jwt_secret
        .as_deref()
        .ok_or_else(|| AppError::ServiceUnavailable("JWT_SECRET is not configured.".to_string()))
}

pub fn issue_token(config: &AppConfig, user_id: &str, role: Role) -> AppResult<String> {
    let secret = jwt_secret(config)?;
    let now = Utc::now();
    let claims = Claims {
        sub: user_id.to_string(),
        role,
        iat: now.timestamp(),
        exp: (now + Duration::hours(config.jwt_ttl_hours.max(1))).timestamp(),
    };
    encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(secret.as_bytes()),
    )
    .map_err(|error| AppError::Internal(format!("Could not issue token: {error}")))
}

pub fn decode_token(config: &AppConfig, token: &str) -> AppResult<Claims> {
    let secret = jwt_secret(config)?;
    decode::<Claims>(
        token,
        &DecodingKey::from_secret(secret.as_bytes()),
        &Validation::default(),
    )
    .map(|data| data.claims)
    .map_err(|_| AppError::Unauthorized("Unauthorized: invalid or expired token.".to_string()))
}

fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    headers
        .get(AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| {
            value
                .strip_prefix("Bearer ")
                .or_else(|| value.strip_prefix("bearer "))
        })
        .map(str::trim)
        .filter(|token| !token.is_empty())
}

/// Resolves the bearer token to a user that still exists. The role comes
/// from the users table, not the token, so role changes apply once the
/// cache entry expires.
pub async fn require_user(state: &AppState, headers: &HeaderMap) -> AppResult<AuthUser> {
    let token = bearer_token(headers)
        .ok_or_else(|| AppError::Unauthorized("Unauthorized: missing bearer token.".to_string()))?;
    let claims = decode_token(&state.config, token)?;

    if let Some(user) = state.user_cache.get(&claims.sub).await {
        return Ok(user);
    }

    let pool = db_pool(state)?;
    let row = match get_row(pool, "users", &claims.sub, "id").await {
        Ok(row) => row,
        Err(AppError::NotFound(_)) => {
            return Err(AppError::Unauthorized(
                "Unauthorized: user no longer exists.".to_string(),
            ))
        }
        Err(error) => return Err(error),
    };
    let user = AuthUser::from_row(&row)
        .ok_or_else(|| AppError::Unauthorized("Unauthorized: invalid user record.".to_string()))?;

    state.user_cache.insert(claims.sub, user.clone()).await;
    Ok(user)
}

pub fn require_role(user: &AuthUser, allowed: &[Role]) -> AppResult<()> {
    if allowed.contains(&user.role) {
        return Ok(());
    }
    Err(AppError::Forbidden(format!(
        "Forbidden: role '{}' is not allowed for this action.",
        user.role
    )))
}
