use argon2::{
    password_hash::{rand_core::OsRng, PasswordHash, PasswordHasher, PasswordVerifier, SaltString},
    Argon2,
};
use axum::{async_trait, extract::FromRequestParts, http::request::Parts, RequestPartsExt};
use axum_extra::{
    headers::{authorization::Bearer, Authorization},
    TypedHeader,
};
use serde::{Deserialize, Serialize};
use sqlx::PgPool;
use uuid::Uuid;
use validator::Validate;

use crate::error::ApiError;
use crate::models::User;
use crate::state::AppState;
use crate::validation::{normalize_email, validate_name};

#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    /// Carries the email; the field name is part of the wire contract.
    pub username: String,
    pub password: String,
}

#[derive(Debug, Serialize)]
pub struct TokenResponse {
    pub token: String,
}

#[derive(Debug, Deserialize, Validate)]
pub struct SignupRequest {
    #[validate(email, length(max = 255))]
    pub email: String,
    #[validate(length(min = 1, max = 100), custom(function = "validate_name"))]
    pub name: String,
    #[validate(length(min = 1, max = 128))]
    pub password: String,
}

/// Hash password using Argon2
pub fn hash_password(password: &str) -> Result<String, ApiError> {
    let salt = SaltString::generate(&mut OsRng);
    let argon2 = Argon2::default();
    argon2
        .hash_password(password.as_bytes(), &salt)
        .map(|hash| hash.to_string())
        .map_err(|_| ApiError::PasswordHash)
}

/// Verify password against hash
pub fn verify_password(password: &str, hash: &str) -> Result<bool, ApiError> {
    let parsed_hash = PasswordHash::new(hash).map_err(|_| ApiError::PasswordHash)?;
    Ok(Argon2::default()
        .verify_password(password.as_bytes(), &parsed_hash)
        .is_ok())
}

// Opaque token material: two v4 UUIDs, 64 hex chars.
fn generate_token_key() -> String {
    format!("{}{}", Uuid::new_v4().simple(), Uuid::new_v4().simple())
}

/// Return the user's bearer token, creating it on first login.
///
/// The no-op upsert keeps this a single round trip: on conflict the
/// existing key is returned untouched, so a user only ever has one token.
pub async fn issue_token(pool: &PgPool, user_id: Uuid) -> Result<String, ApiError> {
    let key = sqlx::query_scalar::<_, String>(
        r#"
        INSERT INTO auth_tokens (key, user_id)
        VALUES ($1, $2)
        ON CONFLICT (user_id) DO UPDATE SET key = auth_tokens.key
        RETURNING key
        "#,
    )
    .bind(generate_token_key())
    .bind(user_id)
    .fetch_one(pool)
    .await?;

    Ok(key)
}

/// Create a regular user. The password is hashed here and nowhere else.
pub async fn create_user(
    pool: &PgPool,
    email: &str,
    name: &str,
    password: &str,
) -> Result<User, ApiError> {
    insert_user(pool, email, name, password, false).await
}

/// Create a user with elevated flags forced on, regardless of input.
pub async fn create_superuser(
    pool: &PgPool,
    email: &str,
    name: &str,
    password: &str,
) -> Result<User, ApiError> {
    insert_user(pool, email, name, password, true).await
}

async fn insert_user(
    pool: &PgPool,
    email: &str,
    name: &str,
    password: &str,
    is_staff: bool,
) -> Result<User, ApiError> {
    let email = normalize_email(email);
    if email.is_empty() {
        return Err(ApiError::Validation("The Email field must be set".into()));
    }
    let password_hash = hash_password(password)?;

    let user = sqlx::query_as::<_, User>(
        r#"
        INSERT INTO users (email, name, password_hash, is_staff)
        VALUES ($1, $2, $3, $4)
        RETURNING *
        "#,
    )
    .bind(&email)
    .bind(name.trim())
    .bind(&password_hash)
    .bind(is_staff)
    .fetch_one(pool)
    .await
    .map_err(|e| {
        if let sqlx::Error::Database(ref db_err) = e {
            if db_err.constraint() == Some("users_email_key") {
                return ApiError::Validation("user with this email already exists.".into());
            }
        }
        ApiError::Database(e)
    })?;

    Ok(user)
}

/// Verify credentials and hand out the caller's token.
///
/// Unknown email, inactive account and wrong password all collapse into
/// the same `InvalidCredentials` response.
pub async fn login(pool: &PgPool, req: LoginRequest) -> Result<TokenResponse, ApiError> {
    let email = normalize_email(&req.username);
    let user = sqlx::query_as::<_, User>("SELECT * FROM users WHERE email = $1 AND is_active")
        .bind(&email)
        .fetch_optional(pool)
        .await?
        .ok_or(ApiError::InvalidCredentials)?;

    if !verify_password(&req.password, &user.password_hash)? {
        return Err(ApiError::InvalidCredentials);
    }

    let token = issue_token(pool, user.id).await?;
    Ok(TokenResponse { token })
}

/// Authenticated caller, resolved from the bearer token for each request.
#[derive(Debug, Clone)]
pub struct AuthUser {
    pub id: Uuid,
}

#[async_trait]
impl FromRequestParts<AppState> for AuthUser {
    type Rejection = ApiError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let TypedHeader(Authorization(bearer)) = parts
            .extract::<TypedHeader<Authorization<Bearer>>>()
            .await
            .map_err(|_| ApiError::InvalidToken)?;

        let user_id = sqlx::query_scalar::<_, Uuid>(
            r#"
            SELECT u.id
            FROM auth_tokens t
            JOIN users u ON u.id = t.user_id
            WHERE t.key = $1 AND u.is_active
            "#,
        )
        .bind(bearer.token())
        .fetch_optional(&state.db)
        .await?
        .ok_or(ApiError::InvalidToken)?;

        Ok(AuthUser { id: user_id })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hashed_password_never_equals_plaintext() {
        let hash = hash_password("hunter2hunter2").unwrap();
        assert_ne!(hash, "hunter2hunter2");
        assert!(hash.starts_with("$argon2"));
    }

    #[test]
    fn password_verification_round_trips() {
        let hash = hash_password("correct horse battery staple").unwrap();
        assert!(verify_password("correct horse battery staple", &hash).unwrap());
        assert!(!verify_password("wrong password", &hash).unwrap());
    }

    #[test]
    fn verification_fails_cleanly_on_garbage_hash() {
        assert!(verify_password("anything", "not-a-phc-string").is_err());
    }

    #[test]
    fn token_keys_are_opaque_and_unique() {
        let a = generate_token_key();
        let b = generate_token_key();
        assert_eq!(a.len(), 64);
        assert!(a.chars().all(|c| c.is_ascii_hexdigit()));
        assert_ne!(a, b);
    }

    #[test]
    fn signup_request_validation_catches_bad_input() {
        let bad_email = SignupRequest {
            email: "not-an-email".into(),
            name: "Alice".into(),
            password: "password".into(),
        };
        assert!(bad_email.validate().is_err());

        let blank_name = SignupRequest {
            email: "alice@example.com".into(),
            name: "   ".into(),
            password: "password".into(),
        };
        assert!(blank_name.validate().is_err());

        let ok = SignupRequest {
            email: "alice@example.com".into(),
            name: "Alice".into(),
            password: "password".into(),
        };
        assert!(ok.validate().is_ok());
    }
}
