use axum::{extract::State, http::StatusCode, routing::post, Json, Router};
use validator::Validate;

use crate::auth::{self, LoginRequest, SignupRequest, TokenResponse};
use crate::error::ApiError;
use crate::models::UserSummary;
use crate::state::AppState;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/login/", post(login))
        .route("/signup/", post(signup))
}

async fn login(
    State(state): State<AppState>,
    Json(req): Json<LoginRequest>,
) -> Result<Json<TokenResponse>, ApiError> {
    let response = auth::login(&state.db, req).await?;
    Ok(Json(response))
}

async fn signup(
    State(state): State<AppState>,
    Json(req): Json<SignupRequest>,
) -> Result<(StatusCode, Json<UserSummary>), ApiError> {
    req.validate()
        .map_err(|e| ApiError::Validation(e.to_string()))?;

    let user = auth::create_user(&state.db, &req.email, &req.name, &req.password).await?;
    tracing::info!(user_id = %user.id, "new signup");

    Ok((StatusCode::CREATED, Json(user.into())))
}
