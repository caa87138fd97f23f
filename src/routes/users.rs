use axum::{
    extract::{Query, State},
    routing::get,
    Json, Router,
};
use serde::Deserialize;

use crate::auth::AuthUser;
use crate::error::ApiError;
use crate::models::UserSummary;
use crate::state::AppState;
use crate::validation::escape_like;

pub fn router() -> Router<AppState> {
    Router::new().route("/search/", get(search_users))
}

#[derive(Debug, Deserialize)]
pub struct SearchQuery {
    #[serde(default)]
    pub q: String,
}

/// Search users by exact email or name substring, excluding the caller.
///
/// An empty query matches every name, so it returns all users except the
/// caller. That edge case is part of the contract.
async fn search_users(
    State(state): State<AppState>,
    user: AuthUser,
    Query(query): Query<SearchQuery>,
) -> Result<Json<Vec<UserSummary>>, ApiError> {
    let users = sqlx::query_as::<_, UserSummary>(
        r#"
        SELECT id, email, name
        FROM users
        WHERE (LOWER(email) = LOWER($1) OR name ILIKE $2)
        AND id != $3
        "#,
    )
    .bind(&query.q)
    .bind(format!("%{}%", escape_like(&query.q)))
    .bind(user.id)
    .fetch_all(&state.db)
    .await?;

    Ok(Json(users))
}
