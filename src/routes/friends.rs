use axum::{
    extract::{Path, State},
    http::StatusCode,
    routing::{get, post, put},
    Json, Router,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

use crate::auth::AuthUser;
use crate::error::ApiError;
use crate::models::{FriendRequest, RequestStatus, UserSummary};
use crate::state::AppState;

const MAX_REQUESTS_PER_MINUTE: i64 = 3;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/friend-request/", post(send_request))
        .route("/friend-request/:id/", put(respond).patch(respond))
        .route("/friends/", get(list_friends))
        .route("/pending-requests/", get(list_pending))
}

#[derive(Debug, Deserialize)]
pub struct SendFriendRequest {
    pub receiver: Uuid,
}

#[derive(Debug, Serialize, FromRow)]
pub struct FriendRequestCreated {
    pub id: Uuid,
    pub receiver: Uuid,
    pub status: String,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Deserialize)]
pub struct RespondRequest {
    pub status: RequestStatus,
}

#[derive(Debug, Serialize)]
pub struct StatusResponse {
    pub status: String,
}

#[derive(Debug, Serialize, FromRow)]
pub struct PendingRequest {
    pub id: Uuid,
    pub sender: Uuid,
    pub receiver: Uuid,
    pub status: String,
    pub timestamp: DateTime<Utc>,
}

/// Send a friend request
async fn send_request(
    State(state): State<AppState>,
    user: AuthUser,
    Json(req): Json<SendFriendRequest>,
) -> Result<(StatusCode, Json<FriendRequestCreated>), ApiError> {
    if req.receiver == user.id {
        return Err(ApiError::Validation(
            "Cannot send a friend request to yourself.".into(),
        ));
    }

    let receiver = sqlx::query_scalar::<_, Uuid>("SELECT id FROM users WHERE id = $1")
        .bind(req.receiver)
        .fetch_optional(&state.db)
        .await?
        .ok_or_else(|| ApiError::NotFound("Receiver not found".into()))?;

    let mut tx = state.db.begin().await?;

    // Per-sender lock: the window count and the insert must be atomic or
    // parallel requests can slip past the limit.
    sqlx::query("SELECT pg_advisory_xact_lock(hashtextextended($1, 0))")
        .bind(user.id.to_string())
        .execute(&mut *tx)
        .await?;

    let recent = sqlx::query_scalar::<_, i64>(
        r#"
        SELECT COUNT(*) FROM friend_requests
        WHERE sender_id = $1 AND created_at >= NOW() - INTERVAL '60 seconds'
        "#,
    )
    .bind(user.id)
    .fetch_one(&mut *tx)
    .await?;

    if recent >= MAX_REQUESTS_PER_MINUTE {
        tracing::warn!(sender_id = %user.id, "friend request rate limit hit");
        return Err(ApiError::Validation(
            "Cannot send more than 3 friend requests within a minute.".into(),
        ));
    }

    let created = sqlx::query_as::<_, FriendRequestCreated>(
        r#"
        INSERT INTO friend_requests (sender_id, receiver_id)
        VALUES ($1, $2)
        RETURNING id, receiver_id AS receiver, status, created_at AS timestamp
        "#,
    )
    .bind(user.id)
    .bind(receiver)
    .fetch_one(&mut *tx)
    .await?;

    tx.commit().await?;

    Ok((StatusCode::CREATED, Json(created)))
}

/// Accept or reject a friend request (receiver only)
async fn respond(
    State(state): State<AppState>,
    user: AuthUser,
    Path(request_id): Path<Uuid>,
    Json(req): Json<RespondRequest>,
) -> Result<Json<StatusResponse>, ApiError> {
    let request =
        sqlx::query_as::<_, FriendRequest>("SELECT * FROM friend_requests WHERE id = $1")
            .bind(request_id)
            .fetch_optional(&state.db)
            .await?
            .ok_or_else(|| ApiError::NotFound("Friend request not found".into()))?;

    if request.receiver_id != user.id {
        return Err(ApiError::Forbidden(
            "You are not authorized to accept or reject this friend request.".into(),
        ));
    }

    // Sender, receiver and timestamp stay as created; only status moves.
    sqlx::query("UPDATE friend_requests SET status = $1 WHERE id = $2")
        .bind(req.status.as_str())
        .bind(request.id)
        .execute(&state.db)
        .await?;

    Ok(Json(StatusResponse {
        status: req.status.as_str().to_string(),
    }))
}

/// Get all accepted friends
async fn list_friends(
    State(state): State<AppState>,
    user: AuthUser,
) -> Result<Json<Vec<UserSummary>>, ApiError> {
    let friends = sqlx::query_as::<_, UserSummary>(
        r#"
        SELECT DISTINCT u.id, u.email, u.name
        FROM friend_requests f
        JOIN users u ON (
            (f.receiver_id = u.id AND f.sender_id = $1)
            OR (f.sender_id = u.id AND f.receiver_id = $1)
        )
        WHERE f.status = 'accepted'
        AND u.id != $1
        "#,
    )
    .bind(user.id)
    .fetch_all(&state.db)
    .await?;

    Ok(Json(friends))
}

/// List pending friend requests (received)
async fn list_pending(
    State(state): State<AppState>,
    user: AuthUser,
) -> Result<Json<Vec<PendingRequest>>, ApiError> {
    let pending = sqlx::query_as::<_, PendingRequest>(
        r#"
        SELECT id, sender_id AS sender, receiver_id AS receiver, status, created_at AS timestamp
        FROM friend_requests
        WHERE receiver_id = $1 AND status = 'pending'
        "#,
    )
    .bind(user.id)
    .fetch_all(&state.db)
    .await?;

    Ok(Json(pending))
}
