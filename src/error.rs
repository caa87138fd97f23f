use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};

#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("Unable to log in with provided credentials.")]
    InvalidCredentials,
    #[error("Invalid token")]
    InvalidToken,
    #[error("{0}")]
    Validation(String),
    #[error("{0}")]
    Forbidden(String),
    #[error("{0}")]
    NotFound(String),
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("Password hash error")]
    PasswordHash,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, body) = match &self {
            // Login failures keep the legacy non_field_errors shape.
            ApiError::InvalidCredentials => (
                StatusCode::BAD_REQUEST,
                serde_json::json!({ "non_field_errors": [self.to_string()] }),
            ),
            ApiError::InvalidToken => (
                StatusCode::UNAUTHORIZED,
                serde_json::json!({ "error": self.to_string() }),
            ),
            ApiError::Validation(_) => (
                StatusCode::BAD_REQUEST,
                serde_json::json!({ "error": self.to_string() }),
            ),
            ApiError::Forbidden(_) => (
                StatusCode::FORBIDDEN,
                serde_json::json!({ "error": self.to_string() }),
            ),
            ApiError::NotFound(_) => (
                StatusCode::NOT_FOUND,
                serde_json::json!({ "error": self.to_string() }),
            ),
            ApiError::Database(e) => {
                tracing::error!("database error: {e}");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    serde_json::json!({ "error": "Database error" }),
                )
            }
            ApiError::PasswordHash => (
                StatusCode::INTERNAL_SERVER_ERROR,
                serde_json::json!({ "error": "Server error" }),
            ),
        };
        (status, Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::to_bytes;

    async fn body_json(response: Response) -> serde_json::Value {
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn login_failure_uses_non_field_errors_shape() {
        let response = ApiError::InvalidCredentials.into_response();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);

        let body = body_json(response).await;
        assert_eq!(
            body,
            serde_json::json!({
                "non_field_errors": ["Unable to log in with provided credentials."]
            })
        );
    }

    #[tokio::test]
    async fn variants_map_to_expected_statuses() {
        let cases = [
            (
                ApiError::Validation("bad".into()),
                StatusCode::BAD_REQUEST,
            ),
            (ApiError::InvalidToken, StatusCode::UNAUTHORIZED),
            (
                ApiError::Forbidden("no".into()),
                StatusCode::FORBIDDEN,
            ),
            (
                ApiError::NotFound("missing".into()),
                StatusCode::NOT_FOUND,
            ),
            (ApiError::PasswordHash, StatusCode::INTERNAL_SERVER_ERROR),
        ];
        for (error, expected) in cases {
            assert_eq!(error.into_response().status(), expected);
        }
    }

    #[tokio::test]
    async fn database_errors_never_leak_details() {
        let error = ApiError::Database(sqlx::Error::RowNotFound);
        let response = error.into_response();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);

        let body = body_json(response).await;
        assert_eq!(body, serde_json::json!({ "error": "Database error" }));
    }
}
