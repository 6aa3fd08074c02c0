use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

/// Domain error surfaced by every command and query.
///
/// Variants fall into four buckets: validation, authorization,
/// state-conflict and not-found. Anything else (store unavailable,
/// serialization glitches) collapses into the transient variants and is
/// reported to the caller as a generic failure.
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("{0}")]
    Validation(String),
    #[error("not authorized")]
    NotAuthorized,
    #[error("invalid password")]
    InvalidPassword,
    #[error("the group is full")]
    CapacityExceeded,
    #[error("the group is closed to new members")]
    GroupClosed,
    #[error("the group is frozen")]
    GroupFrozen,
    #[error("assignments have already been drawn")]
    AlreadyFrozen,
    #[error("assignments have not been drawn yet")]
    NotFrozen,
    #[error("that name is already taken")]
    DuplicateName,
    #[error("you already joined this group")]
    AlreadyMember,
    #[error("not found")]
    NotFound,
    #[error(transparent)]
    Database(#[from] sqlx::Error),
    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

impl ApiError {
    pub fn validation(msg: impl Into<String>) -> Self {
        ApiError::Validation(msg.into())
    }

    fn status(&self) -> StatusCode {
        match self {
            ApiError::Validation(_) => StatusCode::BAD_REQUEST,
            ApiError::NotAuthorized | ApiError::InvalidPassword => StatusCode::FORBIDDEN,
            ApiError::CapacityExceeded
            | ApiError::GroupClosed
            | ApiError::GroupFrozen
            | ApiError::AlreadyFrozen
            | ApiError::NotFrozen
            | ApiError::DuplicateName
            | ApiError::AlreadyMember => StatusCode::CONFLICT,
            ApiError::NotFound => StatusCode::NOT_FOUND,
            ApiError::Database(_) | ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        let message = match &self {
            ApiError::Database(e) => {
                tracing::error!("database error: {e}");
                "something went wrong, please retry".to_string()
            }
            ApiError::Internal(e) => {
                tracing::error!("internal error: {e}");
                "something went wrong, please retry".to_string()
            }
            other => other.to_string(),
        };
        (status, Json(json!({ "error": message }))).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn conflict_errors_map_to_409() {
        assert_eq!(ApiError::AlreadyFrozen.status(), StatusCode::CONFLICT);
        assert_eq!(ApiError::CapacityExceeded.status(), StatusCode::CONFLICT);
        assert_eq!(ApiError::DuplicateName.status(), StatusCode::CONFLICT);
    }

    #[test]
    fn transient_errors_hide_details() {
        let err = ApiError::Database(sqlx::Error::PoolClosed);
        let response = err.into_response();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }
}
