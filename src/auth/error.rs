use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
};
use tracing::error;

/// Expected, user-facing auth failures plus a catch-all for everything
/// unexpected (storage, hashing). Each variant maps to exactly one status
/// code at the HTTP boundary.
#[derive(Debug, thiserror::Error)]
pub enum AuthError {
    #[error("{0}")]
    InvalidRequest(String),
    #[error("Email already registered")]
    EmailTaken,
    #[error("Invalid credentials")]
    InvalidCredentials,
    #[error("Invalid refresh token")]
    InvalidRefreshToken,
    #[error("User not found")]
    UserNotFound,
    #[error("Invalid or expired token")]
    Unauthenticated,
    #[error("Missing Authorization header")]
    MissingAuthHeader,
    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

impl AuthError {
    pub fn status(&self) -> StatusCode {
        match self {
            AuthError::InvalidRequest(_) | AuthError::EmailTaken => StatusCode::BAD_REQUEST,
            AuthError::InvalidCredentials
            | AuthError::InvalidRefreshToken
            | AuthError::UserNotFound
            | AuthError::Unauthenticated => StatusCode::UNAUTHORIZED,
            AuthError::MissingAuthHeader => StatusCode::FORBIDDEN,
            AuthError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for AuthError {
    fn into_response(self) -> Response {
        if let AuthError::Internal(e) = &self {
            error!(error = %e, "internal error");
            return (StatusCode::INTERNAL_SERVER_ERROR, "Internal server error".to_string())
                .into_response();
        }
        (self.status(), self.to_string()).into_response()
    }
}
