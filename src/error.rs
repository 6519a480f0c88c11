use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use tracing::error;

use crate::auth::{jwt::TokenError, repo_types::RepoError};

/// Coarse failure class; decides the HTTP status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    Validation,
    Auth,
    NotFound,
    Conflict,
    Internal,
}

impl ErrorKind {
    pub fn status(self) -> StatusCode {
        match self {
            ErrorKind::Validation => StatusCode::BAD_REQUEST,
            ErrorKind::Auth => StatusCode::UNAUTHORIZED,
            ErrorKind::NotFound => StatusCode::NOT_FOUND,
            // Duplicate emails answer 400, matching existing clients.
            ErrorKind::Conflict => StatusCode::BAD_REQUEST,
            ErrorKind::Internal => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error("No data provided")]
    NoData,
    #[error("{0}")]
    MissingField(&'static str),
    #[error("Invalid email format")]
    InvalidEmail,
    #[error("{0}")]
    WeakPassword(&'static str),
    #[error("{field} must be at most {max} characters long")]
    FieldTooLong { field: &'static str, max: usize },
    #[error("User already exists with this email")]
    DuplicateEmail,
    #[error("{0}")]
    InvalidCredentials(&'static str),
    #[error("Account is deactivated")]
    AccountDeactivated,
    #[error(transparent)]
    Token(#[from] TokenError),
    #[error("User not found")]
    UserNotFound,
    #[error("Internal server error")]
    Internal(#[from] anyhow::Error),
}

impl AppError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            AppError::NoData
            | AppError::MissingField(_)
            | AppError::InvalidEmail
            | AppError::WeakPassword(_)
            | AppError::FieldTooLong { .. } => ErrorKind::Validation,
            AppError::InvalidCredentials(_) | AppError::AccountDeactivated | AppError::Token(_) => {
                ErrorKind::Auth
            }
            AppError::UserNotFound => ErrorKind::NotFound,
            AppError::DuplicateEmail => ErrorKind::Conflict,
            AppError::Internal(_) => ErrorKind::Internal,
        }
    }

    /// Stable machine-readable code sent as `error`.
    pub fn code(&self) -> &'static str {
        match self {
            AppError::NoData => "no_data",
            AppError::MissingField(_) => "missing_field",
            AppError::InvalidEmail => "invalid_email",
            AppError::WeakPassword(_) => "weak_password",
            AppError::FieldTooLong { .. } => "field_too_long",
            AppError::DuplicateEmail => "duplicate_email",
            AppError::InvalidCredentials(_) => "invalid_credentials",
            AppError::AccountDeactivated => "account_deactivated",
            AppError::Token(TokenError::Missing) => "authorization_required",
            AppError::Token(TokenError::Expired) => "token_expired",
            AppError::Token(TokenError::Invalid) => "invalid_token",
            AppError::UserNotFound => "user_not_found",
            AppError::Internal(_) => "internal_error",
        }
    }

    pub fn status(&self) -> StatusCode {
        self.kind().status()
    }
}

impl From<RepoError> for AppError {
    fn from(e: RepoError) -> Self {
        match e {
            RepoError::DuplicateEmail => AppError::DuplicateEmail,
            RepoError::NotFound => AppError::UserNotFound,
            RepoError::Backend(e) => AppError::Internal(e),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct ErrorBody {
    pub message: String,
    pub error: &'static str,
    pub kind: ErrorKind,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        if let AppError::Internal(e) = &self {
            error!(error = ?e, "request failed");
        }
        let body = Json(ErrorBody {
            message: self.to_string(),
            error: self.code(),
            kind: self.kind(),
        });
        (self.status(), body).into_response()
    }
}
