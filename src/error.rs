use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;
use tracing::error;

/// Every failure an API operation can surface.
#[derive(Debug, Error)]
pub enum AppError {
    #[error("{0}")]
    Validation(String),

    #[error("{0}")]
    Auth(String),

    #[error("{0}")]
    AccountLocked(String),

    #[error("{0}")]
    Forbidden(String),

    #[error("{0}")]
    InvalidToken(String),

    #[error("{0}")]
    Delivery(String),

    #[error("{0}")]
    NotFound(String),

    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

pub type AppResult<T> = Result<T, AppError>;

impl AppError {
    pub fn validation<T: Into<String>>(msg: T) -> Self {
        Self::Validation(msg.into())
    }

    pub fn auth<T: Into<String>>(msg: T) -> Self {
        Self::Auth(msg.into())
    }

    pub fn not_found<T: Into<String>>(msg: T) -> Self {
        Self::NotFound(msg.into())
    }

    pub fn status_code(&self) -> StatusCode {
        match self {
            AppError::Validation(_) | AppError::InvalidToken(_) => StatusCode::BAD_REQUEST,
            AppError::Auth(_) => StatusCode::UNAUTHORIZED,
            AppError::AccountLocked(_) | AppError::Forbidden(_) => StatusCode::FORBIDDEN,
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::Delivery(_) | AppError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Expected failures carry a message meant for the client.
    pub fn is_operational(&self) -> bool {
        !matches!(self, AppError::Internal(_))
    }
}

impl From<sqlx::Error> for AppError {
    fn from(err: sqlx::Error) -> Self {
        if let sqlx::Error::RowNotFound = err {
            return AppError::not_found("No document found with that ID");
        }
        match classify_db_error(&err) {
            Some(mapped) => mapped,
            None => AppError::Internal(err.into()),
        }
    }
}

/// Postgres errors caused by bad client input.
fn classify_db_error(err: &sqlx::Error) -> Option<AppError> {
    let db = err.as_database_error()?;
    let code = db.code()?;
    match code.as_ref() {
        // unique_violation
        "23505" => Some(AppError::validation(format!(
            "Duplicate field value{}. Please use another value!",
            db.constraint().map(|c| format!(" ({c})")).unwrap_or_default()
        ))),
        // check_violation, not_null_violation, foreign_key_violation
        "23514" | "23502" | "23503" => Some(AppError::validation(format!(
            "Invalid input data. {}",
            db.message()
        ))),
        // invalid_text_representation, invalid_datetime_format, numeric_value_out_of_range
        "22P02" | "22007" | "22003" => {
            Some(AppError::validation(format!("Invalid value: {}", db.message())))
        }
        _ => None,
    }
}

/// Full rendering of an unexpected error, carried on its response as an
/// extension and only written out by [`expose_error_details`].
#[derive(Debug, Clone)]
pub struct ErrorDetail {
    pub message: String,
    pub error: String,
    pub stack: String,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let label = if status.is_client_error() { "fail" } else { "error" };

        if self.is_operational() {
            let body = json!({ "status": label, "message": self.to_string() });
            return (status, Json(body)).into_response();
        }

        error!(error = ?self, "unhandled error");
        let detail = ErrorDetail {
            message: self.to_string(),
            error: format!("{:#}", self),
            stack: format!("{:?}", self),
        };
        let body = json!({ "status": label, "message": "Something went very wrong!" });
        let mut response = (status, Json(body)).into_response();
        response.extensions_mut().insert(detail);
        response
    }
}

/// Development rendering: replaces the generic body of unexpected errors
/// with their message, error chain and debug output.
pub async fn expose_error_details(mut response: Response) -> Response {
    match response.extensions_mut().remove::<ErrorDetail>() {
        Some(detail) => {
            let body = json!({
                "status": "error",
                "message": detail.message,
                "error": detail.error,
                "stack": detail.stack,
            });
            (response.status(), Json(body)).into_response()
        }
        None => response,
    }
}
