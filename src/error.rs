use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::Serialize;

/// The main error type for the clearway service.
#[derive(Debug, thiserror::Error)]
pub enum ClearwayError {
    #[error("{0}")]
    BadRequest(String),

    #[error("{0}")]
    NotFound(String),

    #[error("{0}")]
    ServiceUnavailable(String),

    #[error("Internal server error: {0}")]
    Internal(String),

    #[error("Database error: {0}")]
    Database(String),

    #[error(transparent)]
    Anyhow(#[from] anyhow::Error),
}

/// Standard error response body.
#[derive(Serialize)]
struct ErrorResponse {
    error: String,
}

impl ClearwayError {
    pub fn bad_request(msg: impl Into<String>) -> Self {
        Self::BadRequest(msg.into())
    }

    pub fn not_found(msg: impl Into<String>) -> Self {
        Self::NotFound(msg.into())
    }

    pub fn service_unavailable(msg: impl Into<String>) -> Self {
        Self::ServiceUnavailable(msg.into())
    }

    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal(msg.into())
    }

    fn status_code(&self) -> StatusCode {
        match self {
            Self::BadRequest(_) => StatusCode::BAD_REQUEST,
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::ServiceUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            Self::Internal(_) | Self::Database(_) | Self::Anyhow(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }

    /// Returns a message safe to expose to clients.
    ///
    /// Client errors (4xx) expose their message; server errors (5xx) return a
    /// generic message so internal details never leak to webhook senders. The
    /// full error is logged server-side.
    fn safe_message(&self) -> String {
        match self {
            Self::BadRequest(msg) | Self::NotFound(msg) | Self::ServiceUnavailable(msg) => {
                msg.clone()
            }
            Self::Internal(_) | Self::Database(_) | Self::Anyhow(_) => {
                "Internal server error".to_string()
            }
        }
    }
}

impl IntoResponse for ClearwayError {
    fn into_response(self) -> Response {
        let status = self.status_code();

        tracing::error!(
            status = status.as_u16(),
            error = %self,
            "Request failed"
        );

        let body = Json(ErrorResponse {
            error: self.safe_message(),
        });

        (status, body).into_response()
    }
}

/// Result type alias for clearway operations.
pub type Result<T> = std::result::Result<T, ClearwayError>;

impl From<serde_json::Error> for ClearwayError {
    fn from(err: serde_json::Error) -> Self {
        if err.is_data() || err.is_syntax() || err.is_eof() {
            ClearwayError::BadRequest(format!("Invalid JSON payload: {}", err))
        } else {
            ClearwayError::Internal(format!("JSON serialization error: {}", err))
        }
    }
}

#[cfg(feature = "database")]
impl From<sea_orm::DbErr> for ClearwayError {
    fn from(err: sea_orm::DbErr) -> Self {
        match &err {
            sea_orm::DbErr::RecordNotFound(msg) => ClearwayError::NotFound(if msg.is_empty() {
                "Record not found".to_string()
            } else {
                msg.clone()
            }),
            sea_orm::DbErr::Conn(inner) => {
                ClearwayError::Database(format!("Connection error: {}", inner))
            }
            _ => ClearwayError::Database(err.to_string()),
        }
    }
}
