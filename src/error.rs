use axum::{
    http::{header, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
};
use serde_json::json;
use thiserror::Error;

pub type AppResult<T> = Result<T, AppError>;

/// Gateway error type
///
/// Every variant maps to a well-defined HTTP response; none of them is fatal
/// to the process.
#[derive(Error, Debug)]
pub enum AppError {
    // ===== Authentication Errors =====
    #[error("Missing API key. Include it in the X-API-KEY header.")]
    MissingCredential,

    #[error("Invalid or inactive API key.")]
    InvalidCredential,

    // ===== Throttling Errors =====
    #[error("Request was throttled. Expected available in {wait_secs} seconds.")]
    RateLimitExceeded { wait_secs: u64 },

    // ===== Routing Errors =====
    #[error("Service not found.")]
    ServiceNotFound,

    // ===== Upstream Errors =====
    #[error("Upstream service error: {0}")]
    UpstreamUnreachable(String),

    // ===== Request Errors =====
    #[error("Invalid request body: {0}")]
    InvalidRequestBody(String),

    // ===== Infrastructure Errors =====
    /// Cache or store failure surfaced through the storage traits
    #[error("Unknown error: {0}")]
    Unknown(#[from] anyhow::Error),
}

impl AppError {
    /// Get the HTTP status code for this error
    pub fn status_code(&self) -> StatusCode {
        match self {
            AppError::MissingCredential | AppError::InvalidCredential => StatusCode::UNAUTHORIZED,
            AppError::RateLimitExceeded { .. } => StatusCode::TOO_MANY_REQUESTS,
            AppError::ServiceNotFound => StatusCode::NOT_FOUND,
            AppError::UpstreamUnreachable(_) => StatusCode::BAD_GATEWAY,
            AppError::InvalidRequestBody(_) => StatusCode::BAD_REQUEST,
            AppError::Unknown(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Machine-readable code, for errors that carry one
    pub fn error_code(&self) -> Option<&'static str> {
        match self {
            AppError::MissingCredential => Some("missing_api_key"),
            AppError::InvalidCredential => Some("invalid_api_key"),
            AppError::RateLimitExceeded { .. } => Some("throttled"),
            AppError::InvalidRequestBody(_) => Some("invalid_body"),
            _ => None,
        }
    }

    /// Get a user-facing message (without internal details for server errors)
    pub fn user_message(&self) -> String {
        if self.status_code().is_server_error() && !matches!(self, AppError::UpstreamUnreachable(_))
        {
            return "Internal server error".to_string();
        }
        self.to_string()
    }

    /// Log this error with appropriate level and context
    pub fn log(&self) {
        let status = self.status_code();
        let code = self.error_code().unwrap_or("none");

        if status.is_server_error() {
            tracing::error!(
                error = %self,
                error_code = %code,
                status = %status.as_u16(),
                "Server error occurred"
            );
        } else if status == StatusCode::UNAUTHORIZED {
            tracing::warn!(error_code = %code, "Authentication failed");
        } else {
            tracing::debug!(
                error = %self,
                error_code = %code,
                status = %status.as_u16(),
                "Client error occurred"
            );
        }
    }

    /// JSON body in the `{"detail": ...}` shape callers expect
    pub fn body(&self) -> serde_json::Value {
        match self.error_code() {
            Some(code) => json!({ "detail": self.user_message(), "code": code }),
            None => json!({ "detail": self.user_message() }),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        self.log();

        let status = self.status_code();
        let mut response = (status, axum::Json(self.body())).into_response();

        match &self {
            AppError::MissingCredential | AppError::InvalidCredential => {
                response
                    .headers_mut()
                    .insert(header::WWW_AUTHENTICATE, HeaderValue::from_static("API-Key"));
            }
            AppError::RateLimitExceeded { wait_secs } => {
                response
                    .headers_mut()
                    .insert(header::RETRY_AFTER, HeaderValue::from(*wait_secs));
            }
            _ => {}
        }

        response
    }
}
