use axum::{http::StatusCode, response::IntoResponse};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum AppError {
    /// Malformed listing query or comparable data. Rejected before any external call.
    #[error("Validation error: {0}")]
    Validation(String),

    /// Market-data provider or text generator unreachable and no local recovery possible.
    #[error("Upstream unavailable: {0}")]
    UpstreamUnavailable(String),

    #[error("HTTP request error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("JSON parse error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Webhook dispatch outcome that exhausted or skipped retries. Returned next to a
/// successful analysis, never in place of it, so callers can re-dispatch later.
#[derive(Debug, Clone, Error)]
pub enum DeliveryError {
    #[error("permanent rejection (HTTP {status}): {body}")]
    Permanent { status: u16, body: String },

    #[error("gave up after {attempts} attempt(s): {last_error}")]
    Exhausted { attempts: u32, last_error: String },

    #[error("could not encode payload: {0}")]
    Encode(String),
}

pub type Result<T> = std::result::Result<T, AppError>;

impl IntoResponse for AppError {
    fn into_response(self) -> axum::response::Response {
        let status = match &self {
            AppError::Validation(_) => StatusCode::BAD_REQUEST,
            AppError::UpstreamUnavailable(_) => StatusCode::BAD_GATEWAY,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };
        (status, self.to_string()).into_response()
    }
}
