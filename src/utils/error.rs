//! Error handling module
//!
//! Maps admission and completion failures onto HTTP responses for the chat page

use crate::models::chat::ChatResponse;
use crate::services::{AdmissionError, CompletionError};
use crate::utils::logging::truncate_content;
use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use thiserror::Error;

/// What the browser sees for any upstream-side failure
pub const CHAT_FAILED_MESSAGE: &str = "Chat request failed. Check configuration and try again.";

/// Longest slice of an error kept in the server log
const MAX_LOGGED_ERROR_LEN: usize = 2000;

/// Application error types
#[derive(Error, Debug)]
pub enum AppError {
    /// Rejected before any upstream call
    #[error(transparent)]
    Admission(#[from] AdmissionError),

    /// Upstream exchange failed
    #[error("Chat completion failed: {0}")]
    Completion(#[from] CompletionError),
}

impl AppError {
    /// Get HTTP status code
    pub fn status_code(&self) -> StatusCode {
        match self {
            AppError::Admission(AdmissionError::RateLimited) => StatusCode::TOO_MANY_REQUESTS,
            AppError::Admission(_) => StatusCode::BAD_REQUEST,
            AppError::Completion(_) => StatusCode::BAD_GATEWAY,
        }
    }

    /// Get error type string
    pub fn error_type(&self) -> &'static str {
        match self {
            AppError::Admission(AdmissionError::RateLimited) => "rate_limit_error",
            AppError::Admission(_) => "invalid_request_error",
            AppError::Completion(CompletionError::Cancelled) => "cancelled_error",
            AppError::Completion(_) => "api_error",
        }
    }

    /// Message safe to show the caller
    ///
    /// Admission failures explain themselves; everything else is generic.
    pub fn user_message(&self) -> String {
        match self {
            AppError::Admission(e) => e.to_string(),
            AppError::Completion(_) => CHAT_FAILED_MESSAGE.to_string(),
        }
    }

    /// Whether the cause belongs in the error log
    pub fn should_log_details(&self) -> bool {
        !matches!(self, AppError::Admission(_))
    }

    /// Convert to the chat page's error body
    pub fn to_chat_response(&self) -> ChatResponse {
        ChatResponse::error(self.user_message())
    }
}

/// Implement IntoResponse trait to allow errors to be returned directly as HTTP responses
impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status_code();

        if self.should_log_details() {
            tracing::error!(
                "Chat request failed: {} - Status code: {}",
                truncate_content(&self.to_string(), MAX_LOGGED_ERROR_LEN),
                status
            );
        } else {
            tracing::warn!("Chat request rejected: {} - Status code: {}", self.error_type(), status);
        }

        (status, Json(self.to_chat_response())).into_response()
    }
}

/// Result type alias
pub type AppResult<T> = Result<T, AppError>;
