//! Rate limiting middleware
//!
//! Guards the chat send route with the process-wide fixed-window limiter

use crate::services::FixedWindowLimiter;
use crate::utils::error::AppError;
use axum::{
    extract::{Request, State},
    middleware::Next,
    response::Response,
};
use std::sync::Arc;
use tracing::{debug, warn};

/// Admit the request or reject it with 429
///
/// Queued requests stay here until the next window opens.
pub async fn chat_rate_limit_middleware(
    State(limiter): State<Arc<FixedWindowLimiter>>,
    request: Request,
    next: Next,
) -> Result<Response, AppError> {
    debug!("Executing chat rate limit check");

    if let Err(e) = limiter.acquire().await {
        warn!("Chat rate limit exceeded for {}", request.uri().path());
        return Err(e.into());
    }

    Ok(next.run(request).await)
}
