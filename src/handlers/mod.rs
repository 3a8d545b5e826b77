//! HTTP handlers module
//!
//! Contains all HTTP endpoint handling logic

pub mod chat;
pub mod health;

use crate::config::Settings;
use crate::middleware::{chat_rate_limit_middleware, request_logging_middleware};
use crate::services::{AzureOpenAIClient, ChatService, FixedWindowLimiter, SessionStore};
use anyhow::Result;
use axum::{
    http::HeaderValue,
    middleware::{from_fn, from_fn_with_state},
    routing::{get, post},
    Router,
};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tower::ServiceBuilder;
use tower_http::{
    cors::{AllowOrigin, Any, CorsLayer},
    limit::RequestBodyLimitLayer,
    trace::TraceLayer,
};
use tracing::{info, warn};

/// Application state
#[derive(Clone)]
pub struct AppState {
    pub settings: Settings,
    pub chat: Arc<dyn ChatService>,
    pub sessions: Arc<SessionStore>,
    pub limiter: Arc<FixedWindowLimiter>,
    pub started_at: Instant,
}

impl AppState {
    pub fn new(settings: Settings, chat: Arc<dyn ChatService>) -> Self {
        let sessions = Arc::new(SessionStore::new(Duration::from_secs(
            settings.session.idle_timeout,
        )));
        let limiter = Arc::new(FixedWindowLimiter::from_config(&settings.rate_limit));

        Self {
            settings,
            chat,
            sessions,
            limiter,
            started_at: Instant::now(),
        }
    }
}

/// Create application router backed by the Azure OpenAI client
pub async fn create_router(settings: Settings) -> Result<Router> {
    let client = AzureOpenAIClient::new(settings.completion.clone())?;

    if settings.completion.endpoint.is_none() {
        warn!("AZURE_OPENAI_ENDPOINT is not set; chat requests will fail");
    }

    if settings.uses_static_key() {
        info!("Chat calls authenticate with a static api-key");
    } else {
        info!("Chat calls authenticate with Entra ID bearer tokens");
    }

    Ok(build_router(AppState::new(settings, Arc::new(client))))
}

/// Assemble routes and middleware around prepared state
pub fn build_router(state: AppState) -> Router {
    let settings = state.settings.clone();
    let state = Arc::new(state);

    let send_route = post(chat::send_message).route_layer(from_fn_with_state(
        Arc::clone(&state.limiter),
        chat_rate_limit_middleware,
    ));

    // Create middleware stack
    let middleware_stack = ServiceBuilder::new()
        .layer(TraceLayer::new_for_http())
        .layer(from_fn(request_logging_middleware));

    let router = Router::new()
        .route("/chat", get(chat::history))
        .route("/chat/send", send_route)
        .route("/health", get(health::health_check))
        .with_state(state)
        .layer(RequestBodyLimitLayer::new(settings.request.max_request_size))
        .layer(middleware_stack);

    if settings.security.cors_enabled {
        router.layer(cors_layer(&settings.security.allowed_origins))
    } else {
        router
    }
}

fn cors_layer(allowed_origins: &[String]) -> CorsLayer {
    let layer = CorsLayer::new().allow_methods(Any).allow_headers(Any);

    if allowed_origins.iter().any(|origin| origin == "*") {
        return layer.allow_origin(Any);
    }

    let origins: Vec<HeaderValue> = allowed_origins
        .iter()
        .filter_map(|origin| match HeaderValue::from_str(origin) {
            Ok(value) => Some(value),
            Err(_) => {
                warn!("Ignoring invalid CORS origin: {}", origin);
                None
            }
        })
        .collect();

    layer.allow_origin(AllowOrigin::list(origins))
}
