//! Chat page handlers
//!
//! Relays browser messages to the chat service and keeps the session transcript

use crate::handlers::AppState;
use crate::models::chat::{ChatRequest, ChatResponse, HistoryResponse};
use crate::services::{validate_message, SessionStore};
use crate::utils::error::AppResult;
use axum::{
    extract::State,
    http::{
        header::{COOKIE, SET_COOKIE},
        HeaderMap, HeaderValue,
    },
    response::{IntoResponse, Response},
    Json,
};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};
use uuid::Uuid;

/// Cookie carrying the chat session id
pub const SESSION_COOKIE: &str = "chat_session";

/// Chat transcript for the caller's session
///
/// GET /chat
/// Callers without a live session get an empty history and no cookie.
pub async fn history(State(state): State<Arc<AppState>>, headers: HeaderMap) -> Json<HistoryResponse> {
    let history = live_session(&state.sessions, &headers)
        .map(|id| state.sessions.history(&id))
        .unwrap_or_default();

    Json(HistoryResponse { history })
}

/// Send one chat message
///
/// POST /chat/send
pub async fn send_message(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(request): Json<ChatRequest>,
) -> Response {
    let existing = live_session(&state.sessions, &headers);

    let (message, reply) = match relay(&state, request).await {
        Ok(exchange) => exchange,
        Err(e) => return e.into_response(),
    };

    // Sessions only come into being once there is something to remember
    let session_id = existing.unwrap_or_else(Uuid::new_v4);
    state.sessions.append_exchange(session_id, &message, &reply);

    let cookie = match existing {
        Some(_) => None,
        None => session_cookie(session_id),
    };
    with_session_cookie(Json(ChatResponse::reply(reply)).into_response(), cookie)
}

/// Validate and forward one message, returning the trimmed message and the reply
async fn relay(state: &AppState, request: ChatRequest) -> AppResult<(String, String)> {
    let message = validate_message(request.message.as_deref())?;
    info!("Chat message received ({} chars)", message.chars().count());

    // Cancelled when this future is dropped, e.g. the browser went away
    let cancel = CancellationToken::new();
    let _guard = cancel.clone().drop_guard();

    let reply = state.chat.send_message(&message, &cancel).await?;
    Ok((message, reply))
}

/// The caller's session id, if its cookie names a live session
///
/// Refreshes the session's idle timer.
fn live_session(sessions: &SessionStore, headers: &HeaderMap) -> Option<Uuid> {
    let id = session_id_from_headers(headers)?;
    if sessions.touch(&id) {
        Some(id)
    } else {
        debug!("Chat session {} expired or unknown", id);
        None
    }
}

fn session_cookie(id: Uuid) -> Option<HeaderValue> {
    let cookie = format!("{}={}; Path=/; HttpOnly; SameSite=Lax", SESSION_COOKIE, id);
    HeaderValue::from_str(&cookie).ok()
}

/// Read the session id out of any `Cookie` header
pub fn session_id_from_headers(headers: &HeaderMap) -> Option<Uuid> {
    headers
        .get_all(COOKIE)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .flat_map(|value| value.split(';'))
        .filter_map(|pair| pair.trim().split_once('='))
        .find(|(name, _)| *name == SESSION_COOKIE)
        .and_then(|(_, value)| Uuid::parse_str(value.trim()).ok())
}

fn with_session_cookie(mut response: Response, cookie: Option<HeaderValue>) -> Response {
    if let Some(cookie) = cookie {
        response.headers_mut().insert(SET_COOKIE, cookie);
    }
    response
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_session_id_from_headers() {
        let id = Uuid::new_v4();
        let mut headers = HeaderMap::new();
        headers.insert(
            COOKIE,
            format!("theme=dark; {}={}; other=1", SESSION_COOKIE, id).parse().unwrap(),
        );
        assert_eq!(session_id_from_headers(&headers), Some(id));

        headers.clear();
        headers.insert(COOKIE, format!("{}=not-a-uuid", SESSION_COOKIE).parse().unwrap());
        assert_eq!(session_id_from_headers(&headers), None);

        headers.clear();
        assert_eq!(session_id_from_headers(&headers), None);
    }

    #[tokio::test]
    async fn test_live_session_requires_known_id() {
        let sessions = SessionStore::new(std::time::Duration::from_secs(60));
        assert_eq!(live_session(&sessions, &HeaderMap::new()), None);

        let id = Uuid::new_v4();
        let mut headers = HeaderMap::new();
        headers.insert(COOKIE, format!("{}={}", SESSION_COOKIE, id).parse().unwrap());
        assert_eq!(live_session(&sessions, &headers), None);
        assert!(sessions.is_empty());

        sessions.append_exchange(id, "hi", "hello");
        assert_eq!(live_session(&sessions, &headers), Some(id));
    }

    #[test]
    fn test_session_cookie_attributes() {
        let id = Uuid::new_v4();
        let cookie = session_cookie(id).unwrap();
        let cookie = cookie.to_str().unwrap();
        assert!(cookie.starts_with(&format!("{}={}", SESSION_COOKIE, id)));
        assert!(cookie.contains("HttpOnly"));
    }
}
