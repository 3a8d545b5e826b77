//! Chat page data models
//!
//! Request and response bodies exchanged with the browser

use serde::{Deserialize, Serialize};

/// Inbound chat message
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ChatRequest {
    /// Raw user text; may be missing or null
    #[serde(default)]
    pub message: Option<String>,
}

/// Outbound chat result
///
/// Serializes as `{"reply": "..."}` or `{"error": "..."}`, never both.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ChatResponse {
    /// Assistant reply, possibly empty
    Reply { reply: String },
    /// Human-readable failure reason
    Error { error: String },
}

impl ChatResponse {
    pub fn reply(text: impl Into<String>) -> Self {
        Self::Reply { reply: text.into() }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self::Error { error: message.into() }
    }

    pub fn reply_text(&self) -> Option<&str> {
        match self {
            Self::Reply { reply } => Some(reply),
            Self::Error { .. } => None,
        }
    }

    pub fn error_text(&self) -> Option<&str> {
        match self {
            Self::Reply { .. } => None,
            Self::Error { error } => Some(error),
        }
    }
}

/// Session transcript returned by the chat page endpoint
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct HistoryResponse {
    pub history: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reply_serialization() {
        let json = serde_json::to_value(ChatResponse::reply("hi")).unwrap();
        assert_eq!(json, serde_json::json!({"reply": "hi"}));
    }

    #[test]
    fn test_error_serialization() {
        let json = serde_json::to_value(ChatResponse::error("Message is required.")).unwrap();
        assert_eq!(json, serde_json::json!({"error": "Message is required."}));
    }

    #[test]
    fn test_exactly_one_side_populated() {
        for response in [ChatResponse::reply(""), ChatResponse::error("x")] {
            assert!(response.reply_text().is_some() ^ response.error_text().is_some());
        }
    }

    #[test]
    fn test_request_accepts_null_or_missing_message() {
        let missing: ChatRequest = serde_json::from_str("{}").unwrap();
        assert!(missing.message.is_none());

        let null: ChatRequest = serde_json::from_str(r#"{"message": null}"#).unwrap();
        assert!(null.message.is_none());
    }
}
