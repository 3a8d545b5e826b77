//! Azure OpenAI chat completion data models
//!
//! Request body sent to a deployment and the tolerant reply extraction applied to its response

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Sampling temperature used for every chat call
pub const CHAT_TEMPERATURE: f64 = 0.2;

/// Upper bound on generated tokens per reply
pub const CHAT_MAX_TOKENS: u32 = 512;

/// Chat completion request body
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompletionRequest {
    /// Message list
    pub messages: Vec<CompletionMessage>,
    /// Temperature parameter
    pub temperature: f64,
    /// Maximum tokens to generate
    pub max_tokens: u32,
}

/// Single chat message
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompletionMessage {
    pub role: String,
    pub content: String,
}

impl CompletionRequest {
    /// Single-turn request carrying only the user's message
    pub fn for_user_message(message: &str) -> Self {
        Self {
            messages: vec![CompletionMessage {
                role: "user".to_string(),
                content: message.to_string(),
            }],
            temperature: CHAT_TEMPERATURE,
            max_tokens: CHAT_MAX_TOKENS,
        }
    }
}

/// Pull the assistant text out of a chat completion body
///
/// Returns the first `choices[].message.content` that is a JSON string.
/// Invalid JSON and unexpected shapes yield `None`.
pub fn extract_assistant_message(body: &str) -> Option<String> {
    let root: Value = serde_json::from_str(body).ok()?;

    root.get("choices")?
        .as_array()?
        .iter()
        .find_map(|choice| choice.get("message")?.get("content")?.as_str())
        .map(str::to_string)
}
