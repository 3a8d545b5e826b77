//! Data models module
//!
//! Defines the browser-facing chat payloads and the Azure OpenAI wire structures

pub mod chat;
pub mod completion;

pub use chat::{ChatRequest, ChatResponse, HistoryResponse};
pub use completion::{extract_assistant_message, CompletionMessage, CompletionRequest};
