//! Service layer module
//!
//! Contains admission checks, the rate limiter, the Azure OpenAI client with its
//! credential chain, and the session transcript store

pub mod admission;
pub mod client;
pub mod credential;
pub mod rate_limiter;
pub mod transcript;

pub use admission::{validate_message, AdmissionError, MAX_MESSAGE_CHARS};
pub use client::{AuthMode, AzureOpenAIClient, ChatService, CompletionError};
pub use credential::{AccessToken, CredentialError, DefaultCredential, TokenCredential};
pub use rate_limiter::FixedWindowLimiter;
pub use transcript::SessionStore;
