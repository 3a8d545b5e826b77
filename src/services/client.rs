//! HTTP client service
//!
//! Encapsulates the single chat completion exchange with an Azure OpenAI deployment

use crate::config::settings::{CompletionOptions, DEFAULT_API_VERSION, DEFAULT_DEPLOYMENT_NAME};
use crate::models::completion::{extract_assistant_message, CompletionRequest};
use crate::services::credential::{CredentialError, DefaultCredential, TokenCredential, COGNITIVE_SERVICES_SCOPE};
use anyhow::Context;
use async_trait::async_trait;
use reqwest::Client;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error};

/// Header carrying a static resource key
pub const API_KEY_HEADER: &str = "api-key";

/// Failures of a chat completion exchange
#[derive(Error, Debug)]
pub enum CompletionError {
    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Token acquisition failed: {0}")]
    Auth(#[source] CredentialError),

    #[error("Azure OpenAI request failed: {status} {reason}. Body: {body}")]
    Upstream {
        status: u16,
        reason: String,
        body: String,
    },

    #[error("Transport error: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("Chat request cancelled")]
    Cancelled,
}

/// How a call authenticates, decided per call from configuration
#[derive(Clone)]
pub enum AuthMode {
    StaticKey(String),
    Token(Arc<dyn TokenCredential>),
}

impl AuthMode {
    /// A non-blank key wins; otherwise tokens come from `credential`
    pub fn resolve(options: &CompletionOptions, credential: &Arc<dyn TokenCredential>) -> Self {
        match options.api_key.as_deref().filter(|key| !key.trim().is_empty()) {
            Some(key) => AuthMode::StaticKey(key.to_string()),
            None => AuthMode::Token(Arc::clone(credential)),
        }
    }
}

/// Something that can turn a user message into an assistant reply
#[async_trait]
pub trait ChatService: Send + Sync {
    async fn send_message(
        &self,
        message: &str,
        cancel: &CancellationToken,
    ) -> Result<String, CompletionError>;
}

/// Azure OpenAI chat completion client
#[derive(Clone)]
pub struct AzureOpenAIClient {
    client: Client,
    options: CompletionOptions,
    credential: Arc<dyn TokenCredential>,
}

impl AzureOpenAIClient {
    /// Create a client that falls back to the default credential chain
    pub fn new(options: CompletionOptions) -> anyhow::Result<Self> {
        let identity_client = Client::builder()
            .user_agent(concat!("chatrelay/", env!("CARGO_PKG_VERSION")))
            .build()
            .context("Failed to create identity HTTP client")?;
        let credential: Arc<dyn TokenCredential> =
            Arc::new(DefaultCredential::from_env(identity_client));

        Self::with_credential(options, credential)
    }

    /// Create a client with an explicit token source
    pub fn with_credential(
        options: CompletionOptions,
        credential: Arc<dyn TokenCredential>,
    ) -> anyhow::Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(options.timeout.max(1)))
            .user_agent(concat!("chatrelay/", env!("CARGO_PKG_VERSION")))
            .build()
            .context("Failed to create HTTP client")?;

        Ok(Self {
            client,
            options,
            credential,
        })
    }

    /// Build the deployment's chat completions URL
    pub fn request_url(&self) -> Result<String, CompletionError> {
        let endpoint = self
            .options
            .endpoint
            .as_deref()
            .map(str::trim)
            .filter(|endpoint| !endpoint.is_empty())
            .ok_or_else(|| {
                CompletionError::Configuration("Azure OpenAI endpoint is not configured".to_string())
            })?
            .trim_end_matches('/');

        let deployment = non_blank_or(&self.options.deployment_name, DEFAULT_DEPLOYMENT_NAME);
        let api_version = non_blank_or(&self.options.api_version, DEFAULT_API_VERSION);

        Ok(format!(
            "{}/openai/deployments/{}/chat/completions?api-version={}",
            endpoint,
            urlencoding::encode(deployment),
            urlencoding::encode(api_version)
        ))
    }

    /// Send one user message and return the assistant's reply text
    ///
    /// An unreadable or content-free success body yields an empty reply.
    pub async fn complete(
        &self,
        message: &str,
        cancel: &CancellationToken,
    ) -> Result<String, CompletionError> {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                debug!("Chat completion cancelled by caller");
                Err(CompletionError::Cancelled)
            }
            result = self.exchange(message) => result,
        }
    }

    async fn exchange(&self, message: &str) -> Result<String, CompletionError> {
        let url = self.request_url()?;
        let body = CompletionRequest::for_user_message(message);

        let request = self.client.post(&url).json(&body);
        let request = match AuthMode::resolve(&self.options, &self.credential) {
            AuthMode::StaticKey(key) => request.header(API_KEY_HEADER, key),
            AuthMode::Token(credential) => {
                let token = credential
                    .get_token(&[COGNITIVE_SERVICES_SCOPE])
                    .await
                    .map_err(CompletionError::Auth)?;
                request.bearer_auth(token.token)
            }
        };

        debug!("Sending chat completion request to {}", url);
        let response = request.send().await?;

        let status = response.status();
        let text = response.text().await?;

        if !status.is_success() {
            error!("Azure OpenAI request failed: {}", status);
            return Err(CompletionError::Upstream {
                status: status.as_u16(),
                reason: status.canonical_reason().unwrap_or_default().to_string(),
                body: text,
            });
        }

        let reply = extract_assistant_message(&text).unwrap_or_default();
        debug!("Chat completion returned {} chars", reply.chars().count());
        Ok(reply)
    }
}

#[async_trait]
impl ChatService for AzureOpenAIClient {
    async fn send_message(
        &self,
        message: &str,
        cancel: &CancellationToken,
    ) -> Result<String, CompletionError> {
        self.complete(message, cancel).await
    }
}

fn non_blank_or<'a>(value: &'a str, default: &'a str) -> &'a str {
    if value.trim().is_empty() {
        default
    } else {
        value
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::credential::AccessToken;

    struct NoToken;

    #[async_trait]
    impl TokenCredential for NoToken {
        fn name(&self) -> &str {
            "NoToken"
        }

        async fn get_token(&self, _scopes: &[&str]) -> Result<AccessToken, CredentialError> {
            Err(CredentialError::Unavailable("NoToken".to_string()))
        }
    }

    fn client(endpoint: Option<&str>, deployment: &str, api_version: &str) -> AzureOpenAIClient {
        let options = CompletionOptions {
            endpoint: endpoint.map(str::to_string),
            deployment_name: deployment.to_string(),
            api_version: api_version.to_string(),
            api_key: None,
            timeout: 30,
        };
        AzureOpenAIClient::with_credential(options, Arc::new(NoToken)).unwrap()
    }

    #[test]
    fn test_request_url() {
        let url = client(Some("https://res.openai.azure.com/"), "gpt-4o", "2024-06-01")
            .request_url()
            .unwrap();
        assert_eq!(
            url,
            "https://res.openai.azure.com/openai/deployments/gpt-4o/chat/completions?api-version=2024-06-01"
        );
    }

    #[test]
    fn test_request_url_defaults_and_encoding() {
        let url = client(Some("https://res.openai.azure.com"), "  ", "").request_url().unwrap();
        assert!(url.ends_with("/deployments/gpt-4.1-deployment/chat/completions?api-version=2024-10-21"));

        let url = client(Some("https://res"), "my deploy/1", "2024 10&x").request_url().unwrap();
        assert_eq!(
            url,
            "https://res/openai/deployments/my%20deploy%2F1/chat/completions?api-version=2024%2010%26x"
        );
    }

    #[test]
    fn test_missing_endpoint_is_configuration_error() {
        for endpoint in [None, Some(""), Some("   ")] {
            let err = client(endpoint, "d", "v").request_url().unwrap_err();
            assert!(matches!(err, CompletionError::Configuration(_)));
        }
    }

    #[test]
    fn test_auth_mode_resolution() {
        let credential: Arc<dyn TokenCredential> = Arc::new(NoToken);
        let mut options = CompletionOptions {
            api_key: Some("k".to_string()),
            ..Default::default()
        };
        assert!(matches!(AuthMode::resolve(&options, &credential), AuthMode::StaticKey(k) if k == "k"));

        options.api_key = Some(" ".to_string());
        assert!(matches!(AuthMode::resolve(&options, &credential), AuthMode::Token(_)));

        options.api_key = None;
        assert!(matches!(AuthMode::resolve(&options, &credential), AuthMode::Token(_)));
    }
}
