//! Application configuration settings
//!
//! Defines all configuration structures and loading logic

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use tracing_subscriber::EnvFilter;

/// Deployment used when none is configured
pub const DEFAULT_DEPLOYMENT_NAME: &str = "gpt-4.1-deployment";

/// Azure OpenAI API version used when none is configured
pub const DEFAULT_API_VERSION: &str = "2024-10-21";

/// Main application configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Settings {
    /// Server configuration
    pub server: ServerConfig,
    /// Remote completion endpoint configuration
    pub completion: CompletionOptions,
    /// Chat endpoint rate limiting
    pub rate_limit: RateLimitConfig,
    /// Request configuration
    pub request: RequestConfig,
    /// Session configuration
    pub session: SessionConfig,
    /// Security configuration
    pub security: SecurityConfig,
    /// Logging configuration
    pub logging: LoggingConfig,
}

/// Server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Listen host
    pub host: String,
    /// Listen port
    pub port: u16,
}

/// How to reach the remote chat deployment
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CompletionOptions {
    /// Resource base URL, e.g. `https://myres.openai.azure.com`
    pub endpoint: Option<String>,
    /// Deployment to call
    pub deployment_name: String,
    /// `api-version` query parameter
    pub api_version: String,
    /// Static key; token mode is used when absent
    #[serde(skip_serializing)]
    pub api_key: Option<String>,
    /// Upstream request timeout in seconds
    pub timeout: u64,
}

/// Fixed-window limiter for the chat send endpoint
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RateLimitConfig {
    /// Permits per window
    pub permit_limit: u32,
    /// Window length in seconds
    pub window_seconds: u64,
    /// Requests allowed to wait for the next window
    pub queue_limit: usize,
}

/// Request configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RequestConfig {
    /// Maximum request size in bytes
    pub max_request_size: usize,
}

/// Session configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionConfig {
    /// Idle timeout in seconds before a transcript is dropped
    pub idle_timeout: u64,
}

/// Security configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SecurityConfig {
    /// Allowed origins for CORS
    pub allowed_origins: Vec<String>,
    /// Whether CORS is enabled
    pub cors_enabled: bool,
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level
    pub level: String,
    /// Log format (text/json)
    pub format: String,
}

impl Settings {
    /// Create a new configuration instance from the process environment
    pub fn new() -> Result<Self> {
        // Load .env file if it exists
        dotenv::dotenv().ok();

        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build settings from an arbitrary key lookup
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str, default: &str| -> String {
            lookup(key).unwrap_or_else(|| default.to_string())
        };
        let get_opt = |key: &str| -> Option<String> {
            lookup(key)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        };

        let settings = Self {
            server: ServerConfig {
                host: get("SERVER_HOST", "0.0.0.0"),
                port: get("SERVER_PORT", "8080")
                    .parse()
                    .context("Invalid port number")?,
            },
            completion: CompletionOptions {
                endpoint: get_opt("AZURE_OPENAI_ENDPOINT"),
                deployment_name: get("AZURE_OPENAI_DEPLOYMENT_NAME", DEFAULT_DEPLOYMENT_NAME),
                api_version: get("AZURE_OPENAI_API_VERSION", DEFAULT_API_VERSION),
                // Sent verbatim; only blank values are dropped
                api_key: lookup("AZURE_OPENAI_API_KEY").filter(|key| !key.trim().is_empty()),
                timeout: get("REQUEST_TIMEOUT", "30")
                    .parse()
                    .context("Invalid timeout value")?,
            },
            rate_limit: RateLimitConfig {
                permit_limit: get("CHAT_RATE_LIMIT_PERMITS", "10")
                    .parse()
                    .context("Invalid chat rate limit permit count")?,
                window_seconds: get("CHAT_RATE_LIMIT_WINDOW", "60")
                    .parse()
                    .context("Invalid chat rate limit window")?,
                queue_limit: get("CHAT_RATE_LIMIT_QUEUE", "2")
                    .parse()
                    .context("Invalid chat rate limit queue size")?,
            },
            request: RequestConfig {
                max_request_size: get("MAX_REQUEST_SIZE", "65536")
                    .parse()
                    .context("Invalid maximum request size")?,
            },
            session: SessionConfig {
                idle_timeout: get("SESSION_IDLE_TIMEOUT", "1800")
                    .parse()
                    .context("Invalid session idle timeout")?,
            },
            security: SecurityConfig {
                allowed_origins: get("ALLOWED_ORIGINS", "*")
                    .split(',')
                    .map(|s| s.trim().to_string())
                    .collect(),
                cors_enabled: get("CORS_ENABLED", "false")
                    .parse()
                    .context("Invalid CORS enabled flag")?,
            },
            logging: LoggingConfig {
                level: get("RUST_LOG", "info"),
                format: get("LOG_FORMAT", "text"),
            },
        };

        // Validate configuration
        settings.validate()?;

        Ok(settings)
    }

    /// Validate configuration validity
    fn validate(&self) -> Result<()> {
        // Validate port range
        if self.server.port == 0 {
            anyhow::bail!("Port number cannot be 0");
        }

        // A missing endpoint only fails individual chat calls
        if let Some(endpoint) = &self.completion.endpoint {
            if !endpoint.starts_with("http") {
                anyhow::bail!("Invalid Azure OpenAI endpoint format, should start with 'http'");
            }
        }

        if self.completion.timeout == 0 {
            anyhow::bail!("Timeout values cannot be 0");
        }

        if self.rate_limit.permit_limit == 0 {
            anyhow::bail!("Chat rate limit permit count cannot be 0");
        }

        if self.rate_limit.window_seconds == 0 {
            anyhow::bail!("Chat rate limit window cannot be 0");
        }

        if self.request.max_request_size == 0 {
            anyhow::bail!("Maximum request size cannot be 0");
        }

        if self.session.idle_timeout == 0 {
            anyhow::bail!("Session idle timeout cannot be 0");
        }

        // Validate log filter, a bare level or a full directive list
        EnvFilter::try_new(&self.logging.level)
            .with_context(|| format!("Invalid log filter: {}", self.logging.level))?;

        // Validate log format
        let valid_formats = ["text", "json"];
        if !valid_formats.contains(&self.logging.format.as_str()) {
            anyhow::bail!("Invalid log format: {}", self.logging.format);
        }

        Ok(())
    }

    /// Whether chat calls will authenticate with a static key
    pub fn uses_static_key(&self) -> bool {
        self.completion.api_key.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_defaults() {
        let settings = Settings::from_lookup(lookup(&[])).unwrap();

        assert_eq!(settings.server.port, 8080);
        assert_eq!(settings.completion.endpoint, None);
        assert_eq!(settings.completion.deployment_name, DEFAULT_DEPLOYMENT_NAME);
        assert_eq!(settings.completion.api_version, DEFAULT_API_VERSION);
        assert_eq!(settings.rate_limit.permit_limit, 10);
        assert_eq!(settings.rate_limit.window_seconds, 60);
        assert_eq!(settings.rate_limit.queue_limit, 2);
        assert!(!settings.uses_static_key());
    }

    #[test]
    fn test_api_key_is_kept_verbatim() {
        let settings =
            Settings::from_lookup(lookup(&[("AZURE_OPENAI_API_KEY", " key-with-spaces ")])).unwrap();
        assert_eq!(settings.completion.api_key.as_deref(), Some(" key-with-spaces "));
    }

    #[test]
    fn test_log_filter_directives_are_accepted() {
        let settings =
            Settings::from_lookup(lookup(&[("RUST_LOG", "chatrelay=debug,tower_http=info")])).unwrap();
        assert_eq!(settings.logging.level, "chatrelay=debug,tower_http=info");
        assert!(Settings::from_lookup(lookup(&[("RUST_LOG", "chatrelay=loud")])).is_err());
    }

    #[test]
    fn test_blank_api_key_means_token_mode() {
        let settings = Settings::from_lookup(lookup(&[("AZURE_OPENAI_API_KEY", "   ")])).unwrap();
        assert!(!settings.uses_static_key());
    }
}
