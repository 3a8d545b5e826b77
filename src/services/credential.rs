//! Bearer token acquisition
//!
//! Token mode authenticates against Azure OpenAI with an Entra ID access
//! token. Tokens come from a client-secret credential configured through the
//! environment, or from the host's managed identity, tried in that order.

use async_trait::async_trait;
use chrono::{DateTime, Duration as ChronoDuration, Utc};
use reqwest::Client;
use serde::Deserialize;
use std::fmt;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, info, warn};

/// Audience for Azure OpenAI data-plane calls
pub const COGNITIVE_SERVICES_SCOPE: &str = "https://cognitiveservices.azure.com/.default";

const DEFAULT_AUTHORITY_HOST: &str = "https://login.microsoftonline.com";
const IMDS_ENDPOINT: &str = "http://169.254.169.254/metadata/identity/oauth2/token";
const IMDS_API_VERSION: &str = "2018-02-01";
const APP_SERVICE_API_VERSION: &str = "2019-08-01";
const IMDS_TIMEOUT: Duration = Duration::from_secs(2);

/// Cached tokens are refreshed this long before they expire
const REFRESH_MARGIN_SECS: i64 = 300;

/// Access token issued by the identity provider
#[derive(Clone)]
pub struct AccessToken {
    pub token: String,
    pub expires_on: DateTime<Utc>,
}

impl AccessToken {
    pub fn new(token: impl Into<String>, expires_on: DateTime<Utc>) -> Self {
        Self {
            token: token.into(),
            expires_on,
        }
    }

    fn is_fresh(&self, now: DateTime<Utc>) -> bool {
        self.expires_on
            .checked_sub_signed(ChronoDuration::seconds(REFRESH_MARGIN_SECS))
            .is_some_and(|refresh_at| refresh_at > now)
    }
}

impl fmt::Debug for AccessToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AccessToken")
            .field("token", &"<redacted>")
            .field("expires_on", &self.expires_on)
            .finish()
    }
}

/// Token acquisition failures
#[derive(Error, Debug)]
pub enum CredentialError {
    #[error("{0} is not configured")]
    Unavailable(String),

    #[error("Token request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("Identity endpoint returned {status}: {body}")]
    Rejected { status: u16, body: String },

    #[error("Invalid token response: {0}")]
    InvalidResponse(String),

    #[error("No credential could issue a token: {}", .0.join("; "))]
    Exhausted(Vec<String>),
}

/// Source of bearer tokens
#[async_trait]
pub trait TokenCredential: Send + Sync {
    /// Credential name used in diagnostics
    fn name(&self) -> &str;

    /// Acquire a token valid for the given scopes
    async fn get_token(&self, scopes: &[&str]) -> Result<AccessToken, CredentialError>;
}

#[derive(Deserialize)]
struct ClientCredentialsResponse {
    access_token: String,
    #[serde(default)]
    expires_in: Option<i64>,
}

#[derive(Deserialize)]
struct ManagedIdentityResponse {
    access_token: String,
    #[serde(default)]
    expires_on: Option<serde_json::Value>,
    #[serde(default)]
    expires_in: Option<serde_json::Value>,
}

/// Read a token endpoint response, mapping non-success statuses to `Rejected`
async fn read_token_body(response: reqwest::Response) -> Result<String, CredentialError> {
    let status = response.status();
    let body = response.text().await?;

    if !status.is_success() {
        return Err(CredentialError::Rejected {
            status: status.as_u16(),
            body,
        });
    }

    Ok(body)
}

/// Numeric seconds that may arrive as a JSON number or a string
/// Instant `secs` from now, `None` when it falls outside chrono's range
fn expiry_after(secs: i64) -> Option<DateTime<Utc>> {
    ChronoDuration::try_seconds(secs).and_then(|lifetime| Utc::now().checked_add_signed(lifetime))
}

fn seconds_value(value: &serde_json::Value) -> Option<i64> {
    match value {
        serde_json::Value::Number(n) => n.as_i64(),
        serde_json::Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

/// Client-secret credential from `AZURE_TENANT_ID`, `AZURE_CLIENT_ID` and `AZURE_CLIENT_SECRET`
pub struct EnvironmentCredential {
    http: Client,
    authority_host: String,
    tenant_id: String,
    client_id: String,
    client_secret: String,
}

impl EnvironmentCredential {
    pub fn new(
        http: Client,
        authority_host: impl Into<String>,
        tenant_id: impl Into<String>,
        client_id: impl Into<String>,
        client_secret: impl Into<String>,
    ) -> Self {
        Self {
            http,
            authority_host: authority_host.into(),
            tenant_id: tenant_id.into(),
            client_id: client_id.into(),
            client_secret: client_secret.into(),
        }
    }

    /// Returns `None` unless tenant, client id and secret are all set
    pub fn from_env(http: Client) -> Option<Self> {
        let var = |key: &str| std::env::var(key).ok().filter(|v| !v.trim().is_empty());

        let tenant_id = var("AZURE_TENANT_ID")?;
        let client_id = var("AZURE_CLIENT_ID")?;
        let client_secret = var("AZURE_CLIENT_SECRET")?;
        let authority_host =
            var("AZURE_AUTHORITY_HOST").unwrap_or_else(|| DEFAULT_AUTHORITY_HOST.to_string());

        Some(Self::new(http, authority_host, tenant_id, client_id, client_secret))
    }

    fn token_url(&self) -> String {
        format!(
            "{}/{}/oauth2/v2.0/token",
            self.authority_host.trim_end_matches('/'),
            self.tenant_id
        )
    }
}

#[async_trait]
impl TokenCredential for EnvironmentCredential {
    fn name(&self) -> &str {
        "EnvironmentCredential"
    }

    async fn get_token(&self, scopes: &[&str]) -> Result<AccessToken, CredentialError> {
        let scope = scopes.join(" ");
        let form = [
            ("grant_type", "client_credentials"),
            ("client_id", self.client_id.as_str()),
            ("client_secret", self.client_secret.as_str()),
            ("scope", scope.as_str()),
        ];

        let response = self.http.post(self.token_url()).form(&form).send().await?;
        let body = read_token_body(response).await?;

        let parsed: ClientCredentialsResponse = serde_json::from_str(&body)
            .map_err(|e| CredentialError::InvalidResponse(e.to_string()))?;

        let lifetime = parsed.expires_in.unwrap_or(3600);
        let expires_on = expiry_after(lifetime).ok_or_else(|| {
            CredentialError::InvalidResponse(format!("token lifetime out of range: {}", lifetime))
        })?;

        Ok(AccessToken::new(parsed.access_token, expires_on))
    }
}

/// Where the managed identity token is requested from
#[derive(Debug, Clone)]
pub enum ManagedIdentitySource {
    /// App Service / Functions local identity endpoint
    AppService { endpoint: String, secret: String },
    /// VM instance metadata service
    Imds { endpoint: String },
}

/// Token from the hosting environment's managed identity
pub struct ManagedIdentityCredential {
    http: Client,
    source: ManagedIdentitySource,
    client_id: Option<String>,
}

impl ManagedIdentityCredential {
    pub fn new(http: Client, source: ManagedIdentitySource, client_id: Option<String>) -> Self {
        Self {
            http,
            source,
            client_id,
        }
    }

    /// App Service when `IDENTITY_ENDPOINT`/`IDENTITY_HEADER` are present, IMDS otherwise
    pub fn from_env(http: Client) -> Self {
        let var = |key: &str| std::env::var(key).ok().filter(|v| !v.trim().is_empty());

        let source = match (var("IDENTITY_ENDPOINT"), var("IDENTITY_HEADER")) {
            (Some(endpoint), Some(secret)) => ManagedIdentitySource::AppService { endpoint, secret },
            _ => ManagedIdentitySource::Imds {
                endpoint: IMDS_ENDPOINT.to_string(),
            },
        };

        Self::new(http, source, var("AZURE_CLIENT_ID"))
    }
}

/// Managed identity endpoints take a resource, not a scope
fn scope_to_resource(scope: &str) -> &str {
    scope.strip_suffix("/.default").unwrap_or(scope)
}

#[async_trait]
impl TokenCredential for ManagedIdentityCredential {
    fn name(&self) -> &str {
        "ManagedIdentityCredential"
    }

    async fn get_token(&self, scopes: &[&str]) -> Result<AccessToken, CredentialError> {
        let resource = match scopes {
            [scope] => scope_to_resource(scope),
            _ => {
                return Err(CredentialError::InvalidResponse(
                    "managed identity accepts exactly one scope".to_string(),
                ))
            }
        };

        let mut query = vec![("resource", resource)];
        if let Some(client_id) = &self.client_id {
            query.push(("client_id", client_id.as_str()));
        }

        let request = match &self.source {
            ManagedIdentitySource::AppService { endpoint, secret } => {
                query.push(("api-version", APP_SERVICE_API_VERSION));
                self.http
                    .get(endpoint)
                    .header("X-IDENTITY-HEADER", secret)
                    .query(&query)
            }
            ManagedIdentitySource::Imds { endpoint } => {
                query.push(("api-version", IMDS_API_VERSION));
                self.http
                    .get(endpoint)
                    .header("Metadata", "true")
                    .query(&query)
                    .timeout(IMDS_TIMEOUT)
            }
        };

        let body = read_token_body(request.send().await?).await?;
        let parsed: ManagedIdentityResponse = serde_json::from_str(&body)
            .map_err(|e| CredentialError::InvalidResponse(e.to_string()))?;

        let expires_on = parsed
            .expires_on
            .as_ref()
            .and_then(seconds_value)
            .and_then(|secs| DateTime::<Utc>::from_timestamp(secs, 0))
            .or_else(|| {
                parsed
                    .expires_in
                    .as_ref()
                    .and_then(seconds_value)
                    .and_then(expiry_after)
            })
            .ok_or_else(|| CredentialError::InvalidResponse("missing or out of range token expiry".to_string()))?;

        Ok(AccessToken::new(parsed.access_token, expires_on))
    }
}

/// Chained credential with an in-memory token cache
pub struct DefaultCredential {
    sources: Vec<Arc<dyn TokenCredential>>,
    cache: Mutex<Option<(String, AccessToken)>>,
}

impl DefaultCredential {
    pub fn with_sources(sources: Vec<Arc<dyn TokenCredential>>) -> Self {
        Self {
            sources,
            cache: Mutex::new(None),
        }
    }

    /// Environment client secret first, then managed identity
    pub fn from_env(http: Client) -> Self {
        let mut sources: Vec<Arc<dyn TokenCredential>> = Vec::new();

        if let Some(env) = EnvironmentCredential::from_env(http.clone()) {
            info!("Using client secret credential from environment");
            sources.push(Arc::new(env));
        }
        sources.push(Arc::new(ManagedIdentityCredential::from_env(http)));

        Self::with_sources(sources)
    }

    fn cached(&self, key: &str) -> Option<AccessToken> {
        let cache = self.cache.lock().unwrap_or_else(PoisonError::into_inner);
        match cache.as_ref() {
            Some((cached_key, token)) if cached_key == key && token.is_fresh(Utc::now()) => {
                Some(token.clone())
            }
            _ => None,
        }
    }

    fn store(&self, key: String, token: &AccessToken) {
        let mut cache = self.cache.lock().unwrap_or_else(PoisonError::into_inner);
        *cache = Some((key, token.clone()));
    }
}

#[async_trait]
impl TokenCredential for DefaultCredential {
    fn name(&self) -> &str {
        "DefaultCredential"
    }

    async fn get_token(&self, scopes: &[&str]) -> Result<AccessToken, CredentialError> {
        let key = scopes.join(" ");
        if let Some(token) = self.cached(&key) {
            debug!("Reusing cached access token");
            return Ok(token);
        }

        let mut failures = Vec::with_capacity(self.sources.len());
        for source in &self.sources {
            match source.get_token(scopes).await {
                Ok(token) => {
                    debug!("Access token issued by {}", source.name());
                    self.store(key, &token);
                    return Ok(token);
                }
                Err(e) => {
                    warn!("{} could not issue a token: {}", source.name(), e);
                    failures.push(format!("{}: {}", source.name(), e));
                }
            }
        }

        Err(CredentialError::Exhausted(failures))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scope_to_resource() {
        assert_eq!(
            scope_to_resource(COGNITIVE_SERVICES_SCOPE),
            "https://cognitiveservices.azure.com"
        );
        assert_eq!(scope_to_resource("api://thing"), "api://thing");
    }

    #[test]
    fn test_seconds_value_accepts_strings_and_numbers() {
        assert_eq!(seconds_value(&serde_json::json!(1700000000)), Some(1_700_000_000));
        assert_eq!(seconds_value(&serde_json::json!("1700000000")), Some(1_700_000_000));
        assert_eq!(seconds_value(&serde_json::json!(null)), None);
    }

    #[test]
    fn test_token_freshness_margin() {
        let now = Utc::now();
        assert!(AccessToken::new("t", now + ChronoDuration::minutes(10)).is_fresh(now));
        assert!(!AccessToken::new("t", now + ChronoDuration::minutes(4)).is_fresh(now));
    }

    #[test]
    fn test_expiry_after_rejects_out_of_range_lifetimes() {
        assert!(expiry_after(3600).is_some());
        assert_eq!(expiry_after(1_000_000_000_000_000), None);
        assert_eq!(expiry_after(i64::MAX), None);
    }

    #[test]
    fn test_debug_redacts_token() {
        let token = AccessToken::new("super-secret", Utc::now());
        assert!(!format!("{:?}", token).contains("super-secret"));
    }
}
