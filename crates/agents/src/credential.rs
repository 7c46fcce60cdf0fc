//! Ambient credential resolution for the agents project endpoint.
//!
//! [`DefaultCredential`] walks a chain of token sources (service principal
//! from the environment, managed identity, Azure CLI) and returns the first
//! token it gets. Tokens are cached per scope until shortly before expiry.

use std::collections::HashMap;
use std::time::Duration as StdDuration;

use async_trait::async_trait;
use chrono::{DateTime, Duration, TimeZone, Utc};
use serde::Deserialize;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

/// Token scope for the hosted agents data plane.
pub const AGENTS_SCOPE: &str = "https://ai.azure.com/.default";

const DEFAULT_AUTHORITY_HOST: &str = "https://login.microsoftonline.com";

/// Cached tokens are refreshed this long before they expire.
const EXPIRY_MARGIN_SECS: i64 = 300;

/// Upper bound on any single source, matching the CLI process timeout.
const SOURCE_TIMEOUT: StdDuration = StdDuration::from_secs(10);

#[derive(Debug, Clone, PartialEq)]
pub struct AccessToken {
    pub token: String,
    pub expires_on: DateTime<Utc>,
}

impl AccessToken {
    fn is_fresh_at(&self, now: DateTime<Utc>) -> bool {
        self.expires_on - Duration::seconds(EXPIRY_MARGIN_SECS) > now
    }
}

#[derive(Debug, Clone, thiserror::Error)]
pub enum CredentialError {
    /// The source is not configured in this environment.
    #[error("{source_name} unavailable: {reason}")]
    Unavailable {
        source_name: &'static str,
        reason: String,
    },
    /// The source is configured but could not produce a token.
    #[error("{source_name} failed: {reason}")]
    Failed {
        source_name: &'static str,
        reason: String,
    },
    #[error("no credential source produced a token: {}", .0.join("; "))]
    Exhausted(Vec<String>),
}

#[async_trait]
pub trait TokenCredential: Send + Sync {
    async fn get_token(&self, scope: &str) -> Result<AccessToken, CredentialError>;

    fn name(&self) -> &'static str;
}

// ── Default chain ─────────────────────────────────────────────

pub struct DefaultCredential {
    sources: Vec<Box<dyn TokenCredential>>,
    cache: Mutex<HashMap<String, AccessToken>>,
    source_timeout: StdDuration,
}

impl DefaultCredential {
    /// Build the standard chain from the process environment.
    pub fn from_env() -> Self {
        let client = reqwest::Client::builder()
            .timeout(SOURCE_TIMEOUT)
            .build()
            .unwrap_or_default();
        let mut sources: Vec<Box<dyn TokenCredential>> = Vec::new();
        if let Some(env) = EnvironmentCredential::from_env(client.clone()) {
            sources.push(Box::new(env));
        }
        if let Some(mi) = ManagedIdentityCredential::from_env(client) {
            sources.push(Box::new(mi));
        }
        sources.push(Box::new(AzureCliCredential));
        Self::with_sources(sources)
    }

    pub fn with_sources(sources: Vec<Box<dyn TokenCredential>>) -> Self {
        Self {
            sources,
            cache: Mutex::new(HashMap::new()),
            source_timeout: SOURCE_TIMEOUT,
        }
    }

    pub fn with_source_timeout(mut self, timeout: StdDuration) -> Self {
        self.source_timeout = timeout;
        self
    }
}

#[async_trait]
impl TokenCredential for DefaultCredential {
    async fn get_token(&self, scope: &str) -> Result<AccessToken, CredentialError> {
        let mut cache = self.cache.lock().await;
        if let Some(token) = cache.get(scope) {
            if token.is_fresh_at(Utc::now()) {
                return Ok(token.clone());
            }
        }

        let mut failures = Vec::new();
        for source in &self.sources {
            debug!(source = source.name(), scope, "Requesting access token");
            let attempt = tokio::time::timeout(self.source_timeout, source.get_token(scope))
                .await
                .unwrap_or_else(|_| {
                    warn!(source = source.name(), "Credential source timed out");
                    Err(CredentialError::Failed {
                        source_name: source.name(),
                        reason: format!("timed out after {}s", self.source_timeout.as_secs()),
                    })
                });
            match attempt {
                Ok(token) => {
                    info!(
                        source = source.name(),
                        expires_on = %token.expires_on,
                        "Acquired access token"
                    );
                    cache.insert(scope.to_string(), token.clone());
                    return Ok(token);
                }
                Err(e) => {
                    debug!(source = source.name(), error = %e, "Credential source failed");
                    failures.push(e.to_string());
                }
            }
        }

        Err(CredentialError::Exhausted(failures))
    }

    fn name(&self) -> &'static str {
        "DefaultCredential"
    }
}

// ── Service principal (client secret) ─────────────────────────

pub struct EnvironmentCredential {
    client: reqwest::Client,
    authority_host: String,
    tenant_id: String,
    client_id: String,
    client_secret: String,
}

impl EnvironmentCredential {
    /// Present only when `AZURE_TENANT_ID`, `AZURE_CLIENT_ID` and
    /// `AZURE_CLIENT_SECRET` are all set.
    pub fn from_env(client: reqwest::Client) -> Option<Self> {
        let var = |k: &str| std::env::var(k).ok().filter(|v| !v.is_empty());
        Some(Self {
            client,
            authority_host: var("AZURE_AUTHORITY_HOST")
                .unwrap_or_else(|| DEFAULT_AUTHORITY_HOST.to_string()),
            tenant_id: var("AZURE_TENANT_ID")?,
            client_id: var("AZURE_CLIENT_ID")?,
            client_secret: var("AZURE_CLIENT_SECRET")?,
        })
    }
}

#[derive(Deserialize)]
struct OAuthTokenResponse {
    access_token: String,
    expires_in: i64,
}

#[async_trait]
impl TokenCredential for EnvironmentCredential {
    async fn get_token(&self, scope: &str) -> Result<AccessToken, CredentialError> {
        let url = format!(
            "{}/{}/oauth2/v2.0/token",
            self.authority_host.trim_end_matches('/'),
            self.tenant_id
        );
        let failed = |reason: String| CredentialError::Failed {
            source_name: "EnvironmentCredential",
            reason,
        };

        let response = self
            .client
            .post(&url)
            .form(&[
                ("grant_type", "client_credentials"),
                ("client_id", self.client_id.as_str()),
                ("client_secret", self.client_secret.as_str()),
                ("scope", scope),
            ])
            .send()
            .await
            .map_err(|e| failed(e.to_string()))?;

        let status = response.status().as_u16();
        if !response.status().is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(failed(format!("token endpoint returned {status}: {body}")));
        }

        let body: OAuthTokenResponse = response.json().await.map_err(|e| failed(e.to_string()))?;
        Ok(AccessToken {
            token: body.access_token,
            expires_on: Utc::now() + Duration::seconds(body.expires_in),
        })
    }

    fn name(&self) -> &'static str {
        "EnvironmentCredential"
    }
}

// ── Managed identity (App Service / Container Apps) ───────────

pub struct ManagedIdentityCredential {
    client: reqwest::Client,
    endpoint: String,
    identity_header: String,
    client_id: Option<String>,
}

impl ManagedIdentityCredential {
    /// Present only when `IDENTITY_ENDPOINT` and `IDENTITY_HEADER` are set.
    pub fn from_env(client: reqwest::Client) -> Option<Self> {
        let var = |k: &str| std::env::var(k).ok().filter(|v| !v.is_empty());
        Some(Self {
            client,
            endpoint: var("IDENTITY_ENDPOINT")?,
            identity_header: var("IDENTITY_HEADER")?,
            client_id: var("AZURE_CLIENT_ID"),
        })
    }
}

#[derive(Deserialize)]
struct ManagedIdentityTokenResponse {
    access_token: String,
    expires_on: String,
}

#[async_trait]
impl TokenCredential for ManagedIdentityCredential {
    async fn get_token(&self, scope: &str) -> Result<AccessToken, CredentialError> {
        let failed = |reason: String| CredentialError::Failed {
            source_name: "ManagedIdentityCredential",
            reason,
        };

        let resource = scope_to_resource(scope);
        let mut query = vec![("api-version", "2019-08-01"), ("resource", resource)];
        if let Some(ref id) = self.client_id {
            query.push(("client_id", id.as_str()));
        }

        let response = self
            .client
            .get(&self.endpoint)
            .header("X-IDENTITY-HEADER", &self.identity_header)
            .query(&query)
            .send()
            .await
            .map_err(|e| failed(e.to_string()))?;

        let status = response.status().as_u16();
        if !response.status().is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(failed(format!("identity endpoint returned {status}: {body}")));
        }

        let body: ManagedIdentityTokenResponse =
            response.json().await.map_err(|e| failed(e.to_string()))?;
        let expires_on = parse_unix_timestamp(&body.expires_on)
            .ok_or_else(|| failed(format!("unparseable expires_on: {}", body.expires_on)))?;
        Ok(AccessToken {
            token: body.access_token,
            expires_on,
        })
    }

    fn name(&self) -> &'static str {
        "ManagedIdentityCredential"
    }
}

// ── Azure CLI ─────────────────────────────────────────────────

pub struct AzureCliCredential;

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct CliTokenOutput {
    access_token: String,
    /// Unix seconds; only emitted by newer CLI versions.
    #[serde(default, rename = "expires_on")]
    expires_on_unix: Option<i64>,
}

#[async_trait]
impl TokenCredential for AzureCliCredential {
    async fn get_token(&self, scope: &str) -> Result<AccessToken, CredentialError> {
        let output = tokio::process::Command::new("az")
            .args(["account", "get-access-token", "--scope", scope, "--output", "json"])
            .kill_on_drop(true)
            .output()
            .await
            .map_err(|e| CredentialError::Unavailable {
                source_name: "AzureCliCredential",
                reason: e.to_string(),
            })?;

        if !output.status.success() {
            return Err(CredentialError::Failed {
                source_name: "AzureCliCredential",
                reason: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }

        parse_cli_output(&output.stdout, Utc::now())
    }

    fn name(&self) -> &'static str {
        "AzureCliCredential"
    }
}

/// Older CLI versions only report a local-time `expiresOn`; those tokens
/// are assumed to live for thirty minutes from now.
fn parse_cli_output(stdout: &[u8], now: DateTime<Utc>) -> Result<AccessToken, CredentialError> {
    let parsed: CliTokenOutput =
        serde_json::from_slice(stdout).map_err(|e| CredentialError::Failed {
            source_name: "AzureCliCredential",
            reason: format!("unexpected CLI output: {e}"),
        })?;

    let expires_on = parsed
        .expires_on_unix
        .and_then(|secs| Utc.timestamp_opt(secs, 0).single())
        .unwrap_or_else(|| now + Duration::minutes(30));

    Ok(AccessToken {
        token: parsed.access_token,
        expires_on,
    })
}

fn scope_to_resource(scope: &str) -> &str {
    scope.strip_suffix("/.default").unwrap_or(scope)
}

fn parse_unix_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    raw.trim()
        .parse::<i64>()
        .ok()
        .and_then(|secs| Utc.timestamp_opt(secs, 0).single())
}

/// Credential that always hands out the same token. Useful for tests and
/// for callers that manage tokens themselves.
pub struct StaticTokenCredential {
    token: AccessToken,
}

impl StaticTokenCredential {
    pub fn new(token: impl Into<String>) -> Self {
        Self {
            token: AccessToken {
                token: token.into(),
                expires_on: Utc::now() + Duration::hours(1),
            },
        }
    }
}

#[async_trait]
impl TokenCredential for StaticTokenCredential {
    async fn get_token(&self, _scope: &str) -> Result<AccessToken, CredentialError> {
        Ok(self.token.clone())
    }

    fn name(&self) -> &'static str {
        "StaticTokenCredential"
    }
}
