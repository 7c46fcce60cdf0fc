use std::env;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// Model deployment used when `MODEL_DEPLOYMENT_NAME` is not set.
pub const DEFAULT_MODEL: &str = "gpt-4.1";

/// Agents REST API version sent as `api-version` on every request.
pub const DEFAULT_API_VERSION: &str = "2025-05-01";

/// Load .env file (silently ignores if missing).
pub fn load_dotenv() {
    dotenvy::dotenv().ok();
}

fn env_or(key: &str, default: &str) -> String {
    env::var(key).unwrap_or_else(|_| default.to_string())
}

fn env_opt(key: &str) -> Option<String> {
    env::var(key).ok().filter(|s| !s.is_empty())
}

/// Read a profiled env var: tries {PROFILE}_{KEY} first, falls back to {KEY}.
fn profiled_env_opt(profile: &str, key: &str) -> Option<String> {
    if !profile.is_empty() {
        let prefixed = format!("{}_{}", profile, key);
        if let Some(v) = env_opt(&prefixed) {
            return Some(v);
        }
    }
    env_opt(key)
}

fn profiled_env_or(profile: &str, key: &str, default: &str) -> String {
    profiled_env_opt(profile, key).unwrap_or_else(|| default.to_string())
}

fn profiled_env_u16(profile: &str, key: &str, default: u16) -> u16 {
    profiled_env_opt(profile, key)
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

fn profiled_env_u64(profile: &str, key: &str, default: u64) -> u64 {
    profiled_env_opt(profile, key)
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

// ── Top-level config ──────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Active profile name (empty = default).
    pub profile: String,
    pub server: ServerConfig,
    pub agent: AgentConfig,
    pub polling: PollConfig,
}

impl Config {
    /// Build config from environment variables (call `load_dotenv()` first).
    /// Profile is read from `GROUNDED_PROFILE`. When set (e.g. `PROD`),
    /// every key is first looked up as `{PROFILE}_{KEY}`, falling back to `{KEY}`.
    pub fn from_env() -> Self {
        let profile = env_or("GROUNDED_PROFILE", "").to_uppercase();
        Self::for_profile(&profile)
    }

    /// Build config for a specific named profile (empty string = default).
    pub fn for_profile(profile: &str) -> Self {
        let p = profile.to_uppercase();
        let p = p.as_str();
        Self {
            profile: p.to_string(),
            server: ServerConfig::from_env_profiled(p),
            agent: AgentConfig::from_env_profiled(p),
            polling: PollConfig::from_env_profiled(p),
        }
    }

    pub fn profile_label(&self) -> &str {
        if self.profile.is_empty() { "default" } else { &self.profile }
    }

    /// Print a redacted summary for startup logs.
    pub fn log_summary(&self) {
        tracing::info!("Config loaded (profile: {}):", self.profile_label());
        tracing::info!("  server:   {}:{}", self.server.host, self.server.port);
        tracing::info!(
            "  agent:    name={}, model={}, api_version={}",
            self.agent.agent_name.as_deref().unwrap_or("(none)"),
            self.agent.model,
            self.agent.api_version
        );
        tracing::info!(
            "  bing:     connection={}",
            self.agent.bing_connection_name.as_deref().unwrap_or("(none)")
        );
        tracing::info!(
            "  polling:  initial={}ms, max={}ms, timeout={}s",
            self.polling.initial_delay_ms,
            self.polling.max_delay_ms,
            self.polling.timeout_secs
        );
    }
}

// ── Server ────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub cors_origin: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8000,
            cors_origin: "*".to_string(),
        }
    }
}

impl ServerConfig {
    fn from_env_profiled(p: &str) -> Self {
        let defaults = Self::default();
        Self {
            host: profiled_env_or(p, "HOST", &defaults.host),
            port: profiled_env_u16(p, "PORT", defaults.port),
            cors_origin: profiled_env_or(p, "CORS_ORIGIN", &defaults.cors_origin),
        }
    }
}

// ── Agent platform ────────────────────────────────────────────

/// Raw agent settings as read from the environment.
///
/// Required values stay optional here so the server can start and report
/// exactly which ones are missing; [`AgentConfig::validate`] produces the
/// checked [`AgentSettings`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentConfig {
    /// `PROJECT_CONNECTION_STRING` is the project endpoint URL.
    pub project_endpoint: Option<String>,
    /// `BING_RESOURCE_NAME` names the Bing grounding connection.
    pub bing_connection_name: Option<String>,
    pub agent_name: Option<String>,
    pub agent_instructions: Option<String>,
    pub model: String,
    pub api_version: String,
}

impl AgentConfig {
    fn from_env_profiled(p: &str) -> Self {
        Self {
            project_endpoint: profiled_env_opt(p, "PROJECT_CONNECTION_STRING"),
            bing_connection_name: profiled_env_opt(p, "BING_RESOURCE_NAME"),
            agent_name: profiled_env_opt(p, "AGENT_NAME"),
            agent_instructions: profiled_env_opt(p, "AGENT_INSTRUCTIONS"),
            model: profiled_env_or(p, "MODEL_DEPLOYMENT_NAME", DEFAULT_MODEL),
            api_version: profiled_env_or(p, "AGENTS_API_VERSION", DEFAULT_API_VERSION),
        }
    }

    /// Check the required values, naming every one that is missing.
    pub fn validate(&self) -> Result<AgentSettings, ConfigError> {
        let mut missing = Vec::new();
        if self.project_endpoint.is_none() {
            missing.push("PROJECT_CONNECTION_STRING".to_string());
        }
        if self.bing_connection_name.is_none() {
            missing.push("BING_RESOURCE_NAME".to_string());
        }

        match (&self.project_endpoint, &self.bing_connection_name) {
            (Some(endpoint), Some(bing)) => Ok(AgentSettings {
                project_endpoint: endpoint.trim_end_matches('/').to_string(),
                bing_connection_name: bing.clone(),
                agent_name: self.agent_name.clone(),
                agent_instructions: self.agent_instructions.clone(),
                model: self.model.clone(),
                api_version: self.api_version.clone(),
            }),
            _ => Err(ConfigError::Missing(missing)),
        }
    }
}

/// Validated agent settings, passed by reference into the search pipeline.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentSettings {
    pub project_endpoint: String,
    pub bing_connection_name: String,
    pub agent_name: Option<String>,
    pub agent_instructions: Option<String>,
    pub model: String,
    pub api_version: String,
}

// ── Run polling ───────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PollConfig {
    pub initial_delay_ms: u64,
    pub max_delay_ms: u64,
    pub timeout_secs: u64,
}

impl Default for PollConfig {
    fn default() -> Self {
        Self {
            initial_delay_ms: 1000,
            max_delay_ms: 5000,
            timeout_secs: 60,
        }
    }
}

impl PollConfig {
    fn from_env_profiled(p: &str) -> Self {
        let defaults = Self::default();
        Self {
            initial_delay_ms: profiled_env_u64(p, "RUN_POLL_INITIAL_MS", defaults.initial_delay_ms),
            max_delay_ms: profiled_env_u64(p, "RUN_POLL_MAX_MS", defaults.max_delay_ms),
            timeout_secs: profiled_env_u64(p, "RUN_TIMEOUT_SECS", defaults.timeout_secs),
        }
    }
}
