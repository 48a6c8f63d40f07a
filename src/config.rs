//! Configuration management for formatter-relay
//!
//! Parses TOML configuration files and resolves the per-tool model cascades
//! against the process environment. Resolution happens once at startup; the
//! result is read-only for the life of the process.

use crate::error::{AppError, AppResult};
use crate::tools::{ToolKind, ToolSettings};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;

/// Maximum number of model attempts in one cascade
pub const MAX_ATTEMPTS: usize = 3;

/// Upper bound for `server.establish_timeout_seconds`
pub const MAX_ESTABLISH_TIMEOUT_SECONDS: u64 = 300;

/// Root configuration structure
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Config {
    pub server: ServerConfig,
    #[serde(default)]
    pub providers: BTreeMap<String, ProviderConfig>,
    #[serde(default)]
    pub tools: BTreeMap<String, ToolConfig>,
    #[serde(default)]
    pub observability: ObservabilityConfig,
}

/// Server configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    /// Time allowed for a provider to accept a request and deliver its first event
    #[serde(default = "default_establish_timeout")]
    pub establish_timeout_seconds: u64,
    /// Maximum accepted request body size
    #[serde(default = "default_max_body_bytes")]
    pub max_body_bytes: usize,
}

impl ServerConfig {
    pub fn establish_timeout(&self) -> Duration {
        Duration::from_secs(self.establish_timeout_seconds)
    }
}

fn default_establish_timeout() -> u64 {
    30
}

fn default_max_body_bytes() -> usize {
    1024 * 1024
}

/// An OpenAI-compatible chat-completion provider
///
/// Literal values and environment indirections may both be given; a set,
/// non-empty environment variable wins over the literal.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct ProviderConfig {
    base_url: Option<String>,
    base_url_env: Option<String>,
    api_key: Option<String>,
    api_key_env: Option<String>,
    #[serde(default)]
    headers: BTreeMap<String, String>,
}

/// Per-tool settings and its ordered model attempts
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct ToolConfig {
    temperature: Option<f64>,
    max_tokens: Option<u32>,
    #[serde(default)]
    attempts: Vec<AttemptConfig>,
}

impl ToolConfig {
    pub fn attempts(&self) -> &[AttemptConfig] {
        &self.attempts
    }
}

/// One entry of a tool's cascade
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct AttemptConfig {
    provider: String,
    model: Option<String>,
    model_env: Option<String>,
}

impl AttemptConfig {
    pub fn provider(&self) -> &str {
        &self.provider
    }
}

/// Observability configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ObservabilityConfig {
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

/// Source of environment variables used during resolution
///
/// Abstracted so tests can resolve against a fixed map instead of mutating
/// the process environment.
pub trait EnvSource {
    fn var(&self, key: &str) -> Option<String>;
}

/// Reads from the real process environment
#[derive(Debug, Clone, Copy, Default)]
pub struct ProcessEnv;

impl EnvSource for ProcessEnv {
    fn var(&self, key: &str) -> Option<String> {
        std::env::var(key).ok()
    }
}

impl EnvSource for HashMap<String, String> {
    fn var(&self, key: &str) -> Option<String> {
        self.get(key).cloned()
    }
}

fn lookup(env: &dyn EnvSource, key: Option<&str>) -> Option<String> {
    key.and_then(|k| env.var(k))
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

fn pick(env: &dyn EnvSource, env_key: Option<&str>, literal: Option<&str>) -> Option<String> {
    lookup(env, env_key).or_else(|| {
        literal
            .map(str::trim)
            .filter(|v| !v.is_empty())
            .map(str::to_string)
    })
}

fn is_http_url(url: &str) -> bool {
    url.starts_with("http://") || url.starts_with("https://")
}

/// A provider whose URL and credential resolved at startup
#[derive(Clone)]
pub struct ResolvedProvider {
    pub name: String,
    pub base_url: String,
    pub api_key: String,
    pub headers: BTreeMap<String, String>,
}

impl std::fmt::Debug for ResolvedProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResolvedProvider")
            .field("name", &self.name)
            .field("base_url", &self.base_url)
            .field("api_key", &"<redacted>")
            .field("headers", &self.headers)
            .finish()
    }
}

/// One resolved `(provider, model)` pair
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedAttempt {
    pub provider: String,
    pub model: String,
}

/// A tool's resolved cascade
///
/// Generation settings are not part of the plan; see [`Config::tool_settings`].
#[derive(Debug, Clone)]
pub struct ToolPlan {
    pub tool: ToolKind,
    /// Empty when the primary attempt did not resolve
    pub attempts: Vec<ResolvedAttempt>,
}

impl Config {
    /// Load configuration from a TOML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> AppResult<Self> {
        let path_display = path.as_ref().display().to_string();

        let content = std::fs::read_to_string(path.as_ref()).map_err(|source| {
            AppError::ConfigFileRead {
                path: path_display.clone(),
                source,
            }
        })?;

        let config: Self = toml::from_str(&content).map_err(|source| AppError::ConfigParseFailed {
            path: path_display.clone(),
            source,
        })?;

        config
            .validate()
            .map_err(|e| AppError::ConfigValidationFailed {
                path: path_display,
                reason: e.to_string(),
            })?;

        Ok(config)
    }

    /// Built-in configuration, driven entirely by environment variables
    pub fn builtin() -> AppResult<Self> {
        Self::from_str(crate::cli::generate_config_template())
    }

    /// Validate structure (not environment) of the configuration
    pub fn validate(&self) -> AppResult<()> {
        if self.server.establish_timeout_seconds == 0 {
            return Err(AppError::Config(
                "server.establish_timeout_seconds must be greater than 0".to_string(),
            ));
        }
        if self.server.establish_timeout_seconds > MAX_ESTABLISH_TIMEOUT_SECONDS {
            return Err(AppError::Config(format!(
                "server.establish_timeout_seconds cannot exceed {} seconds, got {}",
                MAX_ESTABLISH_TIMEOUT_SECONDS, self.server.establish_timeout_seconds
            )));
        }
        if self.server.max_body_bytes == 0 {
            return Err(AppError::Config(
                "server.max_body_bytes must be greater than 0".to_string(),
            ));
        }

        for (name, provider) in &self.providers {
            if provider.base_url.is_none() && provider.base_url_env.is_none() {
                return Err(AppError::Config(format!(
                    "providers.{name} needs base_url or base_url_env"
                )));
            }
            if let Some(url) = &provider.base_url {
                if !is_http_url(url) {
                    return Err(AppError::Config(format!(
                        "providers.{name}.base_url must start with http:// or https://, got '{url}'"
                    )));
                }
            }
            if provider.api_key.is_none() && provider.api_key_env.is_none() {
                return Err(AppError::Config(format!(
                    "providers.{name} needs api_key or api_key_env"
                )));
            }
        }

        for (name, tool) in &self.tools {
            ToolKind::from_str(name).map_err(|_| {
                AppError::Config(format!(
                    "unknown tool '{name}' (expected one of: {})",
                    ToolKind::ALL
                        .iter()
                        .map(|t| t.as_str())
                        .collect::<Vec<_>>()
                        .join(", ")
                ))
            })?;

            if tool.attempts.len() > MAX_ATTEMPTS {
                return Err(AppError::Config(format!(
                    "tools.{name} has {} attempts; at most {MAX_ATTEMPTS} are allowed",
                    tool.attempts.len()
                )));
            }
            if let Some(t) = tool.temperature {
                if !(0.0..=2.0).contains(&t) {
                    return Err(AppError::Config(format!(
                        "tools.{name}.temperature must be within 0.0..=2.0, got {t}"
                    )));
                }
            }
            if tool.max_tokens == Some(0) {
                return Err(AppError::Config(format!(
                    "tools.{name}.max_tokens must be greater than 0"
                )));
            }
            for (i, attempt) in tool.attempts.iter().enumerate() {
                if !self.providers.contains_key(&attempt.provider) {
                    return Err(AppError::Config(format!(
                        "tools.{name}.attempts[{i}] references unknown provider '{}'",
                        attempt.provider
                    )));
                }
                if attempt.model.is_none() && attempt.model_env.is_none() {
                    return Err(AppError::Config(format!(
                        "tools.{name}.attempts[{i}] needs model or model_env"
                    )));
                }
            }
        }

        Ok(())
    }

    /// Resolve provider URLs and credentials against the environment
    ///
    /// Providers whose URL or key does not resolve are left out; attempts that
    /// reference them are dropped during tool resolution.
    pub fn resolve_providers(&self, env: &dyn EnvSource) -> BTreeMap<String, ResolvedProvider> {
        let mut resolved = BTreeMap::new();

        for (name, provider) in &self.providers {
            let base_url = pick(
                env,
                provider.base_url_env.as_deref(),
                provider.base_url.as_deref(),
            );
            let api_key = pick(
                env,
                provider.api_key_env.as_deref(),
                provider.api_key.as_deref(),
            );

            match (base_url, api_key) {
                (Some(base_url), Some(api_key)) if is_http_url(&base_url) => {
                    resolved.insert(
                        name.clone(),
                        ResolvedProvider {
                            name: name.clone(),
                            base_url: base_url.trim_end_matches('/').to_string(),
                            api_key,
                            headers: provider.headers.clone(),
                        },
                    );
                }
                (Some(base_url), Some(_)) => {
                    tracing::warn!(
                        provider = %name,
                        base_url = %base_url,
                        "Provider base URL is not an http(s) URL; provider disabled"
                    );
                }
                (base_url, api_key) => {
                    tracing::info!(
                        provider = %name,
                        has_base_url = base_url.is_some(),
                        has_api_key = api_key.is_some(),
                        "Provider not resolved from environment; provider disabled"
                    );
                }
            }
        }

        resolved
    }

    /// Generation parameters for `tool`, falling back to its defaults
    pub fn tool_settings(&self, tool: ToolKind) -> ToolSettings {
        let tool_config = self.tools.get(tool.as_str());
        let defaults = ToolSettings::defaults_for(tool);
        ToolSettings {
            temperature: tool_config
                .and_then(|t| t.temperature)
                .unwrap_or(defaults.temperature),
            max_tokens: tool_config
                .and_then(|t| t.max_tokens)
                .unwrap_or(defaults.max_tokens),
        }
    }

    /// Resolve one tool's cascade
    ///
    /// The first attempt must resolve (model and provider); otherwise the
    /// tool is returned with no attempts and every request to it fails with
    /// a configuration error. Later attempts that do not resolve are omitted.
    pub fn resolve_tool(
        &self,
        tool: ToolKind,
        providers: &BTreeMap<String, ResolvedProvider>,
        env: &dyn EnvSource,
    ) -> ToolPlan {
        let tool_config = self.tools.get(tool.as_str());

        let mut attempts = Vec::new();
        for (i, attempt) in tool_config
            .map(|t| t.attempts.as_slice())
            .unwrap_or_default()
            .iter()
            .enumerate()
        {
            let model = pick(env, attempt.model_env.as_deref(), attempt.model.as_deref());
            let provider_ok = providers.contains_key(&attempt.provider);

            match model {
                Some(model) if provider_ok => attempts.push(ResolvedAttempt {
                    provider: attempt.provider.clone(),
                    model,
                }),
                model if i == 0 => {
                    tracing::error!(
                        tool = %tool,
                        provider = %attempt.provider,
                        model_env = ?attempt.model_env,
                        has_model = model.is_some(),
                        provider_resolved = provider_ok,
                        "Primary model attempt is not configured; tool will reject requests"
                    );
                    break;
                }
                model => {
                    tracing::info!(
                        tool = %tool,
                        attempt = i + 1,
                        provider = %attempt.provider,
                        model_env = ?attempt.model_env,
                        has_model = model.is_some(),
                        provider_resolved = provider_ok,
                        "Fallback attempt not configured; omitted from cascade"
                    );
                }
            }
        }

        ToolPlan { tool, attempts }
    }
}

impl FromStr for Config {
    type Err = AppError;

    fn from_str(toml_str: &str) -> Result<Self, Self::Err> {
        let config: Config =
            toml::from_str(toml_str).map_err(|source| AppError::ConfigParseFailed {
                path: "<string>".to_string(),
                source,
            })?;

        config.validate()?;
        Ok(config)
    }
}
