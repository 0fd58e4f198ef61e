//! Configuration system for YieldLens.
//!
//! Uses `figment` for layered configuration: defaults -> config file -> environment -> overrides.
//! Configuration is loaded from `~/.config/yieldlens/config.toml` and/or `.yieldlens/config.toml`
//! in the workspace directory.

use crate::error::ConfigError;
use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Secondary environment variable consulted when `llm.api_key_env` is unset.
pub const FALLBACK_API_KEY_ENV: &str = "GEMINI_API_KEY";

/// Top-level configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub llm: LlmConfig,
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl AppConfig {
    /// Validate every section and return human-readable warnings.
    pub fn validate(&self) -> Vec<String> {
        let mut warnings = self.llm.validate();
        warnings.extend(self.server.validate());
        warnings
    }
}

/// Configuration for the generative model provider.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LlmConfig {
    /// Provider name. Only "gemini" is supported.
    pub provider: String,
    /// Model identifier.
    pub model: String,
    /// Environment variable name containing the API key.
    pub api_key_env: String,
    /// Explicit API key. Takes precedence over the environment.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,
    /// Optional base URL override for the API endpoint.
    pub base_url: Option<String>,
    /// Maximum tokens to generate in a response.
    pub max_tokens: usize,
    /// Sampling temperature.
    pub temperature: f32,
    /// Whole-request timeout.
    pub timeout_secs: u64,
    pub connect_timeout_secs: u64,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            provider: "gemini".to_string(),
            model: "gemini-2.5-flash-preview-04-17".to_string(),
            api_key_env: "API_KEY".to_string(),
            api_key: None,
            base_url: None,
            max_tokens: 8192,
            temperature: 0.4,
            timeout_secs: 120,
            connect_timeout_secs: 10,
        }
    }
}

impl LlmConfig {
    /// Validate this LLM config and return any warnings.
    pub fn validate(&self) -> Vec<String> {
        let mut warnings = Vec::new();
        if self.temperature < 0.0 || self.temperature > 2.0 {
            warnings.push(format!(
                "temperature ({}) is outside the typical range 0.0-2.0",
                self.temperature
            ));
        }
        if self.max_tokens == 0 {
            warnings.push("max_tokens is 0; the model cannot produce a response".to_string());
        }
        if self.timeout_secs == 0 {
            warnings.push("timeout_secs is 0; every model request will time out".to_string());
        }
        if !self.provider.eq_ignore_ascii_case("gemini") {
            warnings.push(format!(
                "provider '{}' is not supported; only 'gemini' is available",
                self.provider
            ));
        }
        warnings
    }

    /// Resolve the API key: explicit value, then `api_key_env`, then
    /// [`FALLBACK_API_KEY_ENV`]. Blank values count as absent.
    pub fn resolve_api_key(&self) -> Option<String> {
        [
            self.api_key.clone(),
            std::env::var(&self.api_key_env).ok(),
            std::env::var(FALLBACK_API_KEY_ENV).ok(),
        ]
        .into_iter()
        .flatten()
        .map(|k| k.trim().to_string())
        .find(|k| !k.is_empty())
    }
}

/// Configuration for the HTTP server hosting dashboard sessions.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Host to bind to.
    pub host: String,
    /// Port to listen on.
    pub port: u16,
    /// Largest accepted upload body.
    pub max_upload_bytes: usize,
    /// Sessions idle for longer than this are removed (0 = never).
    pub session_ttl_secs: u64,
    /// Interval of the idle-session sweep.
    pub session_sweep_secs: u64,
    /// Static frontend served for non-API paths, if it contains `index.html`.
    pub frontend_dir: Option<PathBuf>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 8080,
            max_upload_bytes: 10 * 1024 * 1024,
            session_ttl_secs: 3600,
            session_sweep_secs: 60,
            frontend_dir: None,
        }
    }
}

impl ServerConfig {
    pub fn validate(&self) -> Vec<String> {
        let mut warnings = Vec::new();
        if self.port == 0 {
            warnings.push("server.port is 0; an ephemeral port will be chosen".to_string());
        }
        if self.max_upload_bytes == 0 {
            warnings.push("server.max_upload_bytes is 0; every upload will be rejected".to_string());
        }
        if self.session_ttl_secs > 0 && self.session_sweep_secs == 0 {
            warnings.push(
                "server.session_sweep_secs is 0; idle sessions will never be reaped".to_string(),
            );
        }
        if let Some(dir) = &self.frontend_dir
            && !dir.join("index.html").exists()
        {
            warnings.push(format!(
                "server.frontend_dir '{}' has no index.html; static frontend disabled",
                dir.display()
            ));
        }
        warnings
    }

    /// The `host:port` string to bind.
    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

/// Log output settings. Console output always goes to stderr.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Directory for daily-rolling JSON log files. Disabled when unset.
    pub dir: Option<PathBuf>,
    /// Default filter directive when `RUST_LOG` is unset (e.g. "info").
    pub filter: Option<String>,
}

/// Load configuration with layered sources.
///
/// Priority (highest to lowest):
/// 1. Explicit overrides (passed as argument)
/// 2. Environment variables (prefixed with `YIELDLENS_`)
/// 3. Workspace-local config (`.yieldlens/config.toml`)
/// 4. User config (`~/.config/yieldlens/config.toml`)
/// 5. Built-in defaults
pub fn load_config(
    workspace: Option<&Path>,
    overrides: Option<&AppConfig>,
) -> Result<AppConfig, ConfigError> {
    let mut figment = Figment::from(Serialized::defaults(AppConfig::default()));

    if let Some(user_config) = user_config_path()
        && user_config.exists()
    {
        figment = figment.merge(Toml::file(&user_config));
    }

    if let Some(ws) = workspace {
        let ws_config = ws.join(".yieldlens").join("config.toml");
        if ws_config.exists() {
            figment = figment.merge(Toml::file(&ws_config));
        }
    }

    // YIELDLENS_LLM__MODEL, YIELDLENS_SERVER__PORT, etc.
    figment = figment.merge(Env::prefixed("YIELDLENS_").split("__"));

    if let Some(overrides) = overrides {
        figment = figment.merge(Serialized::defaults(overrides));
    }

    figment.extract().map_err(|e| ConfigError::ParseError {
        message: e.to_string(),
    })
}

fn user_config_path() -> Option<PathBuf> {
    directories::ProjectDirs::from("dev", "yieldlens", "yieldlens")
        .map(|dirs| dirs.config_dir().join("config.toml"))
}
