//! Configuration types and loading.
//!
//! Config is loaded from a JSON file (e.g. `~/.ruta/config.json`) and environment.
//! Kept minimal: server bind, Facebook Graph access, model backends, storage.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Top-level application config.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Config {
    /// HTTP API server settings.
    #[serde(default)]
    pub server: ServerConfig,

    /// Facebook Graph API settings (lead forms and leads).
    #[serde(default)]
    pub facebook: FacebookConfig,

    /// Model backend settings (Ollama or an OpenAI-compatible endpoint).
    #[serde(default)]
    pub llm: LlmConfig,

    /// Storage locations for the JSON stores.
    #[serde(default)]
    pub storage: StorageConfig,
}

/// API server bind and port settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServerConfig {
    /// Port for the HTTP API (default 7077).
    #[serde(default = "default_server_port")]
    pub port: u16,

    /// Bind address (default "127.0.0.1").
    #[serde(default = "default_server_bind")]
    pub bind: String,
}

fn default_server_port() -> u16 {
    7077
}

fn default_server_bind() -> String {
    "127.0.0.1".to_string()
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            port: default_server_port(),
            bind: default_server_bind(),
        }
    }
}

/// Facebook Graph API access.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FacebookConfig {
    /// Page access token with leads_retrieval. Overridden by FACEBOOK_ACCESS_TOKEN env when set.
    pub access_token: Option<String>,
    /// Page whose lead forms are synced.
    pub page_id: Option<String>,
    /// Graph API base URL override, mainly for tests (default https://graph.facebook.com/v19.0).
    pub api_base: Option<String>,
}

/// Model backend selection and defaults.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LlmConfig {
    /// "ollama" (default) or "openai" for any OpenAI-compatible endpoint.
    pub backend: Option<String>,
    /// Model used when an agent does not set one: use the exact name the
    /// backend reports (e.g. "llama3.2:latest" from `ollama list`).
    pub default_model: Option<String>,
    /// Ollama base URL (default http://127.0.0.1:11434).
    pub ollama_base_url: Option<String>,
    /// OpenAI-compatible base URL including the version segment
    /// (e.g. https://api.openai.com/v1 or http://127.0.0.1:1234/v1).
    pub openai_base_url: Option<String>,
    /// API key for the OpenAI-compatible endpoint. Overridden by OPENAI_API_KEY env when set.
    pub api_key: Option<String>,
}

/// Storage locations.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StorageConfig {
    /// Override the data directory holding the JSON stores. Relative paths
    /// are resolved against the config file's parent. Omit to use the
    /// default `data` subdirectory (~/.ruta/data when config is ~/.ruta/config.json).
    #[serde(default)]
    pub data_dir: Option<PathBuf>,
}

/// Resolve the Facebook access token: env FACEBOOK_ACCESS_TOKEN overrides config.
pub fn resolve_facebook_token(config: &Config) -> Option<String> {
    std::env::var("FACEBOOK_ACCESS_TOKEN")
        .ok()
        .and_then(|s| {
            let t = s.trim();
            if t.is_empty() {
                None
            } else {
                Some(t.to_string())
            }
        })
        .or_else(|| {
            config
                .facebook
                .access_token
                .as_ref()
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
        })
}

/// Resolve the OpenAI-compatible API key: env OPENAI_API_KEY overrides config.
pub fn resolve_openai_api_key(config: &Config) -> Option<String> {
    std::env::var("OPENAI_API_KEY")
        .ok()
        .and_then(|s| {
            let t = s.trim();
            if t.is_empty() {
                None
            } else {
                Some(t.to_string())
            }
        })
        .or_else(|| {
            config
                .llm
                .api_key
                .as_ref()
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
        })
}

/// True if the bind address is loopback (127.0.0.1, ::1, etc.).
pub fn is_loopback_bind(bind: &str) -> bool {
    let b = bind.trim();
    b == "127.0.0.1" || b == "::1" || b == "localhost"
}

/// Resolve config path from env or default.
pub fn default_config_path() -> PathBuf {
    std::env::var("RUTA_CONFIG_PATH").map(PathBuf::from).unwrap_or_else(|_| {
        dirs::home_dir()
            .map(|h| h.join(".ruta").join("config.json"))
            .unwrap_or_else(|| PathBuf::from("config.json"))
    })
}

/// Load config from the default path (or RUTA_CONFIG_PATH). Missing file => default config.
/// Returns the config and the path that was used (for resolving the data directory).
pub fn load_config(path: Option<PathBuf>) -> Result<(Config, PathBuf)> {
    let path = path.unwrap_or_else(default_config_path);
    let config = if !path.exists() {
        log::debug!("config file not found, using defaults: {}", path.display());
        Config::default()
    } else {
        let s = std::fs::read_to_string(&path)
            .with_context(|| format!("reading config from {}", path.display()))?;
        serde_json::from_str(&s)
            .with_context(|| format!("parsing config from {}", path.display()))?
    };
    Ok((config, path))
}

/// Default data directory when no override is set: `data` subdirectory of the config file's parent.
pub fn data_dir(config_path: &Path) -> PathBuf {
    config_path
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."))
        .join("data")
}

/// Resolve the data directory: uses `config.storage.dataDir` if set (relative paths resolved against the config file's parent), otherwise the default `data` subdirectory.
pub fn resolve_data_dir(config: &Config, config_path: &Path) -> PathBuf {
    let config_parent = config_path
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."));
    match &config.storage.data_dir {
        Some(d) if !d.as_os_str().is_empty() => {
            if d.is_absolute() {
                d.clone()
            } else {
                config_parent.join(d)
            }
        }
        _ => data_dir(config_path),
    }
}
