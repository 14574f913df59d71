pub mod validation;

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use self::validation::validate_config;

/// Error type for configuration loading and validation.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),
    #[error("Failed to parse YAML: {0}")]
    Yaml(#[from] serde_yaml::Error),
    #[error("Config validation error: {0}")]
    Validation(String),
}

/// Server configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default = "default_host")]
    pub host: String,
    /// Overall upstream request deadline in seconds. This is the only
    /// timeout applied to an in-flight inference stream.
    #[serde(default = "default_timeout")]
    pub timeout: u64,
    #[serde(default = "default_http_pool_max_idle_per_host")]
    pub http_pool_max_idle_per_host: usize,
    #[serde(default = "default_http_pool_idle_timeout_secs")]
    pub http_pool_idle_timeout_secs: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub runtime_worker_threads: Option<usize>,
    #[serde(default)]
    pub base_path: String,
}

fn default_port() -> u16 {
    8088
}
fn default_host() -> String {
    "0.0.0.0".to_string()
}
fn default_timeout() -> u64 {
    180
}
fn default_http_pool_max_idle_per_host() -> usize {
    16
}
fn default_http_pool_idle_timeout_secs() -> u64 {
    15
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            port: default_port(),
            host: default_host(),
            timeout: default_timeout(),
            http_pool_max_idle_per_host: default_http_pool_max_idle_per_host(),
            http_pool_idle_timeout_secs: default_http_pool_idle_timeout_secs(),
            runtime_worker_threads: None,
            base_path: String::new(),
        }
    }
}

/// Notion workspace identity and session credentials.
///
/// `token_v2` is a static session cookie supplied by the operator; this
/// proxy does not manage its lifecycle.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NotionConfig {
    #[serde(default = "default_base_url")]
    pub base_url: String,
    #[serde(default)]
    pub token_v2: String,
    #[serde(default)]
    pub space_id: String,
    #[serde(default)]
    pub user_id: String,
    #[serde(default = "default_user_name")]
    pub user_name: String,
    #[serde(default)]
    pub user_email: String,
    #[serde(default = "default_client_version")]
    pub client_version: String,
    #[serde(default = "default_timezone")]
    pub timezone: String,
    #[serde(default = "default_thread_type")]
    pub thread_type: String,
}

fn default_base_url() -> String {
    "https://www.notion.so".to_string()
}
fn default_user_name() -> String {
    "User".to_string()
}
fn default_client_version() -> String {
    "23.13.0.1".to_string()
}
fn default_timezone() -> String {
    "Asia/Shanghai".to_string()
}
fn default_thread_type() -> String {
    "workflow".to_string()
}

impl Default for NotionConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            token_v2: String::new(),
            space_id: String::new(),
            user_id: String::new(),
            user_name: default_user_name(),
            user_email: String::new(),
            client_version: default_client_version(),
            timezone: default_timezone(),
            thread_type: default_thread_type(),
        }
    }
}

/// One public model alias mapped to the upstream internal model code.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelAlias {
    pub id: String,
    pub upstream: String,
}

/// Model catalog: public aliases and the default alias used when a client
/// omits or sends an unknown model.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelsConfig {
    #[serde(rename = "default", default = "default_model_alias")]
    pub default_model: String,
    #[serde(default = "default_model_aliases")]
    pub aliases: Vec<ModelAlias>,
}

fn default_model_alias() -> String {
    "claude-opus-4.5".to_string()
}

fn default_model_aliases() -> Vec<ModelAlias> {
    [
        ("claude-opus-4.5", "apple-danish"),
        ("claude-sonnet-4.5", "anthropic-sonnet-alt"),
        ("claude-opus-4.1", "anthropic-opus-4.1"),
        ("gpt-5", "openai-turbo"),
        ("gpt-4.1", "openai-gpt-4.1"),
    ]
    .into_iter()
    .map(|(id, upstream)| ModelAlias {
        id: id.to_string(),
        upstream: upstream.to_string(),
    })
    .collect()
}

impl Default for ModelsConfig {
    fn default() -> Self {
        Self {
            default_model: default_model_alias(),
            aliases: default_model_aliases(),
        }
    }
}

impl ModelsConfig {
    /// Map a public alias to the upstream model code, falling back to the
    /// default alias's mapping for unknown names.
    #[must_use]
    pub fn resolve<'a>(&'a self, alias: &'a str) -> &'a str {
        self.lookup(alias)
            .or_else(|| self.lookup(&self.default_model))
            .unwrap_or(alias)
    }

    fn lookup(&self, alias: &str) -> Option<&str> {
        self.aliases
            .iter()
            .find(|entry| entry.id == alias)
            .map(|entry| entry.upstream.as_str())
    }
}

/// Client authentication configuration. An empty key list disables
/// authentication entirely.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ClientAuthConfig {
    #[serde(default)]
    pub allowed_keys: Vec<String>,
}

/// Feature flags and settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FeaturesConfig {
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

fn default_log_level() -> String {
    "INFO".to_string()
}

impl Default for FeaturesConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
        }
    }
}

/// Top-level application configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub notion: NotionConfig,
    #[serde(default)]
    pub models: ModelsConfig,
    #[serde(default)]
    pub client_authentication: ClientAuthConfig,
    #[serde(default)]
    pub features: FeaturesConfig,
}

/// Credential overlay written by the desktop control panel to
/// `~/.notion-ai-proxy/config.json`. Fields present there take priority
/// over the YAML file.
#[derive(Debug, Default, Deserialize)]
struct CredentialOverlay {
    token_v2: Option<String>,
    space_id: Option<String>,
    user_id: Option<String>,
    port: Option<u16>,
}

fn overlay_path() -> Option<PathBuf> {
    let home = std::env::var_os("HOME").or_else(|| std::env::var_os("USERPROFILE"))?;
    Some(PathBuf::from(home).join(".notion-ai-proxy").join("config.json"))
}

fn apply_credential_overlay(config: &mut AppConfig) {
    let Some(path) = overlay_path() else {
        return;
    };
    let contents = match std::fs::read_to_string(&path) {
        Ok(contents) => contents,
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => return,
        Err(err) => {
            tracing::warn!(path = %path.display(), error = %err, "failed to read credential overlay");
            return;
        }
    };
    let overlay: CredentialOverlay = match serde_json::from_str(&contents) {
        Ok(overlay) => overlay,
        Err(err) => {
            tracing::warn!(path = %path.display(), error = %err, "failed to parse credential overlay");
            return;
        }
    };

    if let Some(token_v2) = overlay.token_v2 {
        config.notion.token_v2 = token_v2;
    }
    if let Some(space_id) = overlay.space_id {
        config.notion.space_id = space_id;
    }
    if let Some(user_id) = overlay.user_id {
        config.notion.user_id = user_id;
    }
    if let Some(port) = overlay.port {
        config.server.port = port;
    }
    tracing::info!(path = %path.display(), "applied credential overlay");
}

/// Load configuration from a YAML file, apply the JSON credential overlay,
/// and validate the merged result.
///
/// # Errors
///
/// Returns [`ConfigError::Io`] when reading the file fails, [`ConfigError::Yaml`]
/// when parsing fails, or [`ConfigError::Validation`] when semantic validation fails.
pub fn load_config(path: &str) -> Result<AppConfig, ConfigError> {
    let contents = std::fs::read_to_string(path)?;
    let mut config: AppConfig = serde_yaml::from_str(&contents)?;
    apply_credential_overlay(&mut config);
    validate_config(&config)?;
    Ok(config)
}
