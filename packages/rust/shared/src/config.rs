//! Application configuration for Visapress.
//!
//! User config lives at `~/.visapress/visapress.toml`.
//! CLI flags override config file values, which override defaults.
//! Secrets are never stored in the file, only the names of the env vars
//! that hold them.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{PipelineError, Result};

/// Default configuration file name.
const CONFIG_FILE_NAME: &str = "visapress.toml";

/// Default config directory name under the user's home.
const CONFIG_DIR_NAME: &str = ".visapress";

// ---------------------------------------------------------------------------
// Config structs (matching visapress.toml schema)
// ---------------------------------------------------------------------------

/// Top-level application config, deserialized from TOML.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    /// OpenRouter (LLM) settings.
    #[serde(default)]
    pub openrouter: OpenRouterConfig,

    /// Stock-photo search settings.
    #[serde(default)]
    pub unsplash: UnsplashConfig,

    /// Durable image storage.
    #[serde(default)]
    pub object_storage: ObjectStorageConfig,

    /// Public site routing and cache hooks.
    #[serde(default)]
    pub site: SiteConfig,

    /// Pipeline defaults.
    #[serde(default)]
    pub pipeline: PipelineConfig,
}

/// `[openrouter]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OpenRouterConfig {
    /// Name of the env var holding the API key.
    #[serde(default = "default_api_key_env")]
    pub api_key_env: String,

    /// Model used for planning and article generation.
    #[serde(default = "default_model")]
    pub default_model: String,

    /// API base URL (without `/chat/completions`).
    #[serde(default = "default_openrouter_base")]
    pub base_url: String,

    /// Request timeout in seconds.
    #[serde(default = "default_llm_timeout")]
    pub timeout_secs: u64,

    /// Completion token cap per request.
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,

    #[serde(default = "default_temperature")]
    pub temperature: f32,
}

impl Default for OpenRouterConfig {
    fn default() -> Self {
        Self {
            api_key_env: default_api_key_env(),
            default_model: default_model(),
            base_url: default_openrouter_base(),
            timeout_secs: default_llm_timeout(),
            max_tokens: default_max_tokens(),
            temperature: default_temperature(),
        }
    }
}

fn default_api_key_env() -> String {
    "OPENROUTER_API_KEY".into()
}
fn default_model() -> String {
    "anthropic/claude-3.5-sonnet".into()
}
fn default_openrouter_base() -> String {
    "https://openrouter.ai/api/v1".into()
}
fn default_llm_timeout() -> u64 {
    120
}
fn default_max_tokens() -> u32 {
    8_000
}
fn default_temperature() -> f32 {
    0.7
}

/// `[unsplash]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UnsplashConfig {
    /// Name of the env var holding the access key.
    #[serde(default = "default_unsplash_key_env")]
    pub access_key_env: String,

    #[serde(default = "default_unsplash_base")]
    pub base_url: String,

    /// Timeout for search and download, in seconds.
    #[serde(default = "default_photo_timeout")]
    pub timeout_secs: u64,
}

impl Default for UnsplashConfig {
    fn default() -> Self {
        Self {
            access_key_env: default_unsplash_key_env(),
            base_url: default_unsplash_base(),
            timeout_secs: default_photo_timeout(),
        }
    }
}

fn default_unsplash_key_env() -> String {
    "UNSPLASH_ACCESS_KEY".into()
}
fn default_unsplash_base() -> String {
    "https://api.unsplash.com".into()
}
fn default_photo_timeout() -> u64 {
    15
}

/// `[object_storage]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ObjectStorageConfig {
    /// Storage API endpoint, e.g. `https://<project>.supabase.co/storage/v1`.
    #[serde(default)]
    pub endpoint: String,

    #[serde(default = "default_bucket")]
    pub bucket: String,

    /// Public URL prefix objects are served from.
    #[serde(default)]
    pub public_base_url: String,

    #[serde(default = "default_storage_key_env")]
    pub api_key_env: String,
}

impl Default for ObjectStorageConfig {
    fn default() -> Self {
        Self {
            endpoint: String::new(),
            bucket: default_bucket(),
            public_base_url: String::new(),
            api_key_env: default_storage_key_env(),
        }
    }
}

fn default_bucket() -> String {
    "blog-images".into()
}
fn default_storage_key_env() -> String {
    "OBJECT_STORAGE_KEY".into()
}

/// `[site]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SiteConfig {
    /// Public origin of the marketing site.
    #[serde(default = "default_site_url")]
    pub base_url: String,

    /// Path segment published articles live under.
    #[serde(default = "default_route_prefix")]
    pub route_prefix: String,

    /// Locale of the secondary title, if the site is bilingual.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub secondary_locale: Option<String>,

    /// Page-cache revalidation endpoint. Empty disables invalidation.
    #[serde(default)]
    pub revalidate_url: String,

    #[serde(default = "default_revalidate_env")]
    pub revalidate_secret_env: String,
}

impl Default for SiteConfig {
    fn default() -> Self {
        Self {
            base_url: default_site_url(),
            route_prefix: default_route_prefix(),
            secondary_locale: None,
            revalidate_url: String::new(),
            revalidate_secret_env: default_revalidate_env(),
        }
    }
}

fn default_site_url() -> String {
    "https://example.com".into()
}
fn default_route_prefix() -> String {
    "blog".into()
}
fn default_revalidate_env() -> String {
    "REVALIDATE_SECRET".into()
}

/// `[pipeline]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineConfig {
    /// Topics requested per plan when the caller gives none.
    #[serde(default = "default_topic_count")]
    pub default_topic_count: u32,

    /// Pause between subjects in a bulk run.
    #[serde(default = "default_bulk_delay")]
    pub bulk_delay_ms: u64,

    /// libSQL database file.
    #[serde(default = "default_database_path")]
    pub database_path: String,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            default_topic_count: default_topic_count(),
            bulk_delay_ms: default_bulk_delay(),
            database_path: default_database_path(),
        }
    }
}

fn default_topic_count() -> u32 {
    20
}
fn default_bulk_delay() -> u64 {
    1_000
}
fn default_database_path() -> String {
    "var/visapress.db".into()
}

// ---------------------------------------------------------------------------
// Config loading
// ---------------------------------------------------------------------------

/// Get the path to the config directory (`~/.visapress/`).
pub fn config_dir() -> Result<PathBuf> {
    let home = dirs::home_dir()
        .ok_or_else(|| PipelineError::config("could not determine home directory"))?;
    Ok(home.join(CONFIG_DIR_NAME))
}

/// Get the path to the config file (`~/.visapress/visapress.toml`).
pub fn config_file_path() -> Result<PathBuf> {
    Ok(config_dir()?.join(CONFIG_FILE_NAME))
}

/// Load the application config from disk. Returns defaults if the file does not exist.
pub fn load_config() -> Result<AppConfig> {
    let path = config_file_path()?;

    if !path.exists() {
        tracing::debug!(?path, "config file not found, using defaults");
        return Ok(AppConfig::default());
    }

    load_config_from(&path)
}

/// Load the application config from a specific file path.
pub fn load_config_from(path: &Path) -> Result<AppConfig> {
    let content = std::fs::read_to_string(path).map_err(|e| PipelineError::io(path, e))?;

    toml::from_str(&content)
        .map_err(|e| PipelineError::config(format!("failed to parse {}: {e}", path.display())))
}

/// Create the config directory and write a default config file.
/// Returns the path to the created file.
pub fn init_config() -> Result<PathBuf> {
    let dir = config_dir()?;
    std::fs::create_dir_all(&dir).map_err(|e| PipelineError::io(&dir, e))?;

    let path = dir.join(CONFIG_FILE_NAME);
    let config = AppConfig::default();
    let content =
        toml::to_string_pretty(&config).map_err(|e| PipelineError::config(e.to_string()))?;

    std::fs::write(&path, content).map_err(|e| PipelineError::io(&path, e))?;
    tracing::info!(?path, "created default config file");

    Ok(path)
}

/// Read a secret from the env var named `var_name`.
pub fn read_secret(var_name: &str) -> Result<String> {
    match std::env::var(var_name) {
        Ok(val) if !val.is_empty() => Ok(val),
        _ => Err(PipelineError::config(format!(
            "secret not found. Set the {var_name} environment variable."
        ))),
    }
}

/// Check that the OpenRouter API key env var is set and non-empty.
pub fn validate_api_key(config: &AppConfig) -> Result<()> {
    let var_name = &config.openrouter.api_key_env;
    read_secret(var_name).map(|_| ()).map_err(|_| {
        PipelineError::config(format!(
            "OpenRouter API key not found. Set the {var_name} environment variable.\n\
             Get a key at https://openrouter.ai/keys"
        ))
    })
}
