use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Top-level configuration (loaded from anymd.toml)
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AnymdConfig {
    pub api: ApiConfig,
    pub cache: CacheConfig,
    pub storage: StorageConfig,
    pub sync: SyncConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ApiConfig {
    /// Remote store base URL (default: http://127.0.0.1:31009)
    pub base_url: String,
    /// Bearer token for authentication
    pub token: String,
    /// Request timeout in seconds (default: 30)
    pub timeout_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// Whether listing caching is enabled (default: true)
    pub enabled: bool,
    /// Listing cache TTL in milliseconds (default: 300000; 0 disables)
    pub ttl_ms: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Directory holding the editable markdown mirror
    pub cache_dir: PathBuf,
    /// JSON file persisting the active space id across restarts
    pub state_file: PathBuf,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncConfig {
    /// Watch-mode debounce window in milliseconds (default: 200)
    pub debounce_ms: u64,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            base_url: "http://127.0.0.1:31009".into(),
            token: String::new(),
            timeout_secs: 30,
        }
    }
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            ttl_ms: 300_000,
        }
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        let data_dir = dirs::data_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("anymd");
        Self {
            cache_dir: data_dir.join("markdown-cache"),
            state_file: data_dir.join("state.json"),
        }
    }
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self { debounce_ms: 200 }
    }
}

impl AnymdConfig {
    /// Effective listing TTL: zero when caching is disabled.
    pub fn effective_ttl_ms(&self) -> u64 {
        if self.cache.enabled {
            self.cache.ttl_ms
        } else {
            0
        }
    }

    /// Check the config is usable for talking to the remote store.
    pub fn validate(&self) -> Result<(), crate::AnymdError> {
        if self.api.token.is_empty() {
            return Err(crate::AnymdError::Config(
                "API token is missing; set api.token in anymd.toml".into(),
            ));
        }
        if self.api.base_url.is_empty() {
            return Err(crate::AnymdError::Config("api.base_url is empty".into()));
        }
        Ok(())
    }
}
