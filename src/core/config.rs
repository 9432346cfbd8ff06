//! Configuration management for trailscan.

use crate::core::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Main configuration structure.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Rule repository connection settings
    pub server: ServerConfig,
    /// Scan limits
    pub scan: ScanConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            server: ServerConfig::default(),
            scan: ScanConfig::default(),
        }
    }
}

impl Config {
    /// Load configuration from a JSON file.
    pub fn load(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)
            .map_err(|e| Error::ConfigLoad(format!("Failed to read config file: {}", e)))?;

        serde_json::from_str(&contents)
            .map_err(|e| Error::ConfigLoad(format!("Failed to parse config file: {}", e)))
    }

    /// Save configuration to a JSON file.
    pub fn save(&self, path: &Path) -> Result<()> {
        let contents = serde_json::to_string_pretty(self)?;

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .map_err(|e| Error::ConfigSave(format!("Failed to create config directory: {}", e)))?;
        }

        std::fs::write(path, contents)
            .map_err(|e| Error::ConfigSave(format!("Failed to write config file: {}", e)))
    }

    /// Load configuration from default location, or fall back to defaults.
    pub fn load_or_default() -> Self {
        let config_path = Self::default_config_path();

        if config_path.exists() {
            match Self::load(&config_path) {
                Ok(config) => return config,
                Err(e) => {
                    log::warn!("Failed to load config, using defaults: {}", e);
                }
            }
        }

        Self::default()
    }

    /// Get the default configuration file path.
    pub fn default_config_path() -> PathBuf {
        #[cfg(windows)]
        {
            PathBuf::from("C:\\ProgramData\\trailscan\\config.json")
        }

        #[cfg(not(windows))]
        {
            PathBuf::from("/etc/trailscan/config.json")
        }
    }
}

/// Rule repository connection settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Port the rule repository listens on
    pub port: u16,
    /// API path prefix prepended to every endpoint
    pub api_prefix: String,
    /// Basic-auth username
    pub auth_user: String,
    /// Basic-auth password
    pub auth_password: String,
    /// Timeout applied to every HTTP request (seconds)
    pub timeout_secs: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            port: 5000,
            api_prefix: "/api/v1".to_string(),
            auth_user: "admin".to_string(),
            auth_password: "admin".to_string(),
            timeout_secs: 30,
        }
    }
}

impl ServerConfig {
    /// Build the base URL for a given server address.
    ///
    /// The CLI passes a bare host or host:scheme string; the port and API
    /// prefix come from configuration.
    pub fn base_url(&self, server: &str) -> String {
        let server = server.trim_end_matches('/');
        if server.contains("://") {
            format!("{}:{}{}", server, self.port, self.api_prefix)
        } else {
            format!("http://{}:{}{}", server, self.port, self.api_prefix)
        }
    }
}

/// Scan limits.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScanConfig {
    /// Skip compound-document entries larger than this when decompressing (MB)
    pub max_entry_size_mb: u64,
    /// Skip reading memory regions larger than this per region (MB)
    pub max_region_size_mb: u64,
}

impl Default for ScanConfig {
    fn default() -> Self {
        Self {
            max_entry_size_mb: 100,
            max_region_size_mb: 256,
        }
    }
}

/// Explicit per-invocation scan context threaded through every engine call.
///
/// Replaces process-wide singletons: the host identifier is resolved once at
/// startup and stays constant for the whole invocation.
#[derive(Debug, Clone)]
pub struct ScanContext {
    /// Stable local hostname attached to every reported record
    pub hostname: String,
    /// Suppress per-item diagnostic output
    pub silent: bool,
    /// Scan limits
    pub scan: ScanConfig,
}

impl ScanContext {
    /// Build a context, resolving the host identifier from the local
    /// environment.
    pub fn new(config: &Config, silent: bool) -> Self {
        let hostname = hostname::get()
            .map(|h| h.to_string_lossy().to_string())
            .unwrap_or_else(|_| "unknown".to_string());

        Self {
            hostname,
            silent,
            scan: config.scan.clone(),
        }
    }

    /// Build a context with a fixed hostname (for tests).
    pub fn with_hostname(hostname: impl Into<String>, silent: bool) -> Self {
        Self {
            hostname: hostname.into(),
            silent,
            scan: ScanConfig::default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.server.port, 5000);
        assert_eq!(config.server.api_prefix, "/api/v1");
    }

    #[test]
    fn test_config_save_load() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("test_config.json");

        let config = Config::default();
        config.save(&path).unwrap();

        let loaded = Config::load(&path).unwrap();
        assert_eq!(loaded.server.port, config.server.port);
        assert_eq!(loaded.scan.max_entry_size_mb, config.scan.max_entry_size_mb);
    }

    #[test]
    fn test_base_url_bare_host() {
        let server = ServerConfig::default();
        assert_eq!(
            server.base_url("10.0.0.5"),
            "http://10.0.0.5:5000/api/v1"
        );
    }

    #[test]
    fn test_base_url_with_scheme() {
        let server = ServerConfig::default();
        assert_eq!(
            server.base_url("https://rules.internal/"),
            "https://rules.internal:5000/api/v1"
        );
    }

    #[test]
    fn test_context_fixed_hostname() {
        let ctx = ScanContext::with_hostname("HOST01", true);
        assert_eq!(ctx.hostname, "HOST01");
        assert!(ctx.silent);
    }
}
