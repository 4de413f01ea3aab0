//! Server configuration
//!
//! This module handles hierarchical configuration loading from multiple sources:
//! - Default configuration file
//! - Environment-specific configuration file
//! - Environment variables
//! - Command-line arguments

use config::{Config, ConfigError, Environment, File};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Server configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BrokerConfig {
    /// HTTP server settings
    #[serde(default)]
    pub server: HttpServerConfig,

    /// Installer endpoint settings
    #[serde(default)]
    pub installer: InstallerConfig,

    /// Catalog seeding
    #[serde(default)]
    pub catalog: CatalogConfig,

    /// Logging settings
    #[serde(default)]
    pub logging: LoggingConfig,

    /// Broker behaviour
    #[serde(default)]
    pub broker: BrokerSettings,
}

/// HTTP server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HttpServerConfig {
    /// Host to bind to
    #[serde(default = "default_host")]
    pub host: String,

    /// Port to bind to
    #[serde(default = "default_port")]
    pub port: u16,

    /// Enable graceful shutdown
    #[serde(default = "default_true")]
    pub graceful_shutdown: bool,

    /// Time granted to running installs and deletes on shutdown
    #[serde(default = "default_shutdown_timeout")]
    pub shutdown_timeout_seconds: u64,
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    8080
}

fn default_true() -> bool {
    true
}

fn default_shutdown_timeout() -> u64 {
    30
}

impl Default for HttpServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            graceful_shutdown: default_true(),
            shutdown_timeout_seconds: default_shutdown_timeout(),
        }
    }
}

/// Installer endpoint configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InstallerConfig {
    /// Base URL of the release service
    #[serde(default = "default_installer_url")]
    pub url: String,

    /// Timeout of a single install or delete call
    #[serde(default = "default_installer_timeout")]
    pub timeout_seconds: u64,
}

fn default_installer_url() -> String {
    "http://localhost:8081".to_string()
}

fn default_installer_timeout() -> u64 {
    300
}

impl Default for InstallerConfig {
    fn default() -> Self {
        Self {
            url: default_installer_url(),
            timeout_seconds: default_installer_timeout(),
        }
    }
}

impl InstallerConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_seconds)
    }
}

/// Catalog seeding configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CatalogConfig {
    /// JSON file with addons, charts, secrets and config maps
    #[serde(default)]
    pub seed_file: Option<PathBuf>,
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Use JSON formatting
    #[serde(default)]
    pub json_format: bool,

    /// Include thread IDs
    #[serde(default)]
    pub include_thread_ids: bool,

    /// Include target module
    #[serde(default = "default_true")]
    pub include_target: bool,
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            json_format: false,
            include_thread_ids: false,
            include_target: true,
        }
    }
}

/// Source of operation ids
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IdProviderKind {
    /// Random UUID v4
    #[default]
    Uuid,
    /// `op1`, `op2`, ...
    Sequential,
}

/// Broker behaviour
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BrokerSettings {
    #[serde(default)]
    pub id_provider: IdProviderKind,
}

impl BrokerConfig {
    /// Load configuration from files and environment
    ///
    /// Later sources override earlier ones:
    /// 1. `{config_dir}/default.toml`
    /// 2. `{config_dir}/{environment}.toml`
    /// 3. Environment variables, e.g. `HELM_BROKER__SERVER__PORT=8080`
    pub fn load(config_dir: impl Into<PathBuf>, environment: &str) -> Result<Self, ConfigError> {
        let config_dir = config_dir.into();

        let config = Config::builder()
            .add_source(File::from(config_dir.join("default.toml")).required(false))
            .add_source(
                File::from(config_dir.join(format!("{}.toml", environment))).required(false),
            )
            .add_source(
                Environment::with_prefix("HELM_BROKER")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        config.try_deserialize()
    }

    /// Load configuration, falling back to defaults
    pub fn load_or_default(config_dir: impl Into<PathBuf>, environment: &str) -> Self {
        Self::load(config_dir, environment).unwrap_or_else(|e| {
            eprintln!("Warning: Failed to load configuration: {}", e);
            eprintln!("Using default configuration");
            Self::default()
        })
    }

    /// Get server bind address
    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.server.host, self.server.port)
    }

    pub fn shutdown_timeout(&self) -> Duration {
        Duration::from_secs(self.server.shutdown_timeout_seconds)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_default_config() {
        let config = BrokerConfig::default();
        assert_eq!(config.bind_address(), "0.0.0.0:8080");
        assert_eq!(config.installer.url, "http://localhost:8081");
        assert_eq!(config.installer.timeout(), Duration::from_secs(300));
        assert_eq!(config.logging.level, "info");
        assert_eq!(config.broker.id_provider, IdProviderKind::Uuid);
        assert!(config.catalog.seed_file.is_none());
    }

    #[test]
    fn test_environment_file_overrides_default() {
        let dir = tempfile::tempdir().unwrap();
        let mut default = std::fs::File::create(dir.path().join("default.toml")).unwrap();
        writeln!(
            default,
            "[server]\nport = 9000\n\n[installer]\nurl = \"http://installer:8081\"\n"
        )
        .unwrap();
        let mut test = std::fs::File::create(dir.path().join("test.toml")).unwrap();
        writeln!(
            test,
            "[server]\nport = 9100\n\n[broker]\nid_provider = \"sequential\"\n"
        )
        .unwrap();

        let config = BrokerConfig::load(dir.path(), "test").unwrap();
        assert_eq!(config.server.port, 9100);
        assert_eq!(config.server.host, "0.0.0.0");
        assert_eq!(config.installer.url, "http://installer:8081");
        assert_eq!(config.broker.id_provider, IdProviderKind::Sequential);
    }

    #[test]
    fn test_missing_files_use_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = BrokerConfig::load(dir.path(), "production").unwrap();
        assert_eq!(config.server.port, 8080);
        assert!(config.server.graceful_shutdown);
    }
}
