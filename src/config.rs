//! Service configuration.
//!
//! The whole configuration is read once at startup from a TOML file into an
//! immutable [`Config`], which is then shared by `Arc` with the webhook
//! filter, the dispatcher, the worker pool and the read handlers. Every table
//! has defaults, so an empty file (or no file at all) yields a working
//! single-process setup: in-process channel, file catalog, text logs.
//!
//! ```toml
//! [app]
//! domain = "https://releases.example.com"
//!
//! [integrations.gitlab]
//! webhook_secret = "s3cret"
//! clone_with = "ssh"
//!
//! [broker]
//! driver = "redis"
//!
//! [broker.redis]
//! url = "redis://127.0.0.1:6379/0"
//! channel = "rabbit"
//! ```

use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;
use thiserror::Error;

/// Placeholder replaced by the repository's full path in clone templates.
pub const REPO_FULL_NAME_PLACEHOLDER: &str = "[.RepoFullName]";

/// Errors that can occur while loading configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The configuration file could not be read.
    #[error("failed to read config file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The configuration file is not valid TOML for [`Config`].
    #[error("failed to parse config file {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },

    /// The listen address is not a valid socket address.
    #[error("invalid listen address {0}")]
    InvalidAddress(String),
}

/// Top-level configuration.
#[derive(Debug, Clone, Default, Deserialize, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    pub app: AppConfig,
    pub log: LogConfig,
    pub integrations: IntegrationsConfig,
    pub broker: BrokerConfig,
    pub catalog: CatalogConfig,
    pub build: BuildConfig,
}

impl Config {
    /// Loads configuration from a TOML file.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml(&text).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Parses configuration from TOML text.
    pub fn from_toml(text: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(text)
    }
}

/// HTTP listener and public URL settings.
#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct AppConfig {
    /// Public base URL used when building download links.
    pub domain: String,
    pub host: String,
    pub port: u16,
}

impl Default for AppConfig {
    fn default() -> Self {
        AppConfig {
            domain: "http://127.0.0.1:8080".to_string(),
            host: "0.0.0.0".to_string(),
            port: 8080,
        }
    }
}

impl AppConfig {
    pub fn listen_addr(&self) -> Result<SocketAddr, ConfigError> {
        let addr = format!("{}:{}", self.host, self.port);
        addr.parse().map_err(|_| ConfigError::InvalidAddress(addr))
    }
}

/// Log output format.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct LogConfig {
    /// Default filter directive; `RUST_LOG` takes precedence when set.
    pub level: String,
    pub format: LogFormat,
}

impl Default for LogConfig {
    fn default() -> Self {
        LogConfig {
            level: "rabbit=info".to_string(),
            format: LogFormat::Text,
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct IntegrationsConfig {
    pub gitlab: ProviderConfig,
    pub github: ProviderConfig,
}

/// Which clone URL template a provider uses.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CloneWith {
    #[default]
    Https,
    Ssh,
}

/// Per-provider webhook settings.
#[derive(Debug, Clone, Default, Deserialize, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct ProviderConfig {
    /// Shared secret. Empty disables authentication for this provider.
    pub webhook_secret: String,
    pub clone_with: CloneWith,
    /// Template such as `https://gitlab.com/[.RepoFullName].git`.
    pub https_format: String,
    /// Template such as `git@gitlab.com:[.RepoFullName].git`.
    pub ssh_format: String,
}

impl ProviderConfig {
    /// Builds the clone URL for a repository from the selected template.
    pub fn clone_url(&self, repo_full_name: &str) -> String {
        let template = match self.clone_with {
            CloneWith::Https => &self.https_format,
            CloneWith::Ssh => &self.ssh_format,
        };
        template.replace(REPO_FULL_NAME_PLACEHOLDER, repo_full_name)
    }

    /// Returns the configured secret, or `None` when checks are disabled.
    pub fn secret(&self) -> Option<&[u8]> {
        if self.webhook_secret.is_empty() {
            None
        } else {
            Some(self.webhook_secret.as_bytes())
        }
    }

    /// Returns a copy with the given templates, mainly for tests.
    pub fn with_templates(mut self, https: impl Into<String>, ssh: impl Into<String>) -> Self {
        self.https_format = https.into();
        self.ssh_format = ssh.into();
        self
    }

    pub fn with_secret(mut self, secret: impl Into<String>) -> Self {
        self.webhook_secret = secret.into();
        self
    }

    pub fn with_clone_with(mut self, clone_with: CloneWith) -> Self {
        self.clone_with = clone_with;
        self
    }
}

/// Transport used between HTTP producers and workers.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BrokerDriver {
    #[default]
    Channel,
    Redis,
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct BrokerConfig {
    pub driver: BrokerDriver,
    /// Largest payload either transport accepts, in bytes.
    pub max_payload_bytes: usize,
    /// Number of concurrent workers consuming release messages.
    pub workers: usize,
    pub channel: ChannelConfig,
    pub redis: RedisBrokerConfig,
}

impl Default for BrokerConfig {
    fn default() -> Self {
        BrokerConfig {
            driver: BrokerDriver::Channel,
            max_payload_bytes: 64 * 1024,
            workers: 4,
            channel: ChannelConfig::default(),
            redis: RedisBrokerConfig::default(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct ChannelConfig {
    /// Buffer size of the in-process queue.
    pub capacity: usize,
}

impl Default for ChannelConfig {
    fn default() -> Self {
        ChannelConfig { capacity: 100 }
    }
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct RedisBrokerConfig {
    pub url: String,
    pub channel: String,
    /// Upper bound on connect, ping and publish together.
    pub timeout_ms: u64,
}

impl Default for RedisBrokerConfig {
    fn default() -> Self {
        RedisBrokerConfig {
            url: "redis://127.0.0.1:6379/0".to_string(),
            channel: "rabbit".to_string(),
            timeout_ms: 5_000,
        }
    }
}

impl RedisBrokerConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CatalogDriver {
    #[default]
    File,
    Redis,
}

#[derive(Debug, Clone, Default, Deserialize, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct CatalogConfig {
    pub driver: CatalogDriver,
    pub file: FileCatalogConfig,
    pub redis: RedisCatalogConfig,
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct FileCatalogConfig {
    pub path: PathBuf,
}

impl Default for FileCatalogConfig {
    fn default() -> Self {
        FileCatalogConfig {
            path: PathBuf::from("var/catalog"),
        }
    }
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct RedisCatalogConfig {
    pub url: String,
    /// Prefix for every key the catalog writes.
    pub prefix: String,
    pub timeout_ms: u64,
    /// Compare-and-swap attempts before a commit gives up.
    pub max_retries: u32,
}

impl Default for RedisCatalogConfig {
    fn default() -> Self {
        RedisCatalogConfig {
            url: "redis://127.0.0.1:6379/0".to_string(),
            prefix: "rabbit".to_string(),
            timeout_ms: 5_000,
            max_retries: 16,
        }
    }
}

impl RedisCatalogConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

/// Settings for the git-based builder.
#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct BuildConfig {
    /// Scratch directory for checkouts.
    pub workspace: PathBuf,
    /// Where built artifacts are kept, as `<releases_path>/<name>/<version>/`.
    pub releases_path: PathBuf,
    /// Shell command run inside the checkout.
    pub command: String,
}

impl Default for BuildConfig {
    fn default() -> Self {
        BuildConfig {
            workspace: PathBuf::from("var/build"),
            releases_path: PathBuf::from("var/releases"),
            command: "make release".to_string(),
        }
    }
}
