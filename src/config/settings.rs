//! Configuration structures for deserialisation.
//!
//! These map directly onto the JSON configuration file format described in
//! spec.md §6. Every nested struct uses `deny_unknown_fields` so a typo in
//! the config file surfaces at load time rather than being silently
//! ignored.

use std::path::PathBuf;

use serde::Deserialize;

use crate::error::ConfigError;

/// Root configuration structure.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Config {
    /// Address the TCP listener binds to.
    #[serde(default = "default_address")]
    pub address: String,

    /// Port the TCP listener binds to.
    #[serde(default = "default_port")]
    pub port: u16,

    /// Maximum number of concurrently open sessions.
    #[serde(default = "default_max_connections")]
    pub max_connections: usize,

    /// Timeout, in seconds, for a single read on a session's transport.
    #[serde(default = "default_read_timeout_secs")]
    pub read_timeout_secs: u64,

    /// Timeout, in seconds, for a single write on a session's transport.
    #[serde(default = "default_write_timeout_secs")]
    pub write_timeout_secs: u64,

    /// How long, in seconds, a session may sit idle before the sweeper
    /// evicts it.
    #[serde(default = "default_idle_timeout_secs")]
    pub idle_timeout_secs: u64,

    /// Grace period, in seconds, given to in-flight requests during
    /// graceful shutdown before sessions are forcibly closed.
    #[serde(default = "default_shutdown_timeout_secs")]
    pub shutdown_timeout_secs: u64,

    /// Whether the metrics subsystem records resource access counters.
    #[serde(default = "default_true")]
    pub enable_metrics: bool,

    /// Whether filesystem watch events are published to subscribers.
    #[serde(default = "default_true")]
    pub enable_events: bool,

    /// TLS settings. Disabled by default (plaintext TCP).
    #[serde(default)]
    pub tls: TlsConfig,

    /// Resource cache settings.
    #[serde(default)]
    pub resources: ResourcesConfig,

    /// Tool subsystem settings.
    #[serde(default)]
    pub tools: ToolsConfig,

    /// Structured logging settings.
    #[serde(default)]
    pub logging: LoggingConfig,

    /// Security / auth settings.
    #[serde(default)]
    pub security: SecurityConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            address: default_address(),
            port: default_port(),
            max_connections: default_max_connections(),
            read_timeout_secs: default_read_timeout_secs(),
            write_timeout_secs: default_write_timeout_secs(),
            idle_timeout_secs: default_idle_timeout_secs(),
            shutdown_timeout_secs: default_shutdown_timeout_secs(),
            enable_metrics: true,
            enable_events: true,
            tls: TlsConfig::default(),
            resources: ResourcesConfig::default(),
            tools: ToolsConfig::default(),
            logging: LoggingConfig::default(),
            security: SecurityConfig::default(),
        }
    }
}

impl Config {
    /// Validates cross-field and range constraints that serde's field
    /// defaults cannot express on their own.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::ValidationError`] when a constraint is
    /// violated.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_connections == 0 {
            return Err(ConfigError::ValidationError {
                message: "max_connections must be greater than zero".to_string(),
            });
        }
        if self.tls.enabled && (self.tls.cert_path.is_none() || self.tls.key_path.is_none()) {
            return Err(ConfigError::ValidationError {
                message: "tls.cert_path and tls.key_path are required when tls.enabled is true"
                    .to_string(),
            });
        }
        self.resources.validate()?;
        self.tools.validate()?;
        Ok(())
    }
}

/// TLS listener settings.
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(deny_unknown_fields)]
pub struct TlsConfig {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default)]
    pub cert_path: Option<PathBuf>,
    #[serde(default)]
    pub key_path: Option<PathBuf>,
    #[serde(default)]
    pub ca_path: Option<PathBuf>,
}

/// Resource registry and cache settings.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ResourcesConfig {
    /// Maximum total bytes the resource cache may hold.
    #[serde(default = "default_cache_max_size_bytes")]
    pub cache_max_size_bytes: u64,

    /// Default time-to-live, in seconds, for a cached resource body.
    #[serde(default = "default_cache_ttl_secs")]
    pub cache_ttl_secs: u64,

    /// Default page size for `resources/list` pagination.
    #[serde(default = "default_page_size")]
    pub default_page_size: usize,
}

impl Default for ResourcesConfig {
    fn default() -> Self {
        Self {
            cache_max_size_bytes: default_cache_max_size_bytes(),
            cache_ttl_secs: default_cache_ttl_secs(),
            default_page_size: default_page_size(),
        }
    }
}

impl ResourcesConfig {
    fn validate(&self) -> Result<(), ConfigError> {
        if self.cache_max_size_bytes == 0 {
            return Err(ConfigError::ValidationError {
                message: "resources.cache_max_size_bytes must be greater than zero".to_string(),
            });
        }
        if self.default_page_size == 0 {
            return Err(ConfigError::ValidationError {
                message: "resources.default_page_size must be greater than zero".to_string(),
            });
        }
        Ok(())
    }
}

/// Filesystem and git tool settings.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ToolsConfig {
    /// Root directory the filesystem tool is sandboxed to.
    pub base_path: PathBuf,

    /// Additional path prefixes permitted outside `base_path`.
    #[serde(default)]
    pub allowlist: Vec<PathBuf>,

    /// Working directory for the git tool's subprocess invocations.
    #[serde(default)]
    pub repo_path: Option<PathBuf>,

    /// Timeout, in seconds, applied to each git subprocess invocation.
    #[serde(default = "default_git_timeout_secs")]
    pub git_timeout_secs: u64,
}

impl Default for ToolsConfig {
    fn default() -> Self {
        Self {
            base_path: PathBuf::from("."),
            allowlist: Vec::new(),
            repo_path: None,
            git_timeout_secs: default_git_timeout_secs(),
        }
    }
}

impl ToolsConfig {
    fn validate(&self) -> Result<(), ConfigError> {
        if self.git_timeout_secs == 0 {
            return Err(ConfigError::ValidationError {
                message: "tools.git_timeout_secs must be greater than zero".to_string(),
            });
        }
        Ok(())
    }
}

/// Structured logging settings.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error).
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Emit logs as single-line JSON instead of human-readable text.
    #[serde(default)]
    pub json: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            json: false,
        }
    }
}

/// Authentication settings (spec.md §4.12).
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(deny_unknown_fields)]
pub struct SecurityConfig {
    /// Whether clients must authenticate before any method besides
    /// `initialize` is accepted.
    #[serde(default)]
    pub require_auth: bool,

    /// Static credentials accepted at session start, keyed by principal
    /// name. Passwords are stored as reference SHA-256 hashes, never in
    /// plaintext (see [`crate::security`] for the documented caveats).
    #[serde(default)]
    pub credentials: Vec<CredentialConfig>,

    /// Absolute expiry, in seconds, for an issued session token.
    #[serde(default = "default_token_ttl_secs")]
    pub token_ttl_secs: u64,
}

/// One statically configured principal.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CredentialConfig {
    pub principal: String,
    pub password_hash_hex: String,
    #[serde(default)]
    pub api_key: Option<String>,
    #[serde(default)]
    pub permissions: Vec<String>,
}

fn default_address() -> String {
    "127.0.0.1".to_string()
}
const fn default_port() -> u16 {
    8765
}
const fn default_max_connections() -> usize {
    1000
}
const fn default_read_timeout_secs() -> u64 {
    30
}
const fn default_write_timeout_secs() -> u64 {
    30
}
const fn default_idle_timeout_secs() -> u64 {
    120
}
const fn default_shutdown_timeout_secs() -> u64 {
    30
}
const fn default_true() -> bool {
    true
}
const fn default_cache_max_size_bytes() -> u64 {
    100 * 1024 * 1024
}
const fn default_cache_ttl_secs() -> u64 {
    30 * 60
}
const fn default_page_size() -> usize {
    100
}
const fn default_git_timeout_secs() -> u64 {
    60
}
fn default_log_level() -> String {
    "info".to_string()
}
const fn default_token_ttl_secs() -> u64 {
    30 * 60
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_used_when_fields_absent() {
        let json = r#"{ "tools": { "base_path": "/srv/data" } }"#;
        let config: Config = serde_json::from_str(json).unwrap();
        assert_eq!(config.port, 8765);
        assert_eq!(config.max_connections, 1000);
        assert!(config.enable_metrics);
        assert_eq!(config.resources.cache_max_size_bytes, 100 * 1024 * 1024);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn rejects_unknown_fields() {
        let json = r#"{ "tools": { "base_path": "/srv" }, "bogus": 1 }"#;
        let result: Result<Config, _> = serde_json::from_str(json);
        assert!(result.is_err());
    }

    #[test]
    fn zero_max_connections_fails_validation() {
        let json = r#"{ "max_connections": 0, "tools": { "base_path": "/srv" } }"#;
        let config: Config = serde_json::from_str(json).unwrap();
        assert!(config.validate().is_err());
    }

    #[test]
    fn tls_enabled_without_cert_fails_validation() {
        let json = r#"{
            "tools": { "base_path": "/srv" },
            "tls": { "enabled": true }
        }"#;
        let config: Config = serde_json::from_str(json).unwrap();
        assert!(config.validate().is_err());
    }

    #[test]
    fn full_config_round_trips() {
        let json = r#"{
            "address": "0.0.0.0",
            "port": 9000,
            "max_connections": 50,
            "resources": { "cache_max_size_bytes": 1048576, "cache_ttl_secs": 60, "default_page_size": 10 },
            "tools": { "base_path": "/srv/data", "allowlist": ["/srv/shared"], "git_timeout_secs": 5 },
            "logging": { "level": "debug", "json": true },
            "security": { "require_auth": true, "token_ttl_secs": 600 }
        }"#;
        let config: Config = serde_json::from_str(json).unwrap();
        assert!(config.validate().is_ok());
        assert_eq!(config.address, "0.0.0.0");
        assert_eq!(config.resources.default_page_size, 10);
        assert!(config.logging.json);
        assert!(config.security.require_auth);
    }
}
