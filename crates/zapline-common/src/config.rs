//! Configuration for Zapline

use serde::{Deserialize, Serialize};

/// Main configuration structure
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Server configuration
    #[serde(default)]
    pub server: ServerConfig,

    /// Database configuration
    pub database: DatabaseConfig,

    /// API configuration
    #[serde(default)]
    pub api: ApiConfig,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,

    /// Campaign dispatch configuration
    #[serde(default)]
    pub dispatch: DispatchConfig,

    /// Drip scheduler configuration
    #[serde(default)]
    pub drip: DripConfig,

    /// Webhook ingress configuration
    #[serde(default)]
    pub webhook: WebhookConfig,
}

/// Server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Hostname
    #[serde(default = "default_hostname")]
    pub hostname: String,

    /// Bind address
    #[serde(default = "default_bind_address")]
    pub bind_address: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            hostname: default_hostname(),
            bind_address: default_bind_address(),
        }
    }
}

fn default_hostname() -> String {
    "localhost".to_string()
}

fn default_bind_address() -> String {
    "0.0.0.0".to_string()
}

/// Database configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    /// Database URL (PostgreSQL)
    pub url: String,

    /// Maximum connections
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,

    /// Minimum connections
    #[serde(default = "default_min_connections")]
    pub min_connections: u32,
}

fn default_max_connections() -> u32 {
    20
}

fn default_min_connections() -> u32 {
    5
}

/// API configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiConfig {
    /// API port
    #[serde(default = "default_api_port")]
    pub port: u16,

    /// CORS allowed origins
    #[serde(default)]
    pub cors_origins: Vec<String>,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            port: default_api_port(),
            cors_origins: Vec::new(),
        }
    }
}

fn default_api_port() -> u16 {
    8080
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Log format: "json" or "text"
    #[serde(default = "default_log_format")]
    pub format: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: default_log_format(),
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_format() -> String {
    "text".to_string()
}

/// Campaign dispatch configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DispatchConfig {
    /// Recipients claimed per cursor batch
    #[serde(default = "default_batch_size")]
    pub batch_size: i64,

    /// Maximum in-flight sends per campaign run
    #[serde(default = "default_concurrency")]
    pub concurrency: usize,

    /// Seconds before an unresolved send counts as a transient failure
    #[serde(default = "default_send_timeout")]
    pub send_timeout_secs: u64,

    /// Delivery attempts per recipient before converting to failed
    #[serde(default = "default_max_attempts")]
    pub max_attempts: i32,

    /// Seconds between runner ticks (scheduled starts, crash resume)
    #[serde(default = "default_runner_interval")]
    pub runner_interval_secs: u64,
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            batch_size: default_batch_size(),
            concurrency: default_concurrency(),
            send_timeout_secs: default_send_timeout(),
            max_attempts: default_max_attempts(),
            runner_interval_secs: default_runner_interval(),
        }
    }
}

fn default_batch_size() -> i64 {
    50
}

fn default_concurrency() -> usize {
    8
}

fn default_send_timeout() -> u64 {
    30
}

fn default_max_attempts() -> i32 {
    3
}

fn default_runner_interval() -> u64 {
    15
}

/// Drip scheduler configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DripConfig {
    /// Seconds between sweeps
    #[serde(default = "default_sweep_interval")]
    pub sweep_interval_secs: u64,

    /// Enrollments processed per sweep
    #[serde(default = "default_sweep_batch_size")]
    pub batch_size: i64,
}

impl Default for DripConfig {
    fn default() -> Self {
        Self {
            sweep_interval_secs: default_sweep_interval(),
            batch_size: default_sweep_batch_size(),
        }
    }
}

fn default_sweep_interval() -> u64 {
    60
}

fn default_sweep_batch_size() -> i64 {
    200
}

/// Webhook ingress configuration
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct WebhookConfig {
    /// Shared secret for HMAC signature verification.
    /// When unset, signatures are not required.
    pub app_secret: Option<String>,
}

impl Config {
    /// Load configuration from file
    pub fn from_file(path: &std::path::Path) -> crate::Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| crate::Error::Config(format!("Failed to read config file: {}", e)))?;

        let config: Config = toml::from_str(&content)
            .map_err(|e| crate::Error::Config(format!("Failed to parse config: {}", e)))?;

        Ok(config)
    }

    /// Load configuration from default locations
    pub fn load() -> crate::Result<Self> {
        let paths = [
            std::path::PathBuf::from("./config.toml"),
            std::path::PathBuf::from("/etc/zapline/config.toml"),
        ];

        for path in paths {
            if path.exists() {
                return Self::from_file(&path);
            }
        }

        Err(crate::Error::Config(
            "No configuration file found".to_string(),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let dispatch = DispatchConfig::default();
        assert_eq!(dispatch.batch_size, 50);
        assert_eq!(dispatch.max_attempts, 3);

        let drip = DripConfig::default();
        assert_eq!(drip.sweep_interval_secs, 60);
    }

    #[test]
    fn test_parse_config() {
        let toml = r#"
[server]
hostname = "crm.example.com"

[database]
url = "postgres://localhost/zapline"

[dispatch]
batch_size = 25
send_timeout_secs = 10

[drip]
sweep_interval_secs = 30

[webhook]
app_secret = "topsecret"
"#;

        let config: Config = toml::from_str(toml).unwrap();
        assert_eq!(config.server.hostname, "crm.example.com");
        assert_eq!(config.dispatch.batch_size, 25);
        assert_eq!(config.dispatch.concurrency, 8);
        assert_eq!(config.drip.sweep_interval_secs, 30);
        assert_eq!(config.webhook.app_secret.as_deref(), Some("topsecret"));
    }
}
