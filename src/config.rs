use crate::error::Result;
use crate::search::SearchConfig;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Main application configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Server configuration
    #[serde(default)]
    pub server: ServerConfig,

    /// Search cluster configuration
    #[serde(default)]
    pub search: SearchConfig,

    /// Observability configuration
    #[serde(default)]
    pub observability: ObservabilityConfig,
}

impl Config {
    /// Load configuration from file and environment.
    ///
    /// A missing config file is fine; a present but invalid one, or an
    /// unparseable `NATLAS__*` value, is a configuration error.
    pub fn load() -> Result<Self> {
        let config_path = std::env::var("CONFIG_PATH").unwrap_or_else(|_| "config/natlas.toml".to_string());
        Self::load_from(&config_path)
    }

    /// Load configuration with `config_path` as the override file
    pub fn load_from(config_path: &str) -> Result<Self> {
        let config = config::Config::builder()
            // Start with default values
            .add_source(config::File::from_str(
                include_str!("../config/default.toml"),
                config::FileFormat::Toml,
            ))
            // Override with config file if it exists
            .add_source(config::File::with_name(config_path).required(false))
            // Override with environment variables (prefix: NATLAS__)
            .add_source(
                config::Environment::with_prefix("NATLAS")
                    .prefix_separator("__")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?
            .try_deserialize()?;

        Ok(config)
    }

    /// Address the HTTP server binds to
    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.server.host, self.server.http_port)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// HTTP server host
    #[serde(default = "default_host")]
    pub host: String,

    /// HTTP server port
    #[serde(default = "default_http_port")]
    pub http_port: u16,

    /// Request timeout (seconds)
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,
}

impl ServerConfig {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            http_port: default_http_port(),
            request_timeout_secs: default_request_timeout(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ObservabilityConfig {
    /// Log level
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Enable JSON logging
    #[serde(default)]
    pub json_logs: bool,

    /// Service name
    #[serde(default = "default_service_name")]
    pub service_name: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            json_logs: false,
            service_name: default_service_name(),
        }
    }
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_http_port() -> u16 {
    8080
}

fn default_request_timeout() -> u64 {
    30
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_service_name() -> String {
    "natlas-server".to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::search::{BackendKind, RefreshPolicy};
    use std::io::Write;

    #[test]
    fn test_bundled_defaults_parse() {
        let config: Config = config::Config::builder()
            .add_source(config::File::from_str(
                include_str!("../config/default.toml"),
                config::FileFormat::Toml,
            ))
            .build()
            .unwrap()
            .try_deserialize()
            .unwrap();

        assert_eq!(config.server.http_port, 8080);
        assert_eq!(config.search.backend, BackendKind::Elasticsearch);
        assert_eq!(config.search.current_index, "nmap");
        assert_eq!(config.search.history_index, "nmap_history");
        assert_eq!(config.search.reconnect_interval_secs, 60);
        assert_eq!(config.search.refresh, RefreshPolicy::WaitFor);
        assert_eq!(config.observability.log_level, "info");
    }

    #[test]
    fn test_missing_sections_fall_back_to_defaults() {
        let config: Config = config::Config::builder()
            .add_source(config::File::from_str(
                "[search]\nbackend = \"memory\"\n",
                config::FileFormat::Toml,
            ))
            .build()
            .unwrap()
            .try_deserialize()
            .unwrap();

        assert_eq!(config.search.backend, BackendKind::Memory);
        assert_eq!(config.search.url, "http://localhost:9200");
        assert_eq!(config.bind_address(), "0.0.0.0:8080");
        assert!(!config.observability.json_logs);
    }

    #[test]
    fn test_missing_override_file_uses_defaults() {
        let config = Config::load_from("/nonexistent/natlas-config").unwrap();
        assert_eq!(config.server.http_port, 8080);
        assert_eq!(config.search.current_index, "nmap");
    }

    #[test]
    fn test_override_file_is_applied() {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        writeln!(file, "[search]\nurl = \"http://es.internal:9200\"").unwrap();

        let config = Config::load_from(file.path().to_str().unwrap()).unwrap();
        assert_eq!(config.search.url, "http://es.internal:9200");
        assert_eq!(config.search.history_index, "nmap_history");
    }

    #[test]
    fn test_invalid_value_is_configuration_error() {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        writeln!(file, "[server]\nhttp_port = \"not-a-port\"").unwrap();

        let err = Config::load_from(file.path().to_str().unwrap()).unwrap_err();
        assert_eq!(err.error_code(), "CONFIGURATION_ERROR");
    }
}
