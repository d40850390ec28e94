//! Server configuration.
//!
//! Configuration is loaded in the following order (later overrides earlier):
//! 1. Default values
//! 2. YAML config file (if specified via WIRERPC_CONFIG)
//! 3. Environment variables

use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::net::{Ipv4Addr, SocketAddr};
use std::path::{Path, PathBuf};
use wirerpc_protocol::{Charset, Grammar};

/// Server configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Network configuration.
    pub network: NetworkConfig,
    /// RPC endpoint configuration.
    pub rpc: RpcConfig,
    /// Metrics configuration.
    pub metrics: MetricsConfig,
}

impl Config {
    /// Loads configuration from file, then applies environment variable overrides.
    pub fn load() -> Result<Self, ConfigError> {
        let mut config = match std::env::var("WIRERPC_CONFIG") {
            Ok(path) => Self::from_file(&path)?,
            Err(_) => Self::default(),
        };
        config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }

    /// Loads configuration from a YAML file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .map_err(|e| ConfigError::IoError(path.to_path_buf(), e))?;
        let config: Config = serde_yaml::from_str(&content)
            .map_err(|e| ConfigError::ParseError(path.to_path_buf(), e.to_string()))?;
        Ok(config)
    }

    /// Loads configuration from environment variables only.
    pub fn from_env() -> Self {
        let mut config = Self::default();
        config.apply_env_overrides();
        config
    }

    fn apply_env_overrides(&mut self) {
        self.apply_overrides(|name| std::env::var(name).ok());
    }

    /// Applies overrides from a variable lookup.
    pub fn apply_overrides(&mut self, var: impl Fn(&str) -> Option<String>) {
        if let Some(addr) = var("WIRERPC_BIND") {
            if let Ok(parsed) = addr.parse() {
                self.network.bind_addr = parsed;
            }
        }

        if let Some(max) = var("WIRERPC_MAX_BODY") {
            if let Ok(n) = max.parse() {
                self.rpc.max_body_bytes = n;
            }
        }

        if let Some(encoding) = var("WIRERPC_ENCODING") {
            self.rpc.encoding = (!encoding.is_empty()).then_some(encoding);
        }

        if let Some(enabled) = var("WIRERPC_METRICS_ENABLED") {
            self.metrics.enabled = enabled == "1" || enabled.to_lowercase() == "true";
        }
    }

    /// Validates the configuration.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.rpc.validate()?;
        if self.metrics.enabled {
            if !self.metrics.path.starts_with('/') {
                return Err(ConfigError::ValidationError(format!(
                    "metrics path {:?} must start with '/'",
                    self.metrics.path
                )));
            }
            if self.rpc.endpoints.iter().any(|e| e.path == self.metrics.path) {
                return Err(ConfigError::ValidationError(format!(
                    "metrics path {:?} collides with an RPC endpoint",
                    self.metrics.path
                )));
            }
        }
        Ok(())
    }

    /// Saves configuration to a YAML file.
    pub fn save(&self, path: impl AsRef<Path>) -> Result<(), ConfigError> {
        let path = path.as_ref();
        let content = serde_yaml::to_string(self)
            .map_err(|e| ConfigError::ParseError(path.to_path_buf(), e.to_string()))?;
        std::fs::write(path, content).map_err(|e| ConfigError::IoError(path.to_path_buf(), e))?;
        Ok(())
    }
}

/// Network configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct NetworkConfig {
    /// Address to bind to.
    #[serde(with = "socket_addr_serde")]
    pub bind_addr: SocketAddr,
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            bind_addr: SocketAddr::from((Ipv4Addr::LOCALHOST, 8080)),
        }
    }
}

/// An HTTP path served by one grammar.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EndpointConfig {
    pub path: String,
    pub grammar: Grammar,
}

impl EndpointConfig {
    pub fn new(path: impl Into<String>, grammar: Grammar) -> Self {
        Self {
            path: path.into(),
            grammar,
        }
    }
}

/// RPC configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RpcConfig {
    /// Endpoint paths and the grammar each one speaks.
    pub endpoints: Vec<EndpointConfig>,
    /// Maximum accepted request body in bytes.
    pub max_body_bytes: usize,
    /// Encoding forced onto every response. Responses otherwise use the
    /// encoding of the call.
    pub encoding: Option<String>,
}

impl Default for RpcConfig {
    fn default() -> Self {
        Self {
            endpoints: vec![
                EndpointConfig::new("/RPC2", Grammar::XmlRpc),
                EndpointConfig::new("/json", Grammar::JsonRpc),
                EndpointConfig::new("/wddx", Grammar::Wddx),
            ],
            max_body_bytes: wirerpc_protocol::MAX_PAYLOAD_SIZE,
            encoding: None,
        }
    }
}

impl RpcConfig {
    fn validate(&self) -> Result<(), ConfigError> {
        if self.endpoints.is_empty() {
            return Err(ConfigError::ValidationError(
                "no RPC endpoints configured".to_string(),
            ));
        }
        let mut seen = HashSet::new();
        for endpoint in &self.endpoints {
            if endpoint.path.is_empty() || !endpoint.path.starts_with('/') {
                return Err(ConfigError::ValidationError(format!(
                    "endpoint path {:?} must start with '/'",
                    endpoint.path
                )));
            }
            if !seen.insert(endpoint.path.as_str()) {
                return Err(ConfigError::ValidationError(format!(
                    "duplicate endpoint path {:?}",
                    endpoint.path
                )));
            }
        }
        if self.max_body_bytes == 0 {
            return Err(ConfigError::ValidationError(
                "max_body_bytes must be greater than zero".to_string(),
            ));
        }
        if let Some(ref encoding) = self.encoding {
            Charset::from_label(encoding)
                .map_err(|e| ConfigError::ValidationError(e.to_string()))?;
        }
        Ok(())
    }

    /// Returns the grammar served at a path.
    pub fn grammar_for(&self, path: &str) -> Option<Grammar> {
        self.endpoints
            .iter()
            .find(|e| e.path == path)
            .map(|e| e.grammar)
    }
}

/// Metrics configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MetricsConfig {
    /// Serve Prometheus metrics.
    pub enabled: bool,
    /// Path the metrics are served at, on the RPC listener.
    pub path: String,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            path: "/metrics".to_string(),
        }
    }
}

/// Configuration error.
#[derive(Debug)]
pub enum ConfigError {
    IoError(PathBuf, std::io::Error),
    ParseError(PathBuf, String),
    ValidationError(String),
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::IoError(path, e) => {
                write!(f, "failed to read config file '{}': {}", path.display(), e)
            }
            ConfigError::ParseError(path, e) => {
                write!(f, "failed to parse config file '{}': {}", path.display(), e)
            }
            ConfigError::ValidationError(msg) => {
                write!(f, "configuration validation failed: {}", msg)
            }
        }
    }
}

impl std::error::Error for ConfigError {}

/// Custom serde module for SocketAddr (to handle as string in YAML).
mod socket_addr_serde {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::net::SocketAddr;

    pub fn serialize<S>(addr: &SocketAddr, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&addr.to_string())
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<SocketAddr, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}
