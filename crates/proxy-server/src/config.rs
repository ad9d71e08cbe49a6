use serde::Deserialize;
use std::path::Path;
use std::time::Duration;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read config file: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to parse config file: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("invalid config: {0}")]
    Invalid(String),
}

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub origin: OriginConfig,
    #[serde(default)]
    pub cache: CacheConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_listen_addr")]
    pub listen_addr: String,
    #[serde(default = "default_metrics_addr")]
    pub metrics_addr: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct OriginConfig {
    #[serde(default = "default_origin_host")]
    pub host: String,
    #[serde(default = "default_origin_port")]
    pub port: u16,
    /// Plain HTTP toward the origin is only meant for local trials.
    #[serde(default = "default_true")]
    pub tls: bool,
    #[serde(default = "default_true")]
    pub verify_certificates: bool,
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,
    #[serde(default = "default_max_cached_body")]
    pub max_cached_body_bytes: usize,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CacheConfig {
    #[serde(default = "default_ttl")]
    pub ttl_seconds: u64,
    /// Sub-second TTL; takes precedence over `ttl_seconds` when set.
    #[serde(default)]
    pub ttl_ms: Option<u64>,
    #[serde(default = "default_cacheable_paths")]
    pub paths: Vec<String>,
}

impl Config {
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path)?;
        Self::from_toml(&contents)
    }

    pub fn from_toml(contents: &str) -> Result<Self, ConfigError> {
        let config: Config = toml::from_str(contents)?;
        config.validate()?;
        Ok(config)
    }

    pub fn default_config() -> Self {
        Config {
            server: ServerConfig::default(),
            origin: OriginConfig::default(),
            cache: CacheConfig::default(),
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.origin.host.trim().is_empty() {
            return Err(ConfigError::Invalid("origin.host must not be empty".into()));
        }
        if self.origin.port == 0 {
            return Err(ConfigError::Invalid("origin.port must not be 0".into()));
        }
        if self.origin.timeout_ms == 0 {
            return Err(ConfigError::Invalid("origin.timeout_ms must be > 0".into()));
        }
        if self.cache.ttl().is_zero() {
            return Err(ConfigError::Invalid("cache TTL must be > 0".into()));
        }
        for path in &self.cache.paths {
            if !path.starts_with('/') || path.contains(['?', '#']) {
                return Err(ConfigError::Invalid(format!(
                    "cacheable path {path:?} must start with '/' and carry no query or fragment"
                )));
            }
        }
        Ok(())
    }
}

impl OriginConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

impl CacheConfig {
    pub fn ttl(&self) -> Duration {
        match self.ttl_ms {
            Some(ms) => Duration::from_millis(ms),
            None => Duration::from_secs(self.ttl_seconds),
        }
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen_addr: default_listen_addr(),
            metrics_addr: default_metrics_addr(),
        }
    }
}

impl Default for OriginConfig {
    fn default() -> Self {
        Self {
            host: default_origin_host(),
            port: default_origin_port(),
            tls: true,
            verify_certificates: true,
            timeout_ms: default_timeout_ms(),
            max_cached_body_bytes: default_max_cached_body(),
        }
    }
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            ttl_seconds: default_ttl(),
            ttl_ms: None,
            paths: default_cacheable_paths(),
        }
    }
}

fn default_listen_addr() -> String {
    "0.0.0.0:8080".to_string()
}
fn default_metrics_addr() -> String {
    "0.0.0.0:9090".to_string()
}
fn default_origin_host() -> String {
    "na.worldguessr.com".to_string()
}
fn default_origin_port() -> u16 {
    443
}
fn default_true() -> bool {
    true
}
fn default_timeout_ms() -> u64 {
    30_000
}
fn default_max_cached_body() -> usize {
    64 * 1024 * 1024
}
fn default_ttl() -> u64 {
    3600
}
fn default_cacheable_paths() -> Vec<String> {
    vec!["/plop.mp3".to_string(), "/index.html".to_string()]
}
