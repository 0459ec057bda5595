//! Configuration management

use std::{path::Path, path::PathBuf, time::Duration};

use figment::{
    Figment,
    providers::{Env, Format, Yaml},
};
use serde::{Deserialize, Serialize};

use crate::client::{
    DEFAULT_DURABLE_QUOTA, DEFAULT_DURABLE_ROUTES, DEFAULT_MEMORY_TTL, DEFAULT_RELOAD_DELAY,
};
use crate::{Error, Result};

/// Main configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Server configuration
    pub server: ServerConfig,
    /// API client configuration
    pub client: ClientConfig,
    /// Server preload cache configuration
    pub preload: PreloadConfig,
    /// Dataset configuration
    pub dataset: DatasetConfig,
}

impl Config {
    /// Load configuration from file and environment
    ///
    /// # Errors
    ///
    /// Returns an error if the config file does not exist or cannot be parsed.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut figment = Figment::new();

        if let Some(p) = path {
            if !p.exists() {
                return Err(Error::Config(format!(
                    "Config file not found: {}",
                    p.display()
                )));
            }
            figment = figment.merge(Yaml::file(p));
        }

        // STATCACHE_CLIENT__BASE_URL -> client.base_url
        figment = figment.merge(Env::prefixed("STATCACHE_").split("__"));

        figment.extract().map_err(|e| Error::Config(e.to_string()))
    }
}

/// Server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Host to bind to
    pub host: String,
    /// Port to listen on
    pub port: u16,
    /// Graceful shutdown timeout
    #[serde(with = "humantime_serde")]
    pub shutdown_timeout: Duration,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 39500,
            shutdown_timeout: Duration::from_secs(30),
        }
    }
}

/// API client configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    /// API base URL, including the `/api` prefix
    pub base_url: String,
    /// Per-request network timeout
    #[serde(with = "humantime_serde")]
    pub request_timeout: Duration,
    /// Time-to-live of cached responses, both tiers
    #[serde(with = "humantime_serde")]
    pub memory_ttl: Duration,
    /// Directory of the durable tier (default: `~/.statcache/durable`)
    pub durable_dir: Option<PathBuf>,
    /// Byte budget of the durable tier
    pub durable_max_bytes: u64,
    /// Delay between a build change and the reload request
    #[serde(with = "humantime_serde")]
    pub reload_delay: Duration,
    /// Route paths whose responses are persisted durably
    pub durable_routes: Vec<String>,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            base_url: "http://127.0.0.1:39500/api".to_string(),
            request_timeout: Duration::from_secs(30),
            memory_ttl: DEFAULT_MEMORY_TTL,
            durable_dir: None,
            durable_max_bytes: DEFAULT_DURABLE_QUOTA,
            reload_delay: DEFAULT_RELOAD_DELAY,
            durable_routes: DEFAULT_DURABLE_ROUTES
                .iter()
                .map(ToString::to_string)
                .collect(),
        }
    }
}

/// Server preload cache configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PreloadConfig {
    /// Warm the cache at startup
    pub enabled: bool,
    /// TTL of warmed entries
    #[serde(with = "humantime_serde")]
    pub default_ttl: Duration,
    /// TTL of "current" snapshot entries
    #[serde(with = "humantime_serde")]
    pub snapshot_ttl: Duration,
    /// Entities warmed in parallel
    pub concurrency: usize,
}

impl Default for PreloadConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            default_ttl: Duration::from_secs(24 * 60 * 60),
            snapshot_ttl: Duration::from_secs(60 * 60),
            concurrency: 8,
        }
    }
}

/// Dataset configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DatasetConfig {
    /// JSON dataset file served by the API
    pub path: PathBuf,
}

impl Default for DatasetConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from("data/dataset.json"),
        }
    }
}

/// Human-readable `Duration` fields ("30s", "24h", "500ms")
pub mod humantime_serde {
    use std::time::Duration;

    use serde::{self, Deserialize, Deserializer, Serializer};

    /// Serialize a `Duration` as a human-readable string
    ///
    /// # Errors
    ///
    /// Returns a serialization error if the serializer fails.
    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&humantime::format_duration(*duration).to_string())
    }

    /// Deserialize a human-readable duration; a bare number means seconds
    ///
    /// # Errors
    ///
    /// Returns a deserialization error if the string cannot be parsed as a duration.
    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        match Raw::deserialize(deserializer)? {
            Raw::Secs(secs) => Ok(Duration::from_secs(secs)),
            Raw::Text(s) => match s.trim().parse::<u64>() {
                Ok(secs) => Ok(Duration::from_secs(secs)),
                Err(_) => humantime::parse_duration(s.trim()).map_err(serde::de::Error::custom),
            },
        }
    }

    /// Environment providers hand over numbers, YAML may hand over either
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Raw {
        Secs(u64),
        Text(String),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn defaults_are_complete() {
        let config = Config::default();
        assert_eq!(config.server.port, 39500);
        assert_eq!(config.client.memory_ttl, Duration::from_secs(86_400));
        assert_eq!(config.client.durable_max_bytes, 5 * 1024 * 1024);
        assert_eq!(config.client.reload_delay, Duration::from_millis(500));
        assert!(config.preload.enabled);
        assert_eq!(config.preload.snapshot_ttl, Duration::from_secs(3600));
        assert!(!config.client.durable_routes.is_empty());
    }

    #[test]
    fn missing_file_is_an_error() {
        let err = Config::load(Some(Path::new("/nonexistent/statcache.yaml"))).unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }

    #[test]
    fn yaml_overrides_defaults() {
        let mut file = tempfile::NamedTempFile::new().expect("temp file");
        writeln!(
            file,
            "server:\n  port: 4000\nclient:\n  memory_ttl: 10m\n  reload_delay: 250ms\n  durable_routes: [/rankings]\npreload:\n  concurrency: 2\n"
        )
        .expect("write");

        let config = Config::load(Some(file.path())).expect("load");
        assert_eq!(config.server.port, 4000);
        assert_eq!(config.server.host, "127.0.0.1");
        assert_eq!(config.client.memory_ttl, Duration::from_secs(600));
        assert_eq!(config.client.reload_delay, Duration::from_millis(250));
        assert_eq!(config.client.durable_routes, vec!["/rankings".to_string()]);
        assert_eq!(config.preload.concurrency, 2);
    }

    #[test]
    fn durations_accept_bare_seconds() {
        #[derive(Deserialize)]
        struct Holder {
            #[serde(with = "humantime_serde")]
            ttl: Duration,
        }
        let holder: Holder = serde_json::from_str(r#"{"ttl": "45"}"#).expect("parse");
        assert_eq!(holder.ttl, Duration::from_secs(45));
        let holder: Holder = serde_json::from_str(r#"{"ttl": 90}"#).expect("parse");
        assert_eq!(holder.ttl, Duration::from_secs(90));
    }
}
