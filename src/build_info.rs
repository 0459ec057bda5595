//! Build identity shared by the server's version endpoint and the client's
//! build version guard.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Build hash injected at compile time through `STATCACHE_BUILD_HASH`
pub const EMBEDDED_BUILD_HASH: Option<&str> = option_env!("STATCACHE_BUILD_HASH");

/// Path of the version endpoint, relative to the API base URL
pub const VERSION_ENDPOINT: &str = "/version";

/// Body of `GET /api/version`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VersionInfo {
    /// Identifier of the running build
    pub build_hash: String,
    /// Process start time, unix milliseconds
    pub timestamp: i64,
    /// Package version
    pub version: String,
}

impl VersionInfo {
    /// Version info for this binary, stamped with the process start time.
    ///
    /// Without an embedded hash the package version stands in, so the
    /// identifier only changes when a new release is deployed.
    #[must_use]
    pub fn current(started_at: DateTime<Utc>) -> Self {
        let version = env!("CARGO_PKG_VERSION").to_string();
        Self {
            build_hash: EMBEDDED_BUILD_HASH.map_or_else(|| format!("v{version}"), str::to_string),
            timestamp: started_at.timestamp_millis(),
            version,
        }
    }
}

/// Where a build identifier came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VersionSource {
    /// Compiled into the client
    Embedded,
    /// Fetched from the version endpoint
    Server,
}

/// The build identifier currently trusted by a client
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BuildVersion {
    /// Build hash
    pub hash: String,
    /// Origin of the hash
    pub source: VersionSource,
}

impl BuildVersion {
    /// A hash compiled into the client
    #[must_use]
    pub fn embedded(hash: impl Into<String>) -> Self {
        Self {
            hash: hash.into(),
            source: VersionSource::Embedded,
        }
    }

    /// A hash reported by the server
    #[must_use]
    pub fn server(hash: impl Into<String>) -> Self {
        Self {
            hash: hash.into(),
            source: VersionSource::Server,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn version_info_uses_camel_case() {
        let info = VersionInfo {
            build_hash: "abc123".to_string(),
            timestamp: 1_700_000_000_000,
            version: "0.3.0".to_string(),
        };
        assert_eq!(
            serde_json::to_value(&info).expect("serialize"),
            json!({"buildHash": "abc123", "timestamp": 1_700_000_000_000_i64, "version": "0.3.0"})
        );
    }

    #[test]
    fn current_reports_package_version() {
        let started = Utc::now();
        let info = VersionInfo::current(started);
        assert_eq!(info.version, env!("CARGO_PKG_VERSION"));
        assert_eq!(info.timestamp, started.timestamp_millis());
        assert!(!info.build_hash.is_empty());
    }

    #[test]
    fn build_version_sources() {
        assert_eq!(BuildVersion::embedded("a").source, VersionSource::Embedded);
        assert_eq!(BuildVersion::server("b").source, VersionSource::Server);
    }
}
