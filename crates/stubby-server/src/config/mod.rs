//! Server settings.
//!
//! Settings come from an optional YAML file and are then overridden by
//! command-line flags. Every field has a default, so an empty file (or no file)
//! yields a runnable server.

use crate::cache::MatchCacheConfig;
use crate::recording::DEFAULT_RECORDER_CAPACITY;
use serde::{Deserialize, Serialize};
use std::net::{IpAddr, SocketAddr};
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct ServerConfig {
    /// Stubs YAML file loaded at startup
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<PathBuf>,

    /// Interface both listeners bind to
    #[serde(default = "default_location")]
    pub location: String,

    #[serde(default = "default_stubs_port")]
    pub stubs_port: u16,

    #[serde(default = "default_admin_port")]
    pub admin_port: u16,

    /// Reload the stubs file when it changes on disk
    #[serde(default)]
    pub watch: bool,

    #[serde(default = "default_watch_interval_ms")]
    pub watch_interval_ms: u64,

    #[serde(default)]
    pub match_cache: MatchCacheSettings,

    /// Maximum number of recorded requests kept in memory
    #[serde(default = "default_recorder_capacity")]
    pub recorder_capacity: usize,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct MatchCacheSettings {
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default = "default_cache_ttl_seconds")]
    pub ttl_seconds: u64,
    #[serde(default = "default_cache_max_size")]
    pub max_size: usize,
}

fn default_location() -> String {
    "0.0.0.0".to_string()
}

fn default_stubs_port() -> u16 {
    8882
}

fn default_admin_port() -> u16 {
    8889
}

fn default_watch_interval_ms() -> u64 {
    100
}

fn default_true() -> bool {
    true
}

fn default_cache_ttl_seconds() -> u64 {
    3600
}

fn default_cache_max_size() -> usize {
    500
}

fn default_recorder_capacity() -> usize {
    DEFAULT_RECORDER_CAPACITY
}

impl Default for MatchCacheSettings {
    fn default() -> Self {
        Self {
            enabled: default_true(),
            ttl_seconds: default_cache_ttl_seconds(),
            max_size: default_cache_max_size(),
        }
    }
}

impl From<&MatchCacheSettings> for MatchCacheConfig {
    fn from(settings: &MatchCacheSettings) -> Self {
        MatchCacheConfig {
            enabled: settings.enabled,
            max_size: settings.max_size,
            ttl_seconds: settings.ttl_seconds,
        }
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            data: None,
            location: default_location(),
            stubs_port: default_stubs_port(),
            admin_port: default_admin_port(),
            watch: false,
            watch_interval_ms: default_watch_interval_ms(),
            match_cache: MatchCacheSettings::default(),
            recorder_capacity: default_recorder_capacity(),
        }
    }
}

impl ServerConfig {
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, anyhow::Error> {
        let contents = std::fs::read_to_string(path)?;
        let config: ServerConfig = serde_yaml::from_str(&contents)?;
        config.validate()?;
        Ok(config)
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<(), anyhow::Error> {
        if self.location.parse::<IpAddr>().is_err() {
            anyhow::bail!(
                "Invalid location '{}': expected an IP address such as 0.0.0.0 or 127.0.0.1",
                self.location
            );
        }

        if self.stubs_port != 0 && self.stubs_port == self.admin_port {
            anyhow::bail!(
                "Stubs and admin listeners cannot share port {}",
                self.stubs_port
            );
        }

        if self.watch && self.data.is_none() {
            anyhow::bail!("Watching requires a stubs file: pass --data <FILE>");
        }

        if self.watch_interval_ms == 0 {
            anyhow::bail!("watch_interval_ms must be greater than zero");
        }

        if self.recorder_capacity == 0 {
            anyhow::bail!("recorder_capacity must be greater than zero");
        }

        Ok(())
    }

    pub fn stubs_addr(&self) -> Result<SocketAddr, anyhow::Error> {
        Ok(SocketAddr::new(self.location.parse()?, self.stubs_port))
    }

    pub fn admin_addr(&self) -> Result<SocketAddr, anyhow::Error> {
        Ok(SocketAddr::new(self.location.parse()?, self.admin_port))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_defaults() {
        let config: ServerConfig = serde_yaml::from_str("{}").unwrap();
        assert_eq!(config.location, "0.0.0.0");
        assert_eq!(config.stubs_port, 8882);
        assert_eq!(config.admin_port, 8889);
        assert!(!config.watch);
        assert!(config.match_cache.enabled);
        assert_eq!(config.match_cache.ttl_seconds, 3600);
        assert_eq!(config.match_cache.max_size, 500);
        assert_eq!(config.recorder_capacity, 1000);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_from_file() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(
            file,
            "location: 127.0.0.1\nstubs_port: 9000\nmatch_cache:\n  enabled: false"
        )
        .unwrap();

        let config = ServerConfig::from_file(file.path()).unwrap();
        assert_eq!(config.stubs_port, 9000);
        assert!(!config.match_cache.enabled);
        assert_eq!(config.match_cache.max_size, 500);
        assert_eq!(
            config.stubs_addr().unwrap(),
            "127.0.0.1:9000".parse::<SocketAddr>().unwrap()
        );
    }

    #[test]
    fn test_unknown_field_rejected() {
        let result: Result<ServerConfig, _> = serde_yaml::from_str("stub_port: 1");
        assert!(result.is_err());
    }

    #[test]
    fn test_validate_rejects_bad_values() {
        let config = ServerConfig {
            location: "localhost:80".to_string(),
            ..Default::default()
        };
        assert!(config.validate().is_err());

        let config = ServerConfig {
            stubs_port: 9000,
            admin_port: 9000,
            ..Default::default()
        };
        assert!(config.validate().is_err());

        let config = ServerConfig {
            watch: true,
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_cache_settings_conversion() {
        let settings = MatchCacheSettings {
            enabled: false,
            ttl_seconds: 5,
            max_size: 7,
        };
        let config = MatchCacheConfig::from(&settings);
        assert!(!config.enabled);
        assert_eq!(config.ttl_seconds, 5);
        assert_eq!(config.max_size, 7);
    }
}
