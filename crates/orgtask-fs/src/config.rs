//! Store configuration.

use serde::{Deserialize, Serialize};

/// Store configuration kept in `.orgtask/config.yml`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreConfig {
    /// Configuration version.
    #[serde(default = "default_version")]
    pub version: u32,

    /// Store settings.
    #[serde(default)]
    pub store: StoreSettings,

    /// Address `orgtask serve` binds to.
    #[serde(default)]
    pub server: ServerSettings,

    /// Remote used by the sync commands.
    #[serde(default)]
    pub sync: SyncSettings,
}

const fn default_version() -> u32 {
    1
}

/// Store-level settings.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StoreSettings {
    /// Store name.
    #[serde(default)]
    pub name: Option<String>,
}

/// HTTP server settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerSettings {
    #[serde(default = "default_host")]
    pub host: String,

    #[serde(default = "default_port")]
    pub port: u16,
}

fn default_host() -> String {
    "127.0.0.1".to_string()
}

const fn default_port() -> u16 {
    8000
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}

/// Client sync settings.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SyncSettings {
    /// Base URL of the remote server, e.g. `http://127.0.0.1:8000`.
    #[serde(default)]
    pub remote: Option<String>,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            version: default_version(),
            store: StoreSettings::default(),
            server: ServerSettings::default(),
            sync: SyncSettings::default(),
        }
    }
}

impl StoreConfig {
    /// Create a new config with the given store name.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            store: StoreSettings {
                name: Some(name.into()),
            },
            ..Default::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_sections_take_defaults() {
        let config: StoreConfig = serde_yaml::from_str("version: 1\n").unwrap();
        assert_eq!(config.server.host, "127.0.0.1");
        assert_eq!(config.server.port, 8000);
        assert!(config.sync.remote.is_none());
        assert!(config.store.name.is_none());
    }

    #[test]
    fn test_partial_sections() {
        let yaml = "server:\n  port: 9000\nsync:\n  remote: http://tasks.local:8000\n";
        let config: StoreConfig = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(config.version, 1);
        assert_eq!(config.server.host, "127.0.0.1");
        assert_eq!(config.server.port, 9000);
        assert_eq!(config.sync.remote.as_deref(), Some("http://tasks.local:8000"));
    }

    #[test]
    fn test_named_config() {
        let config = StoreConfig::new("home");
        assert_eq!(config.store.name.as_deref(), Some("home"));
        assert_eq!(config.server.port, 8000);
    }
}
