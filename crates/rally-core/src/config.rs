//! Engine and remote configuration

use std::env;
use std::time::Duration;

use crate::util::normalize_text_option;

/// Default delay between scheduled sync cycles
pub const DEFAULT_SYNC_INTERVAL: Duration = Duration::from_secs(30);

/// Default maximum number of remote records fetched per pull
pub const DEFAULT_PAGE_SIZE: usize = 100;

/// Connection settings for the authoritative remote store
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteConfig {
    /// Base endpoint, e.g. `https://api.example.com`
    pub endpoint: String,
    /// Optional API key sent with every request
    pub api_key: Option<String>,
}

impl RemoteConfig {
    /// Build a configuration from an endpoint and optional API key
    pub fn new(endpoint: impl Into<String>, api_key: Option<String>) -> Self {
        Self {
            endpoint: endpoint.into(),
            api_key: normalize_text_option(api_key),
        }
    }

    /// Read `RALLY_REMOTE_URL` / `RALLY_API_KEY` from the environment.
    ///
    /// Returns `None` when no remote endpoint is configured, which hosts
    /// treat as "sync not set up on this device".
    #[must_use]
    pub fn from_env() -> Option<Self> {
        let endpoint = normalize_text_option(env::var("RALLY_REMOTE_URL").ok())?;
        let api_key = normalize_text_option(env::var("RALLY_API_KEY").ok());
        Some(Self { endpoint, api_key })
    }
}

/// Tunables for the sync engine
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineConfig {
    /// Delay between scheduled cycles once started
    pub sync_interval: Duration,
    /// Maximum remote records fetched per entity per pull
    pub page_size: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            sync_interval: DEFAULT_SYNC_INTERVAL,
            page_size: DEFAULT_PAGE_SIZE,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn remote_config_normalizes_api_key() {
        let config = RemoteConfig::new("https://api.example.com", Some("  ".to_string()));
        assert_eq!(config.api_key, None);

        let config = RemoteConfig::new("https://api.example.com", Some(" key ".to_string()));
        assert_eq!(config.api_key, Some("key".to_string()));
    }

    #[test]
    fn engine_config_defaults() {
        let config = EngineConfig::default();
        assert_eq!(config.sync_interval, Duration::from_secs(30));
        assert_eq!(config.page_size, 100);
    }
}
