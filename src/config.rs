use std::{collections::HashMap, path::PathBuf, time::Duration};

use config::{Config as ConfigLib, ConfigError, Environment, File};
use serde::Deserialize;

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub keystore: KeystoreConfig,
    #[serde(default)]
    pub crl: CrlConfig,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct KeystoreConfig {
    /// Password protecting key and secret-key entries.
    pub password: String,
    /// Optional directory of DER certificates preloaded as trusted entries.
    #[serde(default)]
    pub certificates_dir: Option<PathBuf>,
}

/// Administrative options consumed by the CRL manager.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct CrlConfig {
    /// Master switch for CRL management.
    pub enabled: bool,
    /// When disabled, any syntactically valid CRL is accepted without a
    /// signature check.
    pub verification_enabled: bool,
    /// Period of the freshness check schedule.
    pub check_interval_ms: u64,
    /// Period of the unconditional forced-update schedule.
    pub update_interval_ms: u64,
    /// Per-URI download timeout.
    pub fetch_timeout_ms: u64,
    /// Distribution point URIs watched independently of any certificate.
    pub distribution_points: Vec<String>,
    /// Override path for the persisted CRL store file.
    pub store_path: Option<PathBuf>,
}

impl Default for CrlConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            verification_enabled: true,
            check_interval_ms: 5_000,
            update_interval_ms: 24 * 60 * 60 * 1_000,
            fetch_timeout_ms: 5_000,
            distribution_points: Vec::new(),
            store_path: None,
        }
    }
}

impl CrlConfig {
    pub fn check_interval(&self) -> Duration {
        Duration::from_millis(self.check_interval_ms)
    }

    pub fn update_interval(&self) -> Duration {
        Duration::from_millis(self.update_interval_ms)
    }

    pub fn fetch_timeout(&self) -> Duration {
        Duration::from_millis(self.fetch_timeout_ms)
    }
}

impl Config {
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_with_sources(None)
    }

    pub fn load_with_sources(
        env_vars: Option<HashMap<String, String>>,
    ) -> Result<Self, ConfigError> {
        let mut builder = ConfigLib::builder()
            .set_default("keystore.password", "changeit")?
            .add_source(File::with_name("config/settings").required(false));

        // If env_vars is provided, we use it instead of system environment
        // This is to avoid systems variables pollution across tests
        if let Some(vars) = env_vars {
            for (key, value) in vars {
                builder = builder.set_override(&key, value)?;
            }
        } else {
            // Use system environment variables
            // Should be in the format APP_CRL__CHECK_INTERVAL_MS
            builder = builder.add_source(
                Environment::with_prefix("APP")
                    .prefix_separator("_")
                    .separator("__"),
            );
        }

        builder.build()?.try_deserialize()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_default_config() {
        let config = Config::load().expect("Failed to load config");

        assert_eq!(config.keystore.password, "changeit");
        assert!(config.keystore.certificates_dir.is_none());
        assert!(!config.crl.enabled);
        assert!(config.crl.verification_enabled);
        assert_eq!(config.crl.check_interval_ms, 5_000);
        assert_eq!(config.crl.update_interval_ms, 24 * 60 * 60 * 1_000);
        assert!(config.crl.distribution_points.is_empty());
    }

    #[test]
    fn test_env_config() {
        let mut env_vars = HashMap::new();
        env_vars.insert("keystore.password".to_string(), "secret".to_string());
        env_vars.insert("crl.enabled".to_string(), "true".to_string());
        env_vars.insert("crl.check_interval_ms".to_string(), "250".to_string());
        env_vars.insert(
            "crl.store_path".to_string(),
            "/var/lib/credstore/crl.json".to_string(),
        );

        let config = Config::load_with_sources(Some(env_vars)).expect("Failed to load config");

        assert_eq!(config.keystore.password, "secret");
        assert!(config.crl.enabled);
        assert_eq!(config.crl.check_interval(), Duration::from_millis(250));
        assert_eq!(
            config.crl.store_path,
            Some(PathBuf::from("/var/lib/credstore/crl.json"))
        );
    }

    #[test]
    fn test_partial_env_override() {
        let mut env_vars = HashMap::new();
        // We just override the fetch timeout
        env_vars.insert("crl.fetch_timeout_ms".to_string(), "1000".to_string());

        let config = Config::load_with_sources(Some(env_vars)).expect("Failed to load config");

        assert_eq!(config.crl.fetch_timeout(), Duration::from_secs(1));
        // The other values should use default
        assert_eq!(config.crl.check_interval_ms, 5_000);
        assert!(!config.crl.enabled);
    }
}
