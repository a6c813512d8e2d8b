//! Backend configuration
//!
//! Resolved from environment variables first, falling back to
//! `~/.lectio/config.toml`. The anon key authenticates row queries; the
//! service key unlocks the auth admin API used for member creation.

use std::env;
use std::path::Path;

use anyhow::{bail, Context, Result};
use serde::Deserialize;

use crate::paths;

/// Environment variable for the backend base URL
pub const ENV_BACKEND_URL: &str = "LECTIO_BACKEND_URL";
/// Environment variable for the anon (publishable) API key
pub const ENV_ANON_KEY: &str = "LECTIO_ANON_KEY";
/// Environment variable for the service-role key
pub const ENV_SERVICE_KEY: &str = "LECTIO_SERVICE_KEY";

/// Connection settings for the hosted backend
#[derive(Debug, Clone, Default, Deserialize)]
pub struct BackendConfig {
    /// Base URL of the hosted backend, e.g. `https://project.example.co`
    #[serde(default)]
    pub url: String,
    /// Anon key sent as `apikey` with every request
    #[serde(default)]
    pub anon_key: String,
    /// Service-role key for admin operations (member creation, profile admin)
    #[serde(default)]
    pub service_key: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct ConfigFile {
    #[serde(default)]
    backend: BackendConfig,
}

impl BackendConfig {
    /// Load config: file values first, environment variables override per field
    pub fn load() -> Result<Self> {
        let mut config = Self::from_file(&paths::config_file())?.unwrap_or_default();

        if let Ok(url) = env::var(ENV_BACKEND_URL) {
            config.url = url;
        }
        if let Ok(key) = env::var(ENV_ANON_KEY) {
            config.anon_key = key;
        }
        if let Ok(key) = env::var(ENV_SERVICE_KEY) {
            config.service_key = Some(key);
        }

        if config.url.is_empty() || config.anon_key.is_empty() {
            bail!(
                "backend not configured: set {} and {} or fill {}",
                ENV_BACKEND_URL,
                ENV_ANON_KEY,
                paths::config_file().display()
            );
        }

        Ok(config)
    }

    /// Read config from a TOML file, returning None if the file is absent
    pub fn from_file(path: &Path) -> Result<Option<Self>> {
        if !path.exists() {
            return Ok(None);
        }
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read {}", path.display()))?;
        let file: ConfigFile = toml::from_str(&contents)
            .with_context(|| format!("invalid config in {}", path.display()))?;
        Ok(Some(file.backend))
    }

    /// Whether a service-role key is available for admin operations
    pub fn has_service_key(&self) -> bool {
        self.service_key.as_deref().is_some_and(|k| !k.is_empty())
    }
}
