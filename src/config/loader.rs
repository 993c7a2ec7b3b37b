//! Configuration Loader
//!
//! Loads the router configuration from an explicit path or from the usual
//! lookup locations.

use std::path::{Path, PathBuf};

use crate::config::schema::RouterConfig;
use crate::error::{Result, RouterError};

/// Loads router configuration from the file system
#[derive(Debug)]
pub struct ConfigLoader {
    config: RouterConfig,
}

impl ConfigLoader {
    /// Load from the first existing default location.
    ///
    /// Also loads a `.env` file if present, so API keys referenced by
    /// backend adapters are in the environment before they are constructed.
    pub fn new() -> Result<Self> {
        let _ = dotenvy::dotenv();

        for path in Self::config_paths() {
            if path.exists() {
                return Self::from_path(&path);
            }
        }

        Err(RouterError::Config(
            "no configuration file found; set LLM_ROUTER_CONFIG or create router.json".to_string(),
        ))
    }

    /// Load from a specific config file
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .map_err(|e| RouterError::Config(format!("Failed to read {}: {}", path.display(), e)))?;

        let config = RouterConfig::from_json(&content)
            .map_err(|e| RouterError::Config(format!("{}: {}", path.display(), e)))?;

        Ok(Self { config })
    }

    /// Lookup locations in priority order
    fn config_paths() -> Vec<PathBuf> {
        let mut paths = Vec::new();

        // 1. Environment variable
        if let Ok(custom_path) = std::env::var("LLM_ROUTER_CONFIG") {
            paths.push(PathBuf::from(custom_path));
        }

        // 2. Current directory
        paths.push(PathBuf::from("router.json"));

        // 3. User config directory
        if let Some(config_dir) = dirs::config_dir() {
            paths.push(config_dir.join("llm-router").join("router.json"));
        }

        // 4. Home directory
        if let Some(home_dir) = dirs::home_dir() {
            paths.push(home_dir.join(".llm-router").join("router.json"));
        }

        paths
    }

    /// Get the loaded configuration
    pub fn config(&self) -> &RouterConfig {
        &self.config
    }

    /// Take ownership of the configuration
    pub fn into_config(self) -> RouterConfig {
        self.config
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_load_from_custom_file() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(
            file,
            r#"{{
                "providers": [
                    {{"name": "openai", "models": [{{"model": "gpt-4"}}]}}
                ]
            }}"#
        )
        .unwrap();

        let loader = ConfigLoader::from_path(file.path()).unwrap();
        assert_eq!(loader.config().providers.len(), 1);
        assert_eq!(loader.config().providers[0].name, "openai");
    }

    #[test]
    fn test_missing_file_is_config_error() {
        let err = ConfigLoader::from_path("/nonexistent/router.json").unwrap_err();
        assert!(matches!(err, RouterError::Config(_)));
    }

    #[test]
    fn test_invalid_json_is_config_error() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, "not json").unwrap();

        let err = ConfigLoader::from_path(file.path()).unwrap_err();
        assert!(matches!(err, RouterError::Config(_)));
    }
}
