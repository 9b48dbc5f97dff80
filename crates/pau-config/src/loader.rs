//! Configuration loader with file and environment variable support

use crate::{AppConfig, ConfigError};
use std::env;
use std::path::PathBuf;
use tracing::info;

/// Standard config file search paths
const CONFIG_PATHS: &[&str] = &[
    "pau.toml",
    "config.toml",
    "./config/pau.toml",
    "/etc/pau/config.toml",
];

/// Configuration loader
pub struct ConfigLoader {
    config_path: Option<PathBuf>,
}

impl ConfigLoader {
    /// Create a new configuration loader
    pub fn new() -> Self {
        Self { config_path: None }
    }

    /// Create a loader with a specific config file path
    pub fn with_path<P: Into<PathBuf>>(path: P) -> Self {
        Self {
            config_path: Some(path.into()),
        }
    }

    /// Load configuration from file (if found) with environment variable overrides
    pub fn load(&self) -> Result<AppConfig, ConfigError> {
        let mut config = AppConfig::default();

        if let Some(path) = self.find_config_file()? {
            info!(?path, "Loading configuration from file");
            config = AppConfig::from_file(&path)?;
        }

        self.apply_env_overrides(&mut config);
        config.validate()?;

        Ok(config)
    }

    /// Find the configuration file to use.
    ///
    /// An explicitly requested file that does not exist is an error; the
    /// standard search paths are optional.
    fn find_config_file(&self) -> Result<Option<PathBuf>, ConfigError> {
        if let Some(path) = &self.config_path {
            if path.exists() {
                return Ok(Some(path.clone()));
            }
            return Err(ConfigError::ValidationError(format!(
                "Config file not found: {}",
                path.display()
            )));
        }

        if let Ok(path) = env::var("PAU_CONFIG") {
            let path = PathBuf::from(path);
            if path.exists() {
                return Ok(Some(path));
            }
            return Err(ConfigError::EnvError(format!(
                "PAU_CONFIG points to a missing file: {}",
                path.display()
            )));
        }

        Ok(CONFIG_PATHS
            .iter()
            .map(PathBuf::from)
            .find(|path| path.exists()))
    }

    /// Apply environment variable overrides to the innermost dispatcher
    fn apply_env_overrides(&self, config: &mut AppConfig) {
        let auth = &mut config.authentication;

        if let Ok(val) = env::var("PAU_PREFIX") {
            auth.prefix = val;
        }
        if let Ok(val) = env::var("PAU_EXTRACTORS") {
            auth.extractors = split_list(&val);
        }
        if let Ok(val) = env::var("PAU_AUTHENTICATORS") {
            auth.authenticators = split_list(&val);
        }
        if let Ok(val) = env::var("PAU_CHALLENGERS") {
            auth.challengers = split_list(&val);
        }
        if let Ok(val) = env::var("PAU_FACTORIES") {
            auth.factories = split_list(&val);
        }
        if let Ok(val) = env::var("PAU_SEARCHERS") {
            auth.searchers = split_list(&val);
        }
    }
}

impl Default for ConfigLoader {
    fn default() -> Self {
        Self::new()
    }
}

fn split_list(val: &str) -> Vec<String> {
    val.split(',')
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_split_list_trims_and_drops_empty() {
        assert_eq!(split_list(" basic, session ,,"), vec!["basic", "session"]);
        assert!(split_list("").is_empty());
    }

    #[test]
    fn test_load_from_explicit_path() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
            file,
            r#"
[authentication]
prefix = "ldap."
extractors = ["basic"]
authenticators = ["users"]

[[principal_folders]]
name = "users"

[[principal_folders.principals]]
id = "bob"
login = "bob"
password = "x"
"#
        )
        .unwrap();

        let config = ConfigLoader::with_path(file.path()).load().unwrap();
        assert_eq!(config.authentication.prefix, "ldap.");
        assert_eq!(config.principal_folders.len(), 1);
    }

    #[test]
    fn test_missing_explicit_path_is_an_error() {
        let loader = ConfigLoader::with_path("/nonexistent/pau.toml");
        assert!(loader.load().is_err());
    }
}
