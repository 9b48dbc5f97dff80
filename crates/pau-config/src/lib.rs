//! Pluggable Authentication Configuration
//!
//! TOML-based configuration with environment variable override support.
//! Describes one dispatcher chain plus the plugins its names refer to.

use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::Path;
use thiserror::Error;

mod loader;

pub use loader::ConfigLoader;

/// Password managers a principal folder may name.
pub const PASSWORD_MANAGERS: &[&str] = &["plain", "sha256", "argon2"];

/// Name the default principal factory is registered under
pub const DEFAULT_FACTORY: &str = "default";

/// Name the already-authenticated challenger is registered under
pub const ALREADY_AUTHENTICATED: &str = "already-authenticated";

/// Plugin names taken by built-in registrations
pub const RESERVED_PLUGIN_NAMES: &[&str] = &[DEFAULT_FACTORY, ALREADY_AUTHENTICATED];

/// Configuration error types
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    ReadError(#[from] std::io::Error),

    #[error("Failed to parse TOML: {0}")]
    ParseError(#[from] toml::de::Error),

    #[error("Invalid configuration: {0}")]
    ValidationError(String),

    #[error("Environment variable error: {0}")]
    EnvError(String),
}

/// Root application configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub authentication: DispatcherConfig,
    pub principal_folders: Vec<PrincipalFolderConfig>,
    pub group_folders: Vec<GroupFolderConfig>,
    pub basic_auth: Vec<BasicAuthConfig>,
    pub session_credentials: Vec<SessionCredentialsConfig>,
    pub anonymous: Option<AnonymousConfig>,
}

/// One dispatcher in the delegation chain.
///
/// Plugin names are resolved at call time, so a name without a registered
/// plugin is legal here and simply skipped at runtime.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DispatcherConfig {
    pub prefix: String,
    pub extractors: Vec<String>,
    pub authenticators: Vec<String>,
    pub challengers: Vec<String>,
    pub factories: Vec<String>,
    pub searchers: Vec<String>,
    /// Next dispatcher to delegate to on a local miss
    pub next: Option<Box<DispatcherConfig>>,
}

impl Default for DispatcherConfig {
    fn default() -> Self {
        Self {
            prefix: String::new(),
            extractors: Vec::new(),
            authenticators: Vec::new(),
            challengers: Vec::new(),
            factories: vec![DEFAULT_FACTORY.to_string()],
            searchers: Vec::new(),
            next: None,
        }
    }
}

impl DispatcherConfig {
    /// Iterate this dispatcher and every dispatcher it delegates to, innermost first.
    pub fn chain(&self) -> impl Iterator<Item = &DispatcherConfig> {
        std::iter::successors(Some(self), |config| config.next.as_deref())
    }
}

/// In-memory principal registry
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PrincipalFolderConfig {
    pub name: String,
    pub prefix: String,
    pub password_manager: String,
    pub principals: Vec<PrincipalEntry>,
}

impl Default for PrincipalFolderConfig {
    fn default() -> Self {
        Self {
            name: String::new(),
            prefix: String::new(),
            password_manager: "plain".to_string(),
            principals: Vec::new(),
        }
    }
}

/// A seeded principal. Exactly one of `password` (encoded on load) or
/// `password_hash` (already encoded by the folder's manager) must be set.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct PrincipalEntry {
    pub id: String,
    pub login: String,
    pub title: String,
    pub description: String,
    pub password: Option<String>,
    pub password_hash: Option<String>,
}

/// Group folder with seeded groups
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct GroupFolderConfig {
    pub name: String,
    pub prefix: String,
    pub groups: Vec<GroupEntry>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct GroupEntry {
    pub id: String,
    pub title: String,
    pub description: String,
    pub principals: Vec<String>,
}

/// HTTP basic authentication credentials plugin
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BasicAuthConfig {
    pub name: String,
    pub realm: String,
}

impl Default for BasicAuthConfig {
    fn default() -> Self {
        Self {
            name: "basic".to_string(),
            realm: "pau".to_string(),
        }
    }
}

/// Session-stored credentials plugin with a login form challenge
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionCredentialsConfig {
    pub name: String,
    pub login_field: String,
    pub password_field: String,
    pub login_page: String,
    /// Base URL the login page lives under
    pub site_url: String,
}

impl Default for SessionCredentialsConfig {
    fn default() -> Self {
        Self {
            name: "session".to_string(),
            login_field: "login".to_string(),
            password_field: "password".to_string(),
            login_page: "loginForm.html".to_string(),
            site_url: "http://127.0.0.1".to_string(),
        }
    }
}

/// Unauthenticated principal returned for anonymous callers
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AnonymousConfig {
    pub id: String,
    pub title: String,
    pub description: String,
}

impl Default for AnonymousConfig {
    fn default() -> Self {
        Self {
            id: "pau.anybody".to_string(),
            title: "Unauthenticated Principal".to_string(),
            description: String::new(),
        }
    }
}

impl AppConfig {
    /// Load configuration from a TOML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml(&content)
    }

    /// Parse configuration from TOML text
    pub fn from_toml(content: &str) -> Result<Self, ConfigError> {
        let config: AppConfig = toml::from_str(content)?;
        Ok(config)
    }

    /// Load configuration with environment variable override
    pub fn load() -> Result<Self, ConfigError> {
        let loader = ConfigLoader::new();
        loader.load()
    }

    /// Check plugin definitions for conflicts that would make assembly ambiguous.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let mut names = HashSet::new();
        let plugin_names = self
            .principal_folders
            .iter()
            .map(|f| f.name.as_str())
            .chain(self.group_folders.iter().map(|f| f.name.as_str()))
            .chain(self.basic_auth.iter().map(|b| b.name.as_str()))
            .chain(self.session_credentials.iter().map(|s| s.name.as_str()));

        for name in plugin_names {
            if name.is_empty() {
                return Err(ConfigError::ValidationError("Plugin name cannot be empty".to_string()));
            }
            if RESERVED_PLUGIN_NAMES.contains(&name) {
                return Err(ConfigError::ValidationError(format!("Plugin name '{}' is reserved", name)));
            }
            if !names.insert(name) {
                return Err(ConfigError::ValidationError(format!("Duplicate plugin name: {}", name)));
            }
        }

        for folder in &self.principal_folders {
            if !PASSWORD_MANAGERS.contains(&folder.password_manager.as_str()) {
                return Err(ConfigError::ValidationError(format!(
                    "Unknown password manager '{}' for principal folder '{}'",
                    folder.password_manager, folder.name
                )));
            }
            for entry in &folder.principals {
                if entry.id.is_empty() || entry.login.is_empty() {
                    return Err(ConfigError::ValidationError(format!(
                        "Principal in folder '{}' needs both id and login",
                        folder.name
                    )));
                }
                if entry.password.is_some() == entry.password_hash.is_some() {
                    return Err(ConfigError::ValidationError(format!(
                        "Principal '{}' must set exactly one of password or password_hash",
                        entry.id
                    )));
                }
            }
        }

        for folder in &self.group_folders {
            for group in &folder.groups {
                if group.id.is_empty() {
                    return Err(ConfigError::ValidationError(format!(
                        "Group in folder '{}' has an empty id",
                        folder.name
                    )));
                }
            }
        }

        Ok(())
    }

    /// Generate an example TOML configuration
    pub fn example_toml() -> String {
        r#"# Pluggable Authentication Configuration
# Environment variables override the [authentication] lists

[authentication]
prefix = "site."
extractors = ["basic", "session"]
authenticators = ["users", "groups"]
challengers = ["session", "basic"]
factories = ["default"]
searchers = ["users", "groups"]

# Parent dispatcher consulted when the local pipeline misses
[authentication.next]
prefix = ""
authenticators = ["admins"]
searchers = ["admins"]

[[principal_folders]]
name = "users"
prefix = "users."
password_manager = "sha256"

[[principal_folders.principals]]
id = "bob"
login = "bob"
title = "Bob"
description = "Site member"
password = "secret"

[[principal_folders]]
name = "admins"
prefix = "zope."
password_manager = "plain"

[[principal_folders.principals]]
id = "manager"
login = "admin"
title = "Manager"
password = "admin"

[[group_folders]]
name = "groups"
prefix = "groups."

[[group_folders.groups]]
id = "staff"
title = "Staff"
description = "Everyone on staff"
principals = ["site.users.bob"]

[[basic_auth]]
name = "basic"
realm = "pau"

[[session_credentials]]
name = "session"
login_page = "loginForm.html"
site_url = "http://127.0.0.1"

[anonymous]
id = "pau.anybody"
title = "Unauthenticated Principal"
"#
        .to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_example_toml_parses_and_validates() {
        let config = AppConfig::from_toml(&AppConfig::example_toml()).unwrap();
        config.validate().unwrap();

        assert_eq!(config.authentication.prefix, "site.");
        assert_eq!(config.authentication.extractors, vec!["basic", "session"]);
        let chain: Vec<_> = config.authentication.chain().map(|c| c.prefix.as_str()).collect();
        assert_eq!(chain, vec!["site.", ""]);
        assert_eq!(config.principal_folders[0].principals[0].login, "bob");
        assert_eq!(config.group_folders[0].groups[0].principals, vec!["site.users.bob"]);
    }

    #[test]
    fn test_defaults_when_sections_missing() {
        let config = AppConfig::from_toml("").unwrap();
        assert_eq!(config.authentication.factories, vec!["default"]);
        assert!(config.authentication.next.is_none());
        assert!(config.anonymous.is_none());
    }

    #[test]
    fn test_duplicate_plugin_names_rejected() {
        let config = AppConfig::from_toml(
            r#"
[[principal_folders]]
name = "users"

[[group_folders]]
name = "users"
"#,
        )
        .unwrap();
        assert!(matches!(config.validate(), Err(ConfigError::ValidationError(_))));
    }

    #[test]
    fn test_reserved_plugin_names_rejected() {
        for reserved in RESERVED_PLUGIN_NAMES {
            let config = AppConfig::from_toml(&format!(
                r#"
[[session_credentials]]
name = "{reserved}"
"#
            ))
            .unwrap();
            let err = config.validate().unwrap_err();
            assert!(err.to_string().contains(reserved));
        }
    }

    #[test]
    fn test_unknown_password_manager_rejected() {
        let config = AppConfig::from_toml(
            r#"
[[principal_folders]]
name = "users"
password_manager = "md5"
"#,
        )
        .unwrap();
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("md5"));
    }

    #[test]
    fn test_principal_needs_exactly_one_password_form() {
        let config = AppConfig::from_toml(
            r#"
[[principal_folders]]
name = "users"

[[principal_folders.principals]]
id = "bob"
login = "bob"
"#,
        )
        .unwrap();
        assert!(config.validate().is_err());
    }
}
