//! Locator configuration with layered resolution using figment.
//!
//! Resolution order (highest priority last):
//! 1. Built-in defaults
//! 2. User config: `~/.config/warden/config.toml` (XDG) or platform config dir
//! 3. Project config: `warden.toml`
//! 4. Environment variables: `WARDEN_*`
//!
//! # Example
//!
//! ```toml
//! ambiguity = "error"
//! duplicate_names = "reject_within_scope"
//! delegate_to_parent = true
//! proxy_same_scope = false
//! ```

use std::ops::Deref;
use std::path::{Path, PathBuf};

use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};

/// Boxed wrapper for figment::Error to reduce Result size on the stack.
#[derive(Debug)]
pub struct ConfigError(Box<figment::Error>);

impl Deref for ConfigError {
    type Target = figment::Error;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.0.fmt(f)
    }
}

impl std::error::Error for ConfigError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        self.0.source()
    }
}

impl From<figment::Error> for ConfigError {
    fn from(err: figment::Error) -> Self {
        Self(Box::new(err))
    }
}

/// What resolution does when several candidates share the top rank.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AmbiguityPolicy {
    /// Highest rank wins, earliest registration breaks ties.
    #[default]
    FirstMatch,
    /// Equal top ranks fail with `AmbiguousConstruction`.
    Error,
}

/// Whether a commit may introduce two services with the same name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DuplicateNamePolicy {
    #[default]
    Allow,
    /// Reject a commit leaving two same-named descriptors in one scope
    /// that advertise a common contract.
    RejectWithinScope,
}

/// Per-locator behavior switches.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LocatorConfig {
    pub ambiguity: AmbiguityPolicy,
    pub duplicate_names: DuplicateNamePolicy,
    /// Ask the parent locator when nothing local matches.
    pub delegate_to_parent: bool,
    /// Proxy proxiable-scope injectees even into components of that same scope.
    pub proxy_same_scope: bool,
}

impl Default for LocatorConfig {
    fn default() -> Self {
        Self {
            ambiguity: AmbiguityPolicy::FirstMatch,
            duplicate_names: DuplicateNamePolicy::Allow,
            delegate_to_parent: true,
            proxy_same_scope: false,
        }
    }
}

/// Project config file name, looked up in the working directory.
pub const PROJECT_CONFIG_FILE: &str = "warden.toml";

/// Environment variable prefix.
pub const ENV_PREFIX: &str = "WARDEN_";

impl LocatorConfig {
    /// Load config with layered resolution (defaults → user → project → env).
    pub fn load() -> Result<Self, ConfigError> {
        Self::layered(Self::user_config_path())
            .extract()
            .map_err(ConfigError::from)
    }

    /// Load defaults overlaid with a single TOML file.
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        Self::figment()
            .merge(Toml::file(path.as_ref()))
            .extract()
            .map_err(ConfigError::from)
    }

    fn figment() -> Figment {
        Figment::from(Serialized::defaults(LocatorConfig::default()))
    }

    /// The user layer is merged only when a user config location exists.
    fn layered(user: Option<PathBuf>) -> Figment {
        let mut figment = Self::figment();
        if let Some(path) = user {
            figment = figment.merge(Toml::file(path));
        }
        figment
            .merge(Toml::file(PROJECT_CONFIG_FILE))
            .merge(Env::prefixed(ENV_PREFIX))
    }

    /// User config path: ~/.config/warden/config.toml (XDG) or platform config dir.
    fn user_config_path() -> Option<PathBuf> {
        if let Some(home) = dirs::home_dir() {
            let xdg_path = home.join(".config").join("warden").join("config.toml");
            if xdg_path.exists() {
                return Some(xdg_path);
            }
        }
        dirs::config_dir().map(|p| p.join("warden").join("config.toml"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;
    use std::io::Write;

    #[test]
    fn test_defaults() {
        let config = LocatorConfig::default();
        assert_eq!(config.ambiguity, AmbiguityPolicy::FirstMatch);
        assert_eq!(config.duplicate_names, DuplicateNamePolicy::Allow);
        assert!(config.delegate_to_parent);
        assert!(!config.proxy_same_scope);
    }

    #[test]
    fn test_from_path_overrides_defaults() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "ambiguity = \"error\"").unwrap();
        writeln!(file, "duplicate_names = \"reject_within_scope\"").unwrap();

        let config = LocatorConfig::from_path(file.path()).unwrap();
        assert_eq!(config.ambiguity, AmbiguityPolicy::Error);
        assert_eq!(config.duplicate_names, DuplicateNamePolicy::RejectWithinScope);
        assert!(config.delegate_to_parent);
    }

    #[test]
    fn test_from_path_rejects_bad_value() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "ambiguity = \"sometimes\"").unwrap();

        assert!(LocatorConfig::from_path(file.path()).is_err());
    }

    #[test]
    fn test_missing_file_yields_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = LocatorConfig::from_path(dir.path().join("absent.toml")).unwrap();
        assert_eq!(config, LocatorConfig::default());
    }

    #[test]
    fn test_user_config_path_is_never_empty() {
        if let Some(path) = LocatorConfig::user_config_path() {
            assert!(path.ends_with("warden/config.toml"));
        }
    }

    #[test]
    #[serial]
    fn test_user_layer_is_optional() {
        let config: LocatorConfig = LocatorConfig::layered(None).extract().unwrap();
        assert_eq!(config, LocatorConfig::default());
    }

    #[test]
    #[serial]
    fn test_user_layer_applies_when_present() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "proxy_same_scope = true").unwrap();

        let config: LocatorConfig = LocatorConfig::layered(Some(file.path().to_path_buf()))
            .extract()
            .unwrap();
        assert!(config.proxy_same_scope);
        assert!(config.delegate_to_parent);
    }

    #[test]
    #[serial]
    fn test_env_overrides() {
        std::env::set_var("WARDEN_DELEGATE_TO_PARENT", "false");
        std::env::set_var("WARDEN_AMBIGUITY", "error");
        let config = LocatorConfig::load();
        std::env::remove_var("WARDEN_DELEGATE_TO_PARENT");
        std::env::remove_var("WARDEN_AMBIGUITY");

        let config = config.unwrap();
        assert!(!config.delegate_to_parent);
        assert_eq!(config.ambiguity, AmbiguityPolicy::Error);
    }
}
