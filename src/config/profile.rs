//! Profile store and credential resolution.
//!
//! Profiles live in a small YAML file under the home directory. Environment
//! variables take precedence over the file, with the following names:
//! `API7_CLOUD_PROFILE`, `API7_CLOUD_ADDR` and `API7_CLOUD_TOKEN`.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::{debug, info};

use crate::error::{ConfigError, DeployError, Result};

use super::merge::set_mode;

/// Environment variable selecting the active profile.
pub const PROFILE_ENV: &str = "API7_CLOUD_PROFILE";

/// Environment variable overriding the control-plane address.
pub const ADDR_ENV: &str = "API7_CLOUD_ADDR";

/// Environment variable overriding the access token.
pub const TOKEN_ENV: &str = "API7_CLOUD_TOKEN";

/// Environment variable overriding the cloud lua module download URL.
pub const MODULE_URL_ENV: &str = "API7_CLOUD_LUA_MODULE_URL";

/// Default control-plane API address.
pub const DEFAULT_ADDRESS: &str = "https://api.api7.cloud";

/// Name used when no profile is selected anywhere.
pub const DEFAULT_PROFILE: &str = "default";

/// A named set of control-plane credentials.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Profile {
    /// Profile name.
    pub name: String,
    /// Control-plane API address.
    #[serde(default = "default_address")]
    pub address: String,
    /// Access token.
    pub token: String,
}

/// Contents of the profile file.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct ProfileFile {
    /// Profile used when none is selected.
    #[serde(default)]
    pub default_profile: Option<String>,
    /// Known profiles.
    #[serde(default)]
    pub profiles: Vec<Profile>,
}

/// Credentials resolved for the current invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Credentials {
    /// Name of the profile the credentials came from.
    pub profile: String,
    /// Control-plane API address.
    pub address: String,
    /// Access token.
    pub token: String,
}

/// Reads and writes the profile file.
#[derive(Debug, Clone)]
pub struct ProfileStore {
    /// Path to the profile file.
    path: PathBuf,
}

fn default_address() -> String {
    String::from(DEFAULT_ADDRESS)
}

impl ProfileFile {
    /// Looks up a profile by name.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&Profile> {
        self.profiles.iter().find(|p| p.name == name)
    }

    /// Inserts or replaces a profile.
    pub fn upsert(&mut self, profile: Profile) {
        if let Some(existing) = self.profiles.iter_mut().find(|p| p.name == profile.name) {
            *existing = profile;
        } else {
            self.profiles.push(profile);
        }
    }
}

impl ProfileStore {
    /// Creates a store backed by `path`.
    #[must_use]
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Loads the profile file; a missing file yields no profiles.
    ///
    /// # Errors
    ///
    /// Returns an error if the file exists but cannot be read or parsed.
    pub fn load(&self) -> Result<ProfileFile> {
        if !self.path.exists() {
            debug!("Profile file does not exist: {}", self.path.display());
            return Ok(ProfileFile::default());
        }

        let content = std::fs::read_to_string(&self.path)?;
        serde_yaml::from_str(&content).map_err(|e| {
            DeployError::Config(ConfigError::ParseError {
                message: format!("YAML parse error: {e}"),
                location: Some(self.path.display().to_string()),
            })
        })
    }

    /// Saves the profile file, readable only by the owner.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be written.
    pub fn save(&self, file: &ProfileFile) -> Result<()> {
        let content = serde_yaml::to_string(file)
            .map_err(|e| ConfigError::parse(format!("Failed to serialize profiles: {e}")))?;

        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(&self.path, content)?;
        set_mode(&self.path, 0o600)?;

        info!("Saved profiles to: {}", self.path.display());
        Ok(())
    }

    /// Resolves credentials using the process environment.
    ///
    /// # Errors
    ///
    /// Returns an error if no token can be found.
    pub fn resolve(&self) -> Result<Credentials> {
        self.resolve_with(|name| std::env::var(name).ok())
    }

    /// Resolves credentials using `env` to read environment variables.
    ///
    /// Precedence: `API7_CLOUD_ADDR`/`API7_CLOUD_TOKEN`, then the profile
    /// named by `API7_CLOUD_PROFILE`, then the file's default profile.
    ///
    /// # Errors
    ///
    /// Returns an error if an explicitly selected profile does not exist or
    /// if no token can be found.
    pub fn resolve_with(&self, env: impl Fn(&str) -> Option<String>) -> Result<Credentials> {
        let file = self.load()?;

        let selected = env(PROFILE_ENV).filter(|s| !s.is_empty());
        let explicit = selected.is_some();
        let name = selected
            .or_else(|| file.default_profile.clone())
            .unwrap_or_else(|| String::from(DEFAULT_PROFILE));

        let profile = file.get(&name);
        if explicit && profile.is_none() && env(TOKEN_ENV).is_none() {
            return Err(ConfigError::ProfileNotFound { name }.into());
        }

        let address = env(ADDR_ENV)
            .filter(|s| !s.is_empty())
            .or_else(|| profile.map(|p| p.address.clone()))
            .unwrap_or_else(default_address);

        let token = env(TOKEN_ENV)
            .filter(|s| !s.is_empty())
            .or_else(|| profile.map(|p| p.token.clone()))
            .ok_or_else(|| ConfigError::MissingSetting {
                name: format!("access token (run 'configure' or set {TOKEN_ENV})"),
            })?;

        debug!(profile = %name, address = %address, "Resolved control plane credentials");

        Ok(Credentials {
            profile: name,
            address,
            token,
        })
    }
}

/// Loads a `.env` file from `dir` if present.
///
/// # Errors
///
/// Returns an error if the file exists but cannot be loaded.
pub fn load_dotenv(dir: &Path) -> Result<()> {
    let env_path = dir.join(".env");

    if env_path.exists() {
        info!("Loading environment from: {}", env_path.display());
        dotenvy::from_path(&env_path).map_err(|e| {
            DeployError::Config(ConfigError::ParseError {
                message: format!("Failed to load .env file: {e}"),
                location: Some(env_path.display().to_string()),
            })
        })?;
    } else {
        debug!(".env file not found at: {}", env_path.display());
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use tempfile::TempDir;

    fn env_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect();
        move |name| map.get(name).cloned()
    }

    fn store_with_profiles() -> (ProfileStore, TempDir) {
        let dir = TempDir::new().expect("tempdir");
        let store = ProfileStore::new(dir.path().join("config"));
        let mut file = ProfileFile {
            default_profile: Some(String::from("prod")),
            profiles: vec![],
        };
        file.upsert(Profile {
            name: String::from("prod"),
            address: String::from("https://prod.example.com"),
            token: String::from("prod-token"),
        });
        file.upsert(Profile {
            name: String::from("staging"),
            address: String::from("https://staging.example.com"),
            token: String::from("staging-token"),
        });
        store.save(&file).expect("save");
        (store, dir)
    }

    #[test]
    fn test_default_profile_is_used() {
        let (store, _dir) = store_with_profiles();
        let creds = store.resolve_with(env_from(&[])).expect("resolve");
        assert_eq!(creds.profile, "prod");
        assert_eq!(creds.token, "prod-token");
    }

    #[test]
    fn test_env_selects_profile() {
        let (store, _dir) = store_with_profiles();
        let creds = store
            .resolve_with(env_from(&[(PROFILE_ENV, "staging")]))
            .expect("resolve");
        assert_eq!(creds.address, "https://staging.example.com");
    }

    #[test]
    fn test_env_overrides_profile_values() {
        let (store, _dir) = store_with_profiles();
        let creds = store
            .resolve_with(env_from(&[(TOKEN_ENV, "env-token"), (ADDR_ENV, "http://localhost")]))
            .expect("resolve");
        assert_eq!(creds.token, "env-token");
        assert_eq!(creds.address, "http://localhost");
    }

    #[test]
    fn test_unknown_selected_profile_fails() {
        let (store, _dir) = store_with_profiles();
        let err = store
            .resolve_with(env_from(&[(PROFILE_ENV, "missing")]))
            .expect_err("profile does not exist");
        assert!(err.to_string().contains("Profile not found: missing"));
    }

    #[test]
    fn test_missing_file_without_token_fails() {
        let dir = TempDir::new().expect("tempdir");
        let store = ProfileStore::new(dir.path().join("config"));
        assert!(store.resolve_with(env_from(&[])).is_err());
    }

    #[test]
    fn test_upsert_replaces_existing() {
        let mut file = ProfileFile::default();
        file.upsert(Profile {
            name: String::from("a"),
            address: default_address(),
            token: String::from("one"),
        });
        file.upsert(Profile {
            name: String::from("a"),
            address: default_address(),
            token: String::from("two"),
        });
        assert_eq!(file.profiles.len(), 1);
        assert_eq!(file.get("a").map(|p| p.token.as_str()), Some("two"));
    }
}
