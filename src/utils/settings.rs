//! Settings and configuration utilities.
//!
//! Settings are read from `$HOME/.repo-owners/settings.json`. The `env`
//! table is a fallback for environment variables, and
//! `organization_overrides` pins the organization of individual logins.

use std::collections::HashMap;
use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::Deserialize;

use crate::contributor::Organization;

/// Environment variable holding GitHub API tokens.
pub const GITHUB_TOKENS_VAR: &str = "GITHUB_API_TOKENS";

/// Settings loaded from `$HOME/.repo-owners/settings.json`.
#[derive(Debug, Default, Deserialize)]
pub struct Settings {
    /// Environment variable overrides.
    #[serde(default)]
    pub env: HashMap<String, String>,

    /// Organization forced for a GitHub login.
    #[serde(default)]
    pub organization_overrides: HashMap<String, Organization>,
}

impl Settings {
    /// Loads settings from the default location.
    pub fn load() -> Result<Self> {
        let settings_path = Self::get_settings_path()?;
        Self::load_from_path(&settings_path)
    }

    /// Loads settings from a specific path, returning defaults when the
    /// file does not exist.
    pub fn load_from_path<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();

        if !path.exists() {
            return Ok(Self::default());
        }

        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read settings file: {}", path.display()))?;

        serde_json::from_str::<Self>(&content)
            .with_context(|| format!("Failed to parse settings file: {}", path.display()))
    }

    /// Returns the default settings path.
    pub fn get_settings_path() -> Result<PathBuf> {
        let home_dir = dirs::home_dir().context("Failed to determine home directory")?;

        Ok(home_dir.join(".repo-owners").join("settings.json"))
    }

    /// Returns an environment variable with fallback to settings.
    pub fn get_env_var(&self, key: &str) -> Option<String> {
        match env::var(key) {
            Ok(value) => Some(value),
            Err(_) => self.env.get(key).cloned(),
        }
    }

    /// GitHub API tokens from `GITHUB_API_TOKENS`, separated by commas or
    /// whitespace.
    pub fn github_tokens(&self) -> Vec<String> {
        self.get_env_var(GITHUB_TOKENS_VAR)
            .map(|value| split_tokens(&value))
            .unwrap_or_default()
    }
}

fn split_tokens(value: &str) -> Vec<String> {
    value
        .split(|c: char| c == ',' || c.is_whitespace())
        .filter(|token| !token.is_empty())
        .map(ToString::to_string)
        .collect()
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    const SETTINGS_JSON: &str = r#"{
        "env": {
            "REPO_OWNERS_TEST_ONLY_VAR": "from-settings"
        },
        "organization_overrides": {
            "octocat": "MSFT"
        }
    }"#;

    #[test]
    fn settings_load_from_path() {
        let temp_dir = TempDir::new().unwrap();
        let settings_path = temp_dir.path().join("settings.json");
        fs::write(&settings_path, SETTINGS_JSON).unwrap();

        let settings = Settings::load_from_path(&settings_path).unwrap();

        assert_eq!(
            settings.get_env_var("REPO_OWNERS_TEST_ONLY_VAR").as_deref(),
            Some("from-settings")
        );
        assert_eq!(
            settings.organization_overrides.get("octocat"),
            Some(&Organization::MSFT)
        );
    }

    #[test]
    fn missing_file_gives_defaults() {
        let temp_dir = TempDir::new().unwrap();
        let settings = Settings::load_from_path(temp_dir.path().join("absent.json")).unwrap();
        assert!(settings.env.is_empty());
        assert!(settings.organization_overrides.is_empty());
    }

    #[test]
    fn invalid_json_is_an_error() {
        let temp_dir = TempDir::new().unwrap();
        let settings_path = temp_dir.path().join("settings.json");
        fs::write(&settings_path, "{ not json").unwrap();
        assert!(Settings::load_from_path(&settings_path).is_err());
    }

    #[test]
    fn tokens_split_on_commas_and_whitespace() {
        assert_eq!(
            split_tokens("ghp_a, ghp_b\nghp_c,,"),
            vec!["ghp_a", "ghp_b", "ghp_c"]
        );
        assert!(split_tokens("  ").is_empty());
    }
}
