//! User settings and the configuration value threaded through every command.

use crate::contexts::MigrationExtractorOptions;
use crate::integration::IntegrationContext;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};

pub const SETTINGS_PATH_ENV: &str = "CHEF_AI_SETTINGS";

const CONFIG_DIR: &str = ".chef";
const SETTINGS_FILE: &str = "chef_ai.yml";

pub const MIN_TEMPERATURE: f32 = 0.0;
pub const MAX_TEMPERATURE: f32 = 2.0;

#[derive(Debug)]
pub enum SettingsError {
    HomeDirUnavailable,
    Read { path: PathBuf, reason: String },
    Parse { path: PathBuf, reason: String },
    Invalid(String),
}

impl fmt::Display for SettingsError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            SettingsError::HomeDirUnavailable => {
                write!(f, "Could not determine the home directory for the settings file")
            }
            SettingsError::Read { path, reason } => {
                write!(f, "Failed to read settings {}: {}", path.display(), reason)
            }
            SettingsError::Parse { path, reason } => {
                write!(f, "Settings file {} is malformed: {}", path.display(), reason)
            }
            SettingsError::Invalid(details) => write!(f, "Invalid setting: {}", details),
        }
    }
}

impl std::error::Error for SettingsError {}

/// Tunables read from `~/.chef/chef_ai.yml`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub temperature: f32,
    pub max_tokens: u32,
    pub connect_timeout_secs: u64,
    pub read_timeout_secs: u64,
    /// Markers in a migration analysis that mean "this file needs changes"
    pub issue_markers: Vec<String>,
    pub min_length_ratio: f64,
    pub min_unfenced_block_len: usize,
    /// File extensions scanned by `migrate`
    pub migrate_extensions: Vec<String>,
    /// Directory with `<command>.yml` prompt overrides
    pub prompts_dir: Option<PathBuf>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            temperature: 0.7,
            max_tokens: 4000,
            connect_timeout_secs: 30,
            read_timeout_secs: 60,
            issue_markers: vec![
                "ISSUE:".to_string(),
                "WARNING:".to_string(),
                "DEPRECATED:".to_string(),
            ],
            min_length_ratio: 0.4,
            min_unfenced_block_len: 80,
            migrate_extensions: vec!["rb".to_string()],
            prompts_dir: None,
        }
    }
}

impl Settings {
    /// Location of the settings file, honouring `CHEF_AI_SETTINGS`
    pub fn default_path() -> Result<PathBuf, SettingsError> {
        if let Ok(path) = std::env::var(SETTINGS_PATH_ENV) {
            if !path.is_empty() {
                return Ok(PathBuf::from(path));
            }
        }
        dirs::home_dir()
            .map(|home| home.join(CONFIG_DIR).join(SETTINGS_FILE))
            .ok_or(SettingsError::HomeDirUnavailable)
    }

    /// Loads settings from `path`; a missing file yields the defaults
    pub fn load(path: &Path) -> Result<Self, SettingsError> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let content = fs::read_to_string(path).map_err(|e| SettingsError::Read {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;
        Self::from_yaml(&content).map_err(|e| match e {
            SettingsError::Parse { reason, .. } => SettingsError::Parse {
                path: path.to_path_buf(),
                reason,
            },
            other => other,
        })
    }

    pub fn from_yaml(content: &str) -> Result<Self, SettingsError> {
        // An empty document deserializes as null rather than a mapping.
        if content.trim().is_empty() {
            return Ok(Self::default());
        }
        let settings: Settings =
            serde_yaml::from_str(content).map_err(|e| SettingsError::Parse {
                path: PathBuf::new(),
                reason: e.to_string(),
            })?;
        settings.validate()?;
        Ok(settings)
    }

    pub fn validate(&self) -> Result<(), SettingsError> {
        validate_temperature(self.temperature)?;
        if !(0.0..=1.0).contains(&self.min_length_ratio) {
            return Err(SettingsError::Invalid(format!(
                "min_length_ratio must be between 0.0 and 1.0, got {}",
                self.min_length_ratio
            )));
        }
        if self.max_tokens == 0 {
            return Err(SettingsError::Invalid("max_tokens must be positive".to_string()));
        }
        if self.connect_timeout_secs == 0 || self.read_timeout_secs == 0 {
            return Err(SettingsError::Invalid(format!(
                "timeouts must be positive, got connect_timeout_secs={} read_timeout_secs={}",
                self.connect_timeout_secs, self.read_timeout_secs
            )));
        }
        Ok(())
    }

    /// Options for the migration code extractor derived from these settings
    pub fn migration_extractor_options(&self) -> MigrationExtractorOptions {
        MigrationExtractorOptions {
            min_length_ratio: self.min_length_ratio,
            min_unfenced_block_len: self.min_unfenced_block_len,
            issue_markers: self.issue_markers.clone(),
            ..MigrationExtractorOptions::default()
        }
    }
}

/// Checks a sampling temperature against the accepted range
pub fn validate_temperature(temperature: f32) -> Result<(), SettingsError> {
    if (MIN_TEMPERATURE..=MAX_TEMPERATURE).contains(&temperature) {
        Ok(())
    } else {
        Err(SettingsError::Invalid(format!(
            "temperature must be between {:.1} and {:.1}, got {}",
            MIN_TEMPERATURE, MAX_TEMPERATURE, temperature
        )))
    }
}

/// Configuration passed by reference to every command and pipeline step
#[derive(Debug, Clone, Default)]
pub struct Config {
    pub verbose: bool,
    pub dry_run: bool,
    pub settings: Settings,
    pub integration: Option<IntegrationContext>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_file_gives_defaults() {
        let temp = tempfile::tempdir().unwrap();
        let settings = Settings::load(&temp.path().join("absent.yml")).unwrap();
        assert_eq!(settings, Settings::default());
        assert_eq!(settings.connect_timeout_secs, 30);
        assert_eq!(settings.read_timeout_secs, 60);
    }

    #[test]
    fn test_partial_file_keeps_other_defaults() {
        let settings = Settings::from_yaml(
            "temperature: 0.2\nmigrate_extensions:\n  - rb\n  - erb\n",
        )
        .unwrap();
        assert_eq!(settings.temperature, 0.2);
        assert_eq!(settings.migrate_extensions, vec!["rb", "erb"]);
        assert_eq!(settings.max_tokens, 4000);
        assert_eq!(settings.issue_markers.len(), 3);
    }

    #[test]
    fn test_empty_file_gives_defaults() {
        assert_eq!(Settings::from_yaml("\n").unwrap(), Settings::default());
    }

    #[test]
    fn test_malformed_file_names_the_path() {
        let temp = tempfile::tempdir().unwrap();
        let path = temp.path().join("chef_ai.yml");
        fs::write(&path, "temperature: [not, a, number]\n").unwrap();

        let err = Settings::load(&path).unwrap_err();
        assert!(matches!(err, SettingsError::Parse { .. }));
        assert!(err.to_string().contains("chef_ai.yml"));
    }

    #[test]
    fn test_temperature_range() {
        assert!(validate_temperature(0.0).is_ok());
        assert!(validate_temperature(2.0).is_ok());
        assert!(validate_temperature(2.1).is_err());
        assert!(validate_temperature(-0.1).is_err());
        assert!(Settings::from_yaml("temperature: 3.5\n").is_err());
    }

    #[test]
    fn test_zero_timeouts_are_rejected() {
        for yaml in ["connect_timeout_secs: 0\n", "read_timeout_secs: 0\n"] {
            let err = Settings::from_yaml(yaml).unwrap_err();
            assert!(matches!(err, SettingsError::Invalid(_)), "{}", yaml);
        }
        assert!(Settings::from_yaml("connect_timeout_secs: 5\nread_timeout_secs: 120\n").is_ok());
    }

    #[test]
    fn test_extractor_options_follow_settings() {
        let settings = Settings::from_yaml("min_length_ratio: 0.5\nissue_markers: [\"TODO:\"]\n")
            .unwrap();
        let options = settings.migration_extractor_options();
        assert_eq!(options.min_length_ratio, 0.5);
        assert_eq!(options.issue_markers, vec!["TODO:".to_string()]);
        assert_eq!(options.min_unfenced_block_len, 80);
    }
}
