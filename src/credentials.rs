//! Azure OpenAI credentials: persisted per user, overridable from the
//! environment.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

pub const CREDENTIALS_PATH_ENV: &str = "CHEF_AI_CREDENTIALS";
pub const API_KEY_ENV: &str = "AZURE_OPENAI_API_KEY";
pub const ENDPOINT_ENV: &str = "AZURE_OPENAI_ENDPOINT";
pub const DEPLOYMENT_ENV: &str = "AZURE_OPENAI_DEPLOYMENT_NAME";
pub const API_VERSION_ENV: &str = "AZURE_OPENAI_API_VERSION";

pub const DEFAULT_API_VERSION: &str = "2024-02-01";

const CONFIG_DIR: &str = ".chef";
const CREDENTIALS_FILE: &str = "chef_ai_credentials.json";

#[derive(Debug)]
pub enum CredentialsError {
    HomeDirUnavailable,
    Read { path: PathBuf, reason: String },
    Parse { path: PathBuf, reason: String },
    Write { path: PathBuf, reason: String },
    Missing(Vec<&'static str>),
}

impl fmt::Display for CredentialsError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            CredentialsError::HomeDirUnavailable => {
                write!(f, "Could not determine the home directory for the credentials file")
            }
            CredentialsError::Read { path, reason } => {
                write!(f, "Failed to read credentials {}: {}", path.display(), reason)
            }
            CredentialsError::Parse { path, reason } => {
                write!(f, "Credentials file {} is malformed: {}", path.display(), reason)
            }
            CredentialsError::Write { path, reason } => {
                write!(f, "Failed to write credentials {}: {}", path.display(), reason)
            }
            CredentialsError::Missing(fields) => write!(
                f,
                "Azure OpenAI credentials are not configured (missing: {}). Run `chef-ai setup` first.",
                fields.join(", ")
            ),
        }
    }
}

impl std::error::Error for CredentialsError {}

/// The four values needed to reach an Azure OpenAI deployment
#[derive(Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CredentialSet {
    #[serde(default)]
    pub azure_openai_api_key: String,
    #[serde(default)]
    pub azure_openai_endpoint: String,
    #[serde(default)]
    pub azure_openai_deployment_name: String,
    #[serde(default)]
    pub azure_openai_api_version: String,
}

impl fmt::Debug for CredentialSet {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_struct("CredentialSet")
            .field("azure_openai_api_key", &self.masked_key())
            .field("azure_openai_endpoint", &self.azure_openai_endpoint)
            .field("azure_openai_deployment_name", &self.azure_openai_deployment_name)
            .field("azure_openai_api_version", &self.azure_openai_api_version)
            .finish()
    }
}

impl CredentialSet {
    /// Location of the credentials file, honouring `CHEF_AI_CREDENTIALS`
    pub fn default_path() -> Result<PathBuf, CredentialsError> {
        if let Ok(path) = std::env::var(CREDENTIALS_PATH_ENV) {
            if !path.is_empty() {
                return Ok(PathBuf::from(path));
            }
        }
        dirs::home_dir()
            .map(|home| home.join(CONFIG_DIR).join(CREDENTIALS_FILE))
            .ok_or(CredentialsError::HomeDirUnavailable)
    }

    /// Reads the credentials file; `Ok(None)` when it does not exist
    pub fn load_file(path: &Path) -> Result<Option<Self>, CredentialsError> {
        if !path.exists() {
            return Ok(None);
        }
        let content = fs::read_to_string(path).map_err(|e| CredentialsError::Read {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;
        serde_json::from_str(&content)
            .map(Some)
            .map_err(|e| CredentialsError::Parse {
                path: path.to_path_buf(),
                reason: e.to_string(),
            })
    }

    /// Loads the file at `path`, applies environment overrides and checks
    /// that every field is present.
    pub fn resolve(path: &Path) -> Result<Self, CredentialsError> {
        let stored = Self::load_file(path)?.unwrap_or_default();
        let credentials = stored.with_overrides(|name| std::env::var(name).ok());
        credentials.validate()?;
        Ok(credentials)
    }

    /// Replaces fields with values from `lookup` (keyed by environment
    /// variable name) where present and non-empty.
    pub fn with_overrides(mut self, lookup: impl Fn(&str) -> Option<String>) -> Self {
        let fields = [
            (API_KEY_ENV, &mut self.azure_openai_api_key),
            (ENDPOINT_ENV, &mut self.azure_openai_endpoint),
            (DEPLOYMENT_ENV, &mut self.azure_openai_deployment_name),
            (API_VERSION_ENV, &mut self.azure_openai_api_version),
        ];
        for (name, field) in fields {
            if let Some(value) = lookup(name).filter(|v| !v.trim().is_empty()) {
                *field = value.trim().to_string();
            }
        }
        if self.azure_openai_api_version.is_empty() {
            self.azure_openai_api_version = DEFAULT_API_VERSION.to_string();
        }
        self
    }

    pub fn missing_fields(&self) -> Vec<&'static str> {
        let mut missing = Vec::new();
        if self.azure_openai_api_key.trim().is_empty() {
            missing.push("azure_openai_api_key");
        }
        if self.azure_openai_endpoint.trim().is_empty() {
            missing.push("azure_openai_endpoint");
        }
        if self.azure_openai_deployment_name.trim().is_empty() {
            missing.push("azure_openai_deployment_name");
        }
        if self.azure_openai_api_version.trim().is_empty() {
            missing.push("azure_openai_api_version");
        }
        missing
    }

    pub fn validate(&self) -> Result<(), CredentialsError> {
        let missing = self.missing_fields();
        if missing.is_empty() {
            Ok(())
        } else {
            Err(CredentialsError::Missing(missing))
        }
    }

    /// Writes the credentials as JSON, readable by the owner only
    pub fn save(&self, path: &Path) -> Result<(), CredentialsError> {
        let write_err = |e: &dyn fmt::Display| CredentialsError::Write {
            path: path.to_path_buf(),
            reason: e.to_string(),
        };

        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(|e| write_err(&e))?;
        }
        let content = serde_json::to_string_pretty(self).map_err(|e| write_err(&e))?;

        let mut options = fs::OpenOptions::new();
        options.write(true).create(true).truncate(true);
        #[cfg(unix)]
        {
            use std::os::unix::fs::OpenOptionsExt;
            options.mode(0o600);
        }
        let mut file = options.open(path).map_err(|e| write_err(&e))?;

        // The mode above only applies to newly created files.
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            let mut perms = file.metadata().map_err(|e| write_err(&e))?.permissions();
            perms.set_mode(0o600);
            fs::set_permissions(path, perms).map_err(|e| write_err(&e))?;
        }

        file.write_all(content.as_bytes()).map_err(|e| write_err(&e))?;
        Ok(())
    }

    /// The API key with all but the last four characters hidden
    pub fn masked_key(&self) -> String {
        let key = &self.azure_openai_api_key;
        let count = key.chars().count();
        if count <= 4 {
            return "*".repeat(count);
        }
        let tail: String = key.chars().skip(count - 4).collect();
        format!("{}{}", "*".repeat(count - 4), tail)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn complete() -> CredentialSet {
        CredentialSet {
            azure_openai_api_key: "sk-test-1234".to_string(),
            azure_openai_endpoint: "https://example.openai.azure.com".to_string(),
            azure_openai_deployment_name: "gpt-4o".to_string(),
            azure_openai_api_version: "2024-02-01".to_string(),
        }
    }

    #[test]
    fn test_save_and_load() {
        let temp = tempfile::tempdir().unwrap();
        let path = temp.path().join("nested").join("creds.json");

        complete().save(&path).unwrap();
        let loaded = CredentialSet::load_file(&path).unwrap().unwrap();
        assert_eq!(loaded, complete());

        let raw: serde_json::Value =
            serde_json::from_str(&fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(raw["azure_openai_deployment_name"], "gpt-4o");
    }

    #[cfg(unix)]
    #[test]
    fn test_saved_file_is_owner_only() {
        use std::os::unix::fs::PermissionsExt;
        let temp = tempfile::tempdir().unwrap();
        let path = temp.path().join("creds.json");
        fs::write(&path, "{}").unwrap();
        fs::set_permissions(&path, fs::Permissions::from_mode(0o644)).unwrap();

        complete().save(&path).unwrap();
        let mode = fs::metadata(&path).unwrap().permissions().mode();
        assert_eq!(mode & 0o777, 0o600);
    }

    #[test]
    fn test_missing_file_is_none() {
        let temp = tempfile::tempdir().unwrap();
        assert!(CredentialSet::load_file(&temp.path().join("absent.json"))
            .unwrap()
            .is_none());
    }

    #[test]
    fn test_malformed_file_is_an_error() {
        let temp = tempfile::tempdir().unwrap();
        let path = temp.path().join("creds.json");
        fs::write(&path, "not json").unwrap();
        assert!(matches!(
            CredentialSet::load_file(&path),
            Err(CredentialsError::Parse { .. })
        ));
    }

    #[test]
    fn test_environment_overrides_file_values() {
        let env: HashMap<&str, &str> = [
            (ENDPOINT_ENV, "https://override.openai.azure.com"),
            (API_KEY_ENV, "  "),
        ]
        .into_iter()
        .collect();

        let merged = complete().with_overrides(|name| env.get(name).map(|v| v.to_string()));
        assert_eq!(merged.azure_openai_endpoint, "https://override.openai.azure.com");
        assert_eq!(merged.azure_openai_api_key, "sk-test-1234");
    }

    #[test]
    fn test_missing_fields_point_to_setup() {
        let partial = CredentialSet {
            azure_openai_endpoint: "https://example.openai.azure.com".to_string(),
            ..Default::default()
        }
        .with_overrides(|_| None);

        assert_eq!(partial.azure_openai_api_version, DEFAULT_API_VERSION);
        let err = partial.validate().unwrap_err();
        let message = err.to_string();
        assert!(message.contains("azure_openai_api_key"));
        assert!(message.contains("azure_openai_deployment_name"));
        assert!(message.contains("chef-ai setup"));
    }

    #[test]
    fn test_key_is_masked() {
        assert_eq!(complete().masked_key(), "********1234");
        assert!(!format!("{:?}", complete()).contains("sk-test"));
    }
}
