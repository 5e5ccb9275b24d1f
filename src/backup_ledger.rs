//! Hash ledger for migration backups
//!
//! Written into the backup directory after an in-place migration so that the
//! originals can be matched against what replaced them.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

pub const LEDGER_FILE: &str = "ledger.json";

/// Tracks a single migrated file
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedgerEntry {
    /// Hash of the content before migration
    pub original_hash: String,
    /// Hash of the content written in its place
    pub migrated_hash: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct BackupLedger {
    pub from_version: String,
    pub to_version: String,
    pub timestamp: String,
    /// relative path -> hashes
    files: BTreeMap<String, LedgerEntry>,
}

impl BackupLedger {
    pub fn new(from_version: &str, to_version: &str) -> Self {
        Self {
            from_version: from_version.to_string(),
            to_version: to_version.to_string(),
            timestamp: chrono::Utc::now().to_rfc3339(),
            files: BTreeMap::new(),
        }
    }

    /// Load the ledger stored in a backup directory
    pub fn load(backup_dir: &Path) -> Result<Self> {
        let path = backup_dir.join(LEDGER_FILE);
        let content = fs::read_to_string(&path)
            .with_context(|| format!("Failed to read backup ledger {}", path.display()))?;
        serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse backup ledger {}", path.display()))
    }

    /// Save the ledger into the backup directory, returning the file path
    pub fn save(&self, backup_dir: &Path) -> Result<PathBuf> {
        fs::create_dir_all(backup_dir).with_context(|| {
            format!("Failed to create backup directory {}", backup_dir.display())
        })?;

        let path = backup_dir.join(LEDGER_FILE);
        let content =
            serde_json::to_string_pretty(self).context("Failed to serialize backup ledger")?;
        fs::write(&path, content)
            .with_context(|| format!("Failed to write backup ledger {}", path.display()))?;

        Ok(path)
    }

    /// Record a migrated file
    pub fn record(&mut self, relative_path: &str, original: &str, migrated: &str) {
        self.files.insert(
            relative_path.to_string(),
            LedgerEntry {
                original_hash: hash_content(original.as_bytes()),
                migrated_hash: hash_content(migrated.as_bytes()),
            },
        );
    }

    pub fn get(&self, relative_path: &str) -> Option<&LedgerEntry> {
        self.files.get(relative_path)
    }

    pub fn len(&self) -> usize {
        self.files.len()
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }

    /// Whether the file on disk still holds the migrated content
    pub fn is_untouched_since(&self, relative_path: &str, path: &Path) -> Result<bool> {
        let Some(entry) = self.files.get(relative_path) else {
            return Ok(false);
        };
        Ok(hash_file(path)? == entry.migrated_hash)
    }

    pub fn summary(&self) -> String {
        let mut lines = vec![format!(
            "Migration {} -> {} ({})",
            self.from_version, self.to_version, self.timestamp
        )];
        for (path, entry) in &self.files {
            lines.push(format!(
                "  {} {} -> {}",
                path,
                &entry.original_hash[..12],
                &entry.migrated_hash[..12]
            ));
        }
        if self.files.is_empty() {
            lines.push("  No files migrated".to_string());
        }
        lines.join("\n")
    }
}

/// Compute SHA256 hash of some content
pub fn hash_content(content: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(content);
    hex::encode(hasher.finalize())
}

/// Compute SHA256 hash of a file
pub fn hash_file(path: &Path) -> Result<String> {
    let content =
        fs::read(path).with_context(|| format!("Failed to read file: {}", path.display()))?;
    Ok(hash_content(&content))
}
