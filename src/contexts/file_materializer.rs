use crate::data::{is_directory_path, Manifest};
use std::fmt;
use std::fs;
use std::io;
use std::path::{Component, Path, PathBuf};
use tracing::{debug, warn};

/// Errors that stop materialization before any entry is attempted
#[derive(Debug)]
pub enum MaterializeError {
    OutputRoot { path: PathBuf, reason: String },
}

impl fmt::Display for MaterializeError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            MaterializeError::OutputRoot { path, reason } => {
                write!(f, "Cannot prepare output directory {}: {}", path.display(), reason)
            }
        }
    }
}

impl std::error::Error for MaterializeError {}

/// Outcome of writing a manifest
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MaterializeReport {
    /// Entries written or created successfully
    pub created: usize,
    pub total: usize,
    /// Relative paths whose previous content was copied to the backup directory
    pub backed_up: Vec<String>,
    /// (relative path, reason) for every entry that failed
    pub errors: Vec<(String, String)>,
}

impl MaterializeReport {
    pub fn is_complete(&self) -> bool {
        self.errors.is_empty() && self.created == self.total
    }
}

/// Writes manifests below a fixed output root
///
/// Entries are attempted independently; a failure is recorded and the next
/// entry is still tried. No entry may resolve outside the root.
#[derive(Debug, Clone)]
pub struct FileMaterializer {
    output_root: PathBuf,
    backup_dir: Option<PathBuf>,
}

impl FileMaterializer {
    pub fn new(output_root: impl Into<PathBuf>) -> Self {
        Self {
            output_root: output_root.into(),
            backup_dir: None,
        }
    }

    /// Copies any existing file into `backup_dir` (same relative path)
    /// before overwriting it.
    pub fn with_backup_dir(mut self, backup_dir: impl Into<PathBuf>) -> Self {
        self.backup_dir = Some(backup_dir.into());
        self
    }

    pub fn output_root(&self) -> &Path {
        &self.output_root
    }

    /// Writes every manifest entry in iteration order
    pub fn materialize(&self, manifest: &Manifest) -> Result<MaterializeReport, MaterializeError> {
        fs::create_dir_all(&self.output_root).map_err(|e| MaterializeError::OutputRoot {
            path: self.output_root.clone(),
            reason: e.to_string(),
        })?;
        let root = self
            .output_root
            .canonicalize()
            .map_err(|e| MaterializeError::OutputRoot {
                path: self.output_root.clone(),
                reason: e.to_string(),
            })?;

        let mut report = MaterializeReport {
            total: manifest.len(),
            ..Default::default()
        };

        for (path, content) in manifest.iter() {
            let outcome = if is_directory_path(path) {
                self.create_directory(&root, path)
            } else {
                self.write_file(&root, path, content, &mut report.backed_up)
            };

            match outcome {
                Ok(()) => {
                    debug!("materialized {}", path);
                    report.created += 1;
                }
                Err(reason) => {
                    warn!("failed to materialize {}: {}", path, reason);
                    report.errors.push((path.to_string(), reason));
                }
            }
        }

        Ok(report)
    }

    fn create_directory(&self, root: &Path, path: &str) -> Result<(), String> {
        let relative = safe_relative_path(path)?;
        create_dirs_within(root, &relative).map(|_| ())
    }

    fn write_file(
        &self,
        root: &Path,
        path: &str,
        content: &str,
        backed_up: &mut Vec<String>,
    ) -> Result<(), String> {
        let relative = safe_relative_path(path)?;
        let parent = match relative.parent() {
            Some(parent) => create_dirs_within(root, parent)?,
            None => root.to_path_buf(),
        };
        let target = match relative.file_name() {
            Some(name) => parent.join(name),
            None => return Err(format!("not a file path: {}", path)),
        };
        if target.is_symlink() {
            return Err("refusing to write through a symbolic link".to_string());
        }

        if let Some(backup_dir) = &self.backup_dir {
            if target.is_file() {
                let backup = backup_dir.join(&relative);
                if let Some(parent) = backup.parent() {
                    fs::create_dir_all(parent)
                        .map_err(|e| format!("cannot create backup directory: {}", e))?;
                }
                fs::copy(&target, &backup).map_err(|e| format!("backup failed: {}", e))?;
                backed_up.push(path.to_string());
            }
        }

        fs::write(&target, content).map_err(|e| e.to_string())
    }
}

/// Validates a manifest path as a plain relative path
///
/// Absolute paths, drive prefixes and `..` segments are rejected; `.`
/// segments are dropped.
pub fn safe_relative_path(path: &str) -> Result<PathBuf, String> {
    let mut relative = PathBuf::new();
    for component in Path::new(path).components() {
        match component {
            Component::Normal(segment) => relative.push(segment),
            Component::CurDir => {}
            Component::ParentDir => {
                return Err(format!("path escapes the output directory: {}", path));
            }
            Component::RootDir | Component::Prefix(_) => {
                return Err(format!("absolute paths are not allowed: {}", path));
            }
        }
    }
    if relative.as_os_str().is_empty() {
        return Err(format!("empty path: {:?}", path));
    }
    Ok(relative)
}

/// Creates `relative` below the canonical `root` one component at a time
///
/// Each existing component is checked before anything below it is created:
/// a symbolic link must resolve inside the root and a regular file stops the
/// walk. Returns the directory path below the root.
fn create_dirs_within(root: &Path, relative: &Path) -> Result<PathBuf, String> {
    let mut current = root.to_path_buf();
    for component in relative.components() {
        current.push(component);
        match fs::symlink_metadata(&current) {
            Ok(meta) if meta.file_type().is_symlink() => {
                let resolved = current.canonicalize().map_err(|e| e.to_string())?;
                if !resolved.starts_with(root) {
                    return Err(format!(
                        "{} resolves outside the output directory",
                        current.display()
                    ));
                }
                if !resolved.is_dir() {
                    return Err(format!("{} is not a directory", current.display()));
                }
            }
            Ok(meta) if meta.is_dir() => {}
            Ok(_) => return Err(format!("{} is not a directory", current.display())),
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                fs::create_dir(&current)
                    .map_err(|e| format!("cannot create {}: {}", current.display(), e))?;
            }
            Err(e) => return Err(format!("cannot inspect {}: {}", current.display(), e)),
        }
    }
    Ok(current)
}
