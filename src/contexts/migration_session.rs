//! Scan and apply phases of a Chef version migration.
//!
//! A session moves through `Configured -> Scanning -> Analyzed`; from
//! `Analyzed` with issues it either stops at `ScanOnly` or applies the
//! migrated code, passing through `BackupCreated` when files are rewritten
//! in place and ending at `FilesWritten`.

use crate::backup_ledger::BackupLedger;
use crate::client::ChatClient;
use crate::contexts::assistant_runner::{AssistantRunner, AssistantRunnerError, PromptRegistry};
use crate::contexts::code_migration_extractor::{
    CodeMigrationExtractor, MigrationExtractorOptions, MigrationStrategy,
};
use crate::contexts::file_materializer::{FileMaterializer, MaterializeError};
use crate::data::{Manifest, MigrationAnalysisResult};
use crate::settings::Settings;
use serde::Serialize;
use std::fmt;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

pub const BACKUP_DIR_PREFIX: &str = ".chef_ai_backup_";

#[derive(Debug)]
pub enum MigrationError {
    Discovery { path: PathBuf, reason: String },
    InvalidTransition { state: &'static str, action: &'static str },
    Backup { path: PathBuf, reason: String },
    Materialize(MaterializeError),
    Ledger(String),
}

impl fmt::Display for MigrationError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            MigrationError::Discovery { path, reason } => {
                write!(f, "Cannot read {}: {}", path.display(), reason)
            }
            MigrationError::InvalidTransition { state, action } => {
                write!(f, "Cannot {} while the migration is {}", action, state)
            }
            MigrationError::Backup { path, reason } => {
                write!(f, "Failed to create backup directory {}: {}", path.display(), reason)
            }
            MigrationError::Materialize(e) => write!(f, "{}", e),
            MigrationError::Ledger(details) => {
                write!(f, "Failed to write backup ledger: {}", details)
            }
        }
    }
}

impl std::error::Error for MigrationError {}

impl From<MaterializeError> for MigrationError {
    fn from(e: MaterializeError) -> Self {
        MigrationError::Materialize(e)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MigrationState {
    Configured,
    Scanning,
    Analyzed { issues: usize },
    ScanOnly,
    BackupCreated { backup_dir: PathBuf },
    FilesWritten { written: usize, total: usize },
}

impl MigrationState {
    pub fn name(&self) -> &'static str {
        match self {
            MigrationState::Configured => "configured",
            MigrationState::Scanning => "scanning",
            MigrationState::Analyzed { .. } => "analyzed",
            MigrationState::ScanOnly => "finished (scan only)",
            MigrationState::BackupCreated { .. } => "backed up",
            MigrationState::FilesWritten { .. } => "finished",
        }
    }
}

/// What to migrate and how to recognize a file that needs it
#[derive(Debug, Clone)]
pub struct MigrationOptions {
    pub from_version: String,
    pub to_version: String,
    /// Extensions (without the dot) picked up when scanning a directory
    pub extensions: Vec<String>,
    pub extractor: MigrationExtractorOptions,
}

impl MigrationOptions {
    pub fn from_settings(from_version: &str, to_version: &str, settings: &Settings) -> Self {
        Self {
            from_version: from_version.to_string(),
            to_version: to_version.to_string(),
            extensions: settings.migrate_extensions.clone(),
            extractor: settings.migration_extractor_options(),
        }
    }
}

/// Prompt input for analyzing one file
#[derive(Debug, Clone, Serialize)]
pub struct AnalysisRequest<'a> {
    pub file_path: &'a str,
    pub content: &'a str,
    pub from_version: &'a str,
    pub to_version: &'a str,
}

/// Produces the analysis text for one file
pub trait MigrationAnalyzer {
    fn analyze(&mut self, request: &AnalysisRequest<'_>) -> Result<String, AssistantRunnerError>;
}

impl<F> MigrationAnalyzer for F
where
    F: FnMut(&AnalysisRequest<'_>) -> Result<String, AssistantRunnerError>,
{
    fn analyze(&mut self, request: &AnalysisRequest<'_>) -> Result<String, AssistantRunnerError> {
        self(request)
    }
}

impl<R, C> MigrationAnalyzer for AssistantRunner<'_, R, C>
where
    R: PromptRegistry,
    C: ChatClient,
{
    fn analyze(&mut self, request: &AnalysisRequest<'_>) -> Result<String, AssistantRunnerError> {
        let result = self.run(request)?;
        if result.truncated {
            warn!("analysis of {} was truncated", request.file_path);
        }
        Ok(result.output)
    }
}

/// Scan progress notifications
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScanProgress<'a> {
    Started { file: &'a str, index: usize, total: usize },
    Finished { file: &'a str, success: bool },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScanSummary {
    pub total: usize,
    pub analyzed: usize,
    pub failed: usize,
    pub issues: usize,
    pub duration: Duration,
}

/// One file's planned replacement
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlannedChange {
    pub relative_path: String,
    pub migrated_content: String,
    pub strategy: MigrationStrategy,
    pub changed: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ApplyReport {
    pub written: usize,
    pub total: usize,
    /// Flagged files whose migrated content equals the original
    pub unchanged: Vec<String>,
    pub errors: Vec<(String, String)>,
    pub backup_dir: Option<PathBuf>,
    pub ledger_path: Option<PathBuf>,
}

pub struct MigrationSession {
    target: PathBuf,
    root: PathBuf,
    options: MigrationOptions,
    extractor: CodeMigrationExtractor,
    state: MigrationState,
    results: Vec<MigrationAnalysisResult>,
    failures: Vec<(String, String)>,
}

impl MigrationSession {
    /// Creates a session for a file or directory
    pub fn new(target: impl Into<PathBuf>, options: MigrationOptions) -> Self {
        let target = target.into();
        let root = if target.is_file() {
            match target.parent() {
                Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
                _ => PathBuf::from("."),
            }
        } else {
            target.clone()
        };
        let extractor = CodeMigrationExtractor::new(options.extractor.clone());

        Self {
            target,
            root,
            options,
            extractor,
            state: MigrationState::Configured,
            results: Vec::new(),
            failures: Vec::new(),
        }
    }

    pub fn state(&self) -> &MigrationState {
        &self.state
    }

    /// Directory that relative paths and backups are anchored to
    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn options(&self) -> &MigrationOptions {
        &self.options
    }

    pub fn results(&self) -> &[MigrationAnalysisResult] {
        &self.results
    }

    pub fn issues(&self) -> impl Iterator<Item = &MigrationAnalysisResult> {
        self.results.iter().filter(|r| r.has_issues)
    }

    /// (relative path, reason) for files whose analysis failed
    pub fn failures(&self) -> &[(String, String)] {
        &self.failures
    }

    /// Files to analyze, sorted
    ///
    /// A file target is taken as is. Directories are walked recursively,
    /// skipping hidden entries and keeping the configured extensions.
    pub fn discover(&self) -> Result<Vec<PathBuf>, MigrationError> {
        let discovery_err = |e: io::Error| MigrationError::Discovery {
            path: self.target.clone(),
            reason: e.to_string(),
        };

        if self.target.is_file() {
            return Ok(vec![self.target.clone()]);
        }
        if !self.target.is_dir() {
            return Err(discovery_err(io::Error::new(
                io::ErrorKind::NotFound,
                "no such file or directory",
            )));
        }

        let mut files = Vec::new();
        collect_files(&self.target, &self.options.extensions, &mut files).map_err(discovery_err)?;
        Ok(files)
    }

    /// Analyzes every discovered file
    ///
    /// A file that cannot be read or analyzed is recorded in `failures` and
    /// left out of the results.
    pub fn scan<A: MigrationAnalyzer>(
        &mut self,
        analyzer: &mut A,
        mut on_progress: impl FnMut(ScanProgress<'_>),
    ) -> Result<ScanSummary, MigrationError> {
        self.expect_state(matches!(self.state, MigrationState::Configured), "scan")?;
        let files = self.discover()?;
        self.state = MigrationState::Scanning;

        let started = Instant::now();
        let total = files.len();
        info!("scanning {} file(s) under {}", total, self.root.display());

        for (index, path) in files.into_iter().enumerate() {
            let relative = relative_path(&self.root, &path);
            on_progress(ScanProgress::Started {
                file: &relative,
                index: index + 1,
                total,
            });

            let outcome = fs::read_to_string(&path)
                .map_err(|e| e.to_string())
                .and_then(|content| {
                    let request = AnalysisRequest {
                        file_path: &relative,
                        content: &content,
                        from_version: &self.options.from_version,
                        to_version: &self.options.to_version,
                    };
                    let analysis = analyzer.analyze(&request).map_err(|e| e.to_string())?;
                    Ok((content, analysis))
                });

            match outcome {
                Ok((content, analysis)) => {
                    let result = MigrationAnalysisResult::new(
                        path,
                        relative.clone(),
                        content,
                        analysis,
                        &self.options.extractor.issue_markers,
                    );
                    debug!("{}: has_issues={}", relative, result.has_issues);
                    self.results.push(result);
                    on_progress(ScanProgress::Finished {
                        file: &relative,
                        success: true,
                    });
                }
                Err(reason) => {
                    warn!("analysis of {} failed: {}", relative, reason);
                    on_progress(ScanProgress::Finished {
                        file: &relative,
                        success: false,
                    });
                    self.failures.push((relative, reason));
                }
            }
        }

        let issues = self.issues().count();
        self.state = MigrationState::Analyzed { issues };

        Ok(ScanSummary {
            total,
            analyzed: self.results.len(),
            failed: self.failures.len(),
            issues,
            duration: started.elapsed(),
        })
    }

    /// Ends the session after reporting, without writing anything
    pub fn finish_scan_only(&mut self) -> Result<(), MigrationError> {
        self.expect_state(self.has_pending_issues(), "finish a scan-only run")?;
        self.state = MigrationState::ScanOnly;
        Ok(())
    }

    /// Migrated content for every flagged file
    pub fn plan(&self) -> Vec<PlannedChange> {
        self.issues()
            .map(|result| {
                let extraction = self
                    .extractor
                    .extract(&result.ai_analysis_text, &result.original_content);
                PlannedChange {
                    relative_path: result.relative_path.clone(),
                    changed: extraction.code != result.original_content,
                    migrated_content: extraction.code,
                    strategy: extraction.strategy,
                }
            })
            .collect()
    }

    /// Writes migrated files
    ///
    /// With `output` the files go to that directory and the originals are
    /// untouched. Without it they are rewritten in place after the originals
    /// are copied to a timestamped backup directory under the root.
    pub fn apply(&mut self, output: Option<&Path>) -> Result<ApplyReport, MigrationError> {
        self.expect_state(self.has_pending_issues(), "apply changes")?;

        let mut report = ApplyReport::default();
        let mut manifest = Manifest::new();
        for change in self.plan() {
            if change.changed {
                debug!("{} migrated via {}", change.relative_path, change.strategy);
                manifest.insert(change.relative_path, change.migrated_content);
            } else {
                report.unchanged.push(change.relative_path);
            }
        }
        report.total = manifest.len();

        if manifest.is_empty() {
            self.state = MigrationState::FilesWritten {
                written: 0,
                total: 0,
            };
            return Ok(report);
        }

        let materializer = match output {
            Some(dir) => FileMaterializer::new(dir),
            None => {
                let backup_dir = self.create_backup_dir()?;
                self.state = MigrationState::BackupCreated {
                    backup_dir: backup_dir.clone(),
                };
                report.backup_dir = Some(backup_dir.clone());
                FileMaterializer::new(&self.root).with_backup_dir(backup_dir)
            }
        };

        let written = materializer.materialize(&manifest)?;
        report.written = written.created;
        report.errors = written.errors;

        if let Some(backup_dir) = &report.backup_dir {
            let mut ledger =
                BackupLedger::new(&self.options.from_version, &self.options.to_version);
            for result in self.issues() {
                let failed = report.errors.iter().any(|(p, _)| *p == result.relative_path);
                if let Some(migrated) = manifest.get(&result.relative_path).filter(|_| !failed) {
                    ledger.record(&result.relative_path, &result.original_content, migrated);
                }
            }
            let path = ledger
                .save(backup_dir)
                .map_err(|e| MigrationError::Ledger(format!("{:#}", e)))?;
            report.ledger_path = Some(path);
        }

        self.state = MigrationState::FilesWritten {
            written: report.written,
            total: report.total,
        };
        Ok(report)
    }

    fn has_pending_issues(&self) -> bool {
        matches!(self.state, MigrationState::Analyzed { issues } if issues > 0)
    }

    fn expect_state(&self, allowed: bool, action: &'static str) -> Result<(), MigrationError> {
        if allowed {
            Ok(())
        } else {
            Err(MigrationError::InvalidTransition {
                state: self.state.name(),
                action,
            })
        }
    }

    fn create_backup_dir(&self) -> Result<PathBuf, MigrationError> {
        let stamp = chrono::Local::now().format("%Y%m%d_%H%M%S").to_string();
        let mut backup_dir = self.root.join(format!("{}{}", BACKUP_DIR_PREFIX, stamp));
        let mut attempt = 1;
        while backup_dir.exists() {
            backup_dir = self
                .root
                .join(format!("{}{}_{}", BACKUP_DIR_PREFIX, stamp, attempt));
            attempt += 1;
        }

        fs::create_dir_all(&backup_dir).map_err(|e| MigrationError::Backup {
            path: backup_dir.clone(),
            reason: e.to_string(),
        })?;
        info!("backing up originals to {}", backup_dir.display());
        Ok(backup_dir)
    }
}

fn collect_files(dir: &Path, extensions: &[String], files: &mut Vec<PathBuf>) -> io::Result<()> {
    let mut entries = fs::read_dir(dir)?.collect::<io::Result<Vec<_>>>()?;
    entries.sort_by_key(|entry| entry.file_name());

    for entry in entries {
        if entry.file_name().to_string_lossy().starts_with('.') {
            continue;
        }
        let path = entry.path();
        let file_type = entry.file_type()?;
        if file_type.is_dir() {
            collect_files(&path, extensions, files)?;
        } else if file_type.is_file() && has_extension(&path, extensions) {
            files.push(path);
        }
    }
    Ok(())
}

fn has_extension(path: &Path, extensions: &[String]) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| {
            extensions
                .iter()
                .any(|wanted| wanted.trim_start_matches('.').eq_ignore_ascii_case(ext))
        })
}

fn relative_path(root: &Path, path: &Path) -> String {
    let relative = path.strip_prefix(root).unwrap_or(path);
    relative
        .components()
        .map(|c| c.as_os_str().to_string_lossy().into_owned())
        .collect::<Vec<_>>()
        .join("/")
}
