use std::path::PathBuf;

/// Outcome of analyzing one source file during a migration scan.
///
/// Lives only for the duration of a run; nothing here is persisted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MigrationAnalysisResult {
    pub path: PathBuf,
    /// Path relative to the scanned root, `/`-separated
    pub relative_path: String,
    pub original_content: String,
    pub ai_analysis_text: String,
    pub has_issues: bool,
}

impl MigrationAnalysisResult {
    /// Builds a result, deciding `has_issues` by marker containment
    pub fn new(
        path: PathBuf,
        relative_path: String,
        original_content: String,
        ai_analysis_text: String,
        issue_markers: &[String],
    ) -> Self {
        let has_issues = issue_markers
            .iter()
            .any(|marker| ai_analysis_text.contains(marker.as_str()));
        Self {
            path,
            relative_path,
            original_content,
            ai_analysis_text,
            has_issues,
        }
    }
}
