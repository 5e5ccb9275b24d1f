/// Presentational summary of a manifest, recomputed on every run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileTypeSummary {
    /// Label -> count, in first-seen order
    pub file_types: Vec<(String, usize)>,
    pub primary_purpose: String,
    /// At least one file entry carries content
    pub has_real_files: bool,
}

impl FileTypeSummary {
    pub fn count(&self, label: &str) -> usize {
        self.file_types
            .iter()
            .find(|(l, _)| l == label)
            .map(|(_, c)| *c)
            .unwrap_or(0)
    }
}
