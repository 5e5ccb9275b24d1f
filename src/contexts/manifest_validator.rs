//! Heuristics over a normalized manifest: file type histogram, a guess at
//! what was generated, and detection of directory-only output.

use crate::data::{is_directory_path, FileTypeSummary, Manifest};

/// Ecosystem name used in purpose labels
pub const ECOSYSTEM: &str = "Chef";

pub const LABEL_DIRECTORY: &str = "Directory";
pub const LABEL_RECIPE: &str = "Recipe";
pub const LABEL_METADATA: &str = "Cookbook Metadata";
pub const LABEL_TEST: &str = "Test/Spec";
pub const LABEL_DOCUMENTATION: &str = "Documentation";
pub const LABEL_OTHER: &str = "Other";

/// Extension -> label for source types that get a language-specific name
const SOURCE_LABELS: &[(&str, &str)] = &[
    ("erb", "Template"),
    ("sh", "Shell Script"),
    ("bash", "Shell Script"),
    ("ps1", "PowerShell Script"),
    ("py", "Python Script"),
];

const DOC_EXTENSIONS: &[&str] = &["md", "markdown", "rdoc", "txt"];

/// Summarizes a manifest for display and pre-flight checks
pub fn summarize(manifest: &Manifest) -> FileTypeSummary {
    let mut file_types: Vec<(String, usize)> = Vec::new();
    for path in manifest.paths() {
        let label = label_for(path);
        match file_types.iter_mut().find(|(l, _)| *l == label) {
            Some(entry) => entry.1 += 1,
            None => file_types.push((label, 1)),
        }
    }

    let has_real_files = manifest
        .iter()
        .any(|(path, content)| !is_directory_path(path) && !content.is_empty());

    let primary_purpose = primary_purpose(&file_types);

    FileTypeSummary {
        file_types,
        primary_purpose,
        has_real_files,
    }
}

/// Labels a path by pattern precedence
pub fn label_for(path: &str) -> String {
    if is_directory_path(path) {
        return LABEL_DIRECTORY.to_string();
    }

    let lower = path.to_ascii_lowercase();
    let file_name = lower.rsplit('/').next().unwrap_or(&lower);
    let extension = file_name
        .rsplit_once('.')
        .map(|(stem, ext)| if stem.is_empty() { "" } else { ext })
        .unwrap_or("");

    if lower.contains("recipe") || lower.split('/').any(|seg| seg == "recipes") {
        return LABEL_RECIPE.to_string();
    }
    if let Some((_, label)) = SOURCE_LABELS.iter().find(|(ext, _)| *ext == extension) {
        return label.to_string();
    }
    if file_name.starts_with("metadata.") || file_name == "metadata" {
        return LABEL_METADATA.to_string();
    }
    if lower.contains("test") || lower.contains("spec") {
        return LABEL_TEST.to_string();
    }
    if DOC_EXTENSIONS.contains(&extension) {
        return LABEL_DOCUMENTATION.to_string();
    }
    if !extension.is_empty() {
        return format!("{} File", extension.to_ascii_uppercase());
    }
    LABEL_OTHER.to_string()
}

fn primary_purpose(file_types: &[(String, usize)]) -> String {
    let has = |label: &str| file_types.iter().any(|(l, c)| l == label && *c > 0);
    if has(LABEL_RECIPE) {
        return format!("{} recipe", ECOSYSTEM);
    }
    if has(LABEL_METADATA) {
        return format!("{} cookbook", ECOSYSTEM);
    }

    // Ties keep the label seen first.
    let mut best: Option<&(String, usize)> = None;
    for entry in file_types.iter().filter(|(l, _)| l != LABEL_DIRECTORY) {
        if best.is_none_or(|b| entry.1 > b.1) {
            best = Some(entry);
        }
    }

    match best {
        Some((label, _)) => pluralize(label),
        None => "Directory structure".to_string(),
    }
}

fn pluralize(label: &str) -> String {
    match label {
        LABEL_TEST => "Tests/Specs".to_string(),
        LABEL_DOCUMENTATION => "Documentation".to_string(),
        LABEL_OTHER => "Other files".to_string(),
        l if l.ends_with('s') => l.to_string(),
        l => format!("{}s", l),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn manifest(entries: &[(&str, &str)]) -> Manifest {
        entries.iter().map(|(p, c)| (*p, *c)).collect()
    }

    #[test]
    fn test_labels_follow_precedence() {
        assert_eq!(label_for("recipes/"), LABEL_DIRECTORY);
        assert_eq!(label_for("recipes/default.rb"), LABEL_RECIPE);
        assert_eq!(label_for("templates/recipe_motd.erb"), LABEL_RECIPE);
        assert_eq!(label_for("templates/default/motd.erb"), "Template");
        assert_eq!(label_for("files/bootstrap.sh"), "Shell Script");
        assert_eq!(label_for("metadata.rb"), LABEL_METADATA);
        assert_eq!(label_for("metadata.json"), LABEL_METADATA);
        assert_eq!(label_for("spec/unit/default_spec.rb"), LABEL_TEST);
        assert_eq!(label_for("test/integration/default_test.rb"), LABEL_TEST);
        assert_eq!(label_for("README.md"), LABEL_DOCUMENTATION);
        assert_eq!(label_for("attributes/default.rb"), "RB File");
        assert_eq!(label_for("Berksfile"), LABEL_OTHER);
        assert_eq!(label_for(".kitchen.yml"), "YML File");
    }

    #[test]
    fn test_recipe_wins_primary_purpose() {
        let m = manifest(&[
            ("metadata.rb", "name 'x'"),
            ("recipes/", ""),
            ("recipes/default.rb", "package 'nginx'"),
        ]);
        let summary = summarize(&m);
        assert!(summary.has_real_files);
        assert_eq!(summary.primary_purpose, "Chef recipe");
        assert_eq!(summary.count(LABEL_DIRECTORY), 1);
        assert_eq!(summary.count(LABEL_RECIPE), 1);
        assert_eq!(summary.count(LABEL_METADATA), 1);
    }

    #[test]
    fn test_metadata_means_cookbook() {
        let m = manifest(&[("metadata.rb", "name 'x'"), ("README.md", "# x")]);
        assert_eq!(summarize(&m).primary_purpose, "Chef cookbook");
    }

    #[test]
    fn test_most_frequent_label_is_pluralized() {
        let m = manifest(&[
            ("files/a.sh", "echo a"),
            ("files/b.sh", "echo b"),
            ("README.md", "docs"),
        ]);
        assert_eq!(summarize(&m).primary_purpose, "Shell Scripts");
    }

    #[test]
    fn test_directory_only_manifest_has_no_real_files() {
        let m = manifest(&[("cookbook/", ""), ("cookbook/recipes/", "")]);
        let summary = summarize(&m);
        assert!(!summary.has_real_files);
        assert_eq!(summary.primary_purpose, "Directory structure");
    }

    #[test]
    fn test_empty_files_do_not_count_as_real() {
        let m = manifest(&[("recipes/", ""), ("recipes/default.rb", "")]);
        assert!(!summarize(&m).has_real_files);
    }
}
