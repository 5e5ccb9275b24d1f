//! Turns a model's prose-and-code analysis of one source file into the
//! content that should be written back for that file.
//!
//! The result is never empty when an original is supplied: every path that
//! cannot produce a trustworthy replacement falls back to the original,
//! optionally with literal "replace A with B" edits applied.

use super::response_extractor::fenced_blocks;
use regex::Regex;
use std::fmt;
use std::sync::OnceLock;
use tracing::debug;

/// Phrases that mean the model found nothing to change
const NO_CHANGE_PHRASES: &[&str] = &[
    "no issues found",
    "no issues were found",
    "no changes needed",
    "no changes are needed",
    "no changes required",
    "no changes are required",
    "no migration needed",
    "no modifications needed",
    "already compatible",
    "fully compatible",
];

/// Tunables for migrated-code extraction
#[derive(Debug, Clone)]
pub struct MigrationExtractorOptions {
    /// Candidates shorter than this fraction of the original are discarded
    pub min_length_ratio: f64,
    /// Minimum length for an unfenced `def ... end` style match
    pub min_unfenced_block_len: usize,
    pub issue_markers: Vec<String>,
    /// Fence tags that mark the source language
    pub language_tags: Vec<String>,
}

impl Default for MigrationExtractorOptions {
    fn default() -> Self {
        Self {
            min_length_ratio: 0.4,
            min_unfenced_block_len: 80,
            issue_markers: vec![
                "ISSUE:".to_string(),
                "WARNING:".to_string(),
                "DEPRECATED:".to_string(),
            ],
            language_tags: vec!["ruby".to_string(), "rb".to_string()],
        }
    }
}

/// Which path produced the migrated content
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MigrationStrategy {
    TaggedBlock,
    AnyBlock,
    JoinedBlocks,
    MarkedSection,
    UnfencedBlock,
    TextualPatch,
    NoIssues,
    TruncationGuard,
    OriginalFallback,
}

impl fmt::Display for MigrationStrategy {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let name = match self {
            MigrationStrategy::TaggedBlock => "tagged-block",
            MigrationStrategy::AnyBlock => "any-block",
            MigrationStrategy::JoinedBlocks => "joined-blocks",
            MigrationStrategy::MarkedSection => "marked-section",
            MigrationStrategy::UnfencedBlock => "unfenced-block",
            MigrationStrategy::TextualPatch => "textual-patch",
            MigrationStrategy::NoIssues => "no-issues",
            MigrationStrategy::TruncationGuard => "truncation-guard",
            MigrationStrategy::OriginalFallback => "original-fallback",
        };
        write!(f, "{}", name)
    }
}

/// Migrated content plus the strategy that produced it
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MigrationExtraction {
    pub code: String,
    pub strategy: MigrationStrategy,
}

/// Counts of block-opening and block-closing keywords
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct StructureProfile {
    pub openers: usize,
    pub closers: usize,
}

/// Extracts migrated code with default options
pub fn extract_migrated_code(analysis_text: &str, original_content: &str) -> String {
    CodeMigrationExtractor::default()
        .extract(analysis_text, original_content)
        .code
}

#[derive(Debug, Clone, Default)]
pub struct CodeMigrationExtractor {
    options: MigrationExtractorOptions,
}

impl CodeMigrationExtractor {
    pub fn new(options: MigrationExtractorOptions) -> Self {
        Self { options }
    }

    pub fn options(&self) -> &MigrationExtractorOptions {
        &self.options
    }

    /// Decides what content should replace `original_content`
    pub fn extract(&self, analysis_text: &str, original_content: &str) -> MigrationExtraction {
        let result = self.select(analysis_text, original_content);
        debug!(
            strategy = %result.strategy,
            candidate_len = result.code.len(),
            original_len = original_content.len(),
            "migration extraction"
        );
        result
    }

    fn select(&self, analysis: &str, original: &str) -> MigrationExtraction {
        if let Some((candidate, strategy)) = self.find_candidate(analysis, original) {
            if self.is_suspiciously_short(&candidate, original) {
                debug!(
                    "{} candidate is {} chars against {} original; keeping original",
                    strategy,
                    candidate.len(),
                    original.len()
                );
                return MigrationExtraction {
                    code: apply_replacements(original, &replace_instructions(analysis)),
                    strategy: MigrationStrategy::TruncationGuard,
                };
            }
            return MigrationExtraction {
                code: match_trailing_newline(candidate, original),
                strategy,
            };
        }

        let instructions = replace_instructions(analysis);
        if !instructions.is_empty() {
            let patched = apply_replacements(original, &instructions);
            if patched != original {
                return MigrationExtraction {
                    code: patched,
                    strategy: MigrationStrategy::TextualPatch,
                };
            }
        }

        if !self.has_issue_markers(analysis) || states_no_change(analysis) {
            return MigrationExtraction {
                code: original.to_string(),
                strategy: MigrationStrategy::NoIssues,
            };
        }

        MigrationExtraction {
            code: original.to_string(),
            strategy: MigrationStrategy::OriginalFallback,
        }
    }

    /// Steps through the replacement strategies, returning the first
    /// candidate that passes the structural completeness check.
    fn find_candidate(&self, analysis: &str, original: &str) -> Option<(String, MigrationStrategy)> {
        let blocks = fenced_blocks(analysis);
        let complete = |code: &str| !code.trim().is_empty() && is_structurally_complete(code, original);

        let tagged = blocks.iter().find(|b| {
            self.options
                .language_tags
                .iter()
                .any(|tag| b.lang.eq_ignore_ascii_case(tag))
        });
        if let Some(block) = tagged {
            let code = block.body.trim_end();
            if complete(code) {
                return Some((code.to_string(), MigrationStrategy::TaggedBlock));
            }
            debug!("tagged block looks truncated ({} chars)", code.len());
        }

        for block in &blocks {
            let code = block.body.trim_end();
            if complete(code) {
                return Some((code.to_string(), MigrationStrategy::AnyBlock));
            }
        }

        if blocks.len() > 1 {
            let joined = blocks
                .iter()
                .map(|b| b.body.trim_matches('\n').trim_end())
                .filter(|b| !b.trim().is_empty())
                .collect::<Vec<_>>()
                .join("\n\n");
            let profile = structure_profile(&joined);
            if profile.openers > 0 && profile.closers > 0 && complete(&joined) {
                return Some((joined, MigrationStrategy::JoinedBlocks));
            }
        }

        if let Some(code) = marked_section(analysis) {
            if complete(&code) {
                return Some((code, MigrationStrategy::MarkedSection));
            }
        }

        let largest = unfenced_block_re()
            .find_iter(analysis)
            .map(|m| m.as_str())
            .max_by_key(|s| s.len());
        if let Some(code) = largest {
            if code.len() > self.options.min_unfenced_block_len && complete(code) {
                return Some((code.to_string(), MigrationStrategy::UnfencedBlock));
            }
        }

        None
    }

    fn is_suspiciously_short(&self, candidate: &str, original: &str) -> bool {
        if original.is_empty() {
            return false;
        }
        (candidate.len() as f64) < self.options.min_length_ratio * original.len() as f64
    }

    fn has_issue_markers(&self, analysis: &str) -> bool {
        self.options
            .issue_markers
            .iter()
            .any(|m| analysis.contains(m.as_str()))
    }
}

/// Counts keyword-shaped lines: `module`/`class`/`def` and trailing `do`
/// open a block, `end` closes one.
pub fn structure_profile(code: &str) -> StructureProfile {
    let mut profile = StructureProfile::default();
    for line in code.lines() {
        let trimmed = line.trim();
        if trimmed.starts_with('#') {
            continue;
        }
        if opener_re().is_match(trimmed) || do_block_re().is_match(trimmed) {
            profile.openers += 1;
        }
        if closer_re().is_match(trimmed) {
            profile.closers += 1;
        }
    }
    profile
}

/// A candidate is incomplete when it lost every opener or closer the
/// original had, or opens more blocks than it closes.
pub fn is_structurally_complete(candidate: &str, original: &str) -> bool {
    let cand = structure_profile(candidate);
    if cand.openers > cand.closers {
        return false;
    }
    if original.is_empty() {
        return true;
    }
    let orig = structure_profile(original);
    if orig.openers > 0 && cand.openers == 0 {
        return false;
    }
    if orig.closers > 0 && cand.closers == 0 {
        return false;
    }
    true
}

/// Literal `(from, to)` pairs from "replace `A` with `B`" phrasing
pub fn replace_instructions(analysis: &str) -> Vec<(String, String)> {
    replace_re()
        .captures_iter(analysis)
        .filter_map(|cap| {
            let from = cap.get(1).or(cap.get(2)).or(cap.get(3))?.as_str();
            let to = cap.get(4).or(cap.get(5)).or(cap.get(6))?.as_str();
            (!from.is_empty() && from != to).then(|| (from.to_string(), to.to_string()))
        })
        .collect()
}

pub fn apply_replacements(original: &str, instructions: &[(String, String)]) -> String {
    instructions
        .iter()
        .fold(original.to_string(), |text, (from, to)| text.replace(from.as_str(), to))
}

fn states_no_change(analysis: &str) -> bool {
    let lower = analysis.to_lowercase();
    NO_CHANGE_PHRASES.iter().any(|p| lower.contains(p))
}

/// Content after an "UPDATED CODE:" style heading: the next fenced block if
/// one follows directly, else the remaining text.
fn marked_section(analysis: &str) -> Option<String> {
    let m = code_marker_re().find(analysis)?;
    let rest = analysis[m.end()..].trim_start_matches(['*', ' ', '\t']);
    let rest = rest.trim_start_matches(['\r', '\n']);

    if rest.trim_start().starts_with("```") {
        let offset = analysis.len() - rest.len();
        return fenced_blocks(analysis)
            .into_iter()
            .find(|b| b.start >= offset.saturating_sub(1))
            .map(|b| b.body.trim_end().to_string());
    }

    let text = rest.trim();
    (!text.is_empty()).then(|| text.to_string())
}

fn match_trailing_newline(mut candidate: String, original: &str) -> String {
    if original.ends_with('\n') && !candidate.ends_with('\n') {
        candidate.push('\n');
    }
    candidate
}

fn opener_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^(module|class|def)\b").expect("valid regex"))
}

fn do_block_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\bdo(\s*\|[^|]*\|)?$").expect("valid regex"))
}

fn closer_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(^end\b|;\s*end$)").expect("valid regex"))
}

fn unfenced_block_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?ms)^[ \t]*(?:module|class|def)\b.*^[ \t]*end\b[^\n]*").expect("valid regex")
    })
}

fn code_marker_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?i)\b(?:UPDATED|MIGRATED|FIXED|CORRECTED|REVISED)\s+CODE\s*:").expect("valid regex")
    })
}

fn replace_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(
            r#"(?i)replace\s+(?:`([^`]+)`|"([^"]+)"|'([^']+)')\s+with\s+(?:`([^`]*)`|"([^"]*)"|'([^']*)')"#,
        )
        .expect("valid regex")
    })
}
