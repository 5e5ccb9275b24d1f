use serde_json::{Map, Value};
use std::fmt;

/// A parsed but not yet normalized manifest candidate. Values may still be
/// nested mappings, arrays, or non-string scalars.
pub type ManifestLike = Map<String, Value>;

/// The parse strategy that produced a manifest candidate
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExtractionStrategy {
    /// Input was already a parsed mapping
    Passthrough,
    /// Fenced block tagged `json`
    TaggedBlock,
    /// Untagged fenced block holding an object
    FencedBlock,
    /// The whole response parsed directly
    WholeText,
    /// Brace-counting scan from the first `{` outside a fence
    BraceBalanced,
    /// Greedy `{.*}` match over the whole text
    GreedyRegex,
    /// `"key": "value"` pairs recovered one by one
    KeyValueScan,
}

impl fmt::Display for ExtractionStrategy {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let name = match self {
            ExtractionStrategy::Passthrough => "passthrough",
            ExtractionStrategy::TaggedBlock => "tagged-block",
            ExtractionStrategy::FencedBlock => "fenced-block",
            ExtractionStrategy::WholeText => "whole-text",
            ExtractionStrategy::BraceBalanced => "brace-balanced",
            ExtractionStrategy::GreedyRegex => "greedy-regex",
            ExtractionStrategy::KeyValueScan => "key-value-scan",
        };
        write!(f, "{}", name)
    }
}

/// Result of splitting a model response into prose and a manifest candidate.
///
/// Produced once per response and consumed immediately by the normalizer.
#[derive(Debug, Clone, PartialEq)]
pub struct RawExtraction {
    pub explanation: String,
    pub manifest: Option<ManifestLike>,
    pub strategy: Option<ExtractionStrategy>,
}

impl RawExtraction {
    /// An extraction where no strategy succeeded; the explanation is the raw text
    pub fn failed(raw_text: &str) -> Self {
        Self {
            explanation: raw_text.to_string(),
            manifest: None,
            strategy: None,
        }
    }

    pub fn is_success(&self) -> bool {
        self.manifest.is_some()
    }
}
