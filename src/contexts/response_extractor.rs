//! Splits a free-form model response into leading prose and a structured
//! file manifest.
//!
//! Strategies are tried from most to least trustworthy; the first one that
//! yields a non-empty JSON object wins.

use crate::data::{ExtractionStrategy, ManifestLike, RawExtraction};
use regex::Regex;
use serde_json::Value;
use std::sync::OnceLock;
use tracing::debug;

/// Upper bound on `{` positions tried by the brace-balanced scan
const MAX_BRACE_CANDIDATES: usize = 32;

/// A fenced code block located by line scanning
#[derive(Debug, Clone)]
pub(crate) struct FencedBlock<'a> {
    pub(crate) lang: &'a str,
    pub(crate) body: &'a str,
    /// Byte offset of the opening fence line
    pub(crate) start: usize,
    /// Byte offset just past the closing fence line
    pub(crate) end: usize,
}

/// Extracts explanation and manifest candidate from raw response text
///
/// # Returns
/// A `RawExtraction` whose `manifest` is `None` when every strategy failed;
/// in that case `explanation` holds the raw text unchanged.
pub fn extract_response(raw_text: &str) -> RawExtraction {
    if raw_text.trim().is_empty() {
        return RawExtraction::failed(raw_text);
    }

    let blocks = fenced_blocks(raw_text);

    if let Some(found) = try_tagged_block(raw_text, &blocks) {
        return found;
    }
    if let Some(found) = try_any_fenced_block(raw_text, &blocks) {
        return found;
    }
    if let Some(map) = parse_object(raw_text.trim()) {
        return success(String::new(), map, ExtractionStrategy::WholeText);
    }
    if let Some(found) = try_brace_balanced(raw_text, &blocks) {
        return found;
    }
    if let Some(found) = try_greedy_regex(raw_text) {
        return found;
    }
    if let Some(found) = try_key_value_scan(raw_text) {
        return found;
    }

    debug!("no extraction strategy matched ({} chars)", raw_text.len());
    RawExtraction::failed(raw_text)
}

/// Accepts a response that was already decoded into JSON
///
/// Objects pass through unchanged; strings are run through
/// `extract_response`; anything else is a failed extraction.
pub fn extract_parsed(value: Value) -> RawExtraction {
    match value {
        Value::Object(map) => RawExtraction {
            explanation: String::new(),
            manifest: Some(map),
            strategy: Some(ExtractionStrategy::Passthrough),
        },
        Value::String(s) => extract_response(&s),
        Value::Null => RawExtraction::failed(""),
        other => RawExtraction::failed(&other.to_string()),
    }
}

fn success(explanation: String, map: ManifestLike, strategy: ExtractionStrategy) -> RawExtraction {
    debug!("manifest extracted via {} ({} top-level keys)", strategy, map.len());
    RawExtraction {
        explanation,
        manifest: Some(map),
        strategy: Some(strategy),
    }
}

fn try_tagged_block(text: &str, blocks: &[FencedBlock]) -> Option<RawExtraction> {
    for block in blocks.iter().filter(|b| b.lang.eq_ignore_ascii_case("json")) {
        if let Some(map) = parse_object(block.body.trim()) {
            return Some(success(
                explanation_before(text, block.start),
                map,
                ExtractionStrategy::TaggedBlock,
            ));
        }
    }
    None
}

fn try_any_fenced_block(text: &str, blocks: &[FencedBlock]) -> Option<RawExtraction> {
    for block in blocks {
        let body = block.body.trim();
        if !(body.starts_with('{') && body.ends_with('}')) {
            continue;
        }
        if let Some(map) = parse_object(body) {
            return Some(success(
                explanation_before(text, block.start),
                map,
                ExtractionStrategy::FencedBlock,
            ));
        }
    }
    None
}

fn try_brace_balanced(text: &str, blocks: &[FencedBlock]) -> Option<RawExtraction> {
    let inside_fence = |pos: usize| blocks.iter().any(|b| pos >= b.start && pos < b.end);

    let candidates = text
        .char_indices()
        .filter(|(i, c)| *c == '{' && !inside_fence(*i))
        .map(|(i, _)| i)
        .take(MAX_BRACE_CANDIDATES);

    for start in candidates {
        let Some(end) = balanced_object_end(text, start) else {
            continue;
        };
        if let Some(map) = parse_object(&text[start..end]) {
            return Some(success(
                explanation_before(text, start),
                map,
                ExtractionStrategy::BraceBalanced,
            ));
        }
    }
    None
}

fn try_greedy_regex(text: &str) -> Option<RawExtraction> {
    let m = greedy_object_re().find(text)?;
    let map = parse_object(m.as_str())?;
    Some(success(
        explanation_before(text, m.start()),
        map,
        ExtractionStrategy::GreedyRegex,
    ))
}

fn try_key_value_scan(text: &str) -> Option<RawExtraction> {
    let mut map = ManifestLike::new();
    let mut first_match: Option<usize> = None;

    for cap in key_value_re().captures_iter(text) {
        let (Some(whole), Some(key), Some(value)) = (cap.get(0), cap.get(1), cap.get(2)) else {
            continue;
        };
        let key = unescape_json_fragment(key.as_str());
        if !looks_like_path(&key) {
            continue;
        }
        first_match.get_or_insert(whole.start());
        map.insert(key, Value::String(unescape_json_fragment(value.as_str())));
    }

    if map.is_empty() {
        return None;
    }

    // Prose ends at the object that holds the first recovered pair.
    let first = first_match.unwrap_or(0);
    let cut = text[..first].rfind('{').unwrap_or(first);
    Some(success(
        explanation_before(text, cut),
        map,
        ExtractionStrategy::KeyValueScan,
    ))
}

/// Returns the byte offset just past the `}` matching the `{` at `start`.
///
/// Braces inside JSON string literals are ignored, so a value such as
/// `"recipe body with { and }"` does not disturb the count.
fn balanced_object_end(text: &str, start: usize) -> Option<usize> {
    let bytes = text.as_bytes();
    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;

    for (i, &b) in bytes.iter().enumerate().skip(start) {
        if in_string {
            if escaped {
                escaped = false;
            } else if b == b'\\' {
                escaped = true;
            } else if b == b'"' {
                in_string = false;
            }
            continue;
        }
        match b {
            b'"' => in_string = true,
            b'{' => depth += 1,
            b'}' => {
                depth = depth.saturating_sub(1);
                if depth == 0 {
                    return Some(i + 1);
                }
            }
            _ => {}
        }
    }
    None
}

pub(crate) fn fenced_blocks(text: &str) -> Vec<FencedBlock<'_>> {
    let mut blocks = Vec::new();
    let mut open: Option<(usize, usize, &str)> = None;
    let mut offset = 0;

    for line in text.split_inclusive('\n') {
        let trimmed = line.trim_start();
        if let Some(rest) = trimmed.strip_prefix("```") {
            match open.take() {
                Some((start, body_start, lang)) => blocks.push(FencedBlock {
                    lang,
                    body: &text[body_start..offset],
                    start,
                    end: offset + line.len(),
                }),
                None => open = Some((offset, offset + line.len(), rest.trim())),
            }
        }
        offset += line.len();
    }

    // An unterminated fence runs to the end of the text.
    if let Some((start, body_start, lang)) = open {
        blocks.push(FencedBlock {
            lang,
            body: &text[body_start.min(text.len())..],
            start,
            end: text.len(),
        });
    }
    blocks
}

fn explanation_before(text: &str, pos: usize) -> String {
    text[..pos]
        .lines()
        .filter(|line| !line.trim_start().starts_with("```"))
        .collect::<Vec<_>>()
        .join("\n")
        .trim()
        .to_string()
}

fn parse_object(candidate: &str) -> Option<ManifestLike> {
    match serde_json::from_str::<Value>(candidate) {
        Ok(Value::Object(map)) if !map.is_empty() => Some(map),
        _ => None,
    }
}

fn looks_like_path(key: &str) -> bool {
    !key.trim().is_empty() && (key.contains('/') || key.contains('.'))
}

/// Decodes a JSON string body, tolerating raw newlines and stray escapes
fn unescape_json_fragment(raw: &str) -> String {
    if let Ok(decoded) = serde_json::from_str::<String>(&format!("\"{}\"", raw)) {
        return decoded;
    }

    let mut out = String::with_capacity(raw.len());
    let mut chars = raw.chars();
    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }
        match chars.next() {
            Some('n') => out.push('\n'),
            Some('r') => out.push('\r'),
            Some('t') => out.push('\t'),
            Some('\\') => out.push('\\'),
            Some('"') => out.push('"'),
            Some('/') => out.push('/'),
            Some(other) => {
                out.push('\\');
                out.push(other);
            }
            None => out.push('\\'),
        }
    }
    out
}

fn greedy_object_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?s)(\{.*\})").expect("valid regex"))
}

fn key_value_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r#"(?s)"((?:[^"\\\n]|\\.)+)"\s*:\s*"((?:[^"\\]|\\.)*)""#).expect("valid regex")
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_empty_input_fails_immediately() {
        let result = extract_response("   \n");
        assert!(result.manifest.is_none());
        assert!(result.strategy.is_none());
    }

    #[test]
    fn test_tagged_json_block() {
        let text = "Here is your cookbook.\n\n```json\n{\"recipes/default.rb\": \"package 'git'\"}\n```\n";
        let result = extract_response(text);
        assert_eq!(result.strategy, Some(ExtractionStrategy::TaggedBlock));
        assert_eq!(result.explanation, "Here is your cookbook.");
        let map = result.manifest.unwrap();
        assert_eq!(map["recipes/default.rb"], json!("package 'git'"));
    }

    #[test]
    fn test_untagged_fenced_block() {
        let text = "Files:\n```\n{\"metadata.rb\": \"name 'web'\"}\n```";
        let result = extract_response(text);
        assert_eq!(result.strategy, Some(ExtractionStrategy::FencedBlock));
        assert_eq!(result.explanation, "Files:");
    }

    #[test]
    fn test_whole_text_json() {
        let result = extract_response("{\"README.md\": \"# web\"}");
        assert_eq!(result.strategy, Some(ExtractionStrategy::WholeText));
        assert_eq!(result.explanation, "");
    }

    #[test]
    fn test_brace_balanced_ignores_braces_in_strings() {
        let text = concat!(
            "I'll create the recipe.\n\n",
            "{\"recipes/default.rb\": \"recipe body with { and }\", \"README.md\": \"}}{\"}\n\n",
            "Let me know if you need anything {else}."
        );
        let result = extract_response(text);
        assert_eq!(result.strategy, Some(ExtractionStrategy::BraceBalanced));
        assert_eq!(result.explanation, "I'll create the recipe.");
        let map = result.manifest.unwrap();
        assert_eq!(map.len(), 2);
        assert_eq!(map["recipes/default.rb"], json!("recipe body with { and }"));
        assert_eq!(map["README.md"], json!("}}{"));
    }

    #[test]
    fn test_brace_scan_skips_braces_inside_code_fences() {
        let text = concat!(
            "Example usage:\n```ruby\nnode.default['x'] = { 'a' => 1 }\n```\n",
            "Manifest:\n{\"attributes/default.rb\": \"default['x'] = 1\"}"
        );
        let result = extract_response(text);
        assert_eq!(result.strategy, Some(ExtractionStrategy::BraceBalanced));
        assert!(result.explanation.contains("Manifest:"));
        assert!(!result.explanation.contains("```"));
        assert!(result.manifest.unwrap().contains_key("attributes/default.rb"));
    }

    #[test]
    fn test_key_value_scan_recovers_from_broken_json() {
        let text = concat!(
            "Partial output:\n{\n",
            "  \"recipes/\": \"\",\n",
            "  \"recipes/default.rb\": \"package \\\"nginx\\\"\\nservice 'nginx'\",\n",
            "  \"metadata.rb\": \"name 'web'\",\n",
            "  \"broken\": [1, 2,\n"
        );
        let result = extract_response(text);
        assert_eq!(result.strategy, Some(ExtractionStrategy::KeyValueScan));
        assert_eq!(result.explanation, "Partial output:");
        let map = result.manifest.unwrap();
        assert_eq!(map["recipes/"], json!(""));
        assert_eq!(
            map["recipes/default.rb"],
            json!("package \"nginx\"\nservice 'nginx'")
        );
        assert!(!map.contains_key("broken"));
    }

    #[test]
    fn test_plain_prose_fails() {
        let text = "I cannot help with that request.";
        let result = extract_response(text);
        assert!(!result.is_success());
        assert_eq!(result.explanation, text);
    }

    #[test]
    fn test_parsed_object_passes_through_unchanged() {
        let value = json!({"a/": "", "a/b.rb": {"content": "x"}});
        let result = extract_parsed(value.clone());
        assert_eq!(result.strategy, Some(ExtractionStrategy::Passthrough));
        assert_eq!(Value::Object(result.manifest.unwrap()), value);
    }

    #[test]
    fn test_balanced_object_end_handles_escaped_quotes() {
        let text = r#"{"a": "say \"}\" loudly"} trailing"#;
        let end = balanced_object_end(text, 0).unwrap();
        assert_eq!(&text[..end], r#"{"a": "say \"}\" loudly"}"#);
    }
}
